//! Unit tests for the Engine driver registry and logging API
//!
//! IMPORTANT: the registry and logger are process-wide statics.
//! All tests are marked with #[serial] to run sequentially.

use crate::fna3d::{Engine, Error};
use crate::fna3d::log::{Logger, LogEntry, LogSeverity};
use crate::device::mock_device::MockDevice;
use crate::device::{Config, Device, PresentationParameters};
use std::sync::{Arc, Mutex};
use serial_test::serial;

// ============================================================================
// TEST HELPERS
// ============================================================================

/// Test logger that captures log entries for verification
struct TestLogger {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Logger for TestLogger {
    fn log(&self, entry: &LogEntry) {
        let mut entries = self.entries.lock().unwrap();
        entries.push(format!("{:?}: {}", entry.severity, entry.message));
    }
}

fn setup() {
    Engine::reset_for_testing();
}

fn register_mock(name: &str, tag: u32) {
    Engine::register_driver(name, move |params, config| {
        let mut device = MockDevice::new(params, config);
        device.draw_calls = tag;
        Ok(Box::new(device) as Box<dyn Device>)
    })
    .unwrap();
}

// ============================================================================
// DRIVER REGISTRY TESTS
// ============================================================================

#[test]
#[serial]
fn test_create_device_without_drivers_fails() {
    setup();
    let result = Engine::create_device_with_config(&PresentationParameters::default(), &Config::default());
    assert!(matches!(result, Err(Error::InitializationFailed(_))));
}

#[test]
#[serial]
fn test_first_registered_driver_is_default() {
    setup();
    register_mock("Vulkan", 1);
    register_mock("Null", 2);

    let device = Engine::create_device_with_config(&PresentationParameters::default(), &Config::default()).unwrap();
    assert_eq!(device.stats().draw_calls, 1);
    assert_eq!(Engine::driver_names(), vec!["Vulkan".to_string(), "Null".to_string()]);
}

#[test]
#[serial]
fn test_forced_driver_is_selected_case_insensitively() {
    setup();
    register_mock("Vulkan", 1);
    register_mock("Null", 2);

    let config = Config { force_driver: Some("null".to_string()), ..Config::default() };
    let device = Engine::create_device_with_config(&PresentationParameters::default(), &config).unwrap();
    assert_eq!(device.stats().draw_calls, 2);
}

#[test]
#[serial]
fn test_unknown_forced_driver_fails() {
    setup();
    register_mock("Vulkan", 1);

    let config = Config { force_driver: Some("Metal".to_string()), ..Config::default() };
    let result = Engine::create_device_with_config(&PresentationParameters::default(), &config);
    assert!(matches!(result, Err(Error::InitializationFailed(_))));
}

#[test]
#[serial]
fn test_reregistering_replaces_factory() {
    setup();
    register_mock("Vulkan", 1);
    register_mock("Vulkan", 5);

    assert_eq!(Engine::driver_names().len(), 1);
    let device = Engine::create_device_with_config(&PresentationParameters::default(), &Config::default()).unwrap();
    assert_eq!(device.stats().draw_calls, 5);
}

#[test]
#[serial]
fn test_factory_receives_presentation_parameters() {
    setup();
    register_mock("Vulkan", 0);

    let params = PresentationParameters {
        back_buffer_width: 1280,
        back_buffer_height: 720,
        ..PresentationParameters::default()
    };
    let device = Engine::create_device_with_config(&params, &Config::default()).unwrap();
    assert_eq!(device.backbuffer_size(), (1280, 720));
}

#[test]
#[serial]
fn test_factory_error_is_propagated() {
    setup();
    Engine::register_driver("Broken", |_, _| Err(Error::DeviceLost)).unwrap();

    let result = Engine::create_device_with_config(&PresentationParameters::default(), &Config::default());
    assert!(matches!(result, Err(Error::DeviceLost)));
}

// ============================================================================
// LOGGING API TESTS
// ============================================================================

#[test]
#[serial]
fn test_set_logger_captures_entries() {
    setup();
    let entries = Arc::new(Mutex::new(Vec::new()));
    Engine::set_logger(TestLogger { entries: entries.clone() });

    Engine::log(LogSeverity::Info, "fna3d::test", "hello".to_string());
    crate::engine_warn!("fna3d::test", "careful {}", 1);

    {
        let entries = entries.lock().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], "Info: hello");
        assert_eq!(entries[1], "Warn: careful 1");
    }

    Engine::reset_logger();
    Engine::log(LogSeverity::Info, "fna3d::test", "not captured".to_string());
    assert_eq!(entries.lock().unwrap().len(), 2);
}

#[test]
#[serial]
fn test_registry_errors_are_logged() {
    setup();
    let entries = Arc::new(Mutex::new(Vec::new()));
    Engine::set_logger(TestLogger { entries: entries.clone() });

    let _ = Engine::create_device_with_config(&PresentationParameters::default(), &Config::default());

    assert!(entries.lock().unwrap().iter().any(|e| e.starts_with("Error:")));
    Engine::reset_logger();
}
