//! Integration tests for the driver registry
//!
//! Drivers registered here never open a GPU: their factories record what
//! they were asked for and fail. No GPU required.
//!
//! Run with: cargo test --test engine_integration_tests

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use fna3d::fna3d::render::PresentationParameters;
use fna3d::fna3d::{Config, Engine, Error};
use serial_test::serial;

/// Register `name` with a factory that counts calls, keeps the config and fails
fn register_recording_driver(name: &str) -> (Arc<AtomicU32>, Arc<Mutex<Option<Config>>>) {
    let calls = Arc::new(AtomicU32::new(0));
    let seen = Arc::new(Mutex::new(None));
    let (calls_in, seen_in) = (calls.clone(), seen.clone());
    let driver = name.to_string();
    Engine::register_driver(name, move |_params, config| {
        calls_in.fetch_add(1, Ordering::SeqCst);
        *seen_in.lock().unwrap() = Some(config.clone());
        Err(Error::InitializationFailed(format!("{} has no GPU", driver)))
    })
    .unwrap();
    (calls, seen)
}

#[test]
#[serial]
fn test_integration_register_lists_driver() {
    register_recording_driver("IntegrationListed");
    assert!(Engine::driver_names().iter().any(|name| name == "IntegrationListed"));
}

#[test]
#[serial]
fn test_integration_forced_driver_is_case_insensitive() {
    let (calls, seen) = register_recording_driver("IntegrationForced");
    let config = Config {
        force_driver: Some("integrationforced".to_string()),
        defrag_cooldown_frames: 9,
        ..Config::default()
    };

    let result = Engine::create_device_with_config(&PresentationParameters::default(), &config);
    assert!(matches!(result, Err(Error::InitializationFailed(message)) if message.contains("IntegrationForced")));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(seen.lock().unwrap().as_ref().map(|config| config.defrag_cooldown_frames), Some(9));
}

#[test]
#[serial]
fn test_integration_unknown_forced_driver_fails() {
    register_recording_driver("IntegrationPresent");
    let config = Config { force_driver: Some("Metal".to_string()), ..Config::default() };

    let result = Engine::create_device_with_config(&PresentationParameters::default(), &config);
    assert!(matches!(result, Err(Error::InitializationFailed(message)) if message.contains("Metal")));
}

#[test]
#[serial]
fn test_integration_reregistering_replaces_factory() {
    let (first_calls, _) = register_recording_driver("IntegrationReplaced");
    let (second_calls, _) = register_recording_driver("IntegrationReplaced");
    let config = Config { force_driver: Some("IntegrationReplaced".to_string()), ..Config::default() };

    let _ = Engine::create_device_with_config(&PresentationParameters::default(), &config);
    assert_eq!(first_calls.load(Ordering::SeqCst), 0);
    assert_eq!(second_calls.load(Ordering::SeqCst), 1);
    let listed = Engine::driver_names().iter().filter(|name| *name == "IntegrationReplaced").count();
    assert_eq!(listed, 1);
}
