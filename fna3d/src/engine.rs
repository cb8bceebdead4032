/// FNA3D Engine - global logger and graphics driver registry
///
/// Drivers register a factory under a name; `Engine::create_device` picks one
/// (honoring `FNA3D_FORCE_DRIVER`) and hands back an owned device. The engine
/// keeps no reference to created devices.

use std::sync::{OnceLock, RwLock, Arc};
use std::time::SystemTime;
use crate::device::{Device, PresentationParameters, Config};
use crate::error::{Result, Error};
use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};

// ===== INTERNAL STATE =====

/// Registered drivers, in registration order
static DRIVERS: OnceLock<RwLock<Vec<DriverEntry>>> = OnceLock::new();

/// Global logger (initialized with DefaultLogger)
static LOGGER: OnceLock<RwLock<Box<dyn Logger>>> = OnceLock::new();

/// Driver factory function type
pub type DriverFactory = Box<dyn Fn(&PresentationParameters, &Config) -> Result<Box<dyn Device>> + Send + Sync>;

struct DriverEntry {
    name: String,
    factory: Arc<DriverFactory>,
}

fn drivers() -> &'static RwLock<Vec<DriverEntry>> {
    DRIVERS.get_or_init(|| RwLock::new(Vec::new()))
}

// ===== PUBLIC API =====

/// Engine entry points
///
/// # Example
///
/// ```no_run
/// use fna3d::fna3d::Engine;
/// use fna3d::fna3d::render::PresentationParameters;
///
/// // Drivers register themselves, e.g. fna3d_renderer_vulkan::register()
/// let mut device = Engine::create_device(&PresentationParameters::default(), false)?;
/// # Ok::<(), fna3d::fna3d::Error>(())
/// ```
pub struct Engine;

impl Engine {
    /// Helper to log errors before returning them (internal use)
    fn log_and_return_error(error: Error) -> Error {
        match &error {
            Error::InitializationFailed(msg) => {
                crate::engine_error!("fna3d::Engine", "Initialization failed: {}", msg);
            }
            Error::BackendError(msg) => {
                crate::engine_error!("fna3d::Engine", "Backend error: {}", msg);
            }
            _ => {
                crate::engine_error!("fna3d::Engine", "Engine error: {}", error);
            }
        }
        error
    }

    // ===== DRIVER REGISTRY =====

    /// Register a driver factory under `name`
    ///
    /// Registering an existing name replaces its factory in place.
    pub fn register_driver<F>(name: &str, factory: F) -> Result<()>
    where
        F: Fn(&PresentationParameters, &Config) -> Result<Box<dyn Device>> + Send + Sync + 'static,
    {
        let mut lock = drivers().write()
            .map_err(|_| Self::log_and_return_error(
                Error::BackendError("Driver registry lock poisoned".to_string())
            ))?;

        let factory: Arc<DriverFactory> = Arc::new(Box::new(factory));
        if let Some(entry) = lock.iter_mut().find(|entry| entry.name == name) {
            entry.factory = factory;
        } else {
            lock.push(DriverEntry { name: name.to_string(), factory });
        }

        crate::engine_debug!("fna3d::Engine", "Registered graphics driver '{}'", name);
        Ok(())
    }

    /// Names of the registered drivers, in registration order
    pub fn driver_names() -> Vec<String> {
        drivers()
            .read()
            .map(|lock| lock.iter().map(|entry| entry.name.clone()).collect())
            .unwrap_or_default()
    }

    /// Create a device using the environment configuration
    pub fn create_device(params: &PresentationParameters, debug_mode: bool) -> Result<Box<dyn Device>> {
        let mut config = Config::from_env();
        config.debug_mode = debug_mode;
        Self::create_device_with_config(params, &config)
    }

    /// Create a device with an explicit configuration
    ///
    /// Uses the driver named by `config.force_driver` (case-insensitive), or
    /// the first registered driver.
    pub fn create_device_with_config(params: &PresentationParameters, config: &Config) -> Result<Box<dyn Device>> {
        let (name, factory) = {
            let lock = drivers().read()
                .map_err(|_| Self::log_and_return_error(
                    Error::BackendError("Driver registry lock poisoned".to_string())
                ))?;

            let entry = match &config.force_driver {
                Some(forced) => lock
                    .iter()
                    .find(|entry| entry.name.eq_ignore_ascii_case(forced))
                    .ok_or_else(|| Self::log_and_return_error(
                        Error::InitializationFailed(format!("Forced driver '{}' is not registered", forced))
                    ))?,
                None => lock
                    .first()
                    .ok_or_else(|| Self::log_and_return_error(
                        Error::InitializationFailed("No graphics driver registered".to_string())
                    ))?,
            };
            (entry.name.clone(), entry.factory.clone())
        };

        crate::engine_info!("fna3d::Engine", "Creating device with driver '{}'", name);
        factory(params, config)
    }

    /// Remove every registered driver (only available in test builds)
    #[cfg(test)]
    pub fn reset_for_testing() {
        if let Ok(mut lock) = drivers().write() {
            lock.clear();
        }
    }

    // ===== LOGGING API =====

    /// Replace the default logger with a custom implementation
    pub fn set_logger<L: Logger + 'static>(logger: L) {
        let logger_lock = LOGGER.get_or_init(|| RwLock::new(Box::new(DefaultLogger)));
        if let Ok(mut lock) = logger_lock.write() {
            *lock = Box::new(logger);
        }
    }

    /// Reset logger to default (DefaultLogger)
    pub fn reset_logger() {
        let logger_lock = LOGGER.get_or_init(|| RwLock::new(Box::new(DefaultLogger)));
        if let Ok(mut lock) = logger_lock.write() {
            *lock = Box::new(DefaultLogger);
        }
    }

    /// Internal logging method (for simple logs without file:line)
    ///
    /// Used by macros like engine_info!, engine_warn!, etc.
    pub fn log(severity: LogSeverity, source: &str, message: String) {
        let logger_lock = LOGGER.get_or_init(|| RwLock::new(Box::new(DefaultLogger)));
        if let Ok(lock) = logger_lock.read() {
            lock.log(&LogEntry {
                severity,
                timestamp: SystemTime::now(),
                source: source.to_string(),
                message,
                file: None,
                line: None,
            });
        }
    }

    /// Internal logging method with file:line information (for ERROR logs)
    pub fn log_detailed(
        severity: LogSeverity,
        source: &str,
        message: String,
        file: &'static str,
        line: u32,
    ) {
        let logger_lock = LOGGER.get_or_init(|| RwLock::new(Box::new(DefaultLogger)));
        if let Ok(lock) = logger_lock.read() {
            lock.log(&LogEntry {
                severity,
                timestamp: SystemTime::now(),
                source: source.to_string(),
                message,
                file: Some(file),
                line: Some(line),
            });
        }
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
