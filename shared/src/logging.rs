//! Logging infrastructure for the Latchkey shared library
//!
//! This module provides configurable logging support built on tracing,
//! kept deliberately small: one global configuration and a fmt
//! subscriber that host applications initialize once at startup.

use std::sync::{Arc, Mutex, OnceLock};

use tracing::Level;

/// Global logging configuration
static LOGGING_CONFIG: OnceLock<Arc<Mutex<LoggingConfig>>> = OnceLock::new();

/// Logging configuration structure
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Whether debug logging is enabled
    pub debug_enabled: bool,
    /// Log level filter
    pub level: Level,
    /// Whether to include thread information
    pub include_thread_info: bool,
    /// Whether to include event targets
    pub include_targets: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            debug_enabled: false,
            level: Level::INFO,
            include_thread_info: false,
            include_targets: true,
        }
    }
}

/// Initialize the logging system with defaults
///
/// Safe to call once per process; a second call reports an error
/// instead of replacing the subscriber.
pub fn init_logging() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = LoggingConfig::default();

    LOGGING_CONFIG
        .set(Arc::new(Mutex::new(config.clone())))
        .map_err(|_| "Logging already initialized")?;

    setup_subscriber(&config);
    Ok(())
}

/// Enable or disable debug logging
pub fn set_debug_enabled(enabled: bool) {
    if let Some(global_config) = LOGGING_CONFIG.get() {
        if let Ok(mut stored_config) = global_config.lock() {
            stored_config.debug_enabled = enabled;
            stored_config.level = if enabled { Level::DEBUG } else { Level::INFO };
        }
    }
}

/// Check if debug logging is enabled
pub fn is_debug_enabled() -> bool {
    LOGGING_CONFIG
        .get()
        .and_then(|config| config.lock().ok())
        .map(|config| config.debug_enabled)
        .unwrap_or(false)
}

/// Get current logging configuration
pub fn get_config() -> LoggingConfig {
    LOGGING_CONFIG
        .get()
        .and_then(|config| config.lock().ok())
        .map(|config| config.clone())
        .unwrap_or_default()
}

/// Set up the tracing subscriber based on configuration
///
/// Tolerates an already-installed subscriber so embedding applications
/// keep control of their own logging setup.
fn setup_subscriber(config: &LoggingConfig) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(config.level)
        .with_target(config.include_targets)
        .with_thread_ids(config.include_thread_info)
        .with_thread_names(config.include_thread_info)
        .try_init();
}
