/*!
 * Prelude module for Meross Core.
 *
 * This module re-exports commonly used types and functions from the Meross Core crate
 * to make them easier to import.
 */

// Re-export error types
pub use crate::error::{Error, Result};

// Re-export config types
pub use crate::config::{
    BridgeConfig, Config, ConfigBuilder, HttpConfig, LoggingConfig, MqttConfig, SharedConfig,
};

// Re-export utility functions
pub use crate::utils::{spawn_and_log, with_timeout};

// Re-export logging helpers
pub use crate::logging::{component_span, operation_span};
pub use tracing::{debug, error, info, trace, warn};
