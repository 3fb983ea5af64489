/*!
 * Meross Cloud
 *
 * This crate connects to the Meross cloud: it signs in over HTTP, persists
 * the account credentials and device list, and exchanges commands with
 * devices over the cloud MQTT broker.
 */

#![warn(missing_docs)]

// Re-export core types
pub use meross_core::prelude;

pub mod api;
pub mod bridge;
pub mod dto;
pub mod message;
pub mod protocols;
pub mod sign;
pub mod storage;

pub use api::{ApiStatusCode, HttpEndpoint, API_STATUS_UNKNOWN, SECRET_PREFIX};
pub use bridge::{BridgeStatus, MerossBridge, StatusListener};
pub use dto::{CloudCredentials, Device};
pub use message::{CommandMessage, Method, MqttTopics};
pub use protocols::{HttpReply, HttpSession, MqttSession, SessionState};
pub use storage::CloudStore;

/// Meross cloud crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
