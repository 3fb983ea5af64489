/*!
 * Transport sessions with the Meross cloud.
 *
 * `http` handles sign-in and data retrieval, `mqtt` the command exchange.
 */

pub mod http;
pub mod mqtt;

// Re-export the sessions for convenience
pub use http::{HttpReply, HttpSession, HttpSettings, SessionState};
pub use mqtt::{MqttIdentity, MqttSession, MqttSettings};
