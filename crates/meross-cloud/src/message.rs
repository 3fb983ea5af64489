/*!
 * MQTT topics and signed command messages for Meross appliances.
 */
use std::fmt;

use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use meross_core::error::Result;

use crate::sign::md5_hex;

/// Namespace reading the full device state
pub const NAMESPACE_SYSTEM_ALL: &str = "Appliance.System.All";
/// Namespace switching a channel of a multi-channel device
pub const NAMESPACE_TOGGLE_X: &str = "Appliance.Control.ToggleX";

const TRIGGER_SOURCE: &str = "Android";
const PAYLOAD_VERSION: u8 = 1;

/// Random application id, MD5 of a fresh UUID
pub fn generate_app_id() -> String {
    md5_hex(uuid::Uuid::new_v4().to_string())
}

/// Topic names of one application instance of a user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttTopics {
    user_id: String,
    app_id: String,
}

impl MqttTopics {
    /// Topics for `user_id` seen from the application `app_id`
    pub fn new(user_id: impl Into<String>, app_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            app_id: app_id.into(),
        }
    }

    /// Topics with a freshly generated application id
    pub fn generate(user_id: impl Into<String>) -> Self {
        Self::new(user_id, generate_app_id())
    }

    /// The application id
    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    /// MQTT client identifier
    pub fn client_id(&self) -> String {
        format!("app:{}", self.app_id)
    }

    /// Topic carrying pushes addressed to the user
    pub fn user_topic(&self) -> String {
        format!("/app/{}/subscribe", self.user_id)
    }

    /// Topic devices answer requests on
    pub fn response_topic(&self) -> String {
        format!("/app/{}-{}/subscribe", self.user_id, self.app_id)
    }

    /// Topic a device listens for requests on
    pub fn request_topic(device_uuid: &str) -> String {
        format!("/appliance/{}/subscribe", device_uuid)
    }
}

/// Request method of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    /// Read state
    Get,
    /// Change state
    Set,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Method::Get => "GET",
            Method::Set => "SET",
        };
        f.write_str(name)
    }
}

/// Header of a command message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageHeader {
    /// Topic the device should answer on
    pub from: String,
    /// Random id, echoed in the reply
    pub message_id: String,
    /// Request method
    pub method: Method,
    /// Appliance namespace
    pub namespace: String,
    /// Always 1
    pub payload_version: u8,
    /// MD5 over message id, key and timestamp
    pub sign: String,
    /// Epoch seconds
    pub timestamp: i64,
    /// Origin of the request
    pub trigger_src: String,
    /// Target device
    pub uuid: String,
}

/// A signed command for one device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandMessage {
    /// Message header
    pub header: MessageHeader,
    /// Namespace specific payload
    pub payload: Value,
}

impl CommandMessage {
    /// Build a command signed with the account key
    pub fn build(
        method: Method,
        namespace: &str,
        payload: Value,
        device_uuid: &str,
        key: &str,
        from: &str,
    ) -> Self {
        Self::build_at(
            method,
            namespace,
            payload,
            device_uuid,
            key,
            from,
            md5_hex(uuid::Uuid::new_v4().to_string()),
            Utc::now().timestamp(),
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn build_at(
        method: Method,
        namespace: &str,
        payload: Value,
        device_uuid: &str,
        key: &str,
        from: &str,
        message_id: String,
        timestamp: i64,
    ) -> Self {
        let sign = md5_hex(format!("{}{}{}", message_id, key, timestamp));
        Self {
            header: MessageHeader {
                from: from.to_string(),
                message_id,
                method,
                namespace: namespace.to_string(),
                payload_version: PAYLOAD_VERSION,
                sign,
                timestamp,
                trigger_src: TRIGGER_SOURCE.to_string(),
                uuid: device_uuid.to_string(),
            },
            payload,
        }
    }

    /// JSON encoding of the message
    pub fn to_bytes(&self) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }
}

/// Payload switching `channel` on or off
pub fn toggle_x_payload(channel: u32, on: bool) -> Value {
    json!({
        "togglex": {
            "channel": channel,
            "onoff": u8::from(on),
        }
    })
}
