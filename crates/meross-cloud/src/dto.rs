/*!
 * Data returned by the Meross cloud and persisted on disk.
 */
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Account credentials returned by a successful sign-in
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudCredentials {
    /// Account user id, MQTT username
    #[serde(rename = "userid", default)]
    pub user_id: String,
    /// Account e-mail
    #[serde(default)]
    pub email: String,
    /// Bearer token for subsequent HTTP calls
    #[serde(default)]
    pub token: String,
    /// Shared key used for MQTT password and message signing
    #[serde(default)]
    pub key: String,
    /// Regional HTTP API domain
    #[serde(default)]
    pub domain: String,
    /// Regional MQTT broker domain
    #[serde(rename = "mqttDomain", default)]
    pub mqtt_domain: String,
}

/// A device bound to the account
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Device {
    /// Device identifier, part of the MQTT request topic
    pub uuid: String,
    /// Name given in the Meross app
    pub dev_name: String,
    /// 1 when online
    #[serde(skip_serializing_if = "Option::is_none")]
    pub online_status: Option<i64>,
    /// Icon identifier
    pub dev_icon_id: String,
    /// Epoch seconds of binding to the account
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_time: Option<i64>,
    /// Model, e.g. `mss310`
    pub device_type: String,
    /// Regional sub type
    pub sub_type: String,
    /// Channel descriptors
    pub channels: Vec<Value>,
    /// Cloud region
    pub region: String,
    /// Firmware version
    pub fmware_version: String,
    /// Hardware version
    pub hdware_version: String,
    /// Custom icon
    pub user_dev_icon: String,
    /// Icon type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_type: Option<i64>,
    /// MQTT domain the device is attached to
    pub domain: String,
    /// Fallback MQTT domain
    pub reserved_domain: String,
}

impl Device {
    /// Whether the cloud reports the device as online
    pub fn is_online(&self) -> bool {
        self.online_status == Some(1)
    }
}
