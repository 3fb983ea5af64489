/*!
 * Bridge facade tying the HTTP and MQTT sessions to the host's device lifecycle.
 *
 * The host hands over the account settings and a [`StatusListener`]. On
 * initialization the bridge signs in, syncs credentials and devices to disk,
 * reports whether it is online, and signs out again. Commands then go through
 * the MQTT session built from the persisted credentials.
 */
use std::fmt::Debug;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn, Instrument};

use meross_core::config::{Config, SharedConfig};
use meross_core::error::{Error, Result};
use meross_core::logging::component_span;

use crate::dto::{CloudCredentials, Device};
use crate::message::{CommandMessage, Method, MqttTopics};
use crate::protocols::http::{HttpReply, HttpSession, HttpSettings};
use crate::protocols::mqtt::{MqttIdentity, MqttSession, MqttSettings};
use crate::storage::CloudStore;

/// Status of the bridge as understood by the host platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeStatus {
    /// Initialization in progress
    Unknown,
    /// Signed in and synced
    Online,
    /// Offline because the settings are incomplete
    ConfigurationError(String),
    /// Offline because the cloud could not be reached or refused the account
    CommunicationError(String),
}

impl BridgeStatus {
    /// Whether the bridge is usable
    pub fn is_online(&self) -> bool {
        matches!(self, BridgeStatus::Online)
    }
}

impl From<&Error> for BridgeStatus {
    fn from(err: &Error) -> Self {
        match err {
            Error::Config(msg) => BridgeStatus::ConfigurationError(msg.clone()),
            other => BridgeStatus::CommunicationError(other.to_string()),
        }
    }
}

/// Receives status changes of a bridge
pub trait StatusListener: Send + Sync {
    /// Called on every status change
    fn on_status(&self, status: BridgeStatus);
}

impl<F> StatusListener for F
where
    F: Fn(BridgeStatus) + Send + Sync,
{
    fn on_status(&self, status: BridgeStatus) {
        self(status)
    }
}

/// Connector facade over the cloud sessions
pub struct MerossBridge {
    config: SharedConfig,
    http: Arc<HttpSession>,
    mqtt: Mutex<Option<Arc<MqttSession>>>,
    listener: Arc<dyn StatusListener>,
    status: RwLock<BridgeStatus>,
}

impl Debug for MerossBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MerossBridge")
            .field("host_name", &self.config.get().bridge.host_name)
            .finish_non_exhaustive()
    }
}

impl MerossBridge {
    /// Validate the settings, sign in and sync cloud data
    ///
    /// Reports `ConfigurationError` for blank account settings, `Online` after
    /// a successful sync and `CommunicationError` otherwise. The session is
    /// always signed out before returning.
    pub async fn initialize(config: &Config, listener: Arc<dyn StatusListener>) -> Result<Self> {
        if let Err(e) = config.bridge.validate() {
            listener.on_status(BridgeStatus::from(&e));
            return Err(e);
        }

        listener.on_status(BridgeStatus::Unknown);

        let http = match HttpSession::new(HttpSettings::from_config(config), CloudStore::from_config(config)) {
            Ok(session) => Arc::new(session),
            Err(e) => {
                listener.on_status(BridgeStatus::CommunicationError(e.to_string()));
                return Err(e);
            }
        };

        let bridge = Self {
            config: SharedConfig::new(config.clone()),
            http,
            mqtt: Mutex::new(None),
            listener,
            status: RwLock::new(BridgeStatus::Unknown),
        };

        let result = async {
            let result = bridge.fetch_data().await;
            bridge.logout().await;
            result
        }
        .instrument(component_span("meross-bridge", Some(&config.bridge.host_name)))
        .await;

        match result {
            Ok(()) => {
                info!(host = %config.bridge.host_name, "Meross bridge online");
                Ok(bridge)
            }
            Err(e) => Err(e),
        }
    }

    async fn report(&self, status: BridgeStatus) {
        *self.status.write().await = status.clone();
        self.listener.on_status(status);
    }

    /// Last reported status
    pub async fn status(&self) -> BridgeStatus {
        self.status.read().await.clone()
    }

    /// The underlying HTTP session
    pub fn http(&self) -> &Arc<HttpSession> {
        &self.http
    }

    /// Sign in
    pub async fn login(&self) -> Result<HttpReply> {
        self.http.login().await
    }

    /// Sign in and sync cloud data, reporting the resulting status
    ///
    /// A successful sync drops the cached MQTT session so the next command
    /// connects with the freshly persisted credentials.
    pub async fn fetch_data(&self) -> Result<()> {
        match self.http.fetch_data().await {
            Ok(()) => {
                *self.mqtt.lock().await = None;
                self.report(BridgeStatus::Online).await;
                Ok(())
            }
            Err(e) => {
                warn!("Cloud sync failed: {}", e);
                self.report(BridgeStatus::CommunicationError(e.to_string()))
                    .await;
                Err(e)
            }
        }
    }

    /// Sign out; never fails
    pub async fn logout(&self) {
        self.http.logout().await
    }

    /// Persisted credentials
    pub async fn read_credentials(&self) -> Result<CloudCredentials> {
        self.http.read_credentials().await
    }

    /// Persisted device list
    pub async fn read_devices(&self) -> Result<Vec<Device>> {
        self.http.read_devices().await
    }

    /// UUID of the named device, or `""`
    pub async fn dev_uuid_by_dev_name(&self, dev_name: &str) -> String {
        self.http.dev_uuid_by_dev_name(dev_name).await
    }

    async fn mqtt_session(&self) -> Result<Arc<MqttSession>> {
        let mut slot = self.mqtt.lock().await;
        if let Some(session) = slot.as_ref() {
            return Ok(Arc::clone(session));
        }

        let credentials = self.read_credentials().await?;
        let session = Arc::new(MqttSession::new(
            MqttSettings::from_config(self.config.get()),
            MqttIdentity::from_credentials(&credentials),
        ));
        debug!(client_id = %session.identity().topics.client_id(), "Created MQTT session");

        *slot = Some(Arc::clone(&session));
        Ok(session)
    }

    /// Publish raw bytes to `request_topic` and return the reply, `""` if none
    pub async fn publish(&self, message: &[u8], request_topic: &str) -> Result<String> {
        self.mqtt_session()
            .await?
            .publish_and_await_reply(message, request_topic)
            .await
    }

    /// Send a signed command to the named device and return the reply
    pub async fn send_command(
        &self,
        dev_name: &str,
        method: Method,
        namespace: &str,
        payload: Value,
    ) -> Result<String> {
        let uuid = self.dev_uuid_by_dev_name(dev_name).await;
        if uuid.is_empty() {
            return Err(Error::other(format!("Unknown device '{}'", dev_name)));
        }

        let session = self.mqtt_session().await?;
        let identity = session.identity();
        let message = CommandMessage::build(
            method,
            namespace,
            payload,
            &uuid,
            &identity.key,
            &identity.topics.response_topic(),
        );

        session
            .publish_and_await_reply(&message.to_bytes()?, &MqttTopics::request_topic(&uuid))
            .await
    }
}
