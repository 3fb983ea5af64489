/*!
 * MQTT request/reply exchange with the Meross broker.
 *
 * Every call opens its own broker connection, subscribes to the user and
 * response topics, publishes one command and waits a bounded time for the
 * first message on a subscribed topic. The connection is torn down before the
 * call returns. A missing reply is a normal outcome and yields an empty string.
 */
use std::time::Duration;

use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Outgoing,
    Packet, QoS, SubscribeFilter, Transport,
};
use tokio::sync::Mutex;
use tracing::{debug, info, Instrument};

use meross_core::config::Config;
use meross_core::error::{Error, Result};
use meross_core::logging::operation_span;
use meross_core::utils::with_timeout;

use crate::dto::CloudCredentials;
use crate::message::MqttTopics;
use crate::sign::mqtt_password;

const COMPONENT: &str = "meross-mqtt";
const REQUEST_CHANNEL_CAPACITY: usize = 10;
const RECONNECT_DELAY: Duration = Duration::from_millis(200);
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Connection settings of the MQTT session
#[derive(Debug, Clone)]
pub struct MqttSettings {
    /// Broker host; overrides the MQTT domain of the credentials when set
    pub broker_host: Option<String>,
    /// Broker port
    pub port: u16,
    /// Connect over TLS with the platform's root certificates
    pub use_tls: bool,
    /// Keep-alive interval
    pub keep_alive: Duration,
    /// Reply window after publishing
    pub reception_timeout: Duration,
    /// Connection acknowledgement window
    pub connect_timeout: Duration,
}

impl MqttSettings {
    /// Build settings from the MQTT section of the configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            broker_host: config.mqtt.broker_host.clone(),
            port: config.mqtt.port,
            use_tls: config.mqtt.use_tls,
            keep_alive: config.mqtt.keep_alive(),
            reception_timeout: config.mqtt.reception_timeout(),
            connect_timeout: config.mqtt.connect_timeout(),
        }
    }
}

/// Who the session connects as
#[derive(Debug, Clone)]
pub struct MqttIdentity {
    /// Account user id, used as the MQTT username
    pub user_id: String,
    /// Account key, combined with the user id into the password
    pub key: String,
    /// Broker host from the credentials
    pub broker_host: String,
    /// Topics of this application instance
    pub topics: MqttTopics,
}

impl MqttIdentity {
    /// Identity for the account in `credentials`, with a fresh application id
    pub fn from_credentials(credentials: &CloudCredentials) -> Self {
        Self {
            user_id: credentials.user_id.clone(),
            key: credentials.key.clone(),
            broker_host: credentials.mqtt_domain.clone(),
            topics: MqttTopics::generate(credentials.user_id.clone()),
        }
    }
}

/// One-shot publish/await-reply session
#[derive(Debug)]
pub struct MqttSession {
    settings: MqttSettings,
    identity: MqttIdentity,
    exclusive: Mutex<()>,
}

impl MqttSession {
    /// Create a session; no connection is opened until a message is published
    pub fn new(settings: MqttSettings, identity: MqttIdentity) -> Self {
        Self {
            settings,
            identity,
            exclusive: Mutex::new(()),
        }
    }

    /// The identity the session connects as
    pub fn identity(&self) -> &MqttIdentity {
        &self.identity
    }

    fn broker_host(&self) -> &str {
        self.settings
            .broker_host
            .as_deref()
            .unwrap_or(&self.identity.broker_host)
    }

    fn options(&self) -> MqttOptions {
        let password = mqtt_password(&self.identity.user_id, &self.identity.key);

        let mut options = MqttOptions::new(
            self.identity.topics.client_id(),
            self.broker_host(),
            self.settings.port,
        );
        options
            .set_credentials(self.identity.user_id.clone(), password)
            .set_keep_alive(self.settings.keep_alive)
            .set_clean_session(false);

        if self.settings.use_tls {
            options.set_transport(Transport::tls_with_default_config());
        }
        options
    }

    /// Publish `message` to `request_topic` and return the first reply
    ///
    /// Returns an empty string when no reply with a payload arrives within the
    /// reception window. Fails with a connectivity error when the broker does
    /// not accept the connection. Concurrent calls on the same session are
    /// served one after the other.
    pub async fn publish_and_await_reply(&self, message: &[u8], request_topic: &str) -> Result<String> {
        let _exclusive = self.exclusive.lock().await;

        async {
            let (client, mut eventloop) = AsyncClient::new(self.options(), REQUEST_CHANNEL_CAPACITY);
            let mut connected = false;

            let result = self
                .exchange(&client, &mut eventloop, &mut connected, message, request_topic)
                .await;

            if connected {
                disconnect(&client, &mut eventloop).await;
            }
            result
        }
        .instrument(operation_span("publish", COMPONENT))
        .await
    }

    async fn exchange(
        &self,
        client: &AsyncClient,
        eventloop: &mut EventLoop,
        connected: &mut bool,
        message: &[u8],
        request_topic: &str,
    ) -> Result<String> {
        with_timeout(self.settings.connect_timeout, wait_for_connack(eventloop))
            .await
            .map_err(|e| match e {
                Error::Timeout(msg) => {
                    Error::connectivity(format!("No acknowledgement from broker: {}", msg))
                }
                other => other,
            })?;
        *connected = true;
        info!(
            host = self.broker_host(),
            port = self.settings.port,
            "Connected to Meross broker"
        );

        let user_topic = self.identity.topics.user_topic();
        let response_topic = self.identity.topics.response_topic();

        client
            .subscribe_many(vec![
                SubscribeFilter::new(user_topic.clone(), QoS::AtLeastOnce),
                SubscribeFilter::new(response_topic.clone(), QoS::AtLeastOnce),
            ])
            .await
            .map_err(|e| Error::connectivity(format!("Failed to subscribe: {}", e)))?;

        client
            .publish(request_topic, QoS::AtMostOnce, false, message.to_vec())
            .await
            .map_err(|e| Error::connectivity(format!("Failed to publish: {}", e)))?;

        let subscribed = [user_topic, response_topic];
        Ok(self.await_reply(eventloop, &subscribed).await.unwrap_or_default())
    }

    async fn await_reply(&self, eventloop: &mut EventLoop, subscribed: &[String]) -> Option<String> {
        let first_publish = async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(publish)))
                        if subscribed.contains(&publish.topic) =>
                    {
                        return publish;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        // the next poll reconnects
                        debug!("Broker connection interrupted: {}", e);
                        tokio::time::sleep(RECONNECT_DELAY).await;
                    }
                }
            }
        };

        match tokio::time::timeout(self.settings.reception_timeout, first_publish).await {
            Ok(publish) if publish.payload.is_empty() => {
                debug!("Received a MQTT message without a payload");
                None
            }
            Ok(publish) => {
                debug!(topic = %publish.topic, "Received MQTT reply");
                Some(String::from_utf8_lossy(&publish.payload).into_owned())
            }
            Err(_) => {
                debug!("Did not receive MQTT message within timeout");
                None
            }
        }
    }
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<()> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                return if ack.code == ConnectReturnCode::Success {
                    Ok(())
                } else {
                    Err(Error::connectivity(format!("Connection failed: {:?}", ack.code)))
                };
            }
            Ok(_) => {}
            Err(ConnectionError::ConnectionRefused(code)) => {
                debug!("Connection failed: {:?}", code);
                return Err(Error::connectivity(format!("Connection failed: {:?}", code)));
            }
            Err(e) => {
                return Err(Error::connectivity(format!("Connection failed: {}", e)));
            }
        }
    }
}

async fn disconnect(client: &AsyncClient, eventloop: &mut EventLoop) {
    if let Err(e) = client.disconnect().await {
        debug!("Failed to request disconnect: {}", e);
        return;
    }

    let flush = async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    };
    if tokio::time::timeout(DISCONNECT_TIMEOUT, flush).await.is_err() {
        debug!("Disconnect was not flushed in time");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> MqttIdentity {
        MqttIdentity::from_credentials(&CloudCredentials {
            user_id: "1234".to_string(),
            key: "key".to_string(),
            mqtt_domain: "mqtt-eu-3.meross.com".to_string(),
            ..CloudCredentials::default()
        })
    }

    #[test]
    fn test_settings_from_config() {
        let settings = MqttSettings::from_config(&Config::default());
        assert_eq!(settings.port, 443);
        assert!(settings.use_tls);
        assert_eq!(settings.reception_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_broker_host_override() {
        let mut settings = MqttSettings::from_config(&Config::default());
        let session = MqttSession::new(settings.clone(), identity());
        assert_eq!(session.broker_host(), "mqtt-eu-3.meross.com");

        settings.broker_host = Some("127.0.0.1".to_string());
        let session = MqttSession::new(settings, identity());
        assert_eq!(session.broker_host(), "127.0.0.1");
    }

    #[test]
    fn test_options() {
        let mut settings = MqttSettings::from_config(&Config::default());
        settings.use_tls = false;
        let session = MqttSession::new(settings, identity());
        let options = session.options();

        assert_eq!(options.client_id(), session.identity().topics.client_id());
        assert_eq!(options.broker_address(), ("mqtt-eu-3.meross.com".to_string(), 443));
        assert_eq!(options.keep_alive(), Duration::from_secs(5));
        assert!(!options.clean_session());
        assert_eq!(
            options.credentials(),
            Some(("1234".to_string(), mqtt_password("1234", "key")))
        );
    }
}
