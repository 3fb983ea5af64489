//! Stand-ins for the Meross cloud used by the integration tests.
//!
//! `StubApi` serves the three HTTP endpoints with axum and records every call.
//! `StubBroker` speaks just enough MQTT 3.1.1 over plain TCP to accept a
//! connection, acknowledge subscriptions and answer a publish.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use meross_core::config::Config;

pub const TOKEN: &str = "tok-1";
pub const USER_ID: &str = "1234";
pub const KEY: &str = "key-1";

/// A configuration pointing at the stubs, with its data under `data_dir`
pub fn test_config(base_url: &str, broker: Option<SocketAddr>, data_dir: &Path) -> Config {
    let mut config = Config::default();
    config.general.data_dir = data_dir.to_string_lossy().to_string();
    config.bridge.host_name = base_url.to_string();
    config.bridge.user_email = "user@example.com".to_string();
    config.bridge.user_password = "secret".to_string();
    config.http.connect_timeout_secs = 2;
    if let Some(addr) = broker {
        config.mqtt.broker_host = Some(addr.ip().to_string());
        config.mqtt.port = addr.port();
    }
    config.mqtt.use_tls = false;
    config.mqtt.reception_timeout_secs = 1;
    config.mqtt.connect_timeout_secs = 2;
    config
}

pub fn sample_credentials() -> Value {
    json!({
        "userid": USER_ID,
        "email": "user@example.com",
        "token": TOKEN,
        "key": KEY,
        "domain": "https://iotx-eu.meross.com",
        "mqttDomain": "mqtt-eu-3.meross.com"
    })
}

pub fn sample_devices() -> Value {
    json!([
        {
            "uuid": "abc-123",
            "devName": "Lamp1",
            "onlineStatus": 1,
            "deviceType": "mss310",
            "channels": [{}]
        },
        {
            "uuid": "def-456",
            "devName": "Heater",
            "onlineStatus": 2,
            "deviceType": "mss210"
        }
    ])
}

/// Poll `condition` until it holds or `within` elapses
pub async fn eventually<F: Fn() -> bool>(within: Duration, condition: F) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}

/// How the stub API answers
#[derive(Debug, Clone)]
pub struct ApiBehavior {
    pub login_http_status: u16,
    pub login_api_status: i64,
    pub device_list_http_status: u16,
    pub credentials: Value,
    pub devices: Value,
}

impl Default for ApiBehavior {
    fn default() -> Self {
        Self {
            login_http_status: 200,
            login_api_status: 0,
            device_list_http_status: 200,
            credentials: sample_credentials(),
            devices: sample_devices(),
        }
    }
}

/// One request seen by the stub API
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub path: String,
    pub authorization: Option<String>,
    pub vendor: Option<String>,
    pub user_agent: Option<String>,
    pub body: Value,
}

struct ApiState {
    behavior: Mutex<ApiBehavior>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ApiState {
    fn record(&self, path: &str, headers: &HeaderMap, body: &str) {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        self.calls.lock().unwrap().push(RecordedCall {
            path: path.to_string(),
            authorization: header("authorization"),
            vendor: header("vender"),
            user_agent: header("user-agent"),
            body: serde_json::from_str(body).unwrap_or(Value::Null),
        });
    }
}

/// HTTP stand-in for the cloud API
pub struct StubApi {
    pub base_url: String,
    state: Arc<ApiState>,
}

impl StubApi {
    pub async fn start(behavior: ApiBehavior) -> Self {
        let state = Arc::new(ApiState {
            behavior: Mutex::new(behavior),
            calls: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/v1/Auth/signIn", post(sign_in))
            .route("/v1/Device/devList", post(device_list))
            .route("/v1/Profile/logout", post(logout))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
        }
    }

    /// Serve `credentials` from the next sign-in on
    pub fn set_credentials(&self, credentials: Value) {
        self.state.behavior.lock().unwrap().credentials = credentials;
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, path: &str) -> Vec<RecordedCall> {
        self.calls().into_iter().filter(|c| c.path == path).collect()
    }
}

async fn sign_in(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, Json<Value>) {
    state.record("/v1/Auth/signIn", &headers, &body);

    let behavior = state.behavior.lock().unwrap().clone();
    let status = StatusCode::from_u16(behavior.login_http_status).unwrap();
    let reply = if behavior.login_api_status == 0 {
        json!({ "apiStatus": 0, "info": "Success", "data": behavior.credentials })
    } else {
        json!({ "apiStatus": behavior.login_api_status, "info": "Rejected", "data": {} })
    };
    (status, Json(reply))
}

async fn device_list(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, Json<Value>) {
    state.record("/v1/Device/devList", &headers, &body);

    let behavior = state.behavior.lock().unwrap().clone();
    let status = StatusCode::from_u16(behavior.device_list_http_status).unwrap();
    (
        status,
        Json(json!({ "apiStatus": 0, "info": "Success", "data": behavior.devices })),
    )
}

async fn logout(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, Json<Value>) {
    state.record("/v1/Profile/logout", &headers, &body);
    (StatusCode::OK, Json(json!({ "apiStatus": 0, "data": {} })))
}

/// How the stub broker answers a publish
#[derive(Debug, Clone)]
pub enum Reply {
    /// Never answer
    Silent,
    /// Answer with an empty payload
    Empty,
    /// Answer with the published payload behind a prefix
    Echo(String),
    /// Close the connection instead of answering
    Drop,
}

#[derive(Debug, Clone)]
pub struct BrokerBehavior {
    pub connack_code: u8,
    pub reply: Reply,
    pub reply_delay: Duration,
    /// Send a message on a topic nobody subscribed to before the reply
    pub noise_first: bool,
}

impl Default for BrokerBehavior {
    fn default() -> Self {
        Self {
            connack_code: 0,
            reply: Reply::Echo(String::new()),
            reply_delay: Duration::ZERO,
            noise_first: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectInfo {
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub clean_session: bool,
    pub keep_alive: u16,
}

#[derive(Default)]
struct BrokerState {
    connects: Mutex<Vec<ConnectInfo>>,
    subscriptions: Mutex<Vec<String>>,
    published: Mutex<Vec<(String, Vec<u8>)>>,
    disconnects: AtomicUsize,
}

/// MQTT stand-in for the cloud broker
pub struct StubBroker {
    pub addr: SocketAddr,
    state: Arc<BrokerState>,
}

impl StubBroker {
    pub async fn start(behavior: BrokerBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(BrokerState::default());

        let shared = state.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let state = shared.clone();
                let behavior = behavior.clone();
                tokio::spawn(async move {
                    let _ = serve_client(socket, state, behavior).await;
                });
            }
        });

        Self { addr, state }
    }

    pub fn connects(&self) -> Vec<ConnectInfo> {
        self.state.connects.lock().unwrap().clone()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.state.subscriptions.lock().unwrap().clone()
    }

    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.state.published.lock().unwrap().clone()
    }

    pub fn disconnects(&self) -> usize {
        self.state.disconnects.load(Ordering::SeqCst)
    }
}

async fn read_packet(socket: &mut TcpStream) -> std::io::Result<Option<(u8, Vec<u8>)>> {
    let header = match socket.read_u8().await {
        Ok(byte) => byte,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    };

    let mut len = 0usize;
    let mut shift = 0;
    loop {
        let byte = socket.read_u8().await?;
        len |= ((byte & 0x7f) as usize) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }

    let mut body = vec![0; len];
    socket.read_exact(&mut body).await?;
    Ok(Some((header, body)))
}

fn read_string(body: &[u8], pos: &mut usize) -> String {
    let len = u16::from_be_bytes([body[*pos], body[*pos + 1]]) as usize;
    *pos += 2;
    let value = String::from_utf8_lossy(&body[*pos..*pos + len]).into_owned();
    *pos += len;
    value
}

fn encode_publish(topic: &str, payload: &[u8]) -> Vec<u8> {
    let mut packet = vec![0x30];
    let mut remaining = 2 + topic.len() + payload.len();
    loop {
        let mut byte = (remaining % 128) as u8;
        remaining /= 128;
        if remaining > 0 {
            byte |= 0x80;
        }
        packet.push(byte);
        if remaining == 0 {
            break;
        }
    }
    packet.extend_from_slice(&(topic.len() as u16).to_be_bytes());
    packet.extend_from_slice(topic.as_bytes());
    packet.extend_from_slice(payload);
    packet
}

async fn serve_client(
    mut socket: TcpStream,
    state: Arc<BrokerState>,
    behavior: BrokerBehavior,
) -> std::io::Result<()> {
    let mut topics: Vec<String> = Vec::new();

    while let Some((header, body)) = read_packet(&mut socket).await? {
        match header >> 4 {
            // CONNECT
            1 => {
                let mut pos = 0;
                let _protocol = read_string(&body, &mut pos);
                let flags = body[pos + 1];
                let keep_alive = u16::from_be_bytes([body[pos + 2], body[pos + 3]]);
                pos += 4;
                let client_id = read_string(&body, &mut pos);
                if flags & 0x04 != 0 {
                    read_string(&body, &mut pos);
                    read_string(&body, &mut pos);
                }
                let username = (flags & 0x80 != 0).then(|| read_string(&body, &mut pos));
                let password = (flags & 0x40 != 0).then(|| read_string(&body, &mut pos));

                state.connects.lock().unwrap().push(ConnectInfo {
                    client_id,
                    username,
                    password,
                    clean_session: flags & 0x02 != 0,
                    keep_alive,
                });

                socket
                    .write_all(&[0x20, 0x02, 0x00, behavior.connack_code])
                    .await?;
                if behavior.connack_code != 0 {
                    return Ok(());
                }
            }
            // SUBSCRIBE
            8 => {
                let mut pos = 2;
                let mut granted = Vec::new();
                while pos < body.len() {
                    let topic = read_string(&body, &mut pos);
                    granted.push(body[pos].min(1));
                    pos += 1;
                    state.subscriptions.lock().unwrap().push(topic.clone());
                    topics.push(topic);
                }

                let mut ack = vec![0x90, (2 + granted.len()) as u8, body[0], body[1]];
                ack.extend(granted);
                socket.write_all(&ack).await?;
            }
            // PUBLISH
            3 => {
                let qos = (header >> 1) & 0x03;
                let mut pos = 0;
                let topic = read_string(&body, &mut pos);
                if qos > 0 {
                    pos += 2;
                }
                let payload = body[pos..].to_vec();
                state.published.lock().unwrap().push((topic, payload.clone()));

                tokio::time::sleep(behavior.reply_delay).await;
                if behavior.noise_first {
                    socket
                        .write_all(&encode_publish("/appliance/other/publish", b"noise"))
                        .await?;
                }

                let Some(reply_topic) = topics.last() else {
                    continue;
                };
                match &behavior.reply {
                    Reply::Drop => return Ok(()),
                    Reply::Silent => {}
                    Reply::Empty => {
                        socket.write_all(&encode_publish(reply_topic, b"")).await?;
                    }
                    Reply::Echo(prefix) => {
                        let mut reply = prefix.as_bytes().to_vec();
                        reply.extend_from_slice(&payload);
                        socket.write_all(&encode_publish(reply_topic, &reply)).await?;
                    }
                }
            }
            // PINGREQ
            12 => socket.write_all(&[0xD0, 0x00]).await?,
            // DISCONNECT
            14 => {
                state.disconnects.fetch_add(1, Ordering::SeqCst);
                return Ok(());
            }
            _ => {}
        }
    }
    Ok(())
}
