/*!
 * HTTP session with the Meross cloud.
 *
 * The session signs in with the account e-mail and password, keeps the
 * returned token for later calls, and mirrors the credentials and device list
 * into the local [`CloudStore`].
 *
 * A session moves `Unauthenticated -> TokenAcquired -> DevicesSynced` within a
 * single [`HttpSession::fetch_data`] call. There is no retry loop: a failed
 * attempt leaves the session unauthenticated and the caller tries again.
 */
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn, Instrument};

use meross_core::config::Config;
use meross_core::error::{Error, Result};
use meross_core::logging::operation_span;
use meross_core::utils::spawn_and_log;

use crate::api::{ApiStatusCode, HttpEndpoint, API_STATUS_UNKNOWN};
use crate::dto::{CloudCredentials, Device};
use crate::sign::SignedEnvelope;
use crate::storage::CloudStore;

const COMPONENT: &str = "meross-http";

/// Settings of an HTTP session
#[derive(Clone)]
pub struct HttpSettings {
    /// API base URL, endpoints are appended to it
    pub base_url: String,
    /// Account e-mail
    pub user_email: String,
    /// Account password
    pub user_password: String,
    /// Connection timeout of the HTTP client
    pub connect_timeout: Duration,
    /// `AppType` header, also the user agent product
    pub app_type: String,
    /// `AppVersion` header
    pub app_version: String,
    /// User agent version
    pub module_version: String,
    /// `AppLanguage` header
    pub app_language: String,
    /// Vendor header
    pub vendor: String,
}

impl std::fmt::Debug for HttpSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSettings")
            .field("base_url", &self.base_url)
            .field("user_email", &self.user_email)
            .field("user_password", &"<redacted>")
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

impl HttpSettings {
    /// Build settings from the bridge and HTTP sections of the configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            base_url: config.bridge.host_name.clone(),
            user_email: config.bridge.user_email.clone(),
            user_password: config.bridge.user_password.clone(),
            connect_timeout: config.http.connect_timeout(),
            app_type: config.http.app_type.clone(),
            app_version: config.http.app_version.clone(),
            module_version: config.http.module_version.clone(),
            app_language: config.http.app_language.clone(),
            vendor: config.http.vendor.clone(),
        }
    }
}

/// Raw reply of a cloud call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    /// HTTP status code
    pub status: u16,
    /// Response body
    pub body: String,
}

impl HttpReply {
    /// `apiStatus` of the body, [`API_STATUS_UNKNOWN`] if it can't be read
    pub fn api_status(&self) -> i64 {
        parse_api_status(&self.body)
    }

    /// The `data` member of the body
    pub fn data(&self) -> Result<Value> {
        let mut json: Value = serde_json::from_str(&self.body)
            .map_err(|e| Error::malformed(format!("Invalid response body: {}", e)))?;
        json.get_mut("data")
            .map(Value::take)
            .ok_or_else(|| Error::malformed("Response has no data member"))
    }
}

/// Progress of a session through the sign-in sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No token yet, or the last attempt failed
    Unauthenticated,
    /// Credentials fetched and token stored
    TokenAcquired,
    /// Device list fetched and persisted
    DevicesSynced,
}

#[derive(Serialize)]
struct LoginParams<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct NoParams {}

/// Parse the `apiStatus` member of a response body
pub fn parse_api_status(body: &str) -> i64 {
    let status = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|json| json.get("apiStatus").and_then(Value::as_i64));

    match status {
        Some(status) => status,
        None => {
            debug!("Couldn't get apiStatus");
            API_STATUS_UNKNOWN
        }
    }
}

/// Authenticated HTTP session with the Meross cloud
#[derive(Debug)]
pub struct HttpSession {
    settings: HttpSettings,
    client: reqwest::Client,
    store: CloudStore,
    token: RwLock<Option<String>>,
    state: RwLock<SessionState>,
}

impl HttpSession {
    /// Create a session; no network traffic happens until [`HttpSession::login`]
    pub fn new(settings: HttpSettings, store: CloudStore) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            settings,
            client,
            store,
            token: RwLock::new(None),
            state: RwLock::new(SessionState::Unauthenticated),
        })
    }

    /// The store backing this session
    pub fn store(&self) -> &CloudStore {
        &self.store
    }

    /// Current position in the sign-in sequence
    pub async fn state(&self) -> SessionState {
        *self.state.read().await
    }

    /// Token obtained by the last credentials fetch
    pub async fn token(&self) -> Option<String> {
        self.token.read().await.clone()
    }

    async fn set_state(&self, state: SessionState) {
        *self.state.write().await = state;
    }

    async fn authorization(&self) -> String {
        match self.token.read().await.as_deref() {
            Some(token) if !token.trim().is_empty() => format!("Basic {}", token),
            _ => "Basic".to_string(),
        }
    }

    async fn post<P: Serialize + ?Sized>(&self, endpoint: HttpEndpoint, params: &P) -> Result<HttpReply> {
        let envelope = SignedEnvelope::new(params)?;
        let body = serde_json::to_string(&envelope)?;
        let url = format!(
            "{}{}",
            self.settings.base_url.trim_end_matches('/'),
            endpoint.path()
        );

        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, self.authorization().await)
            .header("AppVersion", &self.settings.app_version)
            .header("vender", &self.settings.vendor)
            .header("AppType", &self.settings.app_type)
            .header("AppLanguage", &self.settings.app_language)
            .header(
                USER_AGENT,
                format!("{}/{}", self.settings.app_type, self.settings.module_version),
            )
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| Error::connectivity(format!("Error while posting to {}: {}", url, e)))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| Error::connectivity(format!("Error while reading reply from {}: {}", url, e)))?;

        debug!(endpoint = endpoint.path(), status, "Cloud call completed");
        Ok(HttpReply { status, body })
    }

    /// Sign in with the configured e-mail and password
    pub async fn login(&self) -> Result<HttpReply> {
        let params = LoginParams {
            email: &self.settings.user_email,
            password: &self.settings.user_password,
        };
        self.post(HttpEndpoint::Login, &params)
            .instrument(operation_span("login", COMPONENT))
            .await
            .map_err(|e| match e {
                Error::Connectivity(msg) => Error::connectivity(format!("Error while logging in: {}", msg)),
                other => other,
            })
    }

    /// Sign in and return the `apiStatus`; never fails
    pub async fn api_status(&self) -> i64 {
        match self.login().await {
            Ok(reply) => reply.api_status(),
            Err(e) => {
                debug!("Couldn't get apiStatus: {}", e);
                API_STATUS_UNKNOWN
            }
        }
    }

    /// Sign in and return the credentials payload, keeping its token
    pub async fn fetch_credentials(&self) -> Result<Value> {
        let data = self.login().await?.data()?;

        let credentials: CloudCredentials = serde_json::from_value(data.clone())
            .map_err(|e| Error::malformed(format!("Invalid credentials: {}", e)))?;
        if !credentials.token.is_empty() {
            *self.token.write().await = Some(credentials.token);
            self.set_state(SessionState::TokenAcquired).await;
        }

        Ok(data)
    }

    /// Fetch credentials (storing the token), then the device list payload
    pub async fn fetch_devices(&self) -> Result<Value> {
        self.fetch_credentials().await?;

        let reply = self
            .post(HttpEndpoint::DeviceList, &NoParams {})
            .instrument(operation_span("device-list", COMPONENT))
            .await?;
        if reply.status != 200 {
            return Err(Error::connectivity(format!(
                "Device list failed with HTTP status {}",
                reply.status
            )));
        }
        reply.data()
    }

    /// Fetch credentials and persist them; the file is left as is on failure
    pub async fn fetch_credentials_and_write(&self, credential_file: &Path) -> bool {
        let json = match self.fetch_credentials().await {
            Ok(json) => json,
            Err(e) => {
                debug!("Error while fetching credentials: {}", e);
                return false;
            }
        };

        match self.store.write_raw(credential_file, &json.to_string()).await {
            Ok(()) => true,
            Err(e) => {
                error!("Couldn't write to file '{}': {}", credential_file.display(), e);
                false
            }
        }
    }

    /// Fetch the device list and persist it; the file is left as is on failure
    pub async fn fetch_devices_and_write(&self, device_file: &Path) -> bool {
        let json = match self.fetch_devices().await {
            Ok(json) => json,
            Err(e) => {
                debug!("Error while fetching devices: {}", e);
                return false;
            }
        };

        match self.store.write_raw(device_file, &json.to_string()).await {
            Ok(()) => {
                self.set_state(SessionState::DevicesSynced).await;
                true
            }
            Err(e) => {
                error!("Couldn't write to file '{}': {}", device_file.display(), e);
                false
            }
        }
    }

    /// Sign in, check the result, then persist credentials and devices
    ///
    /// Fails with a connectivity error when the sign-in HTTP status isn't 200
    /// and with an API error when `apiStatus` isn't OK; nothing is written in
    /// either case. A non-OK code missing from [`ApiStatusCode`] is refused
    /// too, as "Unknown API status code N", instead of being silently skipped.
    /// The fetch-and-persist steps run on a background task that is joined
    /// before returning, and their failures are only logged.
    pub async fn fetch_data(self: &Arc<Self>) -> Result<()> {
        self.set_state(SessionState::Unauthenticated).await;

        let reply = self.login().await?;
        if reply.status != 200 {
            return Err(Error::connectivity(format!(
                "Login failed with HTTP status {}",
                reply.status
            )));
        }

        let code = reply.api_status();
        if code != ApiStatusCode::Ok.code() {
            let message = ApiStatusCode::message_for(code)
                .map(str::to_string)
                .unwrap_or_else(|| format!("Unknown API status code {}", code));
            warn!(code, "Login rejected: {}", message);
            return Err(Error::api(code, message));
        }

        let session = Arc::clone(self);
        let sync = spawn_and_log(
            "meross-cloud-sync",
            async move {
                let credential_file = session.store.credential_file().to_path_buf();
                let device_file = session.store.device_file().to_path_buf();

                session.fetch_credentials_and_write(&credential_file).await;
                if session.fetch_devices_and_write(&device_file).await {
                    Ok(())
                } else {
                    Err(Error::other("Device list was not synced"))
                }
            }
            .instrument(operation_span("sync", COMPONENT)),
        );

        if let Err(e) = sync.await {
            warn!("Cannot fetch data: {}", e);
        }

        let state = self.state().await;
        info!(?state, "Cloud data fetch finished");
        Ok(())
    }

    /// Read the persisted credentials
    pub async fn read_credentials(&self) -> Result<CloudCredentials> {
        self.store.read_credentials().await
    }

    /// Read the persisted device list
    pub async fn read_devices(&self) -> Result<Vec<Device>> {
        self.store.read_devices().await
    }

    /// UUID of the first persisted device named `dev_name`, or `""`
    pub async fn dev_uuid_by_dev_name(&self, dev_name: &str) -> String {
        match self.read_devices().await {
            Ok(devices) => devices
                .into_iter()
                .find(|device| device.dev_name == dev_name)
                .map(|device| device.uuid)
                .unwrap_or_default(),
            Err(e) => {
                debug!("Cannot read device list: {}", e);
                String::new()
            }
        }
    }

    /// Sign out; failures are only logged
    pub async fn logout(&self) {
        let result = self
            .post(HttpEndpoint::Logout, &NoParams {})
            .instrument(operation_span("logout", COMPONENT))
            .await;
        if let Err(e) = result {
            debug!("Cannot log out: {}", e);
        }
    }
}
