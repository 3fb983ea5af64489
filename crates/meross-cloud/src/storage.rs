/*!
 * On-disk persistence of the cloud credentials and the device list.
 *
 * Both files are replaced whole: content goes to a sibling temporary file that
 * is renamed over the target, so a failed write never leaves a truncated file
 * behind. Reads and writes share one async lock per store.
 */
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::debug;

use meross_core::config::Config;
use meross_core::error::{Error, Result};

use crate::dto::{CloudCredentials, Device};

/// Location of the persisted credentials and device list
#[derive(Debug, Clone)]
pub struct CloudStore {
    credential_file: PathBuf,
    device_file: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl CloudStore {
    /// Create a store over explicit file paths
    pub fn new(credential_file: impl Into<PathBuf>, device_file: impl Into<PathBuf>) -> Self {
        Self {
            credential_file: credential_file.into(),
            device_file: device_file.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Create a store under the configured data directory
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.credential_file(), config.device_file())
    }

    /// Path of the credentials file
    pub fn credential_file(&self) -> &Path {
        &self.credential_file
    }

    /// Path of the device list file
    pub fn device_file(&self) -> &Path {
        &self.device_file
    }

    /// Replace `path` with `content`, creating parent directories as needed
    pub async fn write_raw(&self, path: &Path, content: &str) -> Result<()> {
        let _guard = self.lock.lock().await;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        if let Err(e) = tokio::fs::write(&tmp, content.as_bytes()).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        tokio::fs::rename(&tmp, path).await?;

        debug!("Wrote {} bytes to {}", content.len(), path.display());
        Ok(())
    }

    /// Persist credentials
    pub async fn write_credentials(&self, credentials: &CloudCredentials) -> Result<()> {
        let json = serde_json::to_string(credentials)?;
        self.write_raw(&self.credential_file, &json).await
    }

    /// Persist the device list
    pub async fn write_devices(&self, devices: &[Device]) -> Result<()> {
        let json = serde_json::to_string(devices)?;
        self.write_raw(&self.device_file, &json).await
    }

    /// Read the persisted credentials
    pub async fn read_credentials(&self) -> Result<CloudCredentials> {
        self.read_json(&self.credential_file).await
    }

    /// Read the persisted device list
    pub async fn read_devices(&self) -> Result<Vec<Device>> {
        self.read_json(&self.device_file).await
    }

    async fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<T> {
        let content = {
            let _guard = self.lock.lock().await;
            tokio::fs::read_to_string(path).await?
        };

        serde_json::from_str(&content)
            .map_err(|e| Error::malformed(format!("{}: {}", path.display(), e)))
    }
}
