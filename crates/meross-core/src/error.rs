/*!
 * Error types for the Meross connector.
 *
 * The variants follow the failure classes the connector distinguishes:
 * transport problems, application-level refusals from the cloud API,
 * local I/O (including malformed persisted data) and configuration issues.
 */
use thiserror::Error;

/// Error type for Meross connector operations
#[derive(Error, Debug)]
pub enum Error {
    /// Transport-level failure: refused connection, timeout, non-success HTTP
    /// status or a broker that rejected the connection
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// The cloud API answered but reported a non-OK status
    #[error("API error {code}: {message}")]
    Api {
        /// The `apiStatus` value returned by the server
        code: i64,
        /// Human readable message taken from the status-code table
        message: String,
    },

    /// I/O error, also used for persisted data that fails to parse
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Timeout error
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Runtime error (logging setup, task join failures)
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Other error
    #[error("Other error: {0}")]
    Other(String),
}

/// Result type for Meross connector operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a new connectivity error
    pub fn connectivity<S: AsRef<str>>(msg: S) -> Self {
        Error::Connectivity(msg.as_ref().to_string())
    }

    /// Create a new API error
    pub fn api<S: AsRef<str>>(code: i64, msg: S) -> Self {
        Error::Api {
            code,
            message: msg.as_ref().to_string(),
        }
    }

    /// Create an I/O error for data that could not be parsed
    pub fn malformed<S: AsRef<str>>(msg: S) -> Self {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            msg.as_ref().to_string(),
        ))
    }

    /// Create a new configuration error
    pub fn config<S: AsRef<str>>(msg: S) -> Self {
        Error::Config(msg.as_ref().to_string())
    }

    /// Create a new timeout error
    pub fn timeout<S: AsRef<str>>(msg: S) -> Self {
        Error::Timeout(msg.as_ref().to_string())
    }

    /// Create a new runtime error
    pub fn runtime<S: AsRef<str>>(msg: S) -> Self {
        Error::Runtime(msg.as_ref().to_string())
    }

    /// Create a new other error
    pub fn other<S: AsRef<str>>(msg: S) -> Self {
        Error::Other(msg.as_ref().to_string())
    }

    /// Whether this is a transport-level failure
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Error::Connectivity(_) | Error::Timeout(_))
    }

    /// Whether the server rejected the request at the application level
    pub fn is_api(&self) -> bool {
        matches!(self, Error::Api { .. })
    }

    /// Whether this error came from configuration
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
