/*!
 * Request signing for the Meross cloud.
 *
 * Every HTTP call carries a base64 parameter blob, a timestamp, a nonce and an
 * MD5 digest over all of them. The cloud checks the digest against the exact
 * concatenation below, so the hash and its lowercase hex form are fixed by the
 * vendor protocol. The MQTT password uses the same digest.
 */
use base64::engine::general_purpose::STANDARD as Base64;
use base64::Engine as _;
use chrono::Utc;
use serde::{Serialize, Serializer};

use meross_core::error::Result;

use crate::api::SECRET_PREFIX;

/// Lowercase hex MD5 digest of `data`
pub fn md5_hex(data: impl AsRef<[u8]>) -> String {
    format!("{:x}", md5::compute(data.as_ref()))
}

/// Digest over `prefix || timestamp || nonce || encoded_params`
pub fn sign(secret_prefix: &str, timestamp: i64, nonce: &str, encoded_params: &str) -> String {
    md5_hex(format!("{secret_prefix}{timestamp}{nonce}{encoded_params}"))
}

/// Base64 of the JSON form of `params`
pub fn encode_params<P: Serialize + ?Sized>(params: &P) -> Result<String> {
    let json = serde_json::to_vec(params)?;
    Ok(Base64.encode(json))
}

/// 16 uppercase hex characters taken from a random UUID
pub fn generate_nonce() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..16].to_uppercase()
}

/// Broker password derived from the account's user id and key
pub fn mqtt_password(user_id: &str, key: &str) -> String {
    md5_hex(format!("{user_id}{key}"))
}

/// The signed body posted with every HTTP call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignedEnvelope {
    /// Base64 encoded JSON parameters
    pub params: String,
    /// Hex digest over prefix, timestamp, nonce and params
    pub sign: String,
    /// Epoch milliseconds, sent as a decimal string
    #[serde(serialize_with = "as_decimal_string")]
    pub timestamp: i64,
    /// Per-request random nonce
    pub nonce: String,
}

fn as_decimal_string<S>(value: &i64, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_str(value)
}

impl SignedEnvelope {
    /// Sign `params` with a fresh timestamp and nonce
    pub fn new<P: Serialize + ?Sized>(params: &P) -> Result<Self> {
        Self::with(params, Utc::now().timestamp_millis(), generate_nonce())
    }

    /// Sign `params` with an explicit timestamp and nonce
    pub fn with<P: Serialize + ?Sized>(
        params: &P,
        timestamp: i64,
        nonce: impl Into<String>,
    ) -> Result<Self> {
        let nonce = nonce.into();
        let params = encode_params(params)?;
        let sign = sign(SECRET_PREFIX, timestamp, &nonce, &params);
        Ok(Self {
            params,
            sign,
            timestamp,
            nonce,
        })
    }
}
