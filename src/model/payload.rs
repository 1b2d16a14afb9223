//! Payloads handed to the QR encoder.
//!
//! The verification payload is serialized through serde rather than string
//! interpolation so that challenge strings containing quotes or other
//! reserved characters are escaped correctly.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::EncodingError;

/// The JSON object a verifier scans: exactly one of `t` (Unix seconds) or
/// `c` (challenge string), plus `s`, the base64 DER signature over it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationPayload {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub t: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub c: Option<String>,
    pub s: String,
}

impl VerificationPayload {
    pub fn timestamp(secs: u64, signature_der: &[u8]) -> Self {
        Self {
            t: Some(secs.to_string()),
            c: None,
            s: BASE64.encode(signature_der),
        }
    }

    pub fn challenge(challenge: &str, signature_der: &[u8]) -> Self {
        Self {
            t: None,
            c: Some(challenge.to_string()),
            s: BASE64.encode(signature_der),
        }
    }

    pub fn to_json(&self) -> Result<String, EncodingError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// The byte message signed when attesting a timestamp: the minimal
/// big-endian encoding of the Unix seconds value (no leading zero bytes).
pub fn timestamp_message(secs: u64) -> Vec<u8> {
    let bytes = secs.to_be_bytes();
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    bytes[start..].to_vec()
}
