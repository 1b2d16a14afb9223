//! Verify use case
//!
//! Produces the attestation payload a verifier scans: a signature over
//! either a caller-supplied challenge or, absent one, the current Unix
//! timestamp. Signing at all is the proof: the TPM only authorizes the
//! key while the measured boot state matches the sealed policy.

use std::time::{SystemTime, UNIX_EPOCH};

use tracing::info;

use crate::connection::Connection;
use crate::error::UltraqrResult;
use crate::model::{timestamp_message, KeyFiles, PcrSelection, VerificationPayload};
use crate::ports::TpmDevice;
use crate::use_cases::{load_key, sign_message};

/// Load the sealed key, sign the challenge (or the current timestamp), and
/// return the JSON payload to encode.
pub fn verify<D: TpmDevice>(
    conn: &mut Connection<D>,
    files: &KeyFiles,
    selection: &PcrSelection,
    challenge: Option<&str>,
) -> UltraqrResult<String> {
    let authorized = load_key(conn, files, selection)?;

    // An empty challenge string means "no challenge", same as omitting it.
    let challenge = challenge.filter(|c| !c.is_empty());
    let payload = match challenge {
        Some(challenge) => {
            let signature = sign_message(conn, &authorized, challenge.as_bytes())?;
            info!(challenge, "challenge signed");
            VerificationPayload::challenge(challenge, &signature)
        }
        None => {
            let secs = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs();
            let signature = sign_message(conn, &authorized, &timestamp_message(secs))?;
            info!(secs, "timestamp signed");
            VerificationPayload::timestamp(secs, &signature)
        }
    };

    Ok(payload.to_json()?)
}
