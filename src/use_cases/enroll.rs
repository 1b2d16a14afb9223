//! Enroll use case
//!
//! Produces the string a verifier stores at enrollment time: the key's
//! public half as hex-encoded DER SubjectPublicKeyInfo. Loading the key
//! first (rather than parsing the persisted public blob on the host) means
//! enrollment only succeeds on a platform that can still authorize the key.

use tracing::info;

use crate::connection::Connection;
use crate::error::UltraqrResult;
use crate::model::{KeyFiles, PcrSelection};
use crate::ports::TpmDevice;
use crate::use_cases::{load_key, sign};

/// Load the sealed key and return its public half, hex-encoded.
pub fn enroll<D: TpmDevice>(
    conn: &mut Connection<D>,
    files: &KeyFiles,
    selection: &PcrSelection,
) -> UltraqrResult<String> {
    let authorized = load_key(conn, files, selection)?;
    let spki = sign::export_public_key(conn, authorized.key)?;
    info!(spki_len = spki.len(), "public key exported for enrollment");
    Ok(hex::encode(spki))
}
