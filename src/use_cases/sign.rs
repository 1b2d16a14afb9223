//! Sign and public-key export use cases
//!
//! Signing hashes the message on the host and hands the TPM only the
//! 32-byte digest; the policy session is consumed by the one sign command.

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::connection::Connection;
use crate::error::{SigningError, UltraqrResult};
use crate::logic::signature_encoding;
use crate::ports::{TpmDevice, TransientHandle};
use crate::use_cases::load_key::AuthorizedKey;

/// Sign `message` with the authorized key, returning a DER ECDSA signature.
pub fn sign_message<D: TpmDevice>(
    conn: &mut Connection<D>,
    authorized: &AuthorizedKey,
    message: &[u8],
) -> UltraqrResult<Vec<u8>> {
    let digest: [u8; 32] = Sha256::digest(message).into();
    let raw = conn
        .sign_digest(authorized.key, authorized.session, &digest)
        .map_err(|source| SigningError::SigningFailed { source })?;

    let der = signature_encoding::ecdsa_der(&raw)?;
    debug!(message_len = message.len(), sig_len = der.len(), "message signed");
    Ok(der)
}

/// Export the loaded key's public half as a DER SubjectPublicKeyInfo.
pub fn export_public_key<D: TpmDevice>(
    conn: &mut Connection<D>,
    key: TransientHandle,
) -> UltraqrResult<Vec<u8>> {
    let area = conn
        .read_public(key)
        .map_err(|err| SigningError::PublicKeyExportFailed {
            reason: err.to_string(),
        })?;
    Ok(signature_encoding::spki_der(&area)?)
}
