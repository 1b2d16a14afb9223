//! Load key use case
//!
//! Rehydrates the persisted blob pair into the TPM and opens the policy
//! session that authorizes it. The expected policy digest is not taken from
//! the caller: it is read back from the loaded key's own public area, so the
//! session is always checked against what the key was actually sealed to.

use tracing::debug;

use crate::connection::Connection;
use crate::error::{KeyError, UltraqrResult};
use crate::model::{KeyFiles, PcrSelection};
use crate::ports::{TpmDevice, TransientHandle};

/// A loaded key together with the single-use policy session that authorizes
/// exactly one sign operation with it.
#[derive(Debug)]
pub struct AuthorizedKey {
    pub key: TransientHandle,
    pub session: TransientHandle,
}

/// Load the persisted key and authorize it against the live PCR state.
///
/// # Errors
///
/// [`KeyError::NotFound`] when the blob files are missing,
/// [`KeyError::LoadFailed`] when the TPM rejects the blobs, and
/// [`crate::error::PolicyError::AuthFailed`] when the live PCR state no
/// longer reproduces the policy the key was sealed to.
pub fn load_key<D: TpmDevice>(
    conn: &mut Connection<D>,
    files: &KeyFiles,
    selection: &PcrSelection,
) -> UltraqrResult<AuthorizedKey> {
    let blobs = files.read()?;
    let root = conn.derive_storage_root()?;
    let key = conn
        .load_key(root, &blobs)
        .map_err(|source| KeyError::LoadFailed { source })?;

    let public = conn
        .read_public(key)
        .map_err(|source| KeyError::LoadFailed { source })?;
    let session = conn.open_policy_auth_session(selection, &public.auth_policy)?;

    debug!(%key, %session, "sealed key loaded and authorized");
    Ok(AuthorizedKey { key, session })
}
