//! Create key use case
//!
//! Seals a fresh ECDSA P-256 signing key to the current PCR state and
//! persists the resulting blob pair. The private half never leaves the
//! hardware; what lands on disk is only usable by the TPM that wrapped it,
//! and only while the measured boot state still matches.

use tracing::info;

use crate::connection::Connection;
use crate::error::{KeyError, UltraqrResult};
use crate::model::{KeyFiles, PcrSelection};
use crate::ports::TpmDevice;

/// Create a PCR-sealed signing key and persist its blobs under `files`.
///
/// Overwrites any previously persisted key at the same prefix: re-running
/// creation is how an operator rotates the key after an intentional
/// platform change.
pub fn create_key<D: TpmDevice>(
    conn: &mut Connection<D>,
    files: &KeyFiles,
    selection: &PcrSelection,
) -> UltraqrResult<()> {
    let root = conn.derive_storage_root()?;
    let policy = conn.compute_policy_digest(selection)?;

    let blobs = conn
        .create_key(root, &policy)
        .map_err(|source| KeyError::CreationFailed { source })?;
    files.write(&blobs)?;

    info!(
        prefix = %files.prefix().display(),
        pcrs = %selection,
        "sealed signing key created"
    );
    Ok(())
}
