//! Session Manager: owns the device channel and every transient handle
//! opened through it.
//!
//! Scoped acquisition: a [`Connection`] is created once at the top of an
//! invocation and its `Drop` releases every registered handle, whichever
//! exit path was taken. Per-handle flush failures at teardown are logged
//! and swallowed (a consumed policy session is already gone, for example);
//! they never mask the error that caused the teardown.

use std::path::Path;

use tracing::{debug, warn};

use crate::error::{PolicyError, UltraqrResult};
use crate::model::PcrSelection;
use crate::ports::{
    DeviceOpener, EcPublicArea, KeyBlobs, RawEcdsaSignature, SessionKind, TpmDevice,
    TransientHandle,
};

#[derive(Debug)]
pub struct Connection<D: TpmDevice> {
    device: D,
    open_handles: Vec<TransientHandle>,
}

impl<D: TpmDevice> Connection<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            open_handles: Vec::new(),
        }
    }

    /// Open the transport at `path` and wrap it in a connection.
    pub fn open<O: DeviceOpener<Device = D>>(opener: &O, path: &Path) -> UltraqrResult<Self> {
        let device = opener.open(path)?;
        debug!(path = %path.display(), "TPM connection opened");
        Ok(Self::new(device))
    }

    /// Re-derive the storage root primary. The handle is registered for
    /// release at teardown.
    pub fn derive_storage_root(&mut self) -> UltraqrResult<TransientHandle> {
        let root = self.device.create_primary()?;
        self.register(root);
        debug!(%root, "storage root derived");
        Ok(root)
    }

    /// Compute the policy digest for `selection` with a trial session.
    ///
    /// The trial session only exists to be read back; it is flushed as soon
    /// as the digest is extracted and never registered.
    pub fn compute_policy_digest(&mut self, selection: &PcrSelection) -> UltraqrResult<Vec<u8>> {
        let session = self
            .device
            .start_policy_session(SessionKind::Trial, selection)
            .map_err(|source| PolicyError::ComputationFailed { source })?;

        let digest = self.device.policy_digest(session);
        if let Err(err) = self.device.flush(session) {
            warn!(%session, %err, "failed to flush trial session");
        }

        let digest = digest.map_err(|source| PolicyError::ComputationFailed { source })?;
        debug!(digest = %hex::encode(&digest), "policy digest computed");
        Ok(digest)
    }

    /// Open a real policy session evaluating `selection` against the live
    /// registers, and require that its digest reproduces `expected_policy`
    /// (the digest the key was sealed to).
    ///
    /// # Errors
    ///
    /// [`PolicyError::AuthFailed`] when the live PCR state no longer matches
    /// the sealed policy (the measured boot state has changed).
    pub fn open_policy_auth_session(
        &mut self,
        selection: &PcrSelection,
        expected_policy: &[u8],
    ) -> UltraqrResult<TransientHandle> {
        let session = self
            .device
            .start_policy_session(SessionKind::Policy, selection)?;
        self.register(session);

        let live_digest = self.device.policy_digest(session)?;
        if live_digest != expected_policy {
            return Err(PolicyError::AuthFailed {
                reason: format!(
                    "live PCR digest {} does not match the key's sealed policy {}",
                    hex::encode(&live_digest),
                    hex::encode(expected_policy)
                ),
            }
            .into());
        }

        debug!(%session, "policy authorization session opened");
        Ok(session)
    }

    /// Create a sealed key under `parent`. Returns blobs only; no handle is
    /// left open.
    pub fn create_key(
        &mut self,
        parent: TransientHandle,
        auth_policy: &[u8],
    ) -> Result<KeyBlobs, crate::error::DeviceError> {
        self.device.create_key(parent, auth_policy)
    }

    /// Load persisted blobs under `parent`, registering the key handle.
    pub fn load_key(
        &mut self,
        parent: TransientHandle,
        blobs: &KeyBlobs,
    ) -> Result<TransientHandle, crate::error::DeviceError> {
        let key = self.device.load_key(parent, blobs)?;
        self.register(key);
        debug!(%key, "sealed key loaded");
        Ok(key)
    }

    pub fn read_public(
        &mut self,
        key: TransientHandle,
    ) -> Result<EcPublicArea, crate::error::DeviceError> {
        self.device.read_public(key)
    }

    pub fn sign_digest(
        &mut self,
        key: TransientHandle,
        session: TransientHandle,
        digest: &[u8; 32],
    ) -> Result<RawEcdsaSignature, crate::error::DeviceError> {
        self.device.sign_digest(key, session, digest)
    }

    fn register(&mut self, handle: TransientHandle) {
        self.open_handles.push(handle);
    }

    #[cfg(test)]
    pub(crate) fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }
}

impl<D: TpmDevice> Drop for Connection<D> {
    fn drop(&mut self) {
        for handle in self.open_handles.drain(..) {
            if let Err(err) = self.device.flush(handle) {
                warn!(%handle, %err, "failed to flush transient handle at teardown");
            }
        }
        debug!("TPM connection closed");
    }
}
