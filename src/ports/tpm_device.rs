//! TpmDevice trait - the structured-command port to the security processor
//!
//! One method per command the protocol needs. Every call blocks until the
//! hardware responds; a transport error is fatal to the invocation. Handles
//! returned here are opaque to callers; ownership and release discipline
//! live in [`crate::Connection`], not in the adapters.

use std::fmt;

use crate::error::DeviceError;
use crate::model::PcrSelection;

/// Opaque reference to a transient object or session inside the device.
///
/// Valid until flushed; the adapter that issued it maps it back to its
/// native handle representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransientHandle(pub(crate) u32);

impl fmt::Display for TransientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Whether a policy session merely computes a digest (trial) or evaluates
/// live register state for authorization (policy).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    Trial,
    Policy,
}

/// The persisted representation of a sealed key: the marshalled public area
/// and the hardware-wrapped private blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBlobs {
    pub public: Vec<u8>,
    pub private: Vec<u8>,
}

/// Curve of an exported public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyCurve {
    NistP256,
    Unsupported(String),
}

/// Decoded public area of a loaded EC key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcPublicArea {
    pub curve: KeyCurve,
    /// Big-endian affine X coordinate, possibly shorter than 32 bytes.
    pub x: Vec<u8>,
    /// Big-endian affine Y coordinate, possibly shorter than 32 bytes.
    pub y: Vec<u8>,
    /// The policy digest the key was sealed to at creation.
    pub auth_policy: Vec<u8>,
}

/// The hardware-native signature: two big-endian unsigned integers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEcdsaSignature {
    pub r: Vec<u8>,
    pub s: Vec<u8>,
}

/// Synchronous command interface to a TPM 2.0-class security processor.
pub trait TpmDevice {
    /// Re-derive the deterministic ECC storage primary under the owner
    /// hierarchy (empty authorization). Same template + same hardware means
    /// the same root every run, so nothing needs NVRAM bookkeeping.
    fn create_primary(&mut self) -> Result<TransientHandle, DeviceError>;

    /// Start a policy session of the given kind and bind the PCR condition
    /// for `selection` into it (live values are read by the device itself).
    fn start_policy_session(
        &mut self,
        kind: SessionKind,
        selection: &PcrSelection,
    ) -> Result<TransientHandle, DeviceError>;

    /// Read back the session's accumulated policy digest.
    fn policy_digest(&mut self, session: TransientHandle) -> Result<Vec<u8>, DeviceError>;

    /// Create a sign-only ECDSA P-256 key under `parent`, sealed to
    /// `auth_policy`, returning the two blobs to persist.
    fn create_key(
        &mut self,
        parent: TransientHandle,
        auth_policy: &[u8],
    ) -> Result<KeyBlobs, DeviceError>;

    /// Materialize persisted blobs into a transient key handle under `parent`.
    fn load_key(
        &mut self,
        parent: TransientHandle,
        blobs: &KeyBlobs,
    ) -> Result<TransientHandle, DeviceError>;

    /// Read the public area of a loaded key.
    fn read_public(&mut self, key: TransientHandle) -> Result<EcPublicArea, DeviceError>;

    /// Sign a 32-byte digest with `key`, authorized by the (single-use)
    /// policy `session`.
    fn sign_digest(
        &mut self,
        key: TransientHandle,
        session: TransientHandle,
        digest: &[u8; 32],
    ) -> Result<RawEcdsaSignature, DeviceError>;

    /// Release a transient handle. Flushing an already-released or consumed
    /// handle is an error the caller may choose to ignore.
    fn flush(&mut self, handle: TransientHandle) -> Result<(), DeviceError>;
}
