//! Error types for the ultraqr library
//!
//! Errors are organized hierarchically per component area and use thiserror
//! for implementation. Hardware and I/O failures are fatal to the current
//! invocation: policy sessions are single-use, so the operator re-invokes
//! rather than the library retrying.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for ultraqr operations
pub type UltraqrResult<T> = Result<T, UltraqrError>;

/// Top-level error type for all ultraqr operations
#[derive(Error, Debug)]
pub enum UltraqrError {
    /// PCR policy errors (parsing, digest computation, authorization)
    #[error("policy error: {0}")]
    Policy(#[from] PolicyError),

    /// TPM transport and command errors
    #[error("TPM device error: {0}")]
    Device(#[from] DeviceError),

    /// Key lifecycle errors (creation, persistence, loading)
    #[error("key lifecycle error: {0}")]
    Key(#[from] KeyError),

    /// Signing and public-key export errors
    #[error("signing error: {0}")]
    Signing(#[from] SigningError),

    /// Payload and QR encoding errors
    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),
}

/// PCR policy errors
#[derive(Error, Debug)]
pub enum PolicyError {
    /// A token of the PCR selection string is not a valid register index
    #[error("invalid PCR selection token {token:?} (expected an integer in 0..=23)")]
    InvalidPolicySpec { token: String },

    /// The trial session failed before a digest could be extracted
    #[error("failed to compute policy digest: {source}")]
    ComputationFailed {
        #[source]
        source: DeviceError,
    },

    /// The live PCR state does not reproduce the digest the key was sealed to.
    /// This is the central trust check: it fires when the measured boot state
    /// has changed since key creation.
    #[error("policy authorization failed: {reason}")]
    AuthFailed { reason: String },
}

/// TPM transport and command errors
#[derive(Error, Debug)]
pub enum DeviceError {
    /// The device path could not be opened
    #[error("TPM device {path} unavailable: {reason}")]
    Unavailable { path: String, reason: String },

    /// A command was sent and the TPM (or transport) refused it
    #[error("TPM command {command} failed: {reason}")]
    CommandFailed {
        command: &'static str,
        reason: String,
    },
}

/// Key lifecycle errors
#[derive(Error, Debug)]
pub enum KeyError {
    /// The TPM refused to create the key
    #[error("key creation failed: {source}")]
    CreationFailed {
        #[source]
        source: DeviceError,
    },

    /// One of the key blob files could not be written durably. The created
    /// hardware object is unusable without it; the caller must retry creation.
    #[error("could not persist key blob to {path}: {source}")]
    PersistenceFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// One of the key blob files is missing or unreadable
    #[error("key files not found under prefix {prefix}: {source}")]
    NotFound {
        prefix: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TPM refused to load the persisted blobs (e.g. parent mismatch)
    #[error("failed to load key into the TPM: {source}")]
    LoadFailed {
        #[source]
        source: DeviceError,
    },
}

/// Signing and public-key export errors
#[derive(Error, Debug)]
pub enum SigningError {
    /// The TPM refused the sign command (consumed session, policy mismatch)
    #[error("TPM refused to sign: {source}")]
    SigningFailed {
        #[source]
        source: DeviceError,
    },

    /// The hardware-native (R, S) pair could not be re-encoded as DER
    #[error("could not encode signature as DER: {reason}")]
    EncodingFailed { reason: String },

    /// The key's public area is not an EC key on a supported curve
    #[error("public key export failed: {reason}")]
    PublicKeyExportFailed { reason: String },
}

/// Payload and QR encoding errors
#[derive(Error, Debug)]
pub enum EncodingError {
    /// The payload string does not fit in a QR code
    #[error("payload of {len} bytes exceeds QR code capacity")]
    CapacityExceeded { len: usize },

    /// The QR code could not be rendered
    #[error("failed to render QR code: {reason}")]
    RenderFailed { reason: String },

    /// The rendered QR image could not be written
    #[error("failed to write QR image to {path}: {reason}")]
    ImageWrite { path: PathBuf, reason: String },

    /// The verification payload could not be serialized
    #[error("failed to serialize payload: {0}")]
    Serialize(#[from] serde_json::Error),
}
