//! High-level entry points wired to the real TPM adapter.
//!
//! The use cases stay generic over the device port; this module picks
//! [`TssOpener`], runs the workflow inside a scoped [`Connection`], and
//! renders QR output. One connection per invocation: every transient handle
//! is gone by the time these functions return.

use std::path::{Path, PathBuf};

use crate::adapters::TssOpener;
use crate::connection::Connection;
use crate::error::UltraqrResult;
use crate::logic::qr;
use crate::model::{KeyFiles, PcrSelection};
use crate::use_cases;

/// Everything an invocation needs: where the TPM is, where the key blobs
/// live, which PCRs seal the key, and what to sign and render.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub device_path: PathBuf,
    pub key_prefix: PathBuf,
    pub pcrs: PcrSelection,
    /// Verifier-supplied nonce; empty or absent means "sign a timestamp".
    pub challenge: Option<String>,
    /// Also write the rendered QR code as a PNG here.
    pub qr_image: Option<PathBuf>,
}

impl RunConfig {
    fn selection(&self) -> PcrSelection {
        self.pcrs.clone().or_default()
    }

    fn files(&self) -> KeyFiles {
        KeyFiles::new(&self.key_prefix)
    }

    fn image_path(&self) -> Option<&Path> {
        self.qr_image.as_deref()
    }
}

/// Create and persist a fresh PCR-sealed signing key.
pub fn initialize(config: &RunConfig) -> UltraqrResult<()> {
    let mut conn = Connection::open(&TssOpener, &config.device_path)?;
    use_cases::create_key(&mut conn, &config.files(), &config.selection())
}

/// Export the public key as hex DER and render it as a QR code.
pub fn enroll(config: &RunConfig) -> UltraqrResult<String> {
    let mut conn = Connection::open(&TssOpener, &config.device_path)?;
    let enrollment = use_cases::enroll(&mut conn, &config.files(), &config.selection())?;
    drop(conn);
    Ok(qr::generate(&enrollment, config.image_path())?)
}

/// Sign the challenge (or a timestamp) and render the attestation payload
/// as a QR code.
pub fn verify(config: &RunConfig) -> UltraqrResult<String> {
    let mut conn = Connection::open(&TssOpener, &config.device_path)?;
    let payload = use_cases::verify(
        &mut conn,
        &config.files(),
        &config.selection(),
        config.challenge.as_deref(),
    )?;
    drop(conn);
    Ok(qr::generate(&payload, config.image_path())?)
}
