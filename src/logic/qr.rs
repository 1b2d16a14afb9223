//! QR code rendering for enrollment and verification payloads.
//!
//! Low error correction keeps the symbol small; the payloads are
//! re-generated on demand, so damaged prints are re-issued rather than
//! error-corrected.

use std::path::Path;

use qrcode::render::unicode;
use qrcode::types::QrError;
use qrcode::{EcLevel, QrCode};
use tracing::debug;

use crate::error::EncodingError;

/// Render `data` as unicode text art, optionally also saving a PNG.
pub fn generate(data: &str, image_path: Option<&Path>) -> Result<String, EncodingError> {
    debug!(len = data.len(), "encoding QR code");
    let code = QrCode::with_error_correction_level(data.as_bytes(), EcLevel::L).map_err(
        |err| match err {
            QrError::DataTooLong => EncodingError::CapacityExceeded { len: data.len() },
            other => EncodingError::RenderFailed {
                reason: other.to_string(),
            },
        },
    )?;

    if let Some(path) = image_path {
        let img = code.render::<image::Luma<u8>>().build();
        img.save(path).map_err(|err| EncodingError::ImageWrite {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
        debug!(path = %path.display(), "QR image written");
    }

    let mut text = code.render::<unicode::Dense1x2>().build();
    text.push('\n');
    Ok(text)
}
