//! Translation between the TPM's native representations and portable DER.
//!
//! The TPM hands back an ECDSA signature as two big-endian integers and a
//! public key as raw affine coordinates; verifiers expect an ASN.1 DER
//! signature and a SubjectPublicKeyInfo structure. Coordinates and scalars
//! may arrive shorter than 32 bytes when they carry leading zero bytes.

use p256::ecdsa::Signature;
use p256::elliptic_curve::sec1::FromEncodedPoint;
use p256::pkcs8::EncodePublicKey;
use p256::{EncodedPoint, FieldBytes, PublicKey};

use crate::error::SigningError;
use crate::ports::{EcPublicArea, KeyCurve, RawEcdsaSignature};

/// Re-encode a hardware-native (R, S) pair as a DER ECDSA signature.
pub fn ecdsa_der(raw: &RawEcdsaSignature) -> Result<Vec<u8>, SigningError> {
    let r = left_pad(&raw.r).map_err(|reason| SigningError::EncodingFailed { reason })?;
    let s = left_pad(&raw.s).map_err(|reason| SigningError::EncodingFailed { reason })?;
    let signature =
        Signature::from_scalars(r, s).map_err(|err| SigningError::EncodingFailed {
            reason: err.to_string(),
        })?;
    Ok(signature.to_der().as_bytes().to_vec())
}

/// Reassemble a DER SubjectPublicKeyInfo from an exported public area.
pub fn spki_der(area: &EcPublicArea) -> Result<Vec<u8>, SigningError> {
    match &area.curve {
        KeyCurve::NistP256 => {}
        KeyCurve::Unsupported(name) => {
            return Err(SigningError::PublicKeyExportFailed {
                reason: format!("unsupported curve {name}"),
            })
        }
    }

    let export_failed = |reason: String| SigningError::PublicKeyExportFailed { reason };
    let x = left_pad(&area.x).map_err(export_failed)?;
    let y = left_pad(&area.y).map_err(export_failed)?;

    let point = EncodedPoint::from_affine_coordinates(&x, &y, false);
    let key = Option::<PublicKey>::from(PublicKey::from_encoded_point(&point)).ok_or_else(|| {
        SigningError::PublicKeyExportFailed {
            reason: "coordinates are not a point on P-256".to_string(),
        }
    })?;

    let der = key
        .to_public_key_der()
        .map_err(|err| SigningError::PublicKeyExportFailed {
            reason: err.to_string(),
        })?;
    Ok(der.as_bytes().to_vec())
}

fn left_pad(bytes: &[u8]) -> Result<FieldBytes, String> {
    if bytes.len() > 32 {
        return Err(format!("field element of {} bytes exceeds P-256 width", bytes.len()));
    }
    let mut padded = FieldBytes::default();
    padded[32 - bytes.len()..].copy_from_slice(bytes);
    Ok(padded)
}
