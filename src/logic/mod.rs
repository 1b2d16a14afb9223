//! Pure functions with no device access: DER re-encoding of hardware-native
//! signatures and public keys, and QR code rendering.

pub mod qr;
pub mod signature_encoding;
