//! Ports (traits) for the security-processor transport
//!
//! These traits define the capabilities the core depends on. They represent
//! ports in hexagonal architecture: the session manager, key lifecycle and
//! signing code work against these abstractions, never against a concrete
//! TPM stack, which is what lets the whole protocol run against a software
//! device in tests.

mod device_opener;
mod tpm_device;

pub use device_opener::DeviceOpener;
pub use tpm_device::{
    EcPublicArea, KeyBlobs, KeyCurve, RawEcdsaSignature, SessionKind, TpmDevice, TransientHandle,
};
