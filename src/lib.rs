//! ultraqr - measured-boot attestation over QR codes
//!
//! A TPM 2.0 holds an ECDSA P-256 signing key sealed to a selection of PCR
//! registers. While the measured boot state matches the state the key was
//! created under, the TPM will sign challenges and timestamps with it; after
//! any change to the selected registers, authorization fails. The signed
//! payloads and the enrollment public key are rendered as QR codes so an
//! offline verifier can scan them.
//!
//! The crate is organized hexagonally: `model` holds domain types, `ports`
//! the device traits, `adapters` the tss-esapi implementation (and an
//! in-memory fake for tests), `use_cases` the workflows, and `api` the
//! TPM-wired entry points the binary calls.

mod adapters;
pub mod api;
mod connection;
pub mod error;
mod logic;
pub mod model;
pub mod ports;
pub mod use_cases;

pub use adapters::TssOpener;
pub use api::{enroll, initialize, verify, RunConfig};
pub use connection::Connection;
pub use error::{UltraqrError, UltraqrResult};
pub use model::{KeyFiles, PcrSelection, VerificationPayload};
