//! Adapters - concrete implementations of the device ports

mod tss;

#[cfg(test)]
pub mod fake_tpm;

// Re-export for convenience
pub use tss::TssOpener;
