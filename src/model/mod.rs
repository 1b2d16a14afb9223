mod key_files;
mod payload;
mod pcr_selection;

pub use key_files::KeyFiles;
pub use payload::{timestamp_message, VerificationPayload};
pub use pcr_selection::{PcrBank, PcrSelection, MAX_PCR_INDEX};
