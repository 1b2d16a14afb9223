//! Use cases - the orchestrated workflows of the tool
//!
//! Each use case drives a [`crate::Connection`] through the port traits and
//! never touches an adapter directly, so every workflow runs unchanged
//! against the in-memory device in tests.

pub mod create_key;
pub mod enroll;
pub mod load_key;
pub mod sign;
pub mod verify;

pub use create_key::create_key;
pub use enroll::enroll;
pub use load_key::{load_key, AuthorizedKey};
pub use sign::{export_public_key, sign_message};
pub use verify::verify;
