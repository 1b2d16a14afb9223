use std::path::Path;

use super::TpmDevice;
use crate::error::DeviceError;

/// Capability to open the command channel to a security processor.
pub trait DeviceOpener {
    type Device: TpmDevice;

    /// Open the transport at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Unavailable`] if the path cannot be opened.
    fn open(&self, path: &Path) -> Result<Self::Device, DeviceError>;
}
