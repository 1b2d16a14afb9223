//! On-disk persistence of the sealed key pair.
//!
//! Two files per key: `<prefix>.priv` (the hardware-wrapped private blob,
//! opaque to everything but the TPM that wrapped it) and `<prefix>.pub`
//! (the marshalled public area). Both are written with owner-only
//! permissions via write-temp-then-rename, and only after both blobs are in
//! hand, so a reader never observes a mixed old/new pair.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::KeyError;
use crate::ports::KeyBlobs;

const KEY_FILE_MODE: u32 = 0o600;

/// Path prefix for the persisted key blob pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyFiles {
    prefix: PathBuf,
}

impl KeyFiles {
    pub fn new(prefix: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    pub fn private_path(&self) -> PathBuf {
        self.with_suffix("priv")
    }

    pub fn public_path(&self) -> PathBuf {
        self.with_suffix("pub")
    }

    fn with_suffix(&self, suffix: &str) -> PathBuf {
        let mut name = self.prefix.as_os_str().to_os_string();
        name.push(".");
        name.push(suffix);
        PathBuf::from(name)
    }

    /// Persist both blobs, creating parent directories as needed and
    /// truncating any pre-existing files.
    pub fn write(&self, blobs: &KeyBlobs) -> Result<(), KeyError> {
        if let Some(parent) = self.prefix.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| KeyError::PersistenceFailed {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        write_atomic(&self.private_path(), &blobs.private)?;
        write_atomic(&self.public_path(), &blobs.public)?;
        debug!(prefix = %self.prefix.display(), "key blobs persisted");
        Ok(())
    }

    /// Read both blobs back; a missing or unreadable file fails the whole read.
    pub fn read(&self) -> Result<KeyBlobs, KeyError> {
        let not_found = |source| KeyError::NotFound {
            prefix: self.prefix.clone(),
            source,
        };
        let private = fs::read(self.private_path()).map_err(not_found)?;
        let public = fs::read(self.public_path()).map_err(|source| KeyError::NotFound {
            prefix: self.prefix.clone(),
            source,
        })?;
        Ok(KeyBlobs { public, private })
    }
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<(), KeyError> {
    let failed = |source| KeyError::PersistenceFailed {
        path: path.to_path_buf(),
        source,
    };

    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(KEY_FILE_MODE)
        .open(&tmp)
        .map_err(failed)?;
    file.write_all(data).map_err(failed)?;
    file.sync_all().map_err(failed)?;
    drop(file);

    fs::rename(&tmp, path).map_err(failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn scratch_files(name: &str) -> KeyFiles {
        let dir = std::env::temp_dir().join(format!("ultraqr-keyfiles-{}-{name}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        KeyFiles::new(dir.join("key"))
    }

    fn sample_blobs() -> KeyBlobs {
        KeyBlobs {
            public: vec![1, 2, 3, 4],
            private: vec![9, 8, 7],
        }
    }

    #[test]
    fn test_write_then_read_round_trips() {
        let files = scratch_files("roundtrip");
        files.write(&sample_blobs()).unwrap();
        let blobs = files.read().unwrap();
        assert_eq!(blobs.public, vec![1, 2, 3, 4]);
        assert_eq!(blobs.private, vec![9, 8, 7]);
    }

    #[test]
    fn test_files_are_owner_only() {
        let files = scratch_files("perms");
        files.write(&sample_blobs()).unwrap();
        for path in [files.private_path(), files.public_path()] {
            let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o600, "unexpected mode on {}", path.display());
        }
    }

    #[test]
    fn test_rewrite_overwrites_both_files() {
        let files = scratch_files("overwrite");
        files.write(&sample_blobs()).unwrap();
        let replacement = KeyBlobs {
            public: vec![0xaa; 8],
            private: vec![0xbb; 8],
        };
        files.write(&replacement).unwrap();
        let blobs = files.read().unwrap();
        assert_eq!(blobs.public, replacement.public);
        assert_eq!(blobs.private, replacement.private);
    }

    #[test]
    fn test_missing_files_fail_with_not_found() {
        let files = scratch_files("missing");
        assert!(matches!(
            files.read().unwrap_err(),
            KeyError::NotFound { .. }
        ));
    }

    #[test]
    fn test_one_missing_file_fails_the_whole_read() {
        let files = scratch_files("partial");
        files.write(&sample_blobs()).unwrap();
        fs::remove_file(files.public_path()).unwrap();
        assert!(matches!(
            files.read().unwrap_err(),
            KeyError::NotFound { .. }
        ));
    }

    #[test]
    fn test_paths_carry_expected_suffixes() {
        let files = KeyFiles::new("/etc/ultraqr/key");
        assert_eq!(files.private_path(), PathBuf::from("/etc/ultraqr/key.priv"));
        assert_eq!(files.public_path(), PathBuf::from("/etc/ultraqr/key.pub"));
    }
}
