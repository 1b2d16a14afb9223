use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::PolicyError;

/// Highest PCR index in the SHA-256 bank (24 registers).
pub const MAX_PCR_INDEX: u32 = 23;

/// Hash bank a PCR selection refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PcrBank {
    #[default]
    Sha256,
}

/// An ordered set of unique PCR indices plus the bank they live in.
///
/// Parsed from a comma-separated list such as `"0,2,4,8,9"`. Duplicate
/// indices are idempotent; an empty string yields an empty selection, which
/// the orchestrator replaces with [`PcrSelection::default`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcrSelection {
    bank: PcrBank,
    indices: BTreeSet<u32>,
}

impl PcrSelection {
    pub fn bank(&self) -> PcrBank {
        self.bank
    }

    pub fn indices(&self) -> impl Iterator<Item = u32> + '_ {
        self.indices.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Substitute the default selection if this one is empty.
    pub fn or_default(self) -> Self {
        if self.is_empty() {
            Self::default()
        } else {
            self
        }
    }
}

impl Default for PcrSelection {
    /// The measured-boot registers sealed at initialization: firmware (0),
    /// option ROMs (2), boot manager (4) and the kernel command line (8, 9).
    fn default() -> Self {
        Self {
            bank: PcrBank::Sha256,
            indices: [0, 2, 4, 8, 9].into_iter().collect(),
        }
    }
}

impl FromStr for PcrSelection {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Self {
                bank: PcrBank::Sha256,
                indices: BTreeSet::new(),
            });
        }

        let mut indices = BTreeSet::new();
        for token in s.split(',') {
            let token = token.trim();
            let index: u32 =
                token
                    .parse()
                    .map_err(|_| PolicyError::InvalidPolicySpec {
                        token: token.to_string(),
                    })?;
            if index > MAX_PCR_INDEX {
                return Err(PolicyError::InvalidPolicySpec {
                    token: token.to_string(),
                });
            }
            indices.insert(index);
        }

        Ok(Self {
            bank: PcrBank::Sha256,
            indices,
        })
    }
}

impl fmt::Display for PcrSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for index in &self.indices {
            if !first {
                write!(f, ",")?;
            }
            write!(f, "{index}")?;
            first = false;
        }
        Ok(())
    }
}
