//! VSC Identifiers
//!
//! Accounts, groups, virtual organisations and projects are all addressed by
//! a short ASCII name issued by the account page (`vsc40001`, `gvo00012`,
//! `proj_test01`). These names end up inside filesystem paths, so the
//! newtype refuses anything that could escape a path template.
//!
//! # Example
//!
//! ```
//! use vsc_core::VscId;
//!
//! let id: VscId = "vsc40001".parse().unwrap();
//! assert_eq!(id.group_prefix(), "vsc400");
//! assert!("../etc".parse::<VscId>().is_err());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::error::{CoreError, CoreResult};

/// Maximum identifier length accepted from the source.
const MAX_ID_LEN: usize = 64;

/// Validated identifier of an account, group or project.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VscId(String);

impl VscId {
    /// Validate and wrap an identifier.
    pub fn new(value: impl Into<String>) -> CoreResult<Self> {
        let value = value.into();
        if value.is_empty() {
            return Err(CoreError::InvalidId {
                value,
                reason: "empty",
            });
        }
        if value.len() > MAX_ID_LEN {
            return Err(CoreError::InvalidId {
                value,
                reason: "too long",
            });
        }
        if !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(CoreError::InvalidId {
                value,
                reason: "only ASCII letters, digits, '_' and '-' are allowed",
            });
        }
        Ok(Self(value))
    }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The identifier without its last two characters.
    ///
    /// Home and VO directories are grouped per hundred (`vsc400/vsc40001`,
    /// `gvo000/gvo00012`).
    #[must_use]
    pub fn group_prefix(&self) -> &str {
        let cut = self.0.len().saturating_sub(2);
        &self.0[..cut]
    }

    /// Trailing decimal digits of the identifier, if any.
    #[must_use]
    pub fn numeric_suffix(&self) -> Option<u32> {
        let digits = self
            .0
            .char_indices()
            .rev()
            .take_while(|(_, c)| c.is_ascii_digit())
            .last()
            .map(|(i, _)| &self.0[i..])?;
        digits.parse().ok()
    }

    /// Whether the identifier starts with `prefix`.
    #[must_use]
    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }
}

impl Display for VscId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for VscId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for VscId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<VscId> for String {
    fn from(id: VscId) -> Self {
        id.0
    }
}

impl AsRef<str> for VscId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
