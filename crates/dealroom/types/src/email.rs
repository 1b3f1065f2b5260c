//! Email normalisation
//!
//! Every comparison of participant emails (directory lookups, add-to-deal,
//! search, the storage unique index) goes through [`NormalizedEmail`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// An email address trimmed of surrounding whitespace and lowercased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedEmail(String);

impl NormalizedEmail {
    pub fn new(raw: &str) -> Self {
        Self(normalize_email(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Loose shape check: one `@` with a non-empty local part and domain.
    pub fn is_plausible(&self) -> bool {
        match self.0.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty() && !domain.is_empty() && !domain.contains('@')
            }
            None => false,
        }
    }
}

impl fmt::Display for NormalizedEmail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NormalizedEmail {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Trim surrounding whitespace and lowercase.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}
