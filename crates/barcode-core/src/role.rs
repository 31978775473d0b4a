//! Connection roles and the declaration-string table.
//!
//! Every connection starts [`Role::Unclassified`].  Its first `declare` frame
//! names a client type as a free-form string; [`Role::from_declaration`]
//! maps that string onto the closed enumeration.  Older page and desktop
//! builds used several spellings (`mobile`, `mobile_client`, `pc_client`), so
//! the mapping lives in one table instead of being scattered through the relay.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Version of [`DECLARATION_TABLE`].  Bump when a row is added or removed.
pub const DECLARATION_TABLE_VERSION: u8 = 1;

/// Wire-level declaration strings and the role each one selects.
///
/// Matching is case-insensitive after trimming surrounding whitespace.
pub const DECLARATION_TABLE: &[(&str, Role)] = &[
    ("scanner", Role::Scanner),
    ("mobile", Role::Scanner),
    ("mobile_client", Role::Scanner),
    ("consumer", Role::Consumer),
    ("pc_client", Role::Consumer),
    ("desktop", Role::Consumer),
];

/// The role a connection plays in the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Connected, but no valid `declare` frame has been processed yet.
    Unclassified,
    /// Submits scan reports (the phone running the scanner page).
    Scanner,
    /// Receives broadcast scan results (the desktop client).
    Consumer,
}

/// A declaration string that does not appear in [`DECLARATION_TABLE`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown client type: {0:?}")]
pub struct UnknownRole(pub String);

impl Role {
    /// Maps a declared client type onto a classified role.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownRole`] when the string matches no table row.  The
    /// result is never [`Role::Unclassified`].
    ///
    /// # Example
    ///
    /// ```rust
    /// use barcode_core::Role;
    ///
    /// assert_eq!(Role::from_declaration("pc_client").unwrap(), Role::Consumer);
    /// assert!(Role::from_declaration("bogus").is_err());
    /// ```
    pub fn from_declaration(declared: &str) -> Result<Role, UnknownRole> {
        let needle = declared.trim();
        DECLARATION_TABLE
            .iter()
            .find(|(wire, _)| wire.eq_ignore_ascii_case(needle))
            .map(|(_, role)| *role)
            .ok_or_else(|| UnknownRole(declared.to_string()))
    }

    /// Returns `true` for [`Role::Scanner`] and [`Role::Consumer`].
    pub fn is_classified(self) -> bool {
        !matches!(self, Role::Unclassified)
    }

    /// Lower-case name, identical to the serde representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Unclassified => "unclassified",
            Role::Scanner => "scanner",
            Role::Consumer => "consumer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
