//! Externally visible unique identifiers.
//!
//! A unique id is `PREFIX-SUFFIX` where the prefix selects the format kind
//! and the suffix is a fixed-length draw from an uppercase alphanumeric
//! alphabet. Parsing and validation here are pure; collision checking lives
//! in the issuer, which consults the metadata store.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Alphabet the random suffix is drawn from.
pub const SUFFIX_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Format kind for identifier issuance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdKind {
    Student,
    Instructor,
    Scenario,
    Cohort,
}

/// Role encoded by a role-scoped identifier format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Professor,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Professor => "professor",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl IdKind {
    pub const ALL: [IdKind; 4] = [Self::Student, Self::Instructor, Self::Scenario, Self::Cohort];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Instructor => "instructor",
            Self::Scenario => "scenario",
            Self::Cohort => "cohort",
        }
    }

    /// Identifier prefix for this kind.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Student => "STUD",
            Self::Instructor => "INSTR",
            Self::Scenario => "SCEN",
            Self::Cohort => "COHORT",
        }
    }

    /// Fixed suffix length for this kind.
    pub fn suffix_len(&self) -> usize {
        match self {
            Self::Student => 9,
            Self::Instructor => 10,
            Self::Scenario => 10,
            Self::Cohort => 8,
        }
    }

    /// The role this format encodes, for role-scoped kinds.
    pub fn role(&self) -> Option<Role> {
        match self {
            Self::Student => Some(Role::Student),
            Self::Instructor => Some(Role::Professor),
            Self::Scenario | Self::Cohort => None,
        }
    }

    /// Compose a full identifier from a suffix.
    ///
    /// The suffix must already have the right length and alphabet; this is
    /// enforced by `UniqueId::parse` on the way back out.
    pub fn compose(&self, suffix: &str) -> String {
        format!("{}-{}", self.prefix(), suffix)
    }
}

impl FromStr for IdKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Self::Student),
            "instructor" => Ok(Self::Instructor),
            "scenario" => Ok(Self::Scenario),
            "cohort" => Ok(Self::Cohort),
            other => Err(Error::UnknownIdKind(other.to_string())),
        }
    }
}

/// A validated unique identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UniqueId(String);

impl UniqueId {
    /// Parse and validate an identifier string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        let Some((prefix, suffix)) = s.split_once('-') else {
            return Err(Error::InvalidUniqueId(s.to_string()));
        };
        let kind = IdKind::ALL
            .iter()
            .find(|k| k.prefix() == prefix)
            .copied()
            .ok_or_else(|| Error::InvalidUniqueId(s.to_string()))?;
        if suffix.len() != kind.suffix_len()
            || !suffix.bytes().all(|b| SUFFIX_ALPHABET.contains(&b))
        {
            return Err(Error::InvalidUniqueId(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The format kind of this identifier.
    pub fn kind(&self) -> IdKind {
        // Valid by construction, so the prefix always resolves.
        let prefix = self.0.split_once('-').map(|(p, _)| p).unwrap_or_default();
        IdKind::ALL
            .iter()
            .find(|k| k.prefix() == prefix)
            .copied()
            .expect("UniqueId holds a validated prefix")
    }
}

impl fmt::Display for UniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Check whether a string is a well-formed identifier of any known kind.
pub fn is_valid_format(s: &str) -> bool {
    UniqueId::parse(s).is_ok()
}

/// Extract the role encoded by a role-scoped identifier.
///
/// Returns `None` for malformed identifiers and for kinds that carry no
/// role. Used for defensive validation at trust boundaries.
pub fn extract_role(s: &str) -> Option<Role> {
    UniqueId::parse(s).ok().and_then(|id| id.kind().role())
}
