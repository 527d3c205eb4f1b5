//! Lifecycle states and the static entity dependency graph.
//!
//! The graph is declared here, once, and walked iteratively by the metadata
//! store when cascading transitions. Cascade depth is bounded by the graph
//! itself (scenario -> scene -> attachment is the longest chain).

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a managed record.
///
/// ACTIVE and SOFT_DELETED records live in the `records` table and are
/// distinguished by `deleted_at`; a PURGED record's row is gone and only its
/// tombstone remains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Active,
    SoftDeleted,
    Purged,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::SoftDeleted => "soft_deleted",
            Self::Purged => "purged",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kinds of lifecycle-managed entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A course scenario; root of the dependency graph.
    Scenario,
    /// A persona belonging to a scenario.
    Persona,
    /// A scene belonging to a scenario.
    Scene,
    /// A file attached to a scene.
    Attachment,
    /// A user-progress record for a scenario.
    Progress,
}

impl EntityKind {
    /// All entity kinds, in stats-reporting order.
    pub const ALL: [EntityKind; 5] = [
        Self::Scenario,
        Self::Persona,
        Self::Scene,
        Self::Attachment,
        Self::Progress,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scenario => "scenario",
            Self::Persona => "persona",
            Self::Scene => "scene",
            Self::Attachment => "attachment",
            Self::Progress => "progress",
        }
    }

    /// Child kinds this kind cascades into when soft-deleted or purged.
    pub fn children(&self) -> &'static [EntityKind] {
        match self {
            Self::Scenario => &[Self::Persona, Self::Scene, Self::Progress],
            Self::Scene => &[Self::Attachment],
            Self::Persona | Self::Attachment | Self::Progress => &[],
        }
    }

    /// The kind a record's parent must have, if it has one.
    pub fn parent_kind(&self) -> Option<EntityKind> {
        match self {
            Self::Scenario => None,
            Self::Persona | Self::Scene | Self::Progress => Some(Self::Scenario),
            Self::Attachment => Some(Self::Scene),
        }
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scenario" => Ok(Self::Scenario),
            "persona" => Ok(Self::Persona),
            "scene" => Ok(Self::Scene),
            "attachment" => Ok(Self::Attachment),
            "progress" => Ok(Self::Progress),
            other => Err(Error::UnknownEntityKind(other.to_string())),
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
