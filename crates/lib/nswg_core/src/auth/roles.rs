//! Portal roles and role sets.
//!
//! Roles form a total order from `Guest` up to `Developer`. Users hold a set
//! of roles rather than a single tier, so checks are set intersections; the
//! order is used for "minimum role" checks.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// A named permission tier, ordered from least to most privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    Guest,
    Applicant,
    Candidate,
    GreenTeam,
    Member,
    Swcc,
    Seal,
    Instructor,
    Admin,
    SuperAdmin,
    Developer,
}

impl Role {
    /// Every role, lowest first.
    pub const ALL: [Role; 11] = [
        Role::Guest,
        Role::Applicant,
        Role::Candidate,
        Role::GreenTeam,
        Role::Member,
        Role::Swcc,
        Role::Seal,
        Role::Instructor,
        Role::Admin,
        Role::SuperAdmin,
        Role::Developer,
    ];

    /// Wire name, as stored in the database and serialized in sessions.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Guest => "guest",
            Role::Applicant => "applicant",
            Role::Candidate => "candidate",
            Role::GreenTeam => "greenTeam",
            Role::Member => "member",
            Role::Swcc => "swcc",
            Role::Seal => "seal",
            Role::Instructor => "instructor",
            Role::Admin => "admin",
            Role::SuperAdmin => "superAdmin",
            Role::Developer => "developer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string does not name a known role.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}

/// An ordered set of roles held by one user (or allowed for one resource).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleSet(BTreeSet<Role>);

impl RoleSet {
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Every role ranked at or above `min`.
    pub fn at_or_above(min: Role) -> Self {
        Role::ALL.into_iter().filter(|r| *r >= min).collect()
    }

    /// Parse stored role names, skipping (and logging) names this build does not know.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = BTreeSet::new();
        for name in names {
            match name.as_ref().parse::<Role>() {
                Ok(role) => {
                    set.insert(role);
                }
                Err(e) => warn!(error = %e, "ignoring stored role"),
            }
        }
        Self(set)
    }

    pub fn insert(&mut self, role: Role) -> bool {
        self.0.insert(role)
    }

    pub fn contains(&self, role: Role) -> bool {
        self.0.contains(&role)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = Role> + '_ {
        self.0.iter().copied()
    }

    /// True if the two sets share at least one role.
    pub fn intersects(&self, other: &RoleSet) -> bool {
        self.0.intersection(&other.0).next().is_some()
    }

    /// Union of both sets.
    pub fn union(&self, other: &RoleSet) -> RoleSet {
        Self(self.0.union(&other.0).copied().collect())
    }

    /// Most privileged role held, if any.
    pub fn highest(&self) -> Option<Role> {
        self.0.last().copied()
    }

    /// True if any held role ranks at or above `min`.
    pub fn at_least(&self, min: Role) -> bool {
        self.highest().is_some_and(|r| r >= min)
    }

    /// Role names in ascending order.
    pub fn names(&self) -> Vec<String> {
        self.iter().map(|r| r.as_str().to_string()).collect()
    }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<T: IntoIterator<Item = Role>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[Role; N]> for RoleSet {
    fn from(roles: [Role; N]) -> Self {
        roles.into_iter().collect()
    }
}
