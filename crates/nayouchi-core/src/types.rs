//! Core types for the Nayouchi name search
//!
//! This module defines the identifiers and records exchanged with the backend,
//! using newtype patterns so participant and group identifiers cannot be mixed up.
//! All group data is owned by the backend; the client only ever replaces its
//! cached copy wholesale.

use core::fmt;
use core::ops::Deref;
use core::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::errors::NayouchiError;

// ----------------------------------------------------------------------------
// Participant Identifier
// ----------------------------------------------------------------------------

/// Opaque identifier of one participant (one browser/device context)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    /// Path segment that precedes the participant id in invitation links
    pub const LINK_SEGMENT: &'static str = "usr";

    pub fn new<T: Into<String>>(id: T) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Extract the participant id from an invitation link of the form
    /// `https://host/usr/<id>`.
    pub fn from_invite_link(link: &str) -> Result<Self, NayouchiError> {
        let url = url::Url::parse(link)
            .map_err(|e| NayouchiError::config_error(format!("Invalid invite link {}: {}", link, e)))?;

        let mut segments = url
            .path_segments()
            .ok_or_else(|| NayouchiError::config_error("Invite link has no path"))?;

        while let Some(segment) = segments.next() {
            if segment == Self::LINK_SEGMENT {
                return match segments.next() {
                    Some(id) if !id.is_empty() => Ok(Self::new(id)),
                    _ => Err(NayouchiError::config_error(
                        "Invite link is missing the participant id",
                    )),
                };
            }
        }

        Err(NayouchiError::config_error(format!(
            "Invite link does not contain a /{}/ segment",
            Self::LINK_SEGMENT
        )))
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ParticipantId {
    type Err = NayouchiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(NayouchiError::config_error("Participant id must not be empty"));
        }
        Ok(Self::new(trimmed))
    }
}

// ----------------------------------------------------------------------------
// Group Identifier
// ----------------------------------------------------------------------------

/// Backend-assigned identifier of a group
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(String);

impl GroupId {
    pub fn new<T: Into<String>>(id: T) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for GroupId {
    type Err = NayouchiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(NayouchiError::config_error("Group id must not be empty"));
        }
        Ok(Self::new(trimmed))
    }
}

// ----------------------------------------------------------------------------
// Candidate Name
// ----------------------------------------------------------------------------

/// A candidate name proposed by a member, compared by exact value
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Name(String);

impl Name {
    pub fn new<T: Into<String>>(name: T) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the name has no visible characters
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Deref for Name {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<&str> for Name {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Name {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// ----------------------------------------------------------------------------
// Members
// ----------------------------------------------------------------------------

/// Role of a member inside a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    /// May promote proposers and forms the group's decision body
    Initiator,
    /// May suggest names only
    Proposer,
}

impl Default for Role {
    fn default() -> Self {
        Self::Proposer
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Initiator => f.write_str("INITIATOR"),
            Role::Proposer => f.write_str("PROPOSER"),
        }
    }
}

/// A member as seen by the member themself
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub nominations: Vec<Name>,
}

impl Member {
    /// A member who has not chosen a display name yet
    pub fn is_unnamed(&self) -> bool {
        self.name.trim().is_empty()
    }

    pub fn is_initiator(&self) -> bool {
        self.role == Role::Initiator
    }
}

/// Public projection of another member (nominations are not disclosed)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberSummary {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub role: Role,
}

// ----------------------------------------------------------------------------
// Groups
// ----------------------------------------------------------------------------

/// Entry of the group list returned by `list`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub id: GroupId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub me: Member,
    #[serde(default)]
    pub others: Vec<MemberSummary>,
}

/// Full snapshot of a group as returned by `enter`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: GroupId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub me: Member,
    #[serde(default)]
    pub others: Vec<MemberSummary>,
    #[serde(default)]
    pub initiators: Vec<String>,
    #[serde(default)]
    pub proposers: Vec<String>,
    #[serde(default)]
    pub duplicates: Vec<Name>,
    #[serde(default)]
    pub proposers_nominations: Vec<Name>,
    /// Nomination count per member name, in backend order
    #[serde(default)]
    pub stats: IndexMap<String, usize>,
}

impl Group {
    /// Names nominated by the current participant
    pub fn my_nominations(&self) -> &[Name] {
        &self.me.nominations
    }

    /// Whether the current participant still has to choose a display name
    pub fn needs_name(&self) -> bool {
        self.me.is_unnamed()
    }

    /// Whether `name` is one of the shared matches
    pub fn is_match(&self, name: &Name) -> bool {
        self.duplicates.contains(name)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_participant_from_invite_link() {
        let id = ParticipantId::from_invite_link("https://names.example.org/usr/4fa9c0").unwrap();
        assert_eq!(id.as_str(), "4fa9c0");

        assert!(ParticipantId::from_invite_link("https://names.example.org/").is_err());
        assert!(ParticipantId::from_invite_link("https://names.example.org/usr/").is_err());
        assert!(ParticipantId::from_invite_link("not a link").is_err());
    }

    #[test]
    fn test_group_decodes_backend_snapshot() {
        let json = serde_json::json!({
            "id": "g1",
            "name": "Trip",
            "me": { "name": "", "role": "INITIATOR", "nominations": [] },
            "proposers": [],
            "proposersNominations": ["Ada"],
            "initiators": [""],
            "stats": { "": 0 },
            "duplicates": []
        });

        let group: Group = serde_json::from_value(json).unwrap();
        assert_eq!(group.id, GroupId::new("g1"));
        assert_eq!(group.me.role, Role::Initiator);
        assert!(group.needs_name());
        assert_eq!(group.proposers_nominations, vec![Name::new("Ada")]);
        assert!(group.others.is_empty());
    }

    #[test]
    fn test_group_summary_decodes_public_projection() {
        let json = serde_json::json!({
            "id": "g2",
            "name": "Baby",
            "me": { "name": "Kim", "role": "PROPOSER", "nominations": ["Lea"] },
            "others": [{ "name": "Sam", "role": "INITIATOR" }]
        });

        let summary: GroupSummary = serde_json::from_value(json).unwrap();
        assert_eq!(summary.others.len(), 1);
        assert_eq!(summary.others[0].role, Role::Initiator);
        assert!(!summary.me.is_initiator());
    }
}
