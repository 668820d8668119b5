//! Persisted identity for the Nayouchi CLI
//!
//! A small JSON document next to the configuration. The display name chosen
//! once is kept under the `namen-name` key and offered again whenever a new
//! group asks for a name.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use nayouchi_core::ParticipantId;

use crate::error::Result;

/// Key under which the chosen display name is stored
pub const NAME_KEY: &str = "namen-name";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredIdentity {
    #[serde(rename = "namen-name", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant: Option<ParticipantId>,
}

impl StoredIdentity {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.participant.is_none()
    }
}

/// File-backed identity store
#[derive(Debug, Clone)]
pub struct IdentityStore {
    path: PathBuf,
    identity: StoredIdentity,
}

impl IdentityStore {
    /// Open the store at `path`; a missing file is an empty identity
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let path = path.into();
        let identity = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read identity file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse identity file {}", path.display()))?
        } else {
            StoredIdentity::default()
        };
        Ok(Self { path, identity })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn identity(&self) -> &StoredIdentity {
        &self.identity
    }

    pub fn name(&self) -> Option<&str> {
        self.identity.name.as_deref()
    }

    pub fn participant(&self) -> Option<&ParticipantId> {
        self.identity.participant.as_ref()
    }

    /// Remember the display name; blank names are ignored
    pub fn set_name(&mut self, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() || self.name() == Some(name) {
            return Ok(());
        }
        self.identity.name = Some(name.to_string());
        self.save()
    }

    pub fn set_participant(&mut self, participant: ParticipantId) -> Result<()> {
        self.identity.participant = Some(participant);
        self.save()
    }

    /// Forget everything and remove the file
    pub fn clear(&mut self) -> Result<()> {
        self.identity = StoredIdentity::default();
        if self.path.exists() {
            std::fs::remove_file(&self.path)
                .with_context(|| format!("Failed to remove identity file {}", self.path.display()))?;
        }
        Ok(())
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let contents = serde_json::to_string_pretty(&self.identity)?;
        std::fs::write(&self.path, contents)
            .with_context(|| format!("Failed to write identity file {}", self.path.display()))?;
        Ok(())
    }
}
