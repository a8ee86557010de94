//! Shared value types for the dispatch domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! meaningful values with invariants (a repository always has a non-empty
//! owner and name, a token always has an expiry) and participate in domain
//! operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Repository coordinates
// ---------------------------------------------------------------------------

/// A repository addressed as `owner/name`.
///
/// Both components are guaranteed non-empty; API adapters interpolate them
/// into endpoint paths without further validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoId {
    owner: String,
    name: String,
}

impl RepoId {
    /// Creates a [`RepoId`], returning `None` if either component is empty.
    #[must_use]
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Option<Self> {
        let owner = owner.into();
        let name = name.into();
        if owner.is_empty() || name.is_empty() {
            None
        } else {
            Some(Self { owner, name })
        }
    }

    /// Returns the owner component.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Returns the repository-name component.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the `owner/name` form.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl std::fmt::Display for RepoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

// ---------------------------------------------------------------------------
// Installation token
// ---------------------------------------------------------------------------

/// A short-lived access token scoped to one App installation.
///
/// Owned by the host connector for the duration of one dispatch and dropped
/// with it; tokens are never cached across events. The `Debug` representation
/// redacts the secret value.
#[derive(Clone)]
pub struct InstallationToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl InstallationToken {
    /// Creates a token from the exchange response.
    pub fn new(value: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    /// Returns the secret token value.
    pub fn reveal(&self) -> &str {
        &self.value
    }

    /// Returns the token's expiry timestamp.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

impl std::fmt::Debug for InstallationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallationToken")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Fetched repository content
// ---------------------------------------------------------------------------

/// Decoded file content fetched from a repository at a specific ref.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedFile {
    /// UTF-8 file content, already base64-decoded.
    pub content: String,
    /// Revision id (blob SHA) of the fetched content.
    pub sha: String,
}

// ---------------------------------------------------------------------------
// Reactions
// ---------------------------------------------------------------------------

/// Acknowledgment reactions posted on the triggering comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionKind {
    /// Posted before routing: the command has been seen and is being handled.
    Processing,
    /// Posted after the reply comment: handling finished.
    Done,
}

impl ReactionKind {
    /// The reaction `content` value the host API expects.
    pub fn as_api_str(self) -> &'static str {
        match self {
            ReactionKind::Processing => "eyes",
            ReactionKind::Done => "rocket",
        }
    }
}
