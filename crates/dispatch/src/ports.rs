//! Port trait definitions.
//!
//! The domain defines *what* it needs from the outside world; infrastructure
//! crates define *how* to supply it. All traits are dyn-compatible (via
//! `async_trait`) so the dispatcher can be wired with fakes in tests and real
//! adapters in the binary.

use async_trait::async_trait;

use crate::errors::{CompletionError, HostError};
use crate::identifiers::{BranchName, CommentId, InstallationId, IssueNumber};
use crate::types::{FetchedFile, ReactionKind, RepoId};

// ---------------------------------------------------------------------------
// Source-control host
// ---------------------------------------------------------------------------

/// Repository-scoped operations against the source-control host, performed
/// with an installation-scoped credential.
#[async_trait]
pub trait RepositoryHost: Send + Sync {
    /// Fetches file content at a ref.
    ///
    /// "File not found" is a normal condition and surfaces as `Ok(None)`;
    /// every other failure is a hard [`HostError`].
    async fn file_content(
        &self,
        repo: &RepoId,
        path: &str,
        git_ref: &BranchName,
    ) -> Result<Option<FetchedFile>, HostError>;

    /// Resolves a pull request's head branch; `Ok(None)` when the pull
    /// request does not exist.
    async fn pull_request_head(
        &self,
        repo: &RepoId,
        number: IssueNumber,
    ) -> Result<Option<BranchName>, HostError>;

    /// Posts a new comment on an issue or pull request, returning the created
    /// comment's id.
    async fn create_comment(
        &self,
        repo: &RepoId,
        issue: IssueNumber,
        body: &str,
    ) -> Result<CommentId, HostError>;

    /// Adds an acknowledgment reaction to a comment.
    async fn create_reaction(
        &self,
        repo: &RepoId,
        comment: CommentId,
        reaction: ReactionKind,
    ) -> Result<(), HostError>;
}

/// Produces a [`RepositoryHost`] authenticated for exactly one dispatch.
///
/// `connect` performs the full App credential exchange (signed assertion →
/// installation token); the returned host owns that token and is dropped at
/// the end of the dispatch. Nothing is cached across events, so every event
/// pays one exchange round trip; statelessness is traded for latency.
#[async_trait]
pub trait HostConnector: Send + Sync {
    async fn connect(
        &self,
        installation: InstallationId,
    ) -> Result<Box<dyn RepositoryHost>, HostError>;
}

// ---------------------------------------------------------------------------
// Generative-text provider
// ---------------------------------------------------------------------------

/// One bounded generative-text invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    /// System instruction string (role framing + task context).
    pub system: String,
    /// The single user message (the directive for the target story).
    pub user: String,
    /// Output token ceiling for the call.
    pub max_tokens: u32,
}

/// Invokes the generative-text service.
///
/// The returned text is opaque markdown: the domain neither validates nor
/// re-renders it.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError>;
}
