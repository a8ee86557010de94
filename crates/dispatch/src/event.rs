//! Inbound webhook event model.
//!
//! Deserialised shape of the GitHub `issue_comment` payload (the
//! `pull_request` object also appears on review-comment deliveries). Every
//! field that GitHub may omit is optional here; requiredness is decided by the
//! dispatcher, which distinguishes "not for us" (ignore) from "for us but
//! incomplete" (malformed).
//!
//! An event is immutable once received and lives for exactly one dispatch.

use serde::Deserialize;

use crate::identifiers::{BranchName, InstallationId, IssueNumber};
use crate::types::RepoId;

/// One inbound webhook delivery, as sent by the source-control host.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    /// Action kind within the event type (only `"created"` is routable).
    pub action: String,
    /// The triggering comment, when the event carries one.
    pub comment: Option<EventComment>,
    /// Issue context (present on `issue_comment` deliveries; also set for
    /// comments on pull requests, with [`EventIssue::pull_request`] marking
    /// the link).
    pub issue: Option<EventIssue>,
    /// Inline pull-request context, when the delivery carries one directly.
    pub pull_request: Option<EventPullRequest>,
    /// Repository the event originated from.
    pub repository: EventRepository,
    /// The App installation this delivery is scoped to.
    pub installation: Option<EventInstallation>,
    /// The account that triggered the event.
    pub sender: Option<EventAccount>,
}

/// The comment that triggered the event.
#[derive(Debug, Clone, Deserialize)]
pub struct EventComment {
    pub id: u64,
    pub body: String,
    pub user: Option<EventAccount>,
}

/// Issue (or issue-side view of a pull request) the comment was posted on.
#[derive(Debug, Clone, Deserialize)]
pub struct EventIssue {
    pub number: u64,
    /// Present exactly when the "issue" is really a pull request.
    pub pull_request: Option<LinkedPullRequest>,
}

/// Marker object linking an issue to its pull request.
#[derive(Debug, Clone, Deserialize)]
pub struct LinkedPullRequest {
    pub url: Option<String>,
}

/// Inline pull-request payload.
#[derive(Debug, Clone, Deserialize)]
pub struct EventPullRequest {
    pub number: u64,
    pub head: Option<GitReference>,
}

/// A git ref as it appears in pull-request payloads.
#[derive(Debug, Clone, Deserialize)]
pub struct GitReference {
    #[serde(rename = "ref")]
    pub name: String,
}

/// Repository coordinates.
#[derive(Debug, Clone, Deserialize)]
pub struct EventRepository {
    pub name: String,
    pub owner: EventAccount,
}

/// A user or organisation account.
#[derive(Debug, Clone, Deserialize)]
pub struct EventAccount {
    pub login: String,
}

/// App installation reference.
#[derive(Debug, Clone, Deserialize)]
pub struct EventInstallation {
    pub id: u64,
}

impl WebhookEvent {
    /// The issue or pull-request number replies should be posted against.
    ///
    /// An inline pull-request payload takes precedence over the issue view of
    /// the same event.
    pub fn issue_number(&self) -> Option<IssueNumber> {
        self.pull_request
            .as_ref()
            .map(|pr| IssueNumber::new(pr.number))
            .or_else(|| self.issue.as_ref().map(|issue| IssueNumber::new(issue.number)))
    }

    /// Head branch carried inline by a pull-request payload, if any.
    pub fn inline_head_ref(&self) -> Option<BranchName> {
        self.pull_request
            .as_ref()
            .and_then(|pr| pr.head.as_ref())
            .and_then(|head| BranchName::new(head.name.clone()))
    }

    /// The pull-request number to follow when the issue links one but the
    /// delivery carries no inline head ref.
    pub fn linked_pull_request(&self) -> Option<IssueNumber> {
        let issue = self.issue.as_ref()?;
        issue.pull_request.as_ref()?;
        Some(IssueNumber::new(issue.number))
    }

    /// Repository coordinates, when owner and name are both non-empty.
    pub fn repo_id(&self) -> Option<RepoId> {
        RepoId::new(self.repository.owner.login.clone(), self.repository.name.clone())
    }

    /// The installation this delivery is scoped to.
    pub fn installation_id(&self) -> Option<InstallationId> {
        self.installation.as_ref().map(|i| InstallationId::new(i.id))
    }
}
