//! The dispatcher: one webhook delivery in, at most one reply comment out.
//!
//! Lifecycle per event: `received → verified → authenticated → routed →
//! replied → acknowledged`, with short-circuits to ignored / unauthorized /
//! malformed / failed at the gates. Two invariants hold for every routable,
//! authenticated event:
//!
//! 1. Exactly one reply comment is posted: handler failures after the
//!    processing acknowledgment become error-text replies, never silent
//!    drops.
//! 2. At most two reactions are posted (processing, done), and their failure
//!    never blocks the reply.
//!
//! All state is scoped to the single invocation: the authenticated host, the
//! fetched documents, and the generated reply live in locals and are dropped
//! when the dispatch returns. Concurrent deliveries share nothing.

use std::sync::Arc;

use tracing::{debug, error, info, warn, Instrument};

use crate::command::parse_command;
use crate::event::WebhookEvent;
use crate::handlers::{handle, HandlerContext};
use crate::identifiers::{CommentId, DispatchId};
use crate::ports::{CompletionProvider, HostConnector};
use crate::signature::verify_signature;
use crate::types::ReactionKind;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Why a delivery was silently ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Not a newly created comment (edits, deletions, other actions).
    NotCommentCreated,
    /// The comment body contains no `/ralph` command line.
    NoCommand,
}

/// Terminal state of one dispatch. The listener maps these onto HTTP statuses.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// Legitimate but irrelevant traffic; a silent no-op with no side effects.
    Ignored(IgnoreReason),
    /// Signature verification failed; nothing was sent to the host.
    Unauthorized,
    /// The event is routable but missing a required field.
    Malformed(&'static str),
    /// Authentication or reply delivery failed; the event is abandoned.
    Failed(String),
    /// The reply comment was posted.
    Replied {
        /// Label of the executed command.
        command: String,
        /// Id of the posted reply comment.
        comment: CommentId,
    },
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Top-level control flow: verify → authenticate → parse → route → reply →
/// acknowledge.
pub struct Dispatcher {
    webhook_secret: String,
    connector: Arc<dyn HostConnector>,
    completions: Arc<dyn CompletionProvider>,
}

impl Dispatcher {
    /// Creates a dispatcher over the given collaborators.
    pub fn new(
        webhook_secret: impl Into<String>,
        connector: Arc<dyn HostConnector>,
        completions: Arc<dyn CompletionProvider>,
    ) -> Self {
        Self {
            webhook_secret: webhook_secret.into(),
            connector,
            completions,
        }
    }

    /// Handles one delivery end to end.
    ///
    /// `raw_body` must be the exact bytes the signature was computed over;
    /// re-serialising the parsed event would break verification.
    pub async fn dispatch(
        &self,
        dispatch_id: DispatchId,
        event: &WebhookEvent,
        raw_body: &[u8],
        signature_header: Option<&str>,
    ) -> DispatchOutcome {
        let span = tracing::info_span!("dispatch", id = %dispatch_id);
        self.dispatch_inner(event, raw_body, signature_header)
            .instrument(span)
            .await
    }

    async fn dispatch_inner(
        &self,
        event: &WebhookEvent,
        raw_body: &[u8],
        signature_header: Option<&str>,
    ) -> DispatchOutcome {
        // Gate 1: only newly created comments carrying a command are routable.
        // Everything else is a silent no-op, not an error.
        if event.action != "created" {
            debug!(action = %event.action, "ignoring non-created delivery");
            return DispatchOutcome::Ignored(IgnoreReason::NotCommentCreated);
        }
        let Some(comment) = event.comment.as_ref() else {
            debug!("delivery carries no comment");
            return DispatchOutcome::Ignored(IgnoreReason::NotCommentCreated);
        };
        let Some(command) = parse_command(&comment.body) else {
            debug!("comment carries no command");
            return DispatchOutcome::Ignored(IgnoreReason::NoCommand);
        };
        let comment_id = CommentId::new(comment.id);

        // Gate 2: provenance. Verification precedes every host call; a forged
        // delivery never causes authenticated traffic.
        if !verify_signature(&self.webhook_secret, signature_header, raw_body) {
            warn!("webhook signature verification failed");
            return DispatchOutcome::Unauthorized;
        }

        // Gate 3: required coordinates for routing and replying.
        let Some(installation) = event.installation_id() else {
            return DispatchOutcome::Malformed("missing installation id");
        };
        let Some(repo) = event.repo_id() else {
            return DispatchOutcome::Malformed("missing repository owner or name");
        };
        let Some(issue) = event.issue_number() else {
            return DispatchOutcome::Malformed("missing issue or pull request number");
        };

        // Gate 4: authenticate. Failure here is terminal and unrecoverable
        // for this event; no retry, no partial authorisation.
        let host = match self.connector.connect(installation).await {
            Ok(host) => host,
            Err(error) => {
                error!(%error, "host authentication failed");
                return DispatchOutcome::Failed(error.to_string());
            }
        };

        // Processing acknowledgment. Best-effort: its failure is logged and
        // the dispatch continues.
        if let Err(error) = host
            .create_reaction(&repo, comment_id, ReactionKind::Processing)
            .await
        {
            warn!(%error, "failed to post processing reaction");
        }

        // Route. From here on the requester always gets a comment: handler
        // failures are converted into error-text replies.
        let ctx = HandlerContext {
            host: host.as_ref(),
            completions: self.completions.as_ref(),
            repo: repo.clone(),
            event,
        };
        let reply = match handle(&ctx, &command).await {
            Ok(reply) => reply,
            Err(error) => {
                warn!(%error, command = command.name.label(), "handler failed; replying with error text");
                error.to_reply_body()
            }
        };

        let posted = match host.create_comment(&repo, issue, &reply).await {
            Ok(posted) => posted,
            Err(error) => {
                error!(%error, "failed to post reply comment");
                return DispatchOutcome::Failed(error.to_string());
            }
        };

        // Terminal acknowledgment, also best-effort.
        if let Err(error) = host
            .create_reaction(&repo, comment_id, ReactionKind::Done)
            .await
        {
            warn!(%error, "failed to post done reaction");
        }

        info!(command = command.name.label(), comment = %posted, "dispatch replied");
        DispatchOutcome::Replied {
            command: command.name.label().to_string(),
            comment: posted,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    use crate::errors::{CompletionError, HostError};
    use crate::event::WebhookEvent;
    use crate::identifiers::{BranchName, CommentId, DispatchId, InstallationId, IssueNumber};
    use crate::ports::{CompletionProvider, CompletionRequest, HostConnector, RepositoryHost};
    use crate::types::{FetchedFile, ReactionKind, RepoId};

    use super::{DispatchOutcome, Dispatcher, IgnoreReason};

    const SECRET: &str = "webhook-secret";

    // -- fakes --------------------------------------------------------------

    #[derive(Default)]
    struct HostRecord {
        comments: Mutex<Vec<(u64, String)>>,
        reactions: Mutex<Vec<&'static str>>,
    }

    struct FakeHost {
        record: Arc<HostRecord>,
        files: Vec<(String, String)>,
        pr_head: Option<String>,
        fail_reactions: bool,
        fail_comments: bool,
    }

    #[async_trait]
    impl RepositoryHost for FakeHost {
        async fn file_content(
            &self,
            _repo: &RepoId,
            path: &str,
            _git_ref: &BranchName,
        ) -> Result<Option<FetchedFile>, HostError> {
            Ok(self
                .files
                .iter()
                .find(|(candidate, _)| candidate == path)
                .map(|(_, content)| FetchedFile {
                    content: content.clone(),
                    sha: "abc123".to_string(),
                }))
        }

        async fn pull_request_head(
            &self,
            _repo: &RepoId,
            _number: IssueNumber,
        ) -> Result<Option<BranchName>, HostError> {
            Ok(self.pr_head.as_deref().and_then(BranchName::new))
        }

        async fn create_comment(
            &self,
            _repo: &RepoId,
            issue: IssueNumber,
            body: &str,
        ) -> Result<CommentId, HostError> {
            if self.fail_comments {
                return Err(HostError::Api {
                    operation: "create comment".to_string(),
                    status: 502,
                    body: "bad gateway".to_string(),
                });
            }
            self.record
                .comments
                .lock()
                .expect("comments")
                .push((issue.as_u64(), body.to_string()));
            Ok(CommentId::new(777))
        }

        async fn create_reaction(
            &self,
            _repo: &RepoId,
            _comment: CommentId,
            reaction: ReactionKind,
        ) -> Result<(), HostError> {
            if self.fail_reactions {
                return Err(HostError::Api {
                    operation: "create reaction".to_string(),
                    status: 500,
                    body: "boom".to_string(),
                });
            }
            self.record
                .reactions
                .lock()
                .expect("reactions")
                .push(reaction.as_api_str());
            Ok(())
        }
    }

    struct FakeConnector {
        record: Arc<HostRecord>,
        files: Vec<(String, String)>,
        pr_head: Option<String>,
        connects: AtomicUsize,
        fail_connect: bool,
        fail_reactions: bool,
        fail_comments: bool,
    }

    impl FakeConnector {
        fn new(files: Vec<(String, String)>, pr_head: Option<&str>) -> Self {
            Self {
                record: Arc::new(HostRecord::default()),
                files,
                pr_head: pr_head.map(str::to_string),
                connects: AtomicUsize::new(0),
                fail_connect: false,
                fail_reactions: false,
                fail_comments: false,
            }
        }
    }

    #[async_trait]
    impl HostConnector for FakeConnector {
        async fn connect(
            &self,
            _installation: InstallationId,
        ) -> Result<Box<dyn RepositoryHost>, HostError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if self.fail_connect {
                return Err(HostError::Credentials {
                    reason: "key rejected".to_string(),
                });
            }
            Ok(Box::new(FakeHost {
                record: Arc::clone(&self.record),
                files: self.files.clone(),
                pr_head: self.pr_head.clone(),
                fail_reactions: self.fail_reactions,
                fail_comments: self.fail_comments,
            }))
        }
    }

    #[derive(Default)]
    struct FakeCompletions {
        requests: Mutex<Vec<CompletionRequest>>,
    }

    #[async_trait]
    impl CompletionProvider for FakeCompletions {
        async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
            self.requests.lock().expect("requests").push(request);
            Ok("generated guidance".to_string())
        }
    }

    // -- helpers ------------------------------------------------------------

    fn sign(body: &[u8]) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(SECRET.as_bytes()).expect("hmac key");
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    fn payload(comment_body: &str) -> String {
        format!(
            r#"{{
                "action": "created",
                "comment": {{"id": 42, "body": {comment_body:?}}},
                "issue": {{"number": 7, "pull_request": {{"url": "u"}}}},
                "repository": {{"name": "r", "owner": {{"login": "o"}}}},
                "installation": {{"id": 5}},
                "sender": {{"login": "octocat"}}
            }}"#
        )
    }

    const TWO_STORY_PRD: &str = r#"{
        "project": "dark-mode",
        "branchName": "ralph/add-dark-mode",
        "userStories": [
            {"id": "DARK-001", "title": "Add toggle", "priority": 1, "passes": true},
            {"id": "DARK-002", "title": "Persist choice", "priority": 2, "passes": false}
        ]
    }"#;

    fn prd_files() -> Vec<(String, String)> {
        vec![("scripts/ralph/prd.json".to_string(), TWO_STORY_PRD.to_string())]
    }

    async fn dispatch(
        connector: Arc<FakeConnector>,
        completions: Arc<FakeCompletions>,
        body: &str,
        signature: Option<&str>,
    ) -> DispatchOutcome {
        let dispatcher = Dispatcher::new(SECRET, connector, completions);
        let event: WebhookEvent = serde_json::from_str(body).expect("event");
        dispatcher
            .dispatch(DispatchId::new_random(), &event, body.as_bytes(), signature)
            .await
    }

    // -- gates --------------------------------------------------------------

    #[tokio::test]
    async fn non_created_actions_are_ignored_without_side_effects() {
        let connector = Arc::new(FakeConnector::new(vec![], None));
        let body = payload("/ralph status").replace("\"created\"", "\"edited\"");
        let signature = sign(body.as_bytes());
        let outcome = dispatch(
            Arc::clone(&connector),
            Arc::new(FakeCompletions::default()),
            &body,
            Some(&signature),
        )
        .await;
        assert!(matches!(
            outcome,
            DispatchOutcome::Ignored(IgnoreReason::NotCommentCreated)
        ));
        assert_eq!(connector.connects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn commandless_comments_are_ignored_without_side_effects() {
        let connector = Arc::new(FakeConnector::new(vec![], None));
        let body = payload("nice change!");
        let signature = sign(body.as_bytes());
        let outcome = dispatch(
            Arc::clone(&connector),
            Arc::new(FakeCompletions::default()),
            &body,
            Some(&signature),
        )
        .await;
        assert!(matches!(
            outcome,
            DispatchOutcome::Ignored(IgnoreReason::NoCommand)
        ));
        assert_eq!(connector.connects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn bad_signatures_are_rejected_before_any_host_call() {
        let connector = Arc::new(FakeConnector::new(prd_files(), Some("feature")));
        let body = payload("/ralph status");
        let outcome = dispatch(
            Arc::clone(&connector),
            Arc::new(FakeCompletions::default()),
            &body,
            Some("sha256=deadbeef"),
        )
        .await;
        assert!(matches!(outcome, DispatchOutcome::Unauthorized));
        assert_eq!(connector.connects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_installation_is_malformed() {
        let connector = Arc::new(FakeConnector::new(vec![], None));
        let body = payload("/ralph status").replace(r#""installation": {"id": 5},"#, "");
        let signature = sign(body.as_bytes());
        let outcome = dispatch(
            connector,
            Arc::new(FakeCompletions::default()),
            &body,
            Some(&signature),
        )
        .await;
        assert!(matches!(outcome, DispatchOutcome::Malformed(_)));
    }

    #[tokio::test]
    async fn authentication_failure_is_terminal_with_no_reply() {
        let mut connector = FakeConnector::new(prd_files(), Some("feature"));
        connector.fail_connect = true;
        let connector = Arc::new(connector);
        let body = payload("/ralph status");
        let signature = sign(body.as_bytes());
        let outcome = dispatch(
            Arc::clone(&connector),
            Arc::new(FakeCompletions::default()),
            &body,
            Some(&signature),
        )
        .await;
        assert!(matches!(outcome, DispatchOutcome::Failed(_)));
        assert!(connector.record.comments.lock().expect("comments").is_empty());
    }

    // -- end to end ---------------------------------------------------------

    #[tokio::test]
    async fn status_dispatch_posts_one_reply_and_two_reactions() {
        let connector = Arc::new(FakeConnector::new(
            prd_files(),
            Some("ralph/add-dark-mode"),
        ));
        let completions = Arc::new(FakeCompletions::default());
        let body = payload("/ralph status");
        let signature = sign(body.as_bytes());
        let outcome = dispatch(
            Arc::clone(&connector),
            Arc::clone(&completions),
            &body,
            Some(&signature),
        )
        .await;

        let DispatchOutcome::Replied { command, comment } = outcome else {
            panic!("expected a reply");
        };
        assert_eq!(command, "status");
        assert_eq!(comment.as_u64(), 777);

        let comments = connector.record.comments.lock().expect("comments");
        assert_eq!(comments.len(), 1);
        let (issue, reply) = &comments[0];
        assert_eq!(*issue, 7);
        assert!(reply.contains("Progress: 1/2"));
        assert_eq!(reply.matches('✅').count(), 1);
        assert_eq!(reply.matches('⬜').count(), 1);

        let reactions = connector.record.reactions.lock().expect("reactions");
        assert_eq!(*reactions, vec!["eyes", "rocket"]);
        assert!(completions.requests.lock().expect("requests").is_empty());
    }

    #[tokio::test]
    async fn run_with_missing_story_replies_exactly_and_never_calls_the_provider() {
        let connector = Arc::new(FakeConnector::new(prd_files(), Some("feature")));
        let completions = Arc::new(FakeCompletions::default());
        let body = payload("/ralph run DARK-999");
        let signature = sign(body.as_bytes());
        dispatch(
            Arc::clone(&connector),
            Arc::clone(&completions),
            &body,
            Some(&signature),
        )
        .await;

        let comments = connector.record.comments.lock().expect("comments");
        assert_eq!(
            comments[0].1,
            "Story `DARK-999` not found or already complete."
        );
        assert!(completions.requests.lock().expect("requests").is_empty());
    }

    #[tokio::test]
    async fn missing_prd_replies_with_the_resolved_branch_name() {
        let connector = Arc::new(FakeConnector::new(vec![], Some("ralph/add-dark-mode")));
        let body = payload("/ralph run");
        let signature = sign(body.as_bytes());
        dispatch(
            Arc::clone(&connector),
            Arc::new(FakeCompletions::default()),
            &body,
            Some(&signature),
        )
        .await;

        let comments = connector.record.comments.lock().expect("comments");
        assert_eq!(
            comments[0].1,
            "No PRD found at `scripts/ralph/prd.json` on branch `ralph/add-dark-mode`."
        );
    }

    #[tokio::test]
    async fn reaction_failures_never_block_the_reply() {
        let mut connector = FakeConnector::new(prd_files(), Some("feature"));
        connector.fail_reactions = true;
        let connector = Arc::new(connector);
        let body = payload("/ralph status");
        let signature = sign(body.as_bytes());
        let outcome = dispatch(
            Arc::clone(&connector),
            Arc::new(FakeCompletions::default()),
            &body,
            Some(&signature),
        )
        .await;
        assert!(matches!(outcome, DispatchOutcome::Replied { .. }));
        assert_eq!(connector.record.comments.lock().expect("comments").len(), 1);
    }

    #[tokio::test]
    async fn handler_failures_become_error_replies_after_the_acknowledgment() {
        let connector = Arc::new(FakeConnector::new(
            vec![(
                "scripts/ralph/prd.json".to_string(),
                "{ definitely not json".to_string(),
            )],
            Some("feature"),
        ));
        let body = payload("/ralph status");
        let signature = sign(body.as_bytes());
        let outcome = dispatch(
            Arc::clone(&connector),
            Arc::new(FakeCompletions::default()),
            &body,
            Some(&signature),
        )
        .await;
        assert!(matches!(outcome, DispatchOutcome::Replied { .. }));
        let comments = connector.record.comments.lock().expect("comments");
        assert!(comments[0].1.contains("could not be parsed"));
        assert!(comments[0].1.contains("`scripts/ralph/prd.json`"));
    }

    #[tokio::test]
    async fn reply_post_failure_fails_the_dispatch() {
        let mut connector = FakeConnector::new(prd_files(), Some("feature"));
        connector.fail_comments = true;
        let connector = Arc::new(connector);
        let body = payload("/ralph status");
        let signature = sign(body.as_bytes());
        let outcome = dispatch(
            connector,
            Arc::new(FakeCompletions::default()),
            &body,
            Some(&signature),
        )
        .await;
        assert!(matches!(outcome, DispatchOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn run_end_to_end_posts_generated_guidance() {
        let connector = Arc::new(FakeConnector::new(prd_files(), Some("feature")));
        let completions = Arc::new(FakeCompletions::default());
        let body = payload("/ralph run");
        let signature = sign(body.as_bytes());
        let outcome = dispatch(
            Arc::clone(&connector),
            Arc::clone(&completions),
            &body,
            Some(&signature),
        )
        .await;
        assert!(matches!(outcome, DispatchOutcome::Replied { .. }));

        let comments = connector.record.comments.lock().expect("comments");
        assert!(comments[0].1.contains("`DARK-002`"));
        assert!(comments[0].1.contains("generated guidance"));

        let requests = completions.requests.lock().expect("requests");
        assert_eq!(requests.len(), 1);
        assert!(requests[0].system.contains("You are Ralph"));
        assert_eq!(requests[0].max_tokens, crate::prompt::MAX_COMPLETION_TOKENS);
    }
}
