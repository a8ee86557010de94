//! Command handlers: `run`, `status`, `help`.
//!
//! Handlers compose the ports into a single reply string. They distinguish
//! three answer classes: guidance (document missing, story not selectable,
//! unknown command), rendered state (`status`, `help`), and generated
//! analysis (`run` with a selectable story). Only the last one spends a
//! generative-text call.

use crate::command::{Command, CommandName};
use crate::errors::{HandlerError, HostError};
use crate::event::WebhookEvent;
use crate::identifiers::BranchName;
use crate::ports::{CompletionProvider, CompletionRequest, RepositoryHost};
use crate::prompt::{build_directive_prompt, build_system_prompt, MAX_COMPLETION_TOKENS};
use crate::story::{story_table, TaskDocument, PRD_PATH, PROGRESS_PATH};
use crate::types::RepoId;

/// Branch used when the event carries no pull-request context at all.
pub const FALLBACK_BRANCH: &str = "main";

/// Everything a handler may touch during one dispatch.
pub struct HandlerContext<'a> {
    pub host: &'a dyn RepositoryHost,
    pub completions: &'a dyn CompletionProvider,
    pub repo: RepoId,
    pub event: &'a WebhookEvent,
}

/// Routes a parsed command to its handler and returns the reply body.
pub async fn handle(ctx: &HandlerContext<'_>, command: &Command) -> Result<String, HandlerError> {
    match &command.name {
        CommandName::Run => run(ctx, command.args.first().map(String::as_str)).await,
        CommandName::Status => status(ctx).await,
        CommandName::Help => Ok(help_text()),
        CommandName::Unknown(word) => Ok(unknown_command_text(word)),
    }
}

// ---------------------------------------------------------------------------
// Branch and document resolution
// ---------------------------------------------------------------------------

/// Resolves the acting branch: inline pull-request payload first, then the
/// issue's linked pull request (one extra fetch), then [`FALLBACK_BRANCH`].
async fn resolve_branch(ctx: &HandlerContext<'_>) -> Result<BranchName, HostError> {
    if let Some(head) = ctx.event.inline_head_ref() {
        return Ok(head);
    }
    if let Some(number) = ctx.event.linked_pull_request() {
        if let Some(head) = ctx.host.pull_request_head(&ctx.repo, number).await? {
            return Ok(head);
        }
    }
    Ok(BranchName::new(FALLBACK_BRANCH).expect("fallback branch name is non-empty"))
}

/// Fetches and decodes the task document at `branch`.
///
/// Absence is `Ok(None)`; a document that exists but fails to decode is a
/// [`HandlerError::Format`], never silently treated as absent.
async fn fetch_task_document(
    ctx: &HandlerContext<'_>,
    branch: &BranchName,
) -> Result<Option<TaskDocument>, HandlerError> {
    let Some(file) = ctx.host.file_content(&ctx.repo, PRD_PATH, branch).await? else {
        return Ok(None);
    };
    let document =
        serde_json::from_str(&file.content).map_err(|error| HandlerError::Format {
            path: PRD_PATH.to_string(),
            reason: error.to_string(),
        })?;
    Ok(Some(document))
}

fn no_prd_text(branch: &BranchName) -> String {
    format!("No PRD found at `{PRD_PATH}` on branch `{branch}`.")
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

async fn run(ctx: &HandlerContext<'_>, story_id: Option<&str>) -> Result<String, HandlerError> {
    let branch = resolve_branch(ctx).await?;
    let Some(document) = fetch_task_document(ctx, &branch).await? else {
        return Ok(no_prd_text(&branch));
    };

    let target = match story_id {
        Some(id) => match document.selectable_story(id) {
            Some(story) => story,
            None => return Ok(format!("Story `{id}` not found or already complete.")),
        },
        None => match document.next_story() {
            Some(story) => story,
            // Every story passes: answer directly, spend no analysis call.
            None => {
                return Ok(
                    "All stories in the PRD are complete. Nothing left to run. 🎉".to_string()
                )
            }
        },
    };

    let progress = ctx
        .host
        .file_content(&ctx.repo, PROGRESS_PATH, &branch)
        .await?
        .map(|file| file.content);

    let request = CompletionRequest {
        system: build_system_prompt(&document, &branch, progress.as_deref()),
        user: build_directive_prompt(target),
        max_tokens: MAX_COMPLETION_TOKENS,
    };
    let analysis = ctx.completions.complete(request).await?;

    Ok(format!(
        "## Ralph guidance for `{}`: {}\n\n{}",
        target.id, target.title, analysis
    ))
}

// ---------------------------------------------------------------------------
// status
// ---------------------------------------------------------------------------

async fn status(ctx: &HandlerContext<'_>) -> Result<String, HandlerError> {
    let branch = resolve_branch(ctx).await?;
    let Some(document) = fetch_task_document(ctx, &branch).await? else {
        return Ok(no_prd_text(&branch));
    };

    let mut reply = format!("## Ralph status: {}\n\n", document.project);
    reply.push_str(&format!("Branch: `{branch}`\n\n"));
    reply.push_str(&format!(
        "Progress: {}/{} stories complete\n",
        document.complete_count(),
        document.total_count()
    ));
    let table = story_table(&document.user_stories);
    if !table.is_empty() {
        reply.push('\n');
        reply.push_str(&table);
    }
    Ok(reply)
}

// ---------------------------------------------------------------------------
// help / unknown
// ---------------------------------------------------------------------------

/// Static command reference; no I/O, no failure path.
pub fn help_text() -> String {
    "## Ralph commands\n\n\
     - `/ralph run [STORY-ID]` analyses the next incomplete story (or the given one) and \
     replies with implementation guidance\n\
     - `/ralph status` shows completion progress for the current PRD\n\
     - `/ralph help` shows this message\n\n\
     Ralph reads the PRD from `scripts/ralph/prd.json` and the progress log from \
     `scripts/ralph/progress.txt` on the pull request's head branch.\n"
        .to_string()
}

fn unknown_command_text(word: &str) -> String {
    format!("Unknown command `{word}`. Use `/ralph help` to see what Ralph can do.")
}
