//! Deterministic prompt construction for story analysis.
//!
//! Two strings per `run` invocation: a system prompt carrying role framing,
//! task context, the full story-status table, and a progress-log excerpt; and
//! a directive prompt naming the one story to analyse. Rendering is pure
//! (same inputs, same bytes), so prompts are unit-testable without any
//! provider involved.

use crate::identifiers::BranchName;
use crate::story::{story_table, TaskDocument, UserStory};

/// Output-token ceiling for every analysis call.
pub const MAX_COMPLETION_TOKENS: u32 = 2048;

/// Maximum number of trailing characters of the progress log included in the
/// system prompt.
pub const PROGRESS_TAIL_CHARS: usize = 4000;

/// Returns the final [`PROGRESS_TAIL_CHARS`] characters of `progress`,
/// respecting char boundaries.
pub fn progress_tail(progress: &str) -> &str {
    let chars = progress.chars().count();
    if chars <= PROGRESS_TAIL_CHARS {
        return progress;
    }
    let skip = chars - PROGRESS_TAIL_CHARS;
    match progress.char_indices().nth(skip) {
        Some((offset, _)) => &progress[offset..],
        None => progress,
    }
}

/// Renders the system instruction for analysing `target`.
pub fn build_system_prompt(
    document: &TaskDocument,
    branch: &BranchName,
    progress: Option<&str>,
) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        "You are Ralph, a senior engineer guiding the implementation of one user story at a time.\n\n",
    );
    prompt.push_str(&format!(
        "Project: {} (branch `{}`)\n",
        document.project, branch
    ));
    if let Some(description) = document.description.as_deref() {
        if !description.is_empty() {
            prompt.push_str(description);
            prompt.push('\n');
        }
    }
    prompt.push_str("\nCurrent story status:\n");
    prompt.push_str(&story_table(&document.user_stories));
    prompt.push_str("\nRecent progress log:\n");
    match progress {
        Some(log) if !log.trim().is_empty() => {
            prompt.push_str(progress_tail(log));
            if !log.ends_with('\n') {
                prompt.push('\n');
            }
        }
        _ => prompt.push_str("(no progress log found)\n"),
    }
    prompt.push_str(
        "\nReply with focused implementation guidance in markdown: the steps to take, the files \
         likely involved, and how each acceptance criterion will be satisfied. Do not propose \
         work for other stories.\n",
    );
    prompt
}

/// Renders the directive prompt naming the story to analyse.
pub fn build_directive_prompt(target: &UserStory) -> String {
    let mut prompt = format!(
        "Provide implementation guidance for story `{}`: {}\n",
        target.id, target.title
    );
    if !target.description.is_empty() {
        prompt.push('\n');
        prompt.push_str(&target.description);
        prompt.push('\n');
    }
    if !target.acceptance_criteria.is_empty() {
        prompt.push_str("\nAcceptance criteria:\n");
        for (index, criterion) in target.acceptance_criteria.iter().enumerate() {
            prompt.push_str(&format!("{}. {}\n", index + 1, criterion));
        }
    }
    prompt
}

#[cfg(test)]
mod tests {
    use crate::identifiers::BranchName;
    use crate::story::TaskDocument;

    use super::{build_directive_prompt, build_system_prompt, progress_tail, PROGRESS_TAIL_CHARS};

    fn document() -> TaskDocument {
        serde_json::from_str(
            r#"{
                "project": "dark-mode",
                "branchName": "ralph/add-dark-mode",
                "description": "Dark mode for the settings screen.",
                "userStories": [
                    {"id": "DARK-001", "title": "Add toggle", "priority": 1, "passes": true},
                    {"id": "DARK-002", "title": "Persist choice", "priority": 2, "passes": false,
                     "description": "Store the selected theme.",
                     "acceptanceCriteria": ["Theme survives restart", "Defaults to system"]}
                ]
            }"#,
        )
        .expect("task document")
    }

    #[test]
    fn system_prompt_is_deterministic_and_carries_context() {
        let doc = document();
        let branch = BranchName::new("ralph/add-dark-mode").expect("branch");
        let first = build_system_prompt(&doc, &branch, Some("did a thing"));
        let second = build_system_prompt(&doc, &branch, Some("did a thing"));
        assert_eq!(first, second);
        assert!(first.contains("You are Ralph"));
        assert!(first.contains("Project: dark-mode (branch `ralph/add-dark-mode`)"));
        assert!(first.contains("- ✅ `DARK-001` Add toggle (priority 1)"));
        assert!(first.contains("- ⬜ `DARK-002` Persist choice (priority 2)"));
        assert!(first.contains("did a thing"));
    }

    #[test]
    fn absent_progress_log_is_stated_not_omitted() {
        let doc = document();
        let branch = BranchName::new("main").expect("branch");
        let prompt = build_system_prompt(&doc, &branch, None);
        assert!(prompt.contains("(no progress log found)"));
    }

    #[test]
    fn progress_excerpt_keeps_only_the_tail() {
        let log = "x".repeat(PROGRESS_TAIL_CHARS + 100) + "END";
        let tail = progress_tail(&log);
        assert_eq!(tail.chars().count(), PROGRESS_TAIL_CHARS);
        assert!(tail.ends_with("END"));
    }

    #[test]
    fn progress_tail_respects_multibyte_boundaries() {
        let log = "é".repeat(PROGRESS_TAIL_CHARS + 10);
        let tail = progress_tail(&log);
        assert_eq!(tail.chars().count(), PROGRESS_TAIL_CHARS);
    }

    #[test]
    fn directive_prompt_names_story_and_criteria() {
        let doc = document();
        let prompt = build_directive_prompt(&doc.user_stories[1]);
        assert!(prompt.starts_with("Provide implementation guidance for story `DARK-002`"));
        assert!(prompt.contains("Store the selected theme."));
        assert!(prompt.contains("1. Theme survives restart"));
        assert!(prompt.contains("2. Defaults to system"));
    }
}
