//! Task document (PRD) model, story selection, and status rendering.
//!
//! The document is consumed, never produced: it lives at a fixed well-known
//! path in the target repository and enumerates prioritised user stories with
//! their completion state. Story-id uniqueness is the document author's
//! responsibility; lookups here resolve to the first story carrying an id
//! and never fail on duplicates.

use serde::{Deserialize, Serialize};

use crate::identifiers::StoryId;

/// Well-known repository path of the task document.
pub const PRD_PATH: &str = "scripts/ralph/prd.json";

/// Well-known repository path of the free-text progress log.
pub const PROGRESS_PATH: &str = "scripts/ralph/progress.txt";

// ---------------------------------------------------------------------------
// Document model
// ---------------------------------------------------------------------------

/// The structured task document enumerating prioritised work items.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDocument {
    /// Project name, used for reply headings.
    pub project: String,
    /// Branch the document describes.
    pub branch_name: String,
    /// Optional free-text project description.
    #[serde(default)]
    pub description: Option<String>,
    /// Stories in author-defined order. Order is significant: it is the
    /// tie-break for selection and the rendering order for status output.
    #[serde(default)]
    pub user_stories: Vec<UserStory>,
}

/// One prioritised work item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStory {
    /// Document-unique id (e.g. `"DARK-002"`); first match wins on duplicates.
    pub id: StoryId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    /// Lower number = higher priority.
    pub priority: i64,
    /// Completion state; complete stories are immutable from `run`'s view.
    pub passes: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

impl TaskDocument {
    /// Number of stories marked complete.
    pub fn complete_count(&self) -> usize {
        self.user_stories.iter().filter(|s| s.passes).count()
    }

    /// Total number of stories.
    pub fn total_count(&self) -> usize {
        self.user_stories.len()
    }

    /// The first story carrying `id`, provided it is still incomplete.
    ///
    /// Complete stories are not selectable, even by explicit id; a duplicate
    /// id resolves to its first occurrence before the completion check.
    pub fn selectable_story(&self, id: &str) -> Option<&UserStory> {
        self.user_stories
            .iter()
            .find(|story| story.id.as_str() == id)
            .filter(|story| !story.passes)
    }

    /// The incomplete story with the lowest priority number; ties are broken
    /// by original document order. `None` when every story passes.
    pub fn next_story(&self) -> Option<&UserStory> {
        self.user_stories
            .iter()
            .filter(|story| !story.passes)
            .min_by_key(|story| story.priority)
    }
}

// ---------------------------------------------------------------------------
// Status table rendering
// ---------------------------------------------------------------------------

/// Renders the per-story status lines, one story per line in document order,
/// with an indented notes line where notes exist.
///
/// Shared between the `status` reply and the analysis prompt so both always
/// show the same table.
pub fn story_table(stories: &[UserStory]) -> String {
    let mut table = String::new();
    for story in stories {
        let marker = if story.passes { "✅" } else { "⬜" };
        table.push_str(&format!(
            "- {} `{}` {} (priority {})\n",
            marker, story.id, story.title, story.priority
        ));
        if let Some(notes) = story.notes.as_deref() {
            if !notes.is_empty() {
                table.push_str(&format!("    - {notes}\n"));
            }
        }
    }
    table
}
