//! The Task contract submitted to a Runner.

use serde::{Deserialize, Serialize};

/// Submitted to `Runner::execute`. Built by the dispatcher from a confirmed
/// `PendingTask` once it clears confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: String,
    pub project_path: String,
    pub branch: Option<String>,
    pub base_branch: Option<String>,
    pub create_pr: bool,
    pub verbose: bool,
    pub member_id: Option<String>,
}

/// Truncates a free-text description to a title suitable for `Task::title`.
pub fn truncate_title(description: &str, max_len: usize) -> String {
    let trimmed = description.trim();
    if trimmed.chars().count() <= max_len {
        return trimmed.to_string();
    }
    let mut truncated: String = trimmed.chars().take(max_len.saturating_sub(1)).collect();
    truncated.push('…');
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_title_leaves_short_text_untouched() {
        assert_eq!(truncate_title("rename Foo to Bar", 40), "rename Foo to Bar");
    }

    #[test]
    fn truncate_title_adds_ellipsis_on_overflow() {
        let long = "a".repeat(100);
        let title = truncate_title(&long, 20);
        assert_eq!(title.chars().count(), 20);
        assert!(title.ends_with('…'));
    }
}
