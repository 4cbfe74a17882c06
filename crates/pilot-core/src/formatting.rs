//! Pure text-formatting helpers for chat replies. These are the default
//! implementations behind `Messenger`'s formatting methods; a real channel
//! adapter can override them (Slack markdown differs from Discord's, for
//! instance) but gets sensible behavior for free.

use pilot_types::ExecutionResult;

pub fn format_greeting(username: &str) -> String {
    let trimmed = username.trim();
    if trimmed.is_empty() {
        "Hi!".to_string()
    } else {
        format!("Hi, {trimmed}!")
    }
}

pub fn format_question_ack() -> String {
    "Looking into it…".to_string()
}

pub fn format_task_result(result: &ExecutionResult) -> String {
    let mut out = String::new();
    if result.success {
        out.push_str("Task finished.\n");
    } else {
        out.push_str("Task failed.\n");
    }
    out.push_str(&clean_output(&result.output));
    if let Some(err) = &result.error {
        out.push_str("\n\nError: ");
        out.push_str(err);
    }
    if let Some(pr) = &result.pr_url {
        out.push_str("\n\nPR: ");
        out.push_str(pr);
    }
    out
}

pub fn format_progress_update(task_id: &str, phase: &str, pct: u8, detail: &str) -> String {
    if detail.is_empty() {
        format!("[{task_id}] {phase} ({pct}%)")
    } else {
        format!("[{task_id}] {phase} ({pct}%) — {detail}")
    }
}

const NAV_STATUS_MARKER: &str = "NAVIGATOR_STATUS";
const NAV_STATUS_RULE: &str = "━━━";

/// Strips internal signal lines a Runner may leave in raw output: an
/// `EXIT_SIGNAL: true` line, a `[NAV_COMPLETE]` marker, and the
/// `NAVIGATOR_STATUS...━━━` status block.
pub fn clean_output(raw: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();
    let mut in_nav_block = false;

    for line in raw.lines() {
        let trimmed = line.trim();
        if in_nav_block {
            if trimmed.contains(NAV_STATUS_RULE) {
                in_nav_block = false;
            }
            continue;
        }
        if trimmed.contains(NAV_STATUS_MARKER) {
            in_nav_block = !trimmed.contains(NAV_STATUS_RULE);
            continue;
        }
        if trimmed == "EXIT_SIGNAL: true" || trimmed == "[NAV_COMPLETE]" {
            continue;
        }
        lines.push(line);
    }

    lines.join("\n").trim().to_string()
}

pub fn max_message_len() -> usize {
    4000
}

/// Splits `content` into chunks no longer than `max_len`, preferring to
/// break on a newline past the midpoint of the window so chunks don't end
/// mid-sentence more than necessary.
pub fn chunk_content(content: &str, max_len: usize) -> Vec<String> {
    if max_len == 0 || content.chars().count() <= max_len {
        return vec![content.to_string()];
    }

    let chars: Vec<char> = content.chars().collect();
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let remaining = chars.len() - start;
        if remaining <= max_len {
            chunks.push(chars[start..].iter().collect());
            break;
        }

        let window_end = start + max_len;
        let midpoint = start + max_len / 2;
        let split_at = chars[midpoint..window_end]
            .iter()
            .rposition(|c| *c == '\n')
            .map(|offset| midpoint + offset + 1)
            .unwrap_or(window_end);

        chunks.push(chars[start..split_at].iter().collect());
        start = split_at;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greeting_falls_back_when_username_blank() {
        assert_eq!(format_greeting(""), "Hi!");
        assert_eq!(format_greeting("Ada"), "Hi, Ada!");
    }

    #[test]
    fn clean_output_strips_signal_lines_and_nav_block() {
        let raw = "line one\nEXIT_SIGNAL: true\nNAVIGATOR_STATUS foo\nbar\n━━━\nline two\n[NAV_COMPLETE]";
        assert_eq!(clean_output(raw), "line one\nline two");
    }

    #[test]
    fn chunk_content_respects_max_len_and_splits_on_newline() {
        let content = "a".repeat(20) + "\n" + &"b".repeat(20);
        let chunks = chunk_content(&content, 25);
        assert!(chunks.len() >= 2);
        assert!(chunks.iter().all(|c| c.chars().count() <= 25 || chunks.len() == 1));
    }

    #[test]
    fn chunk_content_returns_single_chunk_when_short() {
        assert_eq!(chunk_content("short", 100), vec!["short".to_string()]);
    }
}
