//! Regex-based intent classification: the always-available fallback path,
//! and the pre-checks (confirmation tokens, greetings, clear questions) that
//! run before a configured Classifier is ever consulted.

use once_cell::sync::Lazy;
use pilot_types::Intent;
use regex::Regex;

static QUESTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(who|what|why|how|when|where|which|can|could|would|should|is|are|do|does|did)\b").unwrap()
});

static GREETING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(hi|hello|hey|howdy|yo|greetings)\b").unwrap());

static ACCEPT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(yes|y|execute|confirm)$").unwrap());

static REJECT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(no|n|cancel|abort)$").unwrap());

static TASK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(implement|fix|add|refactor|rename|remove|delete|update|write|create|build|migrate)\b").unwrap()
});

static RESEARCH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(research|investigate|explore|compare|survey)\b").unwrap());

static PLANNING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(plan|design|outline|roadmap|approach)\b").unwrap());

static EPHEMERAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(serve|run locally|run it locally|start the server|localhost|dev server|preview)\b")
        .unwrap()
});

/// `Some(true)` for an accept token, `Some(false)` for a reject token,
/// `None` if the trimmed text is neither.
pub fn confirmation_token(text: &str) -> Option<bool> {
    let trimmed = text.trim();
    if ACCEPT_RE.is_match(trimmed) {
        Some(true)
    } else if REJECT_RE.is_match(trimmed) {
        Some(false)
    } else {
        None
    }
}

pub fn is_clear_question(text: &str) -> bool {
    let trimmed = text.trim();
    trimmed.ends_with('?') || QUESTION_RE.is_match(trimmed)
}

pub fn is_greeting(text: &str) -> bool {
    GREETING_RE.is_match(text.trim())
}

/// Fallback classifier used when no Classifier is configured, or the
/// configured one times out or errors. Greeting and Question are normally
/// resolved before this is reached, but it still recognizes both so it
/// behaves sensibly if called standalone.
pub fn regex_classify(text: &str) -> Intent {
    let trimmed = text.trim();
    if is_greeting(trimmed) {
        return Intent::Greeting;
    }
    if is_clear_question(trimmed) {
        return Intent::Question;
    }
    if TASK_RE.is_match(trimmed) {
        return Intent::Task;
    }
    if RESEARCH_RE.is_match(trimmed) {
        return Intent::Research;
    }
    if PLANNING_RE.is_match(trimmed) {
        return Intent::Planning;
    }
    Intent::Chat
}

/// A task description that reads like a local/dev-only run rather than
/// something that should land a pull request.
pub fn is_ephemeral_task(description: &str) -> bool {
    EPHEMERAL_RE.is_match(description)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirmation_tokens_are_case_insensitive() {
        assert_eq!(confirmation_token("YES"), Some(true));
        assert_eq!(confirmation_token("n"), Some(false));
        assert_eq!(confirmation_token("  confirm  "), Some(true));
        assert_eq!(confirmation_token("sure thing"), None);
    }

    #[test]
    fn clear_questions_are_detected() {
        assert!(is_clear_question("What does this do?"));
        assert!(is_clear_question("how do I run this"));
        assert!(!is_clear_question("fix the login bug"));
    }

    #[test]
    fn regex_classify_picks_task_over_chat() {
        assert_eq!(regex_classify("please fix the login bug"), Intent::Task);
        assert_eq!(regex_classify("research the options"), Intent::Research);
        assert_eq!(regex_classify("let's plan the rollout"), Intent::Planning);
        assert_eq!(regex_classify("lol nice"), Intent::Chat);
        assert_eq!(regex_classify("hey there"), Intent::Greeting);
    }

    #[test]
    fn ephemeral_tasks_are_detected_from_description() {
        assert!(is_ephemeral_task("serve the app locally on port 3000"));
        assert!(!is_ephemeral_task("fix the off-by-one error in parser"));
    }
}
