//! Pure, deterministic pattern extraction from a completed execution.
//!
//! Three passes run independently over the same execution: code patterns
//! from stdout, error patterns from stderr/error text, and workflow
//! patterns from substrings in the output. A fourth mode extracts patterns
//! from human review comments instead of a Runner's own output.

use once_cell::sync::Lazy;
use pilot_types::{Execution, ExecutionStatus, ExtractedPattern, PatternType};
use regex::Regex;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("execution {0} is not completed")]
    NotCompleted(String),
}

struct CodePatternRule {
    regex: &'static Lazy<Regex>,
    title: &'static str,
    description: &'static str,
    context_hint: &'static str,
}

static RESULT_OVER_PANIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"fn \w+\([^)]*\)\s*->\s*Result<").unwrap());
static TABLE_DRIVEN_TESTS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#\[test\]\s*\n\s*fn \w+").unwrap());
static BUILDER_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"fn with_\w+\(").unwrap());
static TRAIT_OBJECT_SEAM: Lazy<Regex> = Lazy::new(|| Regex::new(r"Arc<dyn \w+>").unwrap());

static CODE_PATTERN_TABLE: &[CodePatternRule] = &[
    CodePatternRule {
        regex: &RESULT_OVER_PANIC,
        title: "propagate errors with Result",
        description: "function returns Result instead of panicking on failure",
        context_hint: "error handling",
    },
    CodePatternRule {
        regex: &TABLE_DRIVEN_TESTS,
        title: "add focused unit tests",
        description: "new behavior is covered by a #[test] function",
        context_hint: "testing",
    },
    CodePatternRule {
        regex: &BUILDER_PATTERN,
        title: "builder-style configuration",
        description: "with_* methods compose optional configuration",
        context_hint: "api design",
    },
    CodePatternRule {
        regex: &TRAIT_OBJECT_SEAM,
        title: "trait object seam for collaborators",
        description: "Arc<dyn Trait> used at a boundary to keep it testable",
        context_hint: "architecture",
    },
];

struct ErrorPatternRule {
    regex: &'static Lazy<Regex>,
    title: &'static str,
    description: &'static str,
    context_hint: &'static str,
}

static NIL_DEREF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)called `Option::unwrap\(\)` on a `None`").unwrap());
static SQL_NO_ROWS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)no rows (returned|found)").unwrap());
static DEADLINE_EXCEEDED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(context deadline exceeded|operation timed out)").unwrap());
static RACE_DETECTED: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)data race detected").unwrap());
static IMPORT_CYCLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)cyclic (package|crate) dependency").unwrap());

static ERROR_PATTERN_TABLE: &[ErrorPatternRule] = &[
    ErrorPatternRule {
        regex: &NIL_DEREF,
        title: "unwrap on empty Option",
        description: "code unwrapped an Option that turned out to be None",
        context_hint: "null safety",
    },
    ErrorPatternRule {
        regex: &SQL_NO_ROWS,
        title: "query assumed a row existed",
        description: "a lookup was treated as infallible when the row was missing",
        context_hint: "database",
    },
    ErrorPatternRule {
        regex: &DEADLINE_EXCEEDED,
        title: "operation exceeded its deadline",
        description: "a call ran past its configured timeout budget",
        context_hint: "timeouts",
    },
    ErrorPatternRule {
        regex: &RACE_DETECTED,
        title: "data race under concurrent access",
        description: "shared state was mutated without adequate synchronization",
        context_hint: "concurrency",
    },
    ErrorPatternRule {
        regex: &IMPORT_CYCLE,
        title: "circular module dependency",
        description: "two modules depend on each other, blocking compilation",
        context_hint: "module structure",
    },
];

struct WorkflowPatternRule {
    needle: &'static str,
    title: &'static str,
    description: &'static str,
    context_hint: &'static str,
}

static WORKFLOW_PATTERN_TABLE: &[WorkflowPatternRule] = &[
    WorkflowPatternRule {
        needle: "make test",
        title: "run the test suite via make",
        description: "task ran `make test` as part of its workflow",
        context_hint: "build tooling",
    },
    WorkflowPatternRule {
        needle: "make lint",
        title: "run lint via make",
        description: "task ran `make lint` as part of its workflow",
        context_hint: "build tooling",
    },
    WorkflowPatternRule {
        needle: "git commit",
        title: "commit incrementally",
        description: "task committed work with git as it progressed",
        context_hint: "version control",
    },
];

const REVIEW_TRIGGERS: &[(&str, &str, &str)] = &[
    ("test", "add missing test coverage", "the change lacked adequate tests"),
    ("naming", "improve identifier naming", "names did not clearly convey intent"),
    (
        "error handling",
        "handle errors explicitly",
        "error paths were unhandled or swallowed",
    ),
    (
        "documentation",
        "document non-obvious behavior",
        "a non-obvious invariant went unexplained",
    ),
];

const REVIEW_POSITIVE_TRIGGERS: &[&str] = &["nice", "well done", "good approach"];

pub struct PatternExtractor;

impl PatternExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Runs all three output-derived passes over a completed execution.
    pub fn extract(&self, execution: &Execution) -> Result<Vec<ExtractedPattern>, ExtractError> {
        if execution.status != ExecutionStatus::Completed {
            return Err(ExtractError::NotCompleted(execution.id.clone()));
        }

        let mut patterns = Vec::new();
        if let Some(output) = &execution.output {
            patterns.extend(self.extract_code_patterns(output));
            patterns.extend(self.extract_workflow_patterns(output));
        }
        if let Some(error) = &execution.error {
            patterns.extend(self.extract_error_patterns(error));
        }
        Ok(patterns)
    }

    fn extract_code_patterns(&self, output: &str) -> Vec<ExtractedPattern> {
        CODE_PATTERN_TABLE
            .iter()
            .filter_map(|rule| {
                let examples: Vec<String> = rule
                    .regex
                    .captures_iter(output)
                    .map(|c| c.get(0).map(|m| m.as_str().to_string()).unwrap_or_default())
                    .take(pilot_types::CrossPattern::MAX_EXAMPLES)
                    .collect();
                if examples.is_empty() {
                    return None;
                }
                Some(ExtractedPattern {
                    pattern_type: PatternType::Code,
                    title: rule.title.to_string(),
                    description: rule.description.to_string(),
                    context: rule.context_hint.to_string(),
                    examples,
                    confidence: 0.7,
                    is_anti_pattern: false,
                })
            })
            .collect()
    }

    fn extract_error_patterns(&self, error: &str) -> Vec<ExtractedPattern> {
        ERROR_PATTERN_TABLE
            .iter()
            .filter(|rule| rule.regex.is_match(error))
            .map(|rule| ExtractedPattern {
                pattern_type: PatternType::Error,
                title: rule.title.to_string(),
                description: rule.description.to_string(),
                context: rule.context_hint.to_string(),
                examples: vec![truncate(error, 200)],
                confidence: 0.8,
                is_anti_pattern: true,
            })
            .collect()
    }

    fn extract_workflow_patterns(&self, output: &str) -> Vec<ExtractedPattern> {
        let lowered = output.to_lowercase();
        WORKFLOW_PATTERN_TABLE
            .iter()
            .filter(|rule| lowered.contains(rule.needle))
            .map(|rule| ExtractedPattern {
                pattern_type: PatternType::Workflow,
                title: rule.title.to_string(),
                description: rule.description.to_string(),
                context: rule.context_hint.to_string(),
                examples: vec![rule.needle.to_string()],
                confidence: 0.6,
                is_anti_pattern: false,
            })
            .collect()
    }

    /// Given raw review comments, extracts anti-patterns from critical
    /// triggers and positive patterns from praise.
    pub fn extract_from_review_comments(&self, comments: &[String]) -> Vec<ExtractedPattern> {
        let mut patterns = Vec::new();
        for comment in comments {
            let lowered = comment.to_lowercase();
            for (trigger, title, description) in REVIEW_TRIGGERS {
                if lowered.contains(trigger) {
                    patterns.push(ExtractedPattern {
                        pattern_type: PatternType::Code,
                        title: title.to_string(),
                        description: description.to_string(),
                        context: "code review".to_string(),
                        examples: vec![truncate(comment, 200)],
                        confidence: 0.6,
                        is_anti_pattern: true,
                    });
                }
            }
            if REVIEW_POSITIVE_TRIGGERS.iter().any(|t| lowered.contains(t)) {
                patterns.push(ExtractedPattern {
                    pattern_type: PatternType::Code,
                    title: "approach praised in review".to_string(),
                    description: "a reviewer called out this approach favorably".to_string(),
                    context: "code review".to_string(),
                    examples: vec![truncate(comment, 200)],
                    confidence: 0.6,
                    is_anti_pattern: false,
                });
            }
        }
        patterns
    }
}

impl Default for PatternExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pilot_types::DeferredTask;

    fn completed_execution(output: Option<&str>, error: Option<&str>) -> Execution {
        let mut exec = Execution::new(
            "exec-1".to_string(),
            "task-1".to_string(),
            "/repo".to_string(),
            "ctx-1".to_string(),
            None,
            DeferredTask {
                title: "t".to_string(),
                description: "d".to_string(),
                branch: None,
                base_branch: None,
                create_pr: false,
                verbose: false,
            },
        );
        exec.status = ExecutionStatus::Completed;
        exec.output = output.map(str::to_string);
        exec.error = error.map(str::to_string);
        exec
    }

    #[test]
    fn extract_errors_on_non_completed_execution() {
        let extractor = PatternExtractor::new();
        let mut exec = completed_execution(None, None);
        exec.status = ExecutionStatus::Failed;
        assert!(matches!(
            extractor.extract(&exec),
            Err(ExtractError::NotCompleted(_))
        ));
    }

    #[test]
    fn extract_code_patterns_matches_result_signature() {
        let extractor = PatternExtractor::new();
        let exec = completed_execution(Some("fn parse(input: &str) -> Result<Thing, Error> { todo!() }"), None);
        let patterns = extractor.extract(&exec).unwrap();
        assert!(patterns
            .iter()
            .any(|p| p.title == "propagate errors with Result"));
    }

    #[test]
    fn extract_error_patterns_flags_anti_pattern() {
        let extractor = PatternExtractor::new();
        let exec = completed_execution(None, Some("thread panicked: called `Option::unwrap()` on a `None` value"));
        let patterns = extractor.extract(&exec).unwrap();
        assert_eq!(patterns.len(), 1);
        assert!(patterns[0].is_anti_pattern);
        assert_eq!(patterns[0].confidence, 0.8);
    }

    #[test]
    fn extract_workflow_patterns_matches_substring_case_insensitively() {
        let extractor = PatternExtractor::new();
        let exec = completed_execution(Some("Running MAKE TEST now"), None);
        let patterns = extractor.extract(&exec).unwrap();
        assert!(patterns.iter().any(|p| p.title.contains("make")));
    }

    #[test]
    fn review_comments_yield_anti_and_positive_patterns() {
        let extractor = PatternExtractor::new();
        let comments = vec![
            "needs more test coverage here".to_string(),
            "nice, well done on this refactor".to_string(),
        ];
        let patterns = extractor.extract_from_review_comments(&comments);
        assert!(patterns.iter().any(|p| p.is_anti_pattern));
        assert!(patterns.iter().any(|p| !p.is_anti_pattern));
    }
}
