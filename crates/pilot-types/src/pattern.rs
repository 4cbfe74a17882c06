//! Cross-project pattern learning types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Confidence is clamped to this range on every write.
pub const CONFIDENCE_MIN: f64 = 0.1;
pub const CONFIDENCE_MAX: f64 = 0.95;

pub fn clamp_confidence(value: f64) -> f64 {
    value.clamp(CONFIDENCE_MIN, CONFIDENCE_MAX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    Code,
    Structure,
    Naming,
    Workflow,
    Error,
}

impl std::fmt::Display for PatternType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PatternType::Code => "code",
            PatternType::Structure => "structure",
            PatternType::Naming => "naming",
            PatternType::Workflow => "workflow",
            PatternType::Error => "error",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for PatternType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "code" => Ok(PatternType::Code),
            "structure" => Ok(PatternType::Structure),
            "naming" => Ok(PatternType::Naming),
            "workflow" => Ok(PatternType::Workflow),
            "error" => Ok(PatternType::Error),
            other => Err(format!("unknown pattern type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternScope {
    Project,
    Org,
    Global,
}

impl std::fmt::Display for PatternScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PatternScope::Project => "project",
            PatternScope::Org => "org",
            PatternScope::Global => "global",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for PatternScope {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "project" => Ok(PatternScope::Project),
            "org" => Ok(PatternScope::Org),
            "global" => Ok(PatternScope::Global),
            other => Err(format!("unknown pattern scope: {other}")),
        }
    }
}

/// A learned pattern usable across projects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossPattern {
    pub id: String,
    pub pattern_type: PatternType,
    pub title: String,
    pub description: String,
    pub context: String,
    /// Ordered, deduplicated, bounded (~10) examples.
    pub examples: Vec<String>,
    pub confidence: f64,
    pub occurrences: i64,
    pub is_anti_pattern: bool,
    pub scope: PatternScope,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CrossPattern {
    pub const ANTI_TITLE_PREFIX: &'static str = "[ANTI] ";
    pub const ANTI_DESCRIPTION_PREFIX: &'static str = "AVOID: ";
    pub const MAX_EXAMPLES: usize = 10;

    pub fn push_example(&mut self, example: String) {
        if !self.examples.iter().any(|e| e == &example) {
            self.examples.push(example);
        }
        if self.examples.len() > Self::MAX_EXAMPLES {
            let overflow = self.examples.len() - Self::MAX_EXAMPLES;
            self.examples.drain(0..overflow);
        }
    }
}

/// Many-to-many link between a pattern and a project, with usage counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternProjectLink {
    pub pattern_id: String,
    pub project_path: String,
    pub uses: i64,
    pub success_count: i64,
    pub failure_count: i64,
    pub last_used: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackOutcome {
    Success,
    Failure,
    Neutral,
}

impl std::fmt::Display for FeedbackOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FeedbackOutcome::Success => "success",
            FeedbackOutcome::Failure => "failure",
            FeedbackOutcome::Neutral => "neutral",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for FeedbackOutcome {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(FeedbackOutcome::Success),
            "failure" => Ok(FeedbackOutcome::Failure),
            "neutral" => Ok(FeedbackOutcome::Neutral),
            other => Err(format!("unknown feedback outcome: {other}")),
        }
    }
}

/// Audit row for one application of a pattern in one execution. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternFeedback {
    pub id: String,
    pub pattern_id: String,
    pub execution_id: String,
    pub project_path: String,
    pub outcome: FeedbackOutcome,
    pub confidence_delta: f64,
    pub created_at: DateTime<Utc>,
}

/// A single pattern (positive or anti-) extracted from one execution by
/// `PatternExtractor`, before it is merged/saved into the durable
/// `CrossPattern` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedPattern {
    pub pattern_type: PatternType,
    pub title: String,
    pub description: String,
    pub context: String,
    pub examples: Vec<String>,
    pub confidence: f64,
    pub is_anti_pattern: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_confidence_respects_bounds() {
        assert_eq!(clamp_confidence(0.0), CONFIDENCE_MIN);
        assert_eq!(clamp_confidence(1.0), CONFIDENCE_MAX);
        assert_eq!(clamp_confidence(0.5), 0.5);
    }

    #[test]
    fn push_example_dedupes_and_caps() {
        let mut p = CrossPattern {
            id: "p1".into(),
            pattern_type: PatternType::Code,
            title: "t".into(),
            description: "d".into(),
            context: "c".into(),
            examples: Vec::new(),
            confidence: 0.7,
            occurrences: 1,
            is_anti_pattern: false,
            scope: PatternScope::Project,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        for i in 0..15 {
            p.push_example(format!("ex{i}"));
        }
        assert_eq!(p.examples.len(), CrossPattern::MAX_EXAMPLES);
        p.push_example("ex14".to_string());
        assert_eq!(p.examples.len(), CrossPattern::MAX_EXAMPLES);
    }
}
