//! Turns settled executions into pattern feedback and periodic upkeep
//! (decay, deprecation) over the `cross_patterns` table.

use async_trait::async_trait;
use chrono::Utc;
use pilot_store::Store;
use pilot_types::{CrossPattern, Execution, ExecutionResult, ExecutionStatus, FeedbackOutcome, PatternFeedback};
use uuid::Uuid;

use crate::extractor::PatternExtractor;

/// Feedback weight applied on a successful application; failures are
/// penalized 1.5x as hard as successes are rewarded.
const FEEDBACK_WEIGHT: f64 = 0.05;
const FAILURE_PENALTY_MULTIPLIER: f64 = 1.5;

/// Patterns untouched for this long are candidates for decay.
const DECAY_AFTER_DAYS: i64 = 90;
const DECAY_RATE: f64 = 0.1;

pub struct LearningLoop {
    store: Store,
    extractor: PatternExtractor,
}

impl LearningLoop {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            extractor: PatternExtractor::new(),
        }
    }

    /// Records feedback for every pattern that was applied to `execution`,
    /// and, on success, extracts and saves any new patterns its output
    /// revealed.
    pub async fn record_execution(
        &self,
        execution: &Execution,
        applied_pattern_ids: &[String],
    ) -> anyhow::Result<()> {
        let outcome = match execution.status {
            ExecutionStatus::Completed => FeedbackOutcome::Success,
            ExecutionStatus::Failed => FeedbackOutcome::Failure,
            _ => FeedbackOutcome::Neutral,
        };
        let delta = match outcome {
            FeedbackOutcome::Success => FEEDBACK_WEIGHT,
            FeedbackOutcome::Failure => -FEEDBACK_WEIGHT * FAILURE_PENALTY_MULTIPLIER,
            FeedbackOutcome::Neutral => 0.0,
        };

        for pattern_id in applied_pattern_ids {
            let feedback = PatternFeedback {
                id: Uuid::new_v4().to_string(),
                pattern_id: pattern_id.clone(),
                execution_id: execution.id.clone(),
                project_path: execution.project_path.clone(),
                outcome,
                confidence_delta: delta,
                created_at: Utc::now(),
            };
            self.store.insert_pattern_feedback(&feedback).await?;
            if delta != 0.0 {
                self.store.reinforce_pattern(pattern_id, delta, None).await?;
            }
            self.store
                .upsert_pattern_project_link(
                    pattern_id,
                    &execution.project_path,
                    matches!(outcome, FeedbackOutcome::Success),
                )
                .await?;
        }

        if matches!(outcome, FeedbackOutcome::Success) {
            if let Err(err) = self.extract_and_save(execution).await {
                tracing::warn!(execution_id = %execution.id, error = %err, "pattern extraction failed");
            }
        }

        Ok(())
    }

    /// Extracts patterns from a completed execution's output and merges
    /// each into the durable pattern table: reinforces an existing pattern
    /// of the same type/title, or inserts a fresh one.
    pub async fn extract_and_save(&self, execution: &Execution) -> anyhow::Result<Vec<String>> {
        let extracted = self.extractor.extract(execution)?;
        let mut saved_ids = Vec::new();

        for candidate in extracted {
            let title = if candidate.is_anti_pattern {
                format!("{}{}", CrossPattern::ANTI_TITLE_PREFIX, candidate.title)
            } else {
                candidate.title.clone()
            };
            let description = if candidate.is_anti_pattern {
                format!("{}{}", CrossPattern::ANTI_DESCRIPTION_PREFIX, candidate.description)
            } else {
                candidate.description.clone()
            };

            let existing = self
                .store
                .find_pattern_by_title(candidate.pattern_type, pilot_types::PatternScope::Project, &title)
                .await?;

            let id = match existing {
                Some(pattern) => {
                    let example = candidate.examples.first().map(String::as_str);
                    self.store.reinforce_pattern(&pattern.id, 0.1, example).await?;
                    pattern.id
                }
                None => {
                    let id = Uuid::new_v4().to_string();
                    let now = Utc::now();
                    let pattern = CrossPattern {
                        id: id.clone(),
                        pattern_type: candidate.pattern_type,
                        title,
                        description,
                        context: candidate.context,
                        examples: candidate.examples,
                        confidence: candidate.confidence,
                        occurrences: 1,
                        is_anti_pattern: candidate.is_anti_pattern,
                        scope: pilot_types::PatternScope::Project,
                        created_at: now,
                        updated_at: now,
                    };
                    self.store.insert_pattern(&pattern).await?;
                    id
                }
            };
            self.store
                .upsert_pattern_project_link(&id, &execution.project_path, true)
                .await?;
            saved_ids.push(id);
        }

        Ok(saved_ids)
    }

    /// Decays confidence on patterns that haven't been touched in a while.
    /// Returns the number of patterns decayed.
    pub async fn apply_decay(&self) -> anyhow::Result<usize> {
        let cutoff = Utc::now() - chrono::Duration::days(DECAY_AFTER_DAYS);
        let stale = self.store.list_patterns_updated_before(cutoff).await?;
        for pattern in &stale {
            let delta = -(pattern.confidence * DECAY_RATE);
            self.store.adjust_pattern_confidence(&pattern.id, delta).await?;
        }
        Ok(stale.len())
    }

    /// Deletes patterns below `threshold` confidence that never gathered
    /// enough occurrences to earn a reprieve.
    pub async fn deprecate_low_confidence_patterns(&self, threshold: f64) -> anyhow::Result<usize> {
        let candidates = self.store.list_low_confidence_patterns(threshold).await?;
        for pattern in &candidates {
            self.store.delete_pattern(&pattern.id).await?;
        }
        Ok(candidates.len())
    }

    /// Patterns worth surfacing proactively: well-established and
    /// confidently positive, capped at 5.
    pub async fn surface_high_value_patterns(&self, project_path: &str) -> anyhow::Result<Vec<CrossPattern>> {
        let patterns = self
            .store
            .get_cross_patterns_for_project(project_path, true, 50)
            .await?;
        let mut high_value: Vec<CrossPattern> = patterns
            .into_iter()
            .filter(|p| !p.is_anti_pattern && p.confidence >= 0.75 && p.occurrences >= 5)
            .collect();
        high_value.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap());
        high_value.truncate(5);
        Ok(high_value)
    }

    pub async fn boost_pattern_confidence(&self, pattern_id: &str, delta: f64) -> anyhow::Result<()> {
        self.store.adjust_pattern_confidence(pattern_id, delta).await?;
        Ok(())
    }

    pub async fn reset_pattern_stats(&self, pattern_id: &str) -> anyhow::Result<()> {
        let pattern = self.store.get_pattern(pattern_id).await?;
        let reset_delta = 0.5 - pattern.confidence;
        self.store.adjust_pattern_confidence(pattern_id, reset_delta).await?;
        Ok(())
    }
}

#[async_trait]
impl pilot_queue::ExecutionObserver for LearningLoop {
    async fn record_execution(&self, execution: &Execution, result: &ExecutionResult) {
        if let Err(err) = LearningLoop::record_execution(self, execution, &result.applied_pattern_ids).await {
            tracing::warn!(execution_id = %execution.id, error = %err, "failed to record execution for learning");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pilot_types::DeferredTask;

    fn sample_execution(output: &str) -> Execution {
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
        exec.output = Some(output.to_string());
        exec
    }

    #[tokio::test]
    async fn record_execution_reinforces_applied_patterns_on_success() {
        let store = Store::open_in_memory().await.unwrap();
        let pattern = CrossPattern {
            id: "pat-1".to_string(),
            pattern_type: pilot_types::PatternType::Code,
            title: "t".to_string(),
            description: "d".to_string(),
            context: "c".to_string(),
            examples: vec![],
            confidence: 0.5,
            occurrences: 1,
            is_anti_pattern: false,
            scope: pilot_types::PatternScope::Project,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        store.insert_pattern(&pattern).await.unwrap();

        let learning = LearningLoop::new(store.clone());
        let execution = sample_execution("nothing notable");
        learning
            .record_execution(&execution, &["pat-1".to_string()])
            .await
            .unwrap();

        let fetched = store.get_pattern("pat-1").await.unwrap();
        assert!(fetched.confidence > 0.5);
        let feedback = store.list_pattern_feedback("pat-1").await.unwrap();
        assert_eq!(feedback.len(), 1);
        assert_eq!(feedback[0].outcome, FeedbackOutcome::Success);
    }

    #[tokio::test]
    async fn extract_and_save_inserts_new_pattern_from_output() {
        let store = Store::open_in_memory().await.unwrap();
        let learning = LearningLoop::new(store.clone());
        let execution = sample_execution("fn parse(s: &str) -> Result<Thing, Error> { todo!() }");

        let ids = learning.extract_and_save(&execution).await.unwrap();
        assert_eq!(ids.len(), 1);
        let pattern = store.get_pattern(&ids[0]).await.unwrap();
        assert_eq!(pattern.title, "propagate errors with Result");
    }

    #[tokio::test]
    async fn apply_decay_reduces_confidence_on_stale_patterns() {
        let store = Store::open_in_memory().await.unwrap();
        let mut pattern = CrossPattern {
            id: "pat-2".to_string(),
            pattern_type: pilot_types::PatternType::Code,
            title: "t".to_string(),
            description: "d".to_string(),
            context: "c".to_string(),
            examples: vec![],
            confidence: 0.8,
            occurrences: 1,
            is_anti_pattern: false,
            scope: pilot_types::PatternScope::Project,
            created_at: Utc::now(),
            updated_at: Utc::now() - chrono::Duration::days(100),
        };
        store.insert_pattern(&pattern).await.unwrap();
        pattern.updated_at = Utc::now();
        let learning = LearningLoop::new(store.clone());
        let decayed = learning.apply_decay().await.unwrap();
        assert_eq!(decayed, 1);

        let fetched = store.get_pattern("pat-2").await.unwrap();
        assert!(fetched.confidence < 0.8);
    }

    #[tokio::test]
    async fn deprecate_low_confidence_patterns_deletes_unestablished_rows() {
        let store = Store::open_in_memory().await.unwrap();
        let mut low = CrossPattern {
            id: "pat-3".to_string(),
            pattern_type: pilot_types::PatternType::Code,
            title: "t".to_string(),
            description: "d".to_string(),
            context: "c".to_string(),
            examples: vec![],
            confidence: 0.15,
            occurrences: 1,
            is_anti_pattern: false,
            scope: pilot_types::PatternScope::Project,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        store.insert_pattern(&low).await.unwrap();
        low.id = "pat-4".to_string();
        low.occurrences = 10;
        store.insert_pattern(&low).await.unwrap();

        let learning = LearningLoop::new(store.clone());
        let deleted = learning.deprecate_low_confidence_patterns(0.2).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(store.get_pattern("pat-3").await.is_err());
        assert!(store.get_pattern("pat-4").await.is_ok());
    }
}
