//! Read-side API over the pattern table: search/filter/rank queries and
//! prompt-ready formatting for a Runner to consume before it starts a task.

use pilot_store::Store;
use pilot_types::{CrossPattern, PatternType};

const DEFAULT_MAX_RESULTS: usize = 20;
const DEFAULT_MIN_CONFIDENCE: f64 = 0.5;
const OVERFETCH_FACTOR: i64 = 2;

#[derive(Debug, Clone, Default)]
pub struct PatternQuery {
    pub search_term: Option<String>,
    pub project_path: Option<String>,
    pub pattern_type: Option<PatternType>,
    pub include_anti_patterns: bool,
    pub max_results: Option<usize>,
    pub min_confidence: Option<f64>,
}

pub struct PatternQueryService {
    store: Store,
}

impl PatternQueryService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn query(&self, q: &PatternQuery) -> anyhow::Result<Vec<CrossPattern>> {
        let max_results = q.max_results.unwrap_or(DEFAULT_MAX_RESULTS);
        let min_confidence = q.min_confidence.unwrap_or(DEFAULT_MIN_CONFIDENCE);
        let overfetch = (max_results as i64) * OVERFETCH_FACTOR;

        let mut candidates = if let Some(term) = &q.search_term {
            self.store.search_cross_patterns(term, overfetch).await?
        } else if let Some(project_path) = &q.project_path {
            self.store
                .get_cross_patterns_for_project(project_path, true, overfetch)
                .await?
        } else {
            self.store.get_top_cross_patterns(overfetch).await?
        };

        candidates.retain(|p| {
            p.confidence >= min_confidence
                && q.pattern_type.map(|t| t == p.pattern_type).unwrap_or(true)
                && (q.include_anti_patterns || !p.is_anti_pattern)
        });

        candidates.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap()
                .then(b.occurrences.cmp(&a.occurrences))
        });
        candidates.truncate(max_results);
        Ok(candidates)
    }

    /// Scores every pattern touching `project_path` against a free-text
    /// task description and returns the top 10 most relevant.
    pub async fn get_relevant_patterns(
        &self,
        project_path: &str,
        task_context: &str,
    ) -> anyhow::Result<Vec<CrossPattern>> {
        let patterns = self
            .store
            .get_cross_patterns_for_project(project_path, true, 100)
            .await?;
        let lowered_context = task_context.to_lowercase();

        let mut scored: Vec<(f64, CrossPattern)> = patterns
            .into_iter()
            .map(|p| {
                let mut score = p.confidence;
                if !p.context.is_empty() && lowered_context.contains(&p.context.to_lowercase()) {
                    score += 0.2;
                }
                let word_matches = p
                    .title
                    .split_whitespace()
                    .filter(|w| w.len() > 3 && lowered_context.contains(&w.to_lowercase()))
                    .count();
                score += word_matches as f64 * 0.1;
                if p.occurrences > 5 {
                    score += 0.1;
                }
                (score, p)
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap());
        scored.truncate(10);
        Ok(scored.into_iter().map(|(_, p)| p).collect())
    }

    /// Renders patterns as a markdown block suitable for injecting into a
    /// Runner's prompt context.
    pub fn format_for_prompt(patterns: &[CrossPattern]) -> String {
        let (anti, positive): (Vec<&CrossPattern>, Vec<&CrossPattern>) =
            patterns.iter().partition(|p| p.is_anti_pattern);

        let mut out = String::new();
        if !positive.is_empty() {
            out.push_str("## Recommended Patterns\n\n");
            for p in &positive {
                out.push_str(&format!(
                    "- **{}** ({:.0}% confidence): {} _(context: {})_\n",
                    p.title,
                    p.confidence * 100.0,
                    p.description,
                    p.context
                ));
            }
            out.push('\n');
        }
        if !anti.is_empty() {
            out.push_str("## Anti-Patterns to Avoid\n\n");
            for p in &anti {
                out.push_str(&format!(
                    "- **{}** ({:.0}% confidence): {} _(context: {})_\n",
                    p.title,
                    p.confidence * 100.0,
                    p.description,
                    p.context
                ));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pilot_types::PatternScope;

    fn sample(id: &str, title: &str, confidence: f64, is_anti_pattern: bool) -> CrossPattern {
        CrossPattern {
            id: id.to_string(),
            pattern_type: PatternType::Code,
            title: title.to_string(),
            description: "desc".to_string(),
            context: "error handling".to_string(),
            examples: vec![],
            confidence,
            occurrences: 1,
            is_anti_pattern,
            scope: PatternScope::Global,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn query_filters_by_min_confidence_and_anti_pattern_flag() {
        let store = Store::open_in_memory().await.unwrap();
        store.insert_pattern(&sample("p1", "good", 0.8, false)).await.unwrap();
        store.insert_pattern(&sample("p2", "bad", 0.8, true)).await.unwrap();
        store.insert_pattern(&sample("p3", "low", 0.2, false)).await.unwrap();

        let service = PatternQueryService::new(store);
        let results = service.query(&PatternQuery::default()).await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "p1");
    }

    #[tokio::test]
    async fn get_relevant_patterns_scores_context_match_higher() {
        let store = Store::open_in_memory().await.unwrap();
        let mut matching = sample("p1", "propagate errors", 0.5, false);
        matching.context = "error handling".to_string();
        store.insert_pattern(&matching).await.unwrap();
        store
            .upsert_pattern_project_link("p1", "/repo", true)
            .await
            .unwrap();

        let mut unrelated = sample("p2", "formatting", 0.5, false);
        unrelated.context = "style".to_string();
        store.insert_pattern(&unrelated).await.unwrap();
        store
            .upsert_pattern_project_link("p2", "/repo", true)
            .await
            .unwrap();

        let service = PatternQueryService::new(store);
        let results = service
            .get_relevant_patterns("/repo", "fix error handling in the parser")
            .await
            .unwrap();

        assert_eq!(results[0].id, "p1");
    }

    #[test]
    fn format_for_prompt_separates_positive_and_anti_sections() {
        let patterns = vec![sample("p1", "good", 0.8, false), sample("p2", "bad", 0.8, true)];
        let formatted = PatternQueryService::format_for_prompt(&patterns);
        assert!(formatted.contains("Recommended Patterns"));
        assert!(formatted.contains("Anti-Patterns to Avoid"));
    }
}
