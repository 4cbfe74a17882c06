//! Cross-project and cross-org promotion/export of learned patterns, plus
//! the two sidecar JSON views (`global_patterns.json`, `org_patterns.json`)
//! that live alongside the database for tooling that doesn't want to open
//! it directly.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use pilot_store::Store;
use pilot_types::{CrossPattern, PatternScope};
use serde::{Deserialize, Serialize};

/// Confidence haircut applied to an imported pattern, since it hasn't yet
/// proven itself against this store's own project history.
const IMPORT_CONFIDENCE_DISCOUNT: f64 = 0.8;

#[derive(Debug, Serialize, Deserialize)]
pub struct ExportedPattern {
    pub pattern_type: String,
    pub title: String,
    pub description: String,
    pub context: String,
    pub examples: Vec<String>,
    pub confidence: f64,
    pub occurrences: i64,
    pub is_anti_pattern: bool,
}

/// A global-scope pattern as it appears in `global_patterns.json` — the
/// same shape exported/imported across orgs, without the per-project link
/// breakdown that only makes sense for an org-scoped pattern.
#[derive(Debug, Serialize, Deserialize)]
pub struct GlobalPattern {
    pub id: String,
    pub pattern_type: String,
    pub title: String,
    pub description: String,
    pub context: String,
    pub confidence: f64,
    pub occurrences: i64,
    pub is_anti_pattern: bool,
}

/// One project's usage of an org-scoped pattern, as recorded in
/// `org_patterns.json`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AggregatedPatternProject {
    pub project_path: String,
    pub uses: i64,
    pub success_rate: f64,
}

/// An org-scoped pattern plus the per-project breakdown `SyncFromProject`
/// computed it from.
#[derive(Debug, Serialize, Deserialize)]
pub struct AggregatedPattern {
    pub id: String,
    pub pattern_type: String,
    pub title: String,
    pub description: String,
    pub context: String,
    pub confidence: f64,
    pub occurrences: i64,
    pub is_anti_pattern: bool,
    pub projects: Vec<AggregatedPatternProject>,
}

pub struct PatternSync {
    store: Store,
    data_dir: PathBuf,
}

impl PatternSync {
    pub fn new(store: Store, data_dir: PathBuf) -> Self {
        Self { store, data_dir }
    }

    pub fn global_patterns_path(&self) -> PathBuf {
        self.data_dir.join("global_patterns.json")
    }

    pub fn org_patterns_path(&self) -> PathBuf {
        self.data_dir.join("org_patterns.json")
    }

    /// Recomputes a project-scoped pattern's confidence from its aggregate
    /// usage across every project it's linked to, persists the update, and
    /// refreshes `org_patterns.json` to match the current org-scope view.
    pub async fn sync_from_project(&self, project_path: &str) -> anyhow::Result<usize> {
        let patterns = self
            .store
            .get_cross_patterns_for_project(project_path, false, 500)
            .await?;

        for pattern in &patterns {
            let links = self.store.list_pattern_project_links(&pattern.id).await?;
            let project_count = links.len().max(1) as f64;
            let total_uses: i64 = links.iter().map(|l| l.uses).sum();
            let total_successes: i64 = links.iter().map(|l| l.success_count).sum();
            let avg_success_rate = if total_uses > 0 {
                total_successes as f64 / total_uses as f64
            } else {
                0.0
            };

            let aggregated = (0.5 + project_count * 0.05 + avg_success_rate * 0.3).min(0.95);
            let delta = aggregated - pattern.confidence;
            self.store.adjust_pattern_confidence(&pattern.id, delta).await?;
        }

        self.write_org_patterns_sidecar().await?;
        Ok(patterns.len())
    }

    /// Rebuilds `org_patterns.json` from every org-scoped pattern and its
    /// project links, keyed by pattern id as the aggregation is defined.
    async fn write_org_patterns_sidecar(&self) -> anyhow::Result<()> {
        let org_patterns = self.store.list_patterns_by_scope(PatternScope::Org, 0.0).await?;
        let mut aggregated = HashMap::with_capacity(org_patterns.len());
        for pattern in &org_patterns {
            let links = self.store.list_pattern_project_links(&pattern.id).await?;
            let projects = links
                .iter()
                .map(|l| AggregatedPatternProject {
                    project_path: l.project_path.clone(),
                    uses: l.uses,
                    success_rate: if l.uses > 0 {
                        l.success_count as f64 / l.uses as f64
                    } else {
                        0.0
                    },
                })
                .collect();
            aggregated.insert(
                pattern.id.clone(),
                AggregatedPattern {
                    id: pattern.id.clone(),
                    pattern_type: pattern.pattern_type.to_string(),
                    title: pattern.title.clone(),
                    description: pattern.description.clone(),
                    context: pattern.context.clone(),
                    confidence: pattern.confidence,
                    occurrences: pattern.occurrences,
                    is_anti_pattern: pattern.is_anti_pattern,
                    projects,
                },
            );
        }
        atomic_write_json(&self.org_patterns_path(), &aggregated)
    }

    /// Rebuilds `global_patterns.json` from every global-scope pattern.
    async fn write_global_patterns_sidecar(&self) -> anyhow::Result<()> {
        let global_patterns = self.store.list_patterns_by_scope(PatternScope::Global, 0.0).await?;
        let items: Vec<GlobalPattern> = global_patterns
            .iter()
            .map(|p| GlobalPattern {
                id: p.id.clone(),
                pattern_type: p.pattern_type.to_string(),
                title: p.title.clone(),
                description: p.description.clone(),
                context: p.context.clone(),
                confidence: p.confidence,
                occurrences: p.occurrences,
                is_anti_pattern: p.is_anti_pattern,
            })
            .collect();
        atomic_write_json(&self.global_patterns_path(), &items)
    }

    /// Anonymizes a pattern set to JSON, stripping anything project-path
    /// shaped from examples and titles so it's safe to share across orgs.
    pub fn export(patterns: &[CrossPattern]) -> anyhow::Result<String> {
        let exported: Vec<ExportedPattern> = patterns
            .iter()
            .map(|p| ExportedPattern {
                pattern_type: p.pattern_type.to_string(),
                title: p.title.clone(),
                description: p.description.clone(),
                context: p.context.clone(),
                examples: p.examples.iter().map(|e| anonymize(e)).collect(),
                confidence: p.confidence,
                occurrences: p.occurrences,
                is_anti_pattern: p.is_anti_pattern,
            })
            .collect();
        Ok(serde_json::to_string_pretty(&exported)?)
    }

    /// Imports a previously exported pattern set at global scope, discounted
    /// since it has no track record in this store yet, then refreshes
    /// `global_patterns.json`.
    pub async fn import(&self, json: &str) -> anyhow::Result<Vec<String>> {
        let exported: Vec<ExportedPattern> = serde_json::from_str(json)?;
        let mut ids = Vec::new();
        for item in exported {
            let id = uuid::Uuid::new_v4().to_string();
            let now = Utc::now();
            let pattern = CrossPattern {
                id: id.clone(),
                pattern_type: item.pattern_type.parse().unwrap_or(pilot_types::PatternType::Code),
                title: item.title,
                description: item.description,
                context: item.context,
                examples: item.examples,
                confidence: item.confidence * IMPORT_CONFIDENCE_DISCOUNT,
                occurrences: item.occurrences,
                is_anti_pattern: item.is_anti_pattern,
                scope: PatternScope::Global,
                created_at: now,
                updated_at: now,
            };
            self.store.insert_pattern(&pattern).await?;
            ids.push(id);
        }
        self.write_global_patterns_sidecar().await?;
        Ok(ids)
    }

    pub async fn promote_to_org(&self, pattern_id: &str) -> anyhow::Result<()> {
        self.store.set_pattern_scope(pattern_id, PatternScope::Org).await?;
        self.write_org_patterns_sidecar().await?;
        Ok(())
    }

    pub async fn demote_to_project(&self, pattern_id: &str, project_path: &str) -> anyhow::Result<()> {
        self.store
            .set_pattern_scope(pattern_id, PatternScope::Project)
            .await?;
        self.store
            .upsert_pattern_project_link(pattern_id, project_path, true)
            .await?;
        self.write_org_patterns_sidecar().await?;
        Ok(())
    }
}

fn anonymize(example: &str) -> String {
    if let Some(idx) = example.rfind('/') {
        example[idx + 1..].to_string()
    } else {
        example.to_string()
    }
}

/// Writes `value` to `path` via a temp file in the same directory plus a
/// rename, so a reader never observes a partially written file.
fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(value)?;
    let temp_path = path.with_extension("tmp");
    std::fs::write(&temp_path, &json)?;
    std::fs::rename(&temp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pilot_types::PatternType;

    fn sample(id: &str) -> CrossPattern {
        CrossPattern {
            id: id.to_string(),
            pattern_type: PatternType::Code,
            title: "t".to_string(),
            description: "d".to_string(),
            context: "c".to_string(),
            examples: vec!["/home/user/repo/src/main.rs".to_string()],
            confidence: 0.6,
            occurrences: 3,
            is_anti_pattern: false,
            scope: PatternScope::Project,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn sync_from_project_recomputes_confidence_from_links() {
        let store = Store::open_in_memory().await.unwrap();
        store.insert_pattern(&sample("p1")).await.unwrap();
        store
            .upsert_pattern_project_link("p1", "/repo", true)
            .await
            .unwrap();
        store
            .upsert_pattern_project_link("p1", "/repo", true)
            .await
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let sync = PatternSync::new(store.clone(), dir.path().to_path_buf());
        let updated = sync.sync_from_project("/repo").await.unwrap();
        assert_eq!(updated, 1);

        let fetched = store.get_pattern("p1").await.unwrap();
        assert!(fetched.confidence > 0.6);
    }

    #[test]
    fn export_anonymizes_paths_in_examples() {
        let json = PatternSync::export(&[sample("p1")]).unwrap();
        assert!(!json.contains("/home/user/repo"));
        assert!(json.contains("main.rs"));
    }

    #[tokio::test]
    async fn import_applies_confidence_discount() {
        let store = Store::open_in_memory().await.unwrap();
        let json = PatternSync::export(&[sample("p1")]).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let sync = PatternSync::new(store.clone(), dir.path().to_path_buf());
        let ids = sync.import(&json).await.unwrap();
        assert_eq!(ids.len(), 1);

        let imported = store.get_pattern(&ids[0]).await.unwrap();
        assert_eq!(imported.confidence, 0.6 * IMPORT_CONFIDENCE_DISCOUNT);
        assert_eq!(imported.scope, PatternScope::Global);
    }

    #[tokio::test]
    async fn import_writes_global_patterns_sidecar() {
        let store = Store::open_in_memory().await.unwrap();
        let json = PatternSync::export(&[sample("p1")]).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let sync = PatternSync::new(store.clone(), dir.path().to_path_buf());
        sync.import(&json).await.unwrap();

        let raw = std::fs::read_to_string(sync.global_patterns_path()).unwrap();
        let parsed: Vec<GlobalPattern> = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].title, "t");
        assert!(!sync.global_patterns_path().with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn promote_and_demote_change_scope_and_sidecar() {
        let store = Store::open_in_memory().await.unwrap();
        store.insert_pattern(&sample("p1")).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let sync = PatternSync::new(store.clone(), dir.path().to_path_buf());
        sync.promote_to_org("p1").await.unwrap();
        assert_eq!(store.get_pattern("p1").await.unwrap().scope, PatternScope::Org);

        let raw = std::fs::read_to_string(sync.org_patterns_path()).unwrap();
        let parsed: HashMap<String, AggregatedPattern> = serde_json::from_str(&raw).unwrap();
        assert!(parsed.contains_key("p1"));

        sync.demote_to_project("p1", "/repo").await.unwrap();
        assert_eq!(store.get_pattern("p1").await.unwrap().scope, PatternScope::Project);
        let links = store.list_pattern_project_links("p1").await.unwrap();
        assert_eq!(links.len(), 1);

        let raw = std::fs::read_to_string(sync.org_patterns_path()).unwrap();
        let parsed: HashMap<String, AggregatedPattern> = serde_json::from_str(&raw).unwrap();
        assert!(!parsed.contains_key("p1"));
    }
}
