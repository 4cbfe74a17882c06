use chrono::{DateTime, Utc};
use pilot_types::{
    clamp_confidence, CrossPattern, FeedbackOutcome, PatternFeedback, PatternProjectLink,
    PatternScope, PatternType,
};
use rusqlite::{params, Row};

use crate::db::Store;
use crate::error::{Result, StoreError};

fn parse_ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

const PATTERN_COLUMNS: &str = "id, pattern_type, title, description, context, examples, \
    confidence, occurrences, is_anti_pattern, scope, created_at, updated_at";

fn row_to_pattern(row: &Row) -> rusqlite::Result<CrossPattern> {
    let pattern_type: String = row.get("pattern_type")?;
    let scope: String = row.get("scope")?;
    let examples_json: String = row.get("examples")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(CrossPattern {
        id: row.get("id")?,
        pattern_type: pattern_type.parse().unwrap_or(PatternType::Code),
        title: row.get("title")?,
        description: row.get("description")?,
        context: row.get("context")?,
        examples: serde_json::from_str(&examples_json).unwrap_or_default(),
        confidence: row.get("confidence")?,
        occurrences: row.get("occurrences")?,
        is_anti_pattern: row.get::<_, i64>("is_anti_pattern")? != 0,
        scope: scope.parse().unwrap_or(PatternScope::Project),
        created_at: parse_ts(&created_at),
        updated_at: parse_ts(&updated_at),
    })
}

impl Store {
    pub async fn insert_pattern(&self, pattern: &CrossPattern) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            &format!(
                "INSERT INTO cross_patterns ({PATTERN_COLUMNS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
            ),
            params![
                pattern.id,
                pattern.pattern_type.to_string(),
                pattern.title,
                pattern.description,
                pattern.context,
                serde_json::to_string(&pattern.examples)?,
                clamp_confidence(pattern.confidence),
                pattern.occurrences,
                pattern.is_anti_pattern as i64,
                pattern.scope.to_string(),
                pattern.created_at.to_rfc3339(),
                pattern.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub async fn get_pattern(&self, id: &str) -> Result<CrossPattern> {
        let conn = self.conn.lock().await;
        conn.query_row(
            &format!("SELECT {PATTERN_COLUMNS} FROM cross_patterns WHERE id = ?1"),
            params![id],
            row_to_pattern,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound(format!("pattern {id}")),
            other => other.into(),
        })
    }

    /// Finds an existing pattern with the same type and scope whose title
    /// matches exactly — the merge key `PatternExtractor` uses to decide
    /// between reinforcing an existing pattern and creating a new one.
    pub async fn find_pattern_by_title(
        &self,
        pattern_type: PatternType,
        scope: PatternScope,
        title: &str,
    ) -> Result<Option<CrossPattern>> {
        let conn = self.conn.lock().await;
        let result = conn.query_row(
            &format!(
                "SELECT {PATTERN_COLUMNS} FROM cross_patterns \
                 WHERE pattern_type = ?1 AND scope = ?2 AND title = ?3"
            ),
            params![pattern_type.to_string(), scope.to_string(), title],
            row_to_pattern,
        );
        match result {
            Ok(pattern) => Ok(Some(pattern)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn list_patterns_by_scope(
        &self,
        scope: PatternScope,
        min_confidence: f64,
    ) -> Result<Vec<CrossPattern>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {PATTERN_COLUMNS} FROM cross_patterns \
             WHERE scope = ?1 AND confidence >= ?2 ORDER BY confidence DESC"
        ))?;
        let rows = stmt
            .query_map(params![scope.to_string(), min_confidence], row_to_pattern)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Reinforces an existing pattern: bumps occurrences, nudges confidence
    /// up by `delta` (clamped), merges in a new example, and stamps
    /// `updated_at`.
    pub async fn reinforce_pattern(
        &self,
        id: &str,
        delta: f64,
        new_example: Option<&str>,
    ) -> Result<()> {
        let mut pattern = self.get_pattern(id).await?;
        pattern.occurrences += 1;
        pattern.confidence = clamp_confidence(pattern.confidence + delta);
        if let Some(example) = new_example {
            pattern.push_example(example.to_string());
        }
        pattern.updated_at = Utc::now();

        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE cross_patterns SET
                occurrences = ?1, confidence = ?2, examples = ?3, updated_at = ?4
             WHERE id = ?5",
            params![
                pattern.occurrences,
                pattern.confidence,
                serde_json::to_string(&pattern.examples)?,
                pattern.updated_at.to_rfc3339(),
                id,
            ],
        )?;
        Ok(())
    }

    /// Applies a one-off confidence delta without bumping occurrences —
    /// used by the decay sweep, as opposed to `reinforce_pattern` which is
    /// used when a pattern is freshly re-observed.
    pub async fn adjust_pattern_confidence(&self, id: &str, delta: f64) -> Result<()> {
        let mut pattern = self.get_pattern(id).await?;
        pattern.confidence = clamp_confidence(pattern.confidence + delta);
        pattern.updated_at = Utc::now();

        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE cross_patterns SET confidence = ?1, updated_at = ?2 WHERE id = ?3",
            params![pattern.confidence, pattern.updated_at.to_rfc3339(), id],
        )?;
        Ok(())
    }

    pub async fn set_pattern_scope(&self, id: &str, scope: PatternScope) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE cross_patterns SET scope = ?1, updated_at = ?2 WHERE id = ?3",
            params![scope.to_string(), Utc::now().to_rfc3339(), id],
        )?;
        Ok(())
    }

    /// Deletes a pattern and its dependent rows. `cross_patterns`' children
    /// declare `ON DELETE CASCADE`, but a database created before that
    /// constraint existed won't have it retrofitted by the additive
    /// migration, so the child deletes stay explicit here too.
    pub async fn delete_pattern(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "DELETE FROM pattern_project_links WHERE pattern_id = ?1",
            params![id],
        )?;
        conn.execute(
            "DELETE FROM pattern_feedback WHERE pattern_id = ?1",
            params![id],
        )?;
        conn.execute("DELETE FROM cross_patterns WHERE id = ?1", params![id])?;
        Ok(())
    }

    pub async fn upsert_pattern_project_link(
        &self,
        pattern_id: &str,
        project_path: &str,
        success: bool,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO pattern_project_links
                (pattern_id, project_path, uses, success_count, failure_count, last_used)
             VALUES (?1, ?2, 1, ?3, ?4, ?5)
             ON CONFLICT(pattern_id, project_path) DO UPDATE SET
                uses = uses + 1,
                success_count = success_count + ?3,
                failure_count = failure_count + ?4,
                last_used = ?5",
            params![
                pattern_id,
                project_path,
                success as i64,
                (!success) as i64,
                now,
            ],
        )?;
        Ok(())
    }

    pub async fn list_pattern_project_links(
        &self,
        pattern_id: &str,
    ) -> Result<Vec<PatternProjectLink>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT pattern_id, project_path, uses, success_count, failure_count, last_used \
             FROM pattern_project_links WHERE pattern_id = ?1",
        )?;
        let rows = stmt
            .query_map(params![pattern_id], |row| {
                let last_used: String = row.get("last_used")?;
                Ok(PatternProjectLink {
                    pattern_id: row.get("pattern_id")?,
                    project_path: row.get("project_path")?,
                    uses: row.get("uses")?,
                    success_count: row.get("success_count")?,
                    failure_count: row.get("failure_count")?,
                    last_used: parse_ts(&last_used),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Title/description substring search, ordered by confidence.
    pub async fn search_cross_patterns(
        &self,
        term: &str,
        limit: i64,
    ) -> Result<Vec<CrossPattern>> {
        let conn = self.conn.lock().await;
        let needle = format!("%{term}%");
        let mut stmt = conn.prepare(&format!(
            "SELECT {PATTERN_COLUMNS} FROM cross_patterns \
             WHERE title LIKE ?1 OR description LIKE ?1 \
             ORDER BY confidence DESC LIMIT ?2"
        ))?;
        let rows = stmt
            .query_map(params![needle, limit], row_to_pattern)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Patterns linked to `project_path`, plus every org-scoped pattern
    /// (org scope means "visible to every project in the org"), optionally
    /// widened further with global-scope patterns.
    pub async fn get_cross_patterns_for_project(
        &self,
        project_path: &str,
        include_global: bool,
        limit: i64,
    ) -> Result<Vec<CrossPattern>> {
        let conn = self.conn.lock().await;
        let sql = if include_global {
            format!(
                "SELECT DISTINCT p.{cols} FROM cross_patterns p \
                 LEFT JOIN pattern_project_links l ON l.pattern_id = p.id \
                 WHERE l.project_path = ?1 OR p.scope = 'org' OR p.scope = 'global' \
                 ORDER BY p.confidence DESC, p.occurrences DESC LIMIT ?2",
                cols = PATTERN_COLUMNS.replace(", ", ", p.")
            )
        } else {
            format!(
                "SELECT DISTINCT p.{cols} FROM cross_patterns p \
                 LEFT JOIN pattern_project_links l ON l.pattern_id = p.id \
                 WHERE l.project_path = ?1 OR p.scope = 'org' \
                 ORDER BY p.confidence DESC, p.occurrences DESC LIMIT ?2",
                cols = PATTERN_COLUMNS.replace(", ", ", p.")
            )
        };
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![project_path, limit], row_to_pattern)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub async fn get_top_cross_patterns(&self, limit: i64) -> Result<Vec<CrossPattern>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {PATTERN_COLUMNS} FROM cross_patterns \
             ORDER BY confidence DESC, occurrences DESC LIMIT ?1"
        ))?;
        let rows = stmt
            .query_map(params![limit], row_to_pattern)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// All patterns whose confidence has dropped stale, for the decay sweep.
    pub async fn list_patterns_updated_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<CrossPattern>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {PATTERN_COLUMNS} FROM cross_patterns WHERE updated_at < ?1"
        ))?;
        let rows = stmt
            .query_map(params![cutoff.to_rfc3339()], row_to_pattern)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// All patterns with fewer than 3 occurrences below `threshold`
    /// confidence — the deprecation sweep's delete set.
    pub async fn list_low_confidence_patterns(&self, threshold: f64) -> Result<Vec<CrossPattern>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {PATTERN_COLUMNS} FROM cross_patterns \
             WHERE confidence < ?1 AND occurrences < 3"
        ))?;
        let rows = stmt
            .query_map(params![threshold], row_to_pattern)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub async fn insert_pattern_feedback(&self, feedback: &PatternFeedback) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO pattern_feedback
                (id, pattern_id, execution_id, project_path, outcome, confidence_delta, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                feedback.id,
                feedback.pattern_id,
                feedback.execution_id,
                feedback.project_path,
                feedback.outcome.to_string(),
                feedback.confidence_delta,
                feedback.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub async fn list_pattern_feedback(&self, pattern_id: &str) -> Result<Vec<PatternFeedback>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, pattern_id, execution_id, project_path, outcome, confidence_delta, \
             created_at FROM pattern_feedback WHERE pattern_id = ?1 ORDER BY created_at DESC",
        )?;
        let rows = stmt
            .query_map(params![pattern_id], |row| {
                let outcome: String = row.get("outcome")?;
                let created_at: String = row.get("created_at")?;
                Ok(PatternFeedback {
                    id: row.get("id")?,
                    pattern_id: row.get("pattern_id")?,
                    execution_id: row.get("execution_id")?,
                    project_path: row.get("project_path")?,
                    outcome: outcome.parse().unwrap_or(FeedbackOutcome::Neutral),
                    confidence_delta: row.get("confidence_delta")?,
                    created_at: parse_ts(&created_at),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_pattern(id: &str) -> CrossPattern {
        CrossPattern {
            id: id.to_string(),
            pattern_type: PatternType::Code,
            title: "use Result over panics".to_string(),
            description: "prefer ? over unwrap in library code".to_string(),
            context: "error handling".to_string(),
            examples: vec!["fn foo() -> Result<()>".to_string()],
            confidence: 0.5,
            occurrences: 1,
            is_anti_pattern: false,
            scope: PatternScope::Project,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn insert_and_reinforce_clamps_confidence() {
        let store = Store::open_in_memory().await.unwrap();
        let mut pattern = sample_pattern("pat-1");
        pattern.confidence = 0.9;
        store.insert_pattern(&pattern).await.unwrap();

        store
            .reinforce_pattern("pat-1", 0.5, Some("new example"))
            .await
            .unwrap();

        let fetched = store.get_pattern("pat-1").await.unwrap();
        assert_eq!(fetched.confidence, 0.95);
        assert_eq!(fetched.occurrences, 2);
        assert!(fetched.examples.contains(&"new example".to_string()));
    }

    #[tokio::test]
    async fn adjust_confidence_never_drops_below_floor() {
        let store = Store::open_in_memory().await.unwrap();
        let mut pattern = sample_pattern("pat-2");
        pattern.confidence = 0.15;
        store.insert_pattern(&pattern).await.unwrap();

        store.adjust_pattern_confidence("pat-2", -0.5).await.unwrap();

        let fetched = store.get_pattern("pat-2").await.unwrap();
        assert_eq!(fetched.confidence, 0.1);
    }

    #[tokio::test]
    async fn pattern_project_link_upsert_accumulates() {
        let store = Store::open_in_memory().await.unwrap();
        store.insert_pattern(&sample_pattern("pat-3")).await.unwrap();

        store
            .upsert_pattern_project_link("pat-3", "/repo", true)
            .await
            .unwrap();
        store
            .upsert_pattern_project_link("pat-3", "/repo", false)
            .await
            .unwrap();

        let links = store.list_pattern_project_links("pat-3").await.unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].uses, 2);
        assert_eq!(links[0].success_count, 1);
        assert_eq!(links[0].failure_count, 1);
    }

    #[tokio::test]
    async fn search_cross_patterns_matches_title_and_description() {
        let store = Store::open_in_memory().await.unwrap();
        store.insert_pattern(&sample_pattern("pat-4")).await.unwrap();

        let hits = store.search_cross_patterns("Result", 10).await.unwrap();
        assert_eq!(hits.len(), 1);

        let misses = store.search_cross_patterns("nonexistent", 10).await.unwrap();
        assert!(misses.is_empty());
    }

    #[tokio::test]
    async fn get_cross_patterns_for_project_includes_global_when_requested() {
        let store = Store::open_in_memory().await.unwrap();
        let mut project_pattern = sample_pattern("pat-5");
        project_pattern.scope = PatternScope::Project;
        store.insert_pattern(&project_pattern).await.unwrap();
        store
            .upsert_pattern_project_link("pat-5", "/repo", true)
            .await
            .unwrap();

        let mut global_pattern = sample_pattern("pat-6");
        global_pattern.title = "global pattern".to_string();
        global_pattern.scope = PatternScope::Global;
        store.insert_pattern(&global_pattern).await.unwrap();

        let without_global = store
            .get_cross_patterns_for_project("/repo", false, 10)
            .await
            .unwrap();
        assert_eq!(without_global.len(), 1);
        assert_eq!(without_global[0].id, "pat-5");

        let with_global = store
            .get_cross_patterns_for_project("/repo", true, 10)
            .await
            .unwrap();
        assert_eq!(with_global.len(), 2);
    }

    #[tokio::test]
    async fn get_cross_patterns_for_project_always_includes_org_scope() {
        let store = Store::open_in_memory().await.unwrap();
        let mut project_pattern = sample_pattern("pat-14");
        project_pattern.scope = PatternScope::Project;
        store.insert_pattern(&project_pattern).await.unwrap();
        store
            .upsert_pattern_project_link("pat-14", "/repo", true)
            .await
            .unwrap();

        let mut org_pattern = sample_pattern("pat-15");
        org_pattern.title = "org pattern".to_string();
        org_pattern.scope = PatternScope::Org;
        store.insert_pattern(&org_pattern).await.unwrap();

        let results = store
            .get_cross_patterns_for_project("/repo", false, 10)
            .await
            .unwrap();
        let ids: Vec<_> = results.iter().map(|p| p.id.as_str()).collect();
        assert!(ids.contains(&"pat-14"));
        assert!(ids.contains(&"pat-15"));
    }

    #[tokio::test]
    async fn get_top_cross_patterns_orders_by_confidence_then_occurrences() {
        let store = Store::open_in_memory().await.unwrap();
        let mut low = sample_pattern("pat-7");
        low.title = "low".to_string();
        low.confidence = 0.2;
        store.insert_pattern(&low).await.unwrap();

        let mut high = sample_pattern("pat-8");
        high.title = "high".to_string();
        high.confidence = 0.9;
        store.insert_pattern(&high).await.unwrap();

        let top = store.get_top_cross_patterns(10).await.unwrap();
        assert_eq!(top[0].id, "pat-8");
    }

    #[tokio::test]
    async fn list_patterns_updated_before_excludes_fresh_rows() {
        let store = Store::open_in_memory().await.unwrap();
        let mut stale = sample_pattern("pat-9");
        stale.updated_at = Utc::now() - chrono::Duration::days(100);
        store.insert_pattern(&stale).await.unwrap();
        store.insert_pattern(&sample_pattern("pat-10")).await.unwrap();

        let results = store
            .list_patterns_updated_before(Utc::now() - chrono::Duration::days(90))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "pat-9");
    }

    #[tokio::test]
    async fn delete_pattern_removes_links_and_feedback() {
        let store = Store::open_in_memory().await.unwrap();
        store.insert_pattern(&sample_pattern("pat-16")).await.unwrap();
        store
            .upsert_pattern_project_link("pat-16", "/repo", true)
            .await
            .unwrap();
        store
            .insert_pattern_feedback(&PatternFeedback {
                id: "fb-1".to_string(),
                pattern_id: "pat-16".to_string(),
                execution_id: "exec-1".to_string(),
                project_path: "/repo".to_string(),
                outcome: FeedbackOutcome::Success,
                confidence_delta: 0.05,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        store.delete_pattern("pat-16").await.unwrap();

        assert!(store.get_pattern("pat-16").await.is_err());
        assert!(store
            .list_pattern_project_links("pat-16")
            .await
            .unwrap()
            .is_empty());
        assert!(store
            .list_pattern_feedback("pat-16")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn set_pattern_scope_updates_scope_and_timestamp() {
        let store = Store::open_in_memory().await.unwrap();
        store.insert_pattern(&sample_pattern("pat-13")).await.unwrap();

        store
            .set_pattern_scope("pat-13", PatternScope::Org)
            .await
            .unwrap();

        let fetched = store.get_pattern("pat-13").await.unwrap();
        assert_eq!(fetched.scope, PatternScope::Org);
    }

    #[tokio::test]
    async fn list_low_confidence_patterns_requires_few_occurrences() {
        let store = Store::open_in_memory().await.unwrap();
        let mut low_new = sample_pattern("pat-11");
        low_new.confidence = 0.15;
        low_new.occurrences = 1;
        store.insert_pattern(&low_new).await.unwrap();

        let mut low_established = sample_pattern("pat-12");
        low_established.confidence = 0.15;
        low_established.occurrences = 5;
        store.insert_pattern(&low_established).await.unwrap();

        let results = store.list_low_confidence_patterns(0.2).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "pat-11");
    }
}
