//! The capsule record store.
//!
//! A single SQLite database shared by every project, session and crew on
//! the host. Records are addressed by `(namespace, title)` where the
//! namespace is a `/`-separated path under the tenant prefix
//! `proj/<project_hash>/…`. SQLite serializes concurrent writers;
//! short-lived hook processes each open their own connection with a busy
//! timeout.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use rusqlite::{Connection, params};

mod record;

pub use record::{ContextRecord, RecordType, is_valid_namespace, normalize_namespace};

/// Ordering for namespace queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOrder {
    /// Most recently updated first
    Recent,
    /// Most frequently accessed first
    Hits,
}

/// Result of resolving a namespace: the records at the namespace itself
/// plus, for COLLECTION records, the records one level below.
#[derive(Debug, Clone, Default)]
pub struct Resolved {
    pub records: Vec<ContextRecord>,
    pub children: Vec<ContextRecord>,
}

pub struct CapsuleStore {
    conn: Connection,
    path: PathBuf,
}

impl CapsuleStore {
    /// Open (and if necessary create) a capsule store at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("opening capsule store at {}", path.display()))?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS records (
                namespace  TEXT NOT NULL,
                title      TEXT NOT NULL,
                summary    TEXT NOT NULL DEFAULT '',
                type       TEXT NOT NULL,
                content    TEXT NOT NULL DEFAULT 'null',
                tags       TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                hit_count  INTEGER NOT NULL DEFAULT 0,
                UNIQUE(namespace, title)
            );
            CREATE INDEX IF NOT EXISTS idx_records_updated_at ON records(updated_at);
            CREATE INDEX IF NOT EXISTS idx_records_namespace ON records(namespace);",
        )?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    /// Open the store at the globally resolved path.
    pub fn open_default() -> Result<Self> {
        Self::open(&crate::paths::capsule_db_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Upsert a record by `(namespace, title)`.
    ///
    /// `created_at` is preserved for existing rows; `updated_at` always
    /// advances to now. `hit_count` survives updates.
    pub fn save(&self, record: &ContextRecord) -> Result<()> {
        let namespace = normalize_namespace(&record.namespace);
        if !is_valid_namespace(&namespace) {
            bail!("empty namespace for record '{}'", record.title);
        }
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO records (namespace, title, summary, type, content, tags, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
             ON CONFLICT(namespace, title) DO UPDATE SET
                summary = excluded.summary,
                type = excluded.type,
                content = excluded.content,
                tags = excluded.tags,
                updated_at = excluded.updated_at",
            params![
                namespace,
                record.title,
                record.summary,
                record.record_type.to_string(),
                serde_json::to_string(&record.content)?,
                serde_json::to_string(&record.tags)?,
                now,
            ],
        )?;
        Ok(())
    }

    /// Fetch a single record by key.
    pub fn get(&self, namespace: &str, title: &str) -> Result<Option<ContextRecord>> {
        let namespace = normalize_namespace(namespace);
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COLUMNS} FROM records WHERE namespace = ?1 AND title = ?2"
        ))?;
        let mut rows = stmt.query_map(params![namespace, title], row_to_record)?;
        Ok(rows.next().transpose()?)
    }

    /// Records at exactly this namespace, most recent first.
    pub fn list(&self, namespace: &str, limit: usize) -> Result<Vec<ContextRecord>> {
        self.query(namespace, QueryOrder::Recent, limit)
    }

    /// Records at exactly this namespace with an explicit ordering.
    pub fn query(
        &self,
        namespace: &str,
        order: QueryOrder,
        limit: usize,
    ) -> Result<Vec<ContextRecord>> {
        let namespace = normalize_namespace(namespace);
        let order_sql = match order {
            QueryOrder::Recent => "updated_at DESC",
            QueryOrder::Hits => "hit_count DESC, updated_at DESC",
        };
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COLUMNS} FROM records WHERE namespace = ?1 ORDER BY {order_sql} LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![namespace, limit as i64], row_to_record)?;
        collect(rows)
    }

    /// Records at the namespace or anywhere below it, most recent first.
    pub fn list_subtree(&self, namespace: &str, limit: usize) -> Result<Vec<ContextRecord>> {
        let namespace = normalize_namespace(namespace);
        let like = format!("{}/%", like_escape(&namespace));
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COLUMNS} FROM records
             WHERE (namespace = ?1 OR namespace LIKE ?2 ESCAPE '\\')
             ORDER BY updated_at DESC LIMIT ?3"
        ))?;
        let rows = stmt.query_map(params![namespace, like, limit as i64], row_to_record)?;
        collect(rows)
    }

    /// Substring search over title and summary, title matches ranked first,
    /// then recency.
    pub fn search(&self, term: &str, limit: usize) -> Result<Vec<ContextRecord>> {
        let like = format!("%{}%", like_escape(term));
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COLUMNS} FROM records
             WHERE title LIKE ?1 ESCAPE '\\' OR summary LIKE ?1 ESCAPE '\\'
             ORDER BY (CASE WHEN title LIKE ?1 ESCAPE '\\' THEN 0 ELSE 1 END), updated_at DESC
             LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![like, limit as i64], row_to_record)?;
        collect(rows)
    }

    /// Most recent record carrying a tag, searched across a namespace
    /// subtree (`namespace` itself plus everything below it).
    pub fn latest_with_tag(&self, namespace: &str, tag: &str) -> Result<Option<ContextRecord>> {
        let namespace = normalize_namespace(namespace);
        let like_ns = format!("{}/%", like_escape(&namespace));
        let like_tag = format!("%\"{}\"%", like_escape(tag));
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COLUMNS} FROM records
             WHERE (namespace = ?1 OR namespace LIKE ?2 ESCAPE '\\')
               AND tags LIKE ?3 ESCAPE '\\'
             ORDER BY updated_at DESC LIMIT 1"
        ))?;
        let mut rows = stmt.query_map(params![namespace, like_ns, like_tag], row_to_record)?;
        match rows.next().transpose()? {
            // LIKE over the tags JSON is a prefilter; confirm the exact tag
            Some(record) if record.has_tag(tag) => Ok(Some(record)),
            _ => Ok(None),
        }
    }

    /// Records in a subtree carrying an exact tag, most recent first.
    pub fn recent_with_tag(
        &self,
        namespace: &str,
        tag: &str,
        limit: usize,
    ) -> Result<Vec<ContextRecord>> {
        let namespace = normalize_namespace(namespace);
        let like_ns = format!("{}/%", like_escape(&namespace));
        let like_tag = format!("%\"{}\"%", like_escape(tag));
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COLUMNS} FROM records
             WHERE (namespace = ?1 OR namespace LIKE ?2 ESCAPE '\\')
               AND tags LIKE ?3 ESCAPE '\\'
             ORDER BY updated_at DESC LIMIT ?4"
        ))?;
        let rows = stmt.query_map(
            params![namespace, like_ns, like_tag, limit as i64],
            row_to_record,
        )?;
        let records: Vec<ContextRecord> = collect(rows)?;
        Ok(records.into_iter().filter(|r| r.has_tag(tag)).collect())
    }

    /// Records in a subtree whose summary or content mentions a term.
    pub fn mentions(&self, namespace: &str, term: &str, limit: usize) -> Result<Vec<ContextRecord>> {
        let namespace = normalize_namespace(namespace);
        let like_ns = format!("{}/%", like_escape(&namespace));
        let like_term = format!("%{}%", like_escape(term));
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COLUMNS} FROM records
             WHERE (namespace = ?1 OR namespace LIKE ?2 ESCAPE '\\')
               AND (summary LIKE ?3 ESCAPE '\\' OR content LIKE ?3 ESCAPE '\\')
             ORDER BY hit_count DESC, updated_at DESC LIMIT ?4"
        ))?;
        let rows = stmt.query_map(
            params![namespace, like_ns, like_term, limit as i64],
            row_to_record,
        )?;
        collect(rows)
    }

    /// Record an access: bumps `hit_count` without touching `updated_at`.
    pub fn bump_hit(&self, namespace: &str, title: &str) -> Result<()> {
        let namespace = normalize_namespace(namespace);
        self.conn.execute(
            "UPDATE records SET hit_count = hit_count + 1 WHERE namespace = ?1 AND title = ?2",
            params![namespace, title],
        )?;
        Ok(())
    }

    /// Count records last updated before the cutoff (dry-run for prune).
    pub fn count_older_than(&self, cutoff: &str) -> Result<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM records WHERE updated_at < ?1",
            params![cutoff],
            |row| row.get(0),
        )?)
    }

    /// Delete records last updated before the cutoff. Returns the count.
    pub fn prune(&self, cutoff: &str) -> Result<usize> {
        let deleted = self.conn.execute(
            "DELETE FROM records WHERE updated_at < ?1",
            params![cutoff],
        )?;
        Ok(deleted)
    }

    /// Resolve a namespace: fetch its records, follow ALIAS redirects, and
    /// expand COLLECTION children one level.
    pub fn resolve(&self, namespace: &str) -> Result<Resolved> {
        let mut namespace = normalize_namespace(namespace);
        // Bounded redirect chase so self-referencing aliases terminate
        for _ in 0..5 {
            let records = self.list(&namespace, 50)?;
            let alias_target = records
                .iter()
                .find(|r| r.record_type == RecordType::Alias)
                .and_then(|r| r.content.get("target"))
                .and_then(|t| t.as_str())
                .map(normalize_namespace);
            match alias_target {
                Some(target) if target != namespace => {
                    namespace = target;
                    continue;
                }
                _ => {
                    let children = if records
                        .iter()
                        .any(|r| r.record_type == RecordType::Collection)
                    {
                        self.list_subtree(&namespace, 100)?
                            .into_iter()
                            .filter(|r| r.namespace != namespace)
                            .collect()
                    } else {
                        Vec::new()
                    };
                    return Ok(Resolved { records, children });
                }
            }
        }
        Ok(Resolved::default())
    }

    // ========== Aggregations ==========

    /// Total number of records.
    pub fn count_all(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?)
    }

    /// Record counts grouped by type, largest first.
    pub fn count_by_type(&self) -> Result<Vec<(String, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT type, COUNT(*) FROM records GROUP BY type ORDER BY COUNT(*) DESC",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        collect(rows)
    }

    /// Distinct namespaces with record counts, filtered by an optional
    /// prefix, largest first.
    pub fn count_by_namespace(&self, prefix: Option<&str>) -> Result<Vec<(String, i64)>> {
        let like = match prefix {
            Some(p) => format!("{}%", like_escape(&normalize_namespace(p))),
            None => "%".to_string(),
        };
        let mut stmt = self.conn.prepare(
            "SELECT namespace, COUNT(*) FROM records
             WHERE namespace LIKE ?1 ESCAPE '\\'
             GROUP BY namespace ORDER BY COUNT(*) DESC",
        )?;
        let rows = stmt.query_map(params![like], |row| Ok((row.get(0)?, row.get(1)?)))?;
        collect(rows)
    }

    /// Records in a subtree carrying a tag with the given prefix
    /// (e.g. `branch:`), most recent first.
    pub fn list_by_tag_prefix(
        &self,
        namespace: &str,
        tag_prefix: &str,
        limit: usize,
    ) -> Result<Vec<ContextRecord>> {
        let namespace = normalize_namespace(namespace);
        let like_ns = format!("{}%", like_escape(&namespace));
        let like_tag = format!("%\"{}%", like_escape(tag_prefix));
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COLUMNS} FROM records
             WHERE namespace LIKE ?1 ESCAPE '\\' AND tags LIKE ?2 ESCAPE '\\'
             ORDER BY updated_at DESC LIMIT ?3"
        ))?;
        let rows = stmt.query_map(params![like_ns, like_tag, limit as i64], row_to_record)?;
        let records: Vec<ContextRecord> = collect(rows)?;
        Ok(records
            .into_iter()
            .filter(|r| r.tags.iter().any(|t| t.starts_with(tag_prefix)))
            .collect())
    }
}

const COLUMNS: &str =
    "namespace, title, summary, type, content, tags, created_at, updated_at, hit_count";

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<ContextRecord> {
    let type_str: String = row.get(3)?;
    let content_str: String = row.get(4)?;
    let tags_str: String = row.get(5)?;
    Ok(ContextRecord {
        namespace: row.get(0)?,
        title: row.get(1)?,
        summary: row.get(2)?,
        record_type: type_str.parse().unwrap_or(RecordType::Meta),
        content: serde_json::from_str(&content_str).unwrap_or(serde_json::Value::Null),
        tags: serde_json::from_str(&tags_str).unwrap_or_default(),
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
        hit_count: row.get(8)?,
    })
}

fn collect<T>(rows: impl Iterator<Item = rusqlite::Result<T>>) -> Result<Vec<T>> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Escape LIKE wildcards in user-derived terms.
fn like_escape(term: &str) -> String {
    term.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn temp_store() -> (tempfile::TempDir, CapsuleStore) {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = CapsuleStore::open(&tmp.path().join("capsule.db")).unwrap();
        (tmp, store)
    }

    #[test]
    fn save_is_idempotent_per_key() {
        let (_tmp, store) = temp_store();
        let record = ContextRecord::new("proj/abc/session", "s1", RecordType::Meta)
            .with_summary("first");
        store.save(&record).unwrap();
        let initial = store.get("proj/abc/session", "s1").unwrap().unwrap();

        let updated = record.clone().with_summary("second");
        store.save(&updated).unwrap();

        let rows = store.list("proj/abc/session", 10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].summary, "second");
        assert_eq!(rows[0].created_at, initial.created_at);
        assert!(rows[0].updated_at >= initial.updated_at);
    }

    #[test]
    fn namespace_is_normalized_on_save() {
        let (_tmp, store) = temp_store();
        let record = ContextRecord::new("/Proj/ABC/Files/", "a.ts", RecordType::Meta);
        store.save(&record).unwrap();
        assert!(store.get("proj/abc/files", "a.ts").unwrap().is_some());
    }

    #[test]
    fn empty_namespace_is_rejected() {
        let (_tmp, store) = temp_store();
        let record = ContextRecord::new("///", "x", RecordType::Meta);
        assert!(store.save(&record).is_err());
    }

    #[test]
    fn search_ranks_title_matches_first() {
        let (_tmp, store) = temp_store();
        store
            .save(
                &ContextRecord::new("proj/a", "mentions-auth", RecordType::Summary)
                    .with_summary("other"),
            )
            .unwrap();
        store
            .save(
                &ContextRecord::new("proj/a", "other", RecordType::Summary)
                    .with_summary("talks about auth flow"),
            )
            .unwrap();
        let hits = store.search("auth", 10).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].title, "mentions-auth");
    }

    #[test]
    fn latest_with_tag_requires_exact_tag() {
        let (_tmp, store) = temp_store();
        store
            .save(
                &ContextRecord::new("proj/a/session/s1/handoff", "h", RecordType::Summary)
                    .with_tags(["handoff-extra"]),
            )
            .unwrap();
        assert!(store.latest_with_tag("proj/a", "handoff").unwrap().is_none());

        store
            .save(
                &ContextRecord::new("proj/a/session/s2/handoff", "h", RecordType::Summary)
                    .with_tags(["handoff", "pre-compact"]),
            )
            .unwrap();
        let found = store.latest_with_tag("proj/a", "handoff").unwrap().unwrap();
        assert_eq!(found.namespace, "proj/a/session/s2/handoff");
    }

    #[test]
    fn query_by_hits_orders_by_hit_count() {
        let (_tmp, store) = temp_store();
        for title in ["cold", "hot"] {
            store
                .save(&ContextRecord::new("proj/a/discoveries", title, RecordType::Summary))
                .unwrap();
        }
        store.bump_hit("proj/a/discoveries", "hot").unwrap();
        store.bump_hit("proj/a/discoveries", "hot").unwrap();
        let rows = store
            .query("proj/a/discoveries", QueryOrder::Hits, 10)
            .unwrap();
        assert_eq!(rows[0].title, "hot");
        assert_eq!(rows[0].hit_count, 2);
    }

    #[test]
    fn prune_deletes_old_records_and_counts() {
        let (_tmp, store) = temp_store();
        store
            .save(&ContextRecord::new("proj/a", "old", RecordType::Meta))
            .unwrap();
        // Backdate the row
        store
            .conn
            .execute(
                "UPDATE records SET updated_at = '2000-01-01T00:00:00+00:00' WHERE title = 'old'",
                [],
            )
            .unwrap();
        store
            .save(&ContextRecord::new("proj/a", "new", RecordType::Meta))
            .unwrap();

        let cutoff = Utc::now()
            .checked_sub_signed(chrono::Duration::days(30))
            .unwrap()
            .to_rfc3339();
        assert_eq!(store.prune(&cutoff).unwrap(), 1);
        assert!(store.get("proj/a", "old").unwrap().is_none());
        assert!(store.get("proj/a", "new").unwrap().is_some());
    }

    #[test]
    fn resolve_follows_alias_and_expands_collections() {
        let (_tmp, store) = temp_store();
        store
            .save(
                &ContextRecord::new("proj/a/old-name", "redirect", RecordType::Alias)
                    .with_content(json!({"target": "proj/a/new-name"})),
            )
            .unwrap();
        store
            .save(&ContextRecord::new("proj/a/new-name", "index", RecordType::Collection))
            .unwrap();
        store
            .save(&ContextRecord::new("proj/a/new-name/child", "c1", RecordType::Summary))
            .unwrap();

        let resolved = store.resolve("proj/a/old-name").unwrap();
        assert_eq!(resolved.records.len(), 1);
        assert_eq!(resolved.records[0].namespace, "proj/a/new-name");
        assert_eq!(resolved.children.len(), 1);
        assert_eq!(resolved.children[0].title, "c1");
    }

    #[test]
    fn mentions_matches_summary_or_content() {
        let (_tmp, store) = temp_store();
        store
            .save(
                &ContextRecord::new("proj/a/discoveries", "d1", RecordType::Summary)
                    .with_summary("pattern near /p/src/a.ts"),
            )
            .unwrap();
        store
            .save(
                &ContextRecord::new("proj/a/discoveries", "d2", RecordType::Summary)
                    .with_content(json!({"filePath": "/p/src/a.ts"})),
            )
            .unwrap();
        store
            .save(
                &ContextRecord::new("proj/a/discoveries", "unrelated", RecordType::Summary)
                    .with_summary("nothing"),
            )
            .unwrap();
        let hits = store.mentions("proj/a/discoveries", "/p/src/a.ts", 10).unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn count_aggregations() {
        let (_tmp, store) = temp_store();
        store
            .save(&ContextRecord::new("proj/a/files", "a.ts", RecordType::Meta))
            .unwrap();
        store
            .save(&ContextRecord::new("proj/a/files", "b.ts", RecordType::Meta))
            .unwrap();
        store
            .save(&ContextRecord::new("proj/a/subagents", "agent", RecordType::Summary))
            .unwrap();

        assert_eq!(store.count_all().unwrap(), 3);
        let by_type = store.count_by_type().unwrap();
        assert_eq!(by_type[0], ("META".to_string(), 2));
        let by_ns = store.count_by_namespace(Some("proj/a")).unwrap();
        assert_eq!(by_ns[0], ("proj/a/files".to_string(), 2));
    }

    #[test]
    fn tag_prefix_filter_matches_branch_tags() {
        let (_tmp, store) = temp_store();
        store
            .save(
                &ContextRecord::new("proj/a/session", "s1", RecordType::Meta)
                    .with_tags(["branch:main"]),
            )
            .unwrap();
        store
            .save(
                &ContextRecord::new("proj/a/session", "s2", RecordType::Meta)
                    .with_tags(["branch:feat/x"]),
            )
            .unwrap();
        let rows = store.list_by_tag_prefix("proj/a", "branch:", 10).unwrap();
        assert_eq!(rows.len(), 2);
        let rows = store
            .list_by_tag_prefix("proj/a", "branch:feat", 10)
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].title, "s2");
    }
}
