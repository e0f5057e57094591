//! Citation edge table access.
//!
//! The edge table has shipped under several column-name conventions over the
//! project's life. Rather than assume one, the pair is probed once at startup
//! against a fixed accept-list and the detected pair is reused for the run.

use std::collections::HashSet;

use sqlx::Row;
use tracing::{debug, info};

use crate::error::{DbError, Result};
use crate::store::PaperStore;

const CITATIONS_TABLE: &str = "citations";

/// Accepted (source, target) column-name pairs, probed in order.
const CANDIDATE_PAIRS: &[(&str, &str)] = &[
    ("source", "target"),
    ("citing", "cited"),
    ("citingPaperId", "citedPaperId"),
    ("from_id", "to_id"),
    ("source_id", "target_id"),
];

/// The detected directed-relation column pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationColumns {
    pub source: String,
    pub target: String,
}

impl PaperStore {
    /// Probe the citations table for a recognized column pair.
    /// Returns `None` when the table is missing or uses no accepted pair.
    pub async fn detect_relation_columns(&self) -> Result<Option<RelationColumns>> {
        let cols = self.table_columns(CITATIONS_TABLE).await?;
        for (a, b) in CANDIDATE_PAIRS {
            if cols.iter().any(|c| c == a) && cols.iter().any(|c| c == b) {
                info!(source = a, target = b, "Detected citation columns");
                return Ok(Some(RelationColumns {
                    source: (*a).to_string(),
                    target: (*b).to_string(),
                }));
            }
        }
        Ok(None)
    }

    /// Create a fresh citations table with the canonical pair if none exists,
    /// and return the pair in use.
    pub async fn ensure_citations_table(&self) -> Result<RelationColumns> {
        if let Some(pair) = self.detect_relation_columns().await? {
            return Ok(pair);
        }
        sqlx::query("CREATE TABLE IF NOT EXISTS citations (source TEXT, target TEXT)")
            .execute(self.pool())
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_citations_source ON citations(source)")
            .execute(self.pool())
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_citations_target ON citations(target)")
            .execute(self.pool())
            .await?;
        self.detect_relation_columns()
            .await?
            .ok_or_else(|| DbError::RelationColumnsNotFound(CITATIONS_TABLE.to_string()))
    }

    /// Replace all outgoing edges of `source_id` in one transaction.
    pub async fn replace_citations(
        &self,
        pair: &RelationColumns,
        source_id: &str,
        targets: &[String],
    ) -> Result<()> {
        validate_column(&pair.source)?;
        validate_column(&pair.target)?;

        let mut tx = self.pool().begin().await?;
        let delete = format!("DELETE FROM citations WHERE \"{}\" = ?", pair.source);
        sqlx::query(&delete)
            .bind(source_id)
            .execute(&mut *tx)
            .await?;
        let insert = format!(
            "INSERT INTO citations (\"{}\", \"{}\") VALUES (?, ?)",
            pair.source, pair.target
        );
        for target in targets {
            sqlx::query(&insert)
                .bind(source_id)
                .bind(target)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        debug!(source = source_id, edges = targets.len(), "Replaced outgoing edges");
        Ok(())
    }

    /// Distinct row keys that already have outgoing edges recorded — the
    /// skip-set that makes the citation rebuild resumable.
    pub async fn sources_with_edges(&self, pair: &RelationColumns) -> Result<HashSet<String>> {
        validate_column(&pair.source)?;
        let sql = format!("SELECT DISTINCT \"{}\" FROM citations", pair.source);
        let rows = sqlx::query(&sql).fetch_all(self.pool()).await?;
        Ok(rows.iter().map(|r| r.get::<String, _>(0)).collect())
    }

    /// All edges as (source, target) pairs.
    pub async fn load_edges(&self, pair: &RelationColumns) -> Result<Vec<(String, String)>> {
        validate_column(&pair.source)?;
        validate_column(&pair.target)?;
        let sql = format!(
            "SELECT \"{}\", \"{}\" FROM citations",
            pair.source, pair.target
        );
        let rows = sqlx::query(&sql).fetch_all(self.pool()).await?;
        Ok(rows
            .iter()
            .map(|r| (r.get::<String, _>(0), r.get::<String, _>(1)))
            .collect())
    }
}

/// Column names come from a fixed accept-list, but they are interpolated
/// into SQL, so reject anything that is not a plain identifier.
fn validate_column(name: &str) -> Result<()> {
    if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(DbError::InvalidColumn(name.to_string()))
    }
}
