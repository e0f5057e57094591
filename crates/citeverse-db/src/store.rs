//! Store handle and additive schema migration.

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::{debug, info};

use crate::error::Result;

/// Columns the enrichment pipeline and exporter rely on. Migration is
/// additive only: missing columns are added, existing ones are never touched.
const PAPER_COLUMNS: &[(&str, &str)] = &[
    ("title", "TEXT"),
    ("abstract", "TEXT"),
    ("year", "INTEGER"),
    ("publicationDate", "TEXT"),
    ("cited_by_count", "INTEGER"),
    ("doi", "TEXT"),
    ("arxivId", "TEXT"),
    ("s2_id", "TEXT"),
    ("corpusId", "INTEGER"),
    ("pmid", "TEXT"),
    ("pmcid", "TEXT"),
    ("authors", "TEXT"),
    ("fieldsOfStudy", "TEXT"),
    ("references", "TEXT"),
    ("citedBy", "TEXT"),
    ("journal_name", "TEXT"),
    ("first_author_name", "TEXT"),
    ("all_author_names", "TEXT"),
    ("AI_field_list", "TEXT"),
    ("AI_primary_field", "TEXT"),
    ("AI_summary", "TEXT"),
    ("AI_abstract", "TEXT"),
];

/// Main store handle. Cheap to clone; all writes are single-row and
/// auto-committed, so one handle can be shared across passes.
#[derive(Clone)]
pub struct PaperStore {
    pool: SqlitePool,
}

impl PaperStore {
    /// Open (or create) the database at `path`.
    pub async fn open(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(path)
            .unwrap_or_else(|_| SqliteConnectOptions::new().filename(path))
            .create_if_missing(true);
        // Single writer by design; a one-connection pool keeps commits ordered.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        info!(path, "Opened paper store");
        Ok(Self { pool })
    }

    /// In-memory store, used by tests.
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .expect("in-memory DSN is valid")
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create the papers table if absent and add any missing columns.
    /// Safe to call on every startup.
    pub async fn ensure_columns(&self) -> Result<()> {
        sqlx::query("CREATE TABLE IF NOT EXISTS papers (paperId TEXT PRIMARY KEY)")
            .execute(&self.pool)
            .await?;

        let existing = self.table_columns("papers").await?;
        for (name, ctype) in PAPER_COLUMNS {
            if !existing.iter().any(|c| c == name) {
                debug!(column = name, "Adding missing column to papers");
                let sql = format!("ALTER TABLE papers ADD COLUMN \"{name}\" {ctype}");
                sqlx::query(&sql).execute(&self.pool).await?;
            }
        }
        Ok(())
    }

    /// Column names of `table`, empty if the table does not exist.
    pub async fn table_columns(&self, table: &str) -> Result<Vec<String>> {
        let sql = format!("PRAGMA table_info(\"{table}\")");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(|r| r.get::<String, _>("name"))
            .collect())
    }

    pub async fn count_all(&self) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM papers")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    /// Distinct non-blank primary-field labels, for the exporter's band map.
    pub async fn distinct_primary_fields(&self) -> Result<Vec<String>> {
        let rows = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT AI_primary_field FROM papers \
             WHERE AI_primary_field IS NOT NULL AND TRIM(AI_primary_field) != ''",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn count_with_abstract(&self) -> Result<i64> {
        let n: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM papers WHERE abstract IS NOT NULL AND TRIM(abstract) != ''",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ensure_columns_is_idempotent() {
        let store = PaperStore::open_in_memory().await.unwrap();
        store.ensure_columns().await.unwrap();
        store.ensure_columns().await.unwrap();

        let cols = store.table_columns("papers").await.unwrap();
        assert!(cols.iter().any(|c| c == "paperId"));
        assert!(cols.iter().any(|c| c == "abstract"));
        assert!(cols.iter().any(|c| c == "AI_primary_field"));
        // no duplicated columns
        let abstracts = cols.iter().filter(|c| *c == "abstract").count();
        assert_eq!(abstracts, 1);
    }

    #[tokio::test]
    async fn test_ensure_columns_preserves_existing_schema() {
        let store = PaperStore::open_in_memory().await.unwrap();
        sqlx::query("CREATE TABLE papers (paperId TEXT PRIMARY KEY, abstract TEXT, extra INTEGER)")
            .execute(store.pool())
            .await
            .unwrap();
        store.ensure_columns().await.unwrap();

        let cols = store.table_columns("papers").await.unwrap();
        assert!(cols.iter().any(|c| c == "extra"));
        assert!(cols.iter().any(|c| c == "doi"));
    }
}
