//! Need-predicate selection and row updates.
//!
//! Update semantics follow the data model: scalar fields are fill-if-absent
//! (a present value is never overwritten by enrichment), while `abstract`,
//! `references` and `citedBy` are point-in-time snapshots from the winning
//! source and are overwritten wholesale.

use sqlx::Row;
use tracing::debug;

use crate::error::Result;
use crate::store::PaperStore;

/// Rows fetched per page when scanning for enrichment candidates.
const SELECT_PAGE_SIZE: i64 = 500;

/// A boolean condition over row fields used to select enrichment candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Need {
    /// `abstract` is NULL or blank.
    AbstractMissing,
    /// `doi` or `arxivId` is NULL or empty.
    IdentifiersMissing,
    /// AI columns are unpopulated (or the row has no abstract of any kind).
    AnnotationsMissing,
}

impl Need {
    fn where_clause(self) -> &'static str {
        match self {
            Need::AbstractMissing => "abstract IS NULL OR TRIM(abstract) = ''",
            Need::IdentifiersMissing => {
                "(doi IS NULL OR doi = '') OR (arxivId IS NULL OR arxivId = '')"
            }
            Need::AnnotationsMissing => {
                "AI_field_list IS NULL OR AI_field_list = '[]' \
                 OR AI_summary IS NULL OR TRIM(AI_summary) = '' \
                 OR ((abstract IS NULL OR TRIM(abstract) = '') \
                     AND (AI_abstract IS NULL OR TRIM(AI_abstract) = ''))"
            }
        }
    }
}

/// A candidate row, with the identifiers needed to route it to a source.
#[derive(Debug, Clone)]
pub struct NeedRow {
    pub paper_id: String,
    pub title: Option<String>,
    pub abstract_text: Option<String>,
    pub doi: Option<String>,
    pub arxiv_id: Option<String>,
    pub s2_id: Option<String>,
    pub year: Option<i64>,
    pub journal: Option<String>,
    pub authors: Option<String>,
}

/// One enrichment result to apply to a row. All fields optional; scalars use
/// fill-if-absent, the three snapshot fields overwrite.
#[derive(Debug, Clone, Default)]
pub struct PaperUpdate {
    // fill-if-absent scalars
    pub title: Option<String>,
    pub year: Option<i64>,
    pub publication_date: Option<String>,
    pub cited_by_count: Option<i64>,
    pub doi: Option<String>,
    pub arxiv_id: Option<String>,
    pub s2_id: Option<String>,
    pub corpus_id: Option<i64>,
    pub pmid: Option<String>,
    pub pmcid: Option<String>,
    pub authors: Option<Vec<String>>,
    pub fields_of_study: Option<Vec<String>>,
    // full-overwrite snapshot fields
    pub abstract_text: Option<String>,
    pub references: Option<Vec<String>>,
    pub cited_by: Option<Vec<String>>,
}

impl PaperUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.year.is_none()
            && self.publication_date.is_none()
            && self.cited_by_count.is_none()
            && self.doi.is_none()
            && self.arxiv_id.is_none()
            && self.s2_id.is_none()
            && self.corpus_id.is_none()
            && self.pmid.is_none()
            && self.pmcid.is_none()
            && self.authors.is_none()
            && self.fields_of_study.is_none()
            && self.abstract_text.is_none()
            && self.references.is_none()
            && self.cited_by.is_none()
    }
}

impl PaperStore {
    /// Select rows matching `need`, optionally capped at `limit`.
    /// Fetches in fixed-size pages to bound memory on large stores.
    pub async fn select_needing(&self, need: Need, limit: Option<i64>) -> Result<Vec<NeedRow>> {
        let mut rows = Vec::new();
        let mut offset: i64 = 0;
        loop {
            let page = limit
                .map(|l| (l - offset).min(SELECT_PAGE_SIZE))
                .unwrap_or(SELECT_PAGE_SIZE);
            if page <= 0 {
                break;
            }
            let sql = format!(
                "SELECT paperId, title, abstract, doi, arxivId, s2_id, year, journal_name, all_author_names \
                 FROM papers WHERE {} LIMIT ? OFFSET ?",
                need.where_clause()
            );
            let fetched = sqlx::query(&sql)
                .bind(page)
                .bind(offset)
                .fetch_all(self.pool())
                .await?;
            let n = fetched.len();
            for r in fetched {
                rows.push(NeedRow {
                    paper_id: r.get("paperId"),
                    title: r.get("title"),
                    abstract_text: r.get("abstract"),
                    doi: r.get("doi"),
                    arxiv_id: r.get("arxivId"),
                    s2_id: r.get("s2_id"),
                    year: r.get("year"),
                    journal: r.get("journal_name"),
                    authors: r.get("all_author_names"),
                });
            }
            if (n as i64) < page {
                break;
            }
            offset += n as i64;
        }
        debug!(need = ?need, rows = rows.len(), "Selected rows needing enrichment");
        Ok(rows)
    }

    /// Every primary key in the papers table.
    pub async fn all_paper_ids(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT paperId FROM papers")
            .fetch_all(self.pool())
            .await?;
        Ok(rows.iter().map(|r| r.get::<String, _>("paperId")).collect())
    }

    /// Apply one update to one row. Single atomic UPDATE, committed
    /// immediately. Returns false if the update carried nothing.
    pub async fn update_fields(&self, paper_id: &str, update: &PaperUpdate) -> Result<bool> {
        if update.is_empty() {
            return Ok(false);
        }

        let mut sets: Vec<String> = Vec::new();
        let mut text_binds: Vec<String> = Vec::new();
        let mut int_binds: Vec<(usize, i64)> = Vec::new();

        // Bind order follows push order; integers are tracked by position so
        // a single loop can bind mixed types below.
        let mut push_text = |sets: &mut Vec<String>, clause: &str, v: &str, binds: &mut Vec<String>| {
            sets.push(clause.to_string());
            binds.push(v.to_string());
        };

        if let Some(ref v) = update.title {
            push_text(&mut sets, "title = COALESCE(NULLIF(title,''), ?)", v, &mut text_binds);
        }
        if let Some(ref v) = update.publication_date {
            push_text(
                &mut sets,
                "publicationDate = COALESCE(NULLIF(publicationDate,''), ?)",
                v,
                &mut text_binds,
            );
        }
        if let Some(ref v) = update.doi {
            push_text(&mut sets, "doi = COALESCE(NULLIF(doi,''), ?)", v, &mut text_binds);
        }
        if let Some(ref v) = update.arxiv_id {
            push_text(&mut sets, "arxivId = COALESCE(NULLIF(arxivId,''), ?)", v, &mut text_binds);
        }
        if let Some(ref v) = update.s2_id {
            push_text(&mut sets, "s2_id = COALESCE(NULLIF(s2_id,''), ?)", v, &mut text_binds);
        }
        if let Some(ref v) = update.pmid {
            push_text(&mut sets, "pmid = COALESCE(NULLIF(pmid,''), ?)", v, &mut text_binds);
        }
        if let Some(ref v) = update.pmcid {
            push_text(&mut sets, "pmcid = COALESCE(NULLIF(pmcid,''), ?)", v, &mut text_binds);
        }
        if let Some(ref v) = update.authors {
            let json = serde_json::to_string(v)?;
            push_text(
                &mut sets,
                "authors = COALESCE(NULLIF(authors,''), ?)",
                &json,
                &mut text_binds,
            );
        }
        if let Some(ref v) = update.fields_of_study {
            let json = serde_json::to_string(v)?;
            push_text(
                &mut sets,
                "fieldsOfStudy = COALESCE(NULLIF(fieldsOfStudy,''), ?)",
                &json,
                &mut text_binds,
            );
        }
        if let Some(v) = update.year {
            sets.push("year = COALESCE(year, ?)".to_string());
            int_binds.push((sets.len() - 1, v));
        }
        if let Some(v) = update.cited_by_count {
            sets.push("cited_by_count = COALESCE(cited_by_count, ?)".to_string());
            int_binds.push((sets.len() - 1, v));
        }
        if let Some(v) = update.corpus_id {
            sets.push("corpusId = COALESCE(corpusId, ?)".to_string());
            int_binds.push((sets.len() - 1, v));
        }
        // snapshot fields: full overwrite
        if let Some(ref v) = update.abstract_text {
            push_text(&mut sets, "abstract = ?", v, &mut text_binds);
        }
        if let Some(ref v) = update.references {
            let json = serde_json::to_string(v)?;
            push_text(&mut sets, "\"references\" = ?", &json, &mut text_binds);
        }
        if let Some(ref v) = update.cited_by {
            let json = serde_json::to_string(v)?;
            push_text(&mut sets, "citedBy = ?", &json, &mut text_binds);
        }

        let sql = format!("UPDATE papers SET {} WHERE paperId = ?", sets.join(", "));
        let mut query = sqlx::query(&sql);
        let mut text_iter = text_binds.iter();
        for (idx, _) in sets.iter().enumerate() {
            if let Some(&(_, v)) = int_binds.iter().find(|(i, _)| *i == idx) {
                query = query.bind(v);
            } else if let Some(v) = text_iter.next() {
                query = query.bind(v.clone());
            }
        }
        query = query.bind(paper_id.to_string());
        let result = query.execute(self.pool()).await?;
        Ok(result.rows_affected() > 0)
    }

    /// Write AI category/summary columns. Overwrite is deliberate: the pass
    /// is gated by the annotations need predicate.
    pub async fn update_annotations(
        &self,
        paper_id: &str,
        field_list: &[String],
        primary_field: &str,
        summary: Option<&str>,
    ) -> Result<()> {
        let json = serde_json::to_string(field_list)?;
        sqlx::query(
            "UPDATE papers SET AI_field_list = ?, AI_primary_field = ?, \
             AI_summary = COALESCE(?, AI_summary) WHERE paperId = ?",
        )
        .bind(json)
        .bind(primary_field)
        .bind(summary)
        .bind(paper_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Store a generated placeholder abstract in both `abstract` and
    /// `AI_abstract`, but only while the row still has no real abstract.
    /// Current abstract text of one row, if any.
    pub async fn abstract_of(&self, paper_id: &str) -> Result<Option<String>> {
        let text: Option<Option<String>> =
            sqlx::query_scalar("SELECT abstract FROM papers WHERE paperId = ?")
                .bind(paper_id)
                .fetch_optional(self.pool())
                .await?;
        Ok(text.flatten())
    }

    pub async fn write_ai_abstract(&self, paper_id: &str, text: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE papers SET abstract = ?, AI_abstract = ? \
             WHERE paperId = ? AND (abstract IS NULL OR TRIM(abstract) = '')",
        )
        .bind(text)
        .bind(text)
        .bind(paper_id)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Insert a bare row, used by tests and the import path.
    pub async fn insert_stub(&self, paper_id: &str) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO papers (paperId) VALUES (?)")
            .bind(paper_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store_with_row(id: &str) -> PaperStore {
        let store = PaperStore::open_in_memory().await.unwrap();
        store.ensure_columns().await.unwrap();
        store.insert_stub(id).await.unwrap();
        store
    }

    async fn fetch_year(store: &PaperStore, id: &str) -> Option<i64> {
        sqlx::query_scalar("SELECT year FROM papers WHERE paperId = ?")
            .bind(id)
            .fetch_one(store.pool())
            .await
            .unwrap()
    }

    async fn fetch_abstract(store: &PaperStore, id: &str) -> Option<String> {
        sqlx::query_scalar("SELECT abstract FROM papers WHERE paperId = ?")
            .bind(id)
            .fetch_one(store.pool())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_fill_if_absent_never_overwrites() {
        let store = store_with_row("W1").await;
        store
            .update_fields(
                "W1",
                &PaperUpdate {
                    year: Some(2019),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        // second pass with weaker data must not win
        store
            .update_fields(
                "W1",
                &PaperUpdate {
                    year: Some(2020),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(fetch_year(&store, "W1").await, Some(2019));
    }

    #[tokio::test]
    async fn test_fill_if_absent_fills_null() {
        let store = store_with_row("W1").await;
        store
            .update_fields(
                "W1",
                &PaperUpdate {
                    year: Some(2020),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(fetch_year(&store, "W1").await, Some(2020));
    }

    #[tokio::test]
    async fn test_abstract_is_overwritten() {
        let store = store_with_row("W1").await;
        for text in ["A", "B"] {
            store
                .update_fields(
                    "W1",
                    &PaperUpdate {
                        abstract_text: Some(text.to_string()),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
        }
        assert_eq!(fetch_abstract(&store, "W1").await.as_deref(), Some("B"));
    }

    #[tokio::test]
    async fn test_empty_title_is_treated_as_missing() {
        let store = store_with_row("W1").await;
        sqlx::query("UPDATE papers SET title = '' WHERE paperId = 'W1'")
            .execute(store.pool())
            .await
            .unwrap();
        store
            .update_fields(
                "W1",
                &PaperUpdate {
                    title: Some("Real Title".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let title: Option<String> = sqlx::query_scalar("SELECT title FROM papers WHERE paperId = 'W1'")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(title.as_deref(), Some("Real Title"));
    }

    #[tokio::test]
    async fn test_select_needing_respects_limit_and_predicate() {
        let store = PaperStore::open_in_memory().await.unwrap();
        store.ensure_columns().await.unwrap();
        for i in 0..10 {
            store.insert_stub(&format!("W{i}")).await.unwrap();
        }
        sqlx::query("UPDATE papers SET abstract = 'present' WHERE paperId = 'W0'")
            .execute(store.pool())
            .await
            .unwrap();

        let all = store.select_needing(Need::AbstractMissing, None).await.unwrap();
        assert_eq!(all.len(), 9);
        let capped = store.select_needing(Need::AbstractMissing, Some(3)).await.unwrap();
        assert_eq!(capped.len(), 3);
    }

    #[tokio::test]
    async fn test_write_ai_abstract_only_when_missing() {
        let store = store_with_row("W1").await;
        assert!(store.write_ai_abstract("W1", "AI abstract - guessed.").await.unwrap());
        // now the row has an abstract; a second write must be a no-op
        assert!(!store.write_ai_abstract("W1", "AI abstract - other.").await.unwrap());
        assert_eq!(
            fetch_abstract(&store, "W1").await.as_deref(),
            Some("AI abstract - guessed.")
        );
    }

    #[tokio::test]
    async fn test_resumability_second_pass_selects_nothing() {
        let store = store_with_row("W1").await;
        store
            .update_fields(
                "W1",
                &PaperUpdate {
                    abstract_text: Some("hello world".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let remaining = store.select_needing(Need::AbstractMissing, None).await.unwrap();
        assert!(remaining.is_empty());
    }
}
