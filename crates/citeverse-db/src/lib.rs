//! Citeverse persistence gateway.
//!
//! Schema-tolerant, idempotent access to the SQLite paper store:
//!
//! - additive column migration (`ensure_columns`), safe on every startup
//! - paged selection of rows matching a need predicate
//! - single-row atomic updates with fill-if-absent vs. overwrite semantics
//! - citation-table column-pair auto-detection (the edge table has shipped
//!   under at least five naming conventions)
//!
//! # Example
//!
//! ```rust,no_run
//! use citeverse_db::{Need, PaperStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PaperStore::open("papers.db").await?;
//!     store.ensure_columns().await?;
//!     let rows = store.select_needing(Need::AbstractMissing, None).await?;
//!     println!("{} rows need abstracts", rows.len());
//!     Ok(())
//! }
//! ```

pub mod citations;
pub mod error;
pub mod papers;
pub mod store;

pub use citations::RelationColumns;
pub use error::{DbError, Result};
pub use papers::{Need, NeedRow, PaperUpdate};
pub use store::PaperStore;
