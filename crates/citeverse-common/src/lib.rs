//! Shared types for the Citeverse enrichment pipeline.

pub mod ident;

pub use ident::{normalize_arxiv, normalize_doi, PaperIdent};
