//! External source clients.

pub mod arxiv;
pub mod openalex;
pub mod semantic_scholar;

use async_trait::async_trait;
use citeverse_common::PaperIdent;

use crate::fetcher::Fetcher;
use crate::models::{AttributeGroup, PartialRecord, SourceTag};

/// Common interface for all source adapters.
///
/// An adapter translates one normalized identifier into a source-specific
/// request and the response into a canonical partial record. Adapters
/// declare which attribute groups they can satisfy and which identifier
/// kinds they consume, so the orchestrator can route rows by need.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn tag(&self) -> SourceTag;

    /// Attribute groups this source can fill.
    fn provides(&self) -> &'static [AttributeGroup];

    /// Whether this adapter can consume the given identifier kind.
    fn accepts(&self, ident: &PaperIdent) -> bool;

    /// Look up one identifier. `Ok(None)` is an explicit not-found;
    /// malformed responses are converted to not-found per identifier and
    /// never abort a batch.
    async fn lookup(
        &self,
        fetcher: &mut Fetcher,
        ident: &PaperIdent,
    ) -> anyhow::Result<Option<PartialRecord>>;
}
