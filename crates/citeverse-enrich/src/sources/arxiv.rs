//! arXiv export API client.
//!
//! Abstract-only fallback: the export API serves an Atom feed, and the
//! `<summary>` element of the first `<entry>` is the paper's abstract.
//! arXiv asks for a ~3s pace between requests; the fetcher's pace setting
//! covers that.
//!
//! API: https://export.arxiv.org/api/query?id_list={id}

use async_trait::async_trait;
use citeverse_common::PaperIdent;
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::warn;

use super::SourceAdapter;
use crate::fetcher::Fetcher;
use crate::models::{AttributeGroup, PartialRecord, SourceTag};

const ARXIV_API: &str = "https://export.arxiv.org/api/query";
const PROVIDES: &[AttributeGroup] = &[AttributeGroup::Abstract];

pub struct ArxivClient;

impl ArxivClient {
    pub fn new() -> Self {
        Self
    }

    /// Fetch the abstract for one arXiv id. Unknown ids come back as a
    /// feed without entries, which maps to `Ok(None)`.
    pub async fn fetch_abstract(
        &self,
        fetcher: &mut Fetcher,
        arxiv_id: &str,
    ) -> anyhow::Result<Option<String>> {
        let query = [
            ("id_list", arxiv_id.to_string()),
            ("max_results", "1".to_string()),
        ];
        let xml = fetcher.get_text(SourceTag::Arxiv, ARXIV_API, &query).await?;
        Ok(parse_atom_summary(&xml))
    }
}

impl Default for ArxivClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for ArxivClient {
    fn tag(&self) -> SourceTag {
        SourceTag::Arxiv
    }

    fn provides(&self) -> &'static [AttributeGroup] {
        PROVIDES
    }

    fn accepts(&self, ident: &PaperIdent) -> bool {
        matches!(ident, PaperIdent::ArxivId(_))
    }

    async fn lookup(
        &self,
        fetcher: &mut Fetcher,
        ident: &PaperIdent,
    ) -> anyhow::Result<Option<PartialRecord>> {
        let PaperIdent::ArxivId(id) = ident else {
            return Ok(None);
        };
        Ok(self.fetch_abstract(fetcher, id).await?.map(|summary| {
            PartialRecord {
                abstract_text: Some(summary),
                ..Default::default()
            }
        }))
    }
}

/// Pull the first `<entry>`'s `<summary>` out of an Atom feed. The feed
/// wraps text hard at ~80 columns, so runs of whitespace collapse to
/// single spaces.
fn parse_atom_summary(xml: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut in_entry = false;
    let mut in_summary = false;
    let mut summary = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"entry" => in_entry = true,
                b"summary" if in_entry => in_summary = true,
                _ => {}
            },
            Ok(Event::Text(ref e)) => {
                if in_summary {
                    summary.push_str(&e.unescape().unwrap_or_default());
                }
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"summary" => in_summary = false,
                // only the first entry counts
                b"entry" if in_entry => break,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                warn!("Atom parse error: {}", e);
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    let collapsed = summary.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}
