//! Local/remote LLM access for AI annotations.
//!
//! The annotation service is consumed as an opaque text-in/text-out endpoint:
//! summarize, categorize, and placeholder-abstract generation. Empty or
//! unparseable model output degrades to sentinels — an LLM hiccup never
//! fails a row.

pub mod annotate;
pub mod backend;

pub use annotate::{Annotator, PaperContext, AI_ABSTRACT_PREFIX, UNKNOWN_FIELD};
pub use backend::{LlmBackend, LlmError, LlmRequest, LlmResponse, Message, OllamaBackend, OpenAiCompatibleBackend};
