//! Frontend JSON export.
//!
//! Turns the enriched paper store into the two documents the 3D viewer
//! loads: `nodes.json` (papers with layout positions and sizes) and
//! `edges.json` (citation links restricted to the exported node set).

pub mod export;
pub mod layout;

pub use export::{build_edges, build_nodes, write_json, Edge, ExportFilter, Node};
