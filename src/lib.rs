mod config;
mod error;
mod fields;
mod filter;
mod graph;
mod links;
mod record;
mod service;
mod store;
mod wiki;

pub use crate::config::{CONFIG_FILE, DOKU_LINK_PATTERN, WIKI_LINK_PATTERN, WikiConfig};
pub use crate::error::{Error, Result};
pub use crate::fields::{Field, FieldKind, FieldMapping, display_name, map_field};
pub use crate::filter::{
    Action, Criterion, DATE_FORMATS, FilterEngine, FilterExpr, Logic, Operator, SortDir, SortKey,
    evaluate, filter_corpus, filter_corpus_expr, matches, parse_date, sort_records,
};
pub use crate::graph::{
    DanglingLink, LinkGraphBuilder, RebuildReport, Rebuilt, Relations, rebuild_links,
};
pub use crate::links::LinkExtractor;
pub use crate::record::{
    DerivedLinks, FileType, Metadata, MetadataPatch, Para, Priority, Status,
};
pub use crate::service::{Page, WikiService};
pub use crate::store::{CorpusSnapshot, FsStore, MemoryStore, MetadataStore};
pub use crate::wiki::{NotePath, Wiki};
