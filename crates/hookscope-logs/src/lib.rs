//! Log parsing and storage for hookscope
//!
//! This crate turns raw debug stream lines into structured records and
//! holds the ordered record sequence both live delivery and backfill
//! append into.

mod extract;
mod filter;
mod parser;
mod store;

pub use extract::{Extracted, extract_json};
pub use filter::{INTERNAL_REQUEST_MARKER, is_internal_noise};
pub use parser::{LogParser, ParsedLine};
pub use store::LogStore;

// Re-export types used in our public API
pub use hookscope_types::{ArcLogRecord, LogKind, LogRecord};
