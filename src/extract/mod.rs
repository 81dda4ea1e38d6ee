//! ML-relevant event extraction
//!
//! One pre-order pass over the syntax tree turns assignments, calls,
//! attribute accesses and comparisons into an ordered [`EventLog`]. Calls are
//! tagged by consulting the configured split functions, preprocessing classes
//! and the `call_categories` name table.

mod event;
mod extractor;

#[cfg(test)]
mod tests;

pub use event::{
    ArgValue, CallCategory, Event, EventId, EventKind, EventLog, KeywordArg, Literal,
    LiteralValue, LoopId, LoopKind, LoopScope, PreprocessMethod, ValueKind,
};
pub use extractor::{extract, EventExtractor, ROW_ACCESSORS};
