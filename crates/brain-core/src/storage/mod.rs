//! Storage Module
//!
//! Three independent persistence surfaces:
//! - [`Store`]: SQLite-backed durable record store for memories/chunks/
//!   projects/sessions (§3).
//! - [`lexical::LexicalIndex`]: hand-rolled BM25 inverted index (C2).
//! - [`event_log::EventLog`]: append-only JSONL mutation log (§3, §6).

pub mod event_log;
pub mod lexical;
mod migrations;
mod sqlite;

pub use event_log::EventLog;
pub use lexical::LexicalIndex;
pub use migrations::{Migration, MIGRATIONS};
pub use sqlite::Store;
