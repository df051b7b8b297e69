//! Local history of generated codes.
//!
//! The history is a single JSON document in durable local storage shared by
//! every open tab. Each tab holds a [`HistoryStore`] that caches the parsed
//! document and re-reads it only when the stored value changes.

mod preview;
pub(crate) mod storage;
mod store;
mod types;

pub use storage::SqliteLocalStorage;
pub use store::HistoryStore;
pub use types::{export_file_name, HistoryItem, QrOptions, DEFAULT_MAX_ITEMS};
