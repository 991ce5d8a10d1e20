//! Shadow cache: an incremental index mirroring vault document metadata.
//!
//! ```text
//! VaultEvent ──► ShadowCache::apply
//!                  read + hash ──► unchanged? stop
//!                  parse_document ──► ShadowIndex::upsert
//!                                       by_type / by_status / by_tag
//!                                       inbound (outbound transpose)
//! ```

mod document;
mod error;
mod index;
pub mod parser;
mod persistence;
mod query;
mod store;
mod walker;

pub use document::{FieldValue, IndexedDocument};
pub use error::{IndexError, IndexResult};
pub use index::ShadowIndex;
pub use persistence::{CachePersistence, SNAPSHOT_VERSION};
pub use query::{CacheStats, DocumentQuery};
pub use store::{ApplyOutcome, ReindexMode, ReindexStats, ShadowCache};
pub use walker::VaultWalker;
