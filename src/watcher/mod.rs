//! Vault file watcher: the event source feeding the pipeline.
//!
//! ```text
//! notify::RecommendedWatcher (recursive on vault root)
//!     │ create / modify ──► Debouncer ──► created / modified
//!     │ remove / rename-from ────────────► removed
//!     ▼
//! EventSender (pipeline queue)
//! ```

mod debouncer;
mod error;
mod vault;

pub use debouncer::Debouncer;
pub use error::WatchError;
pub use vault::VaultWatcher;
