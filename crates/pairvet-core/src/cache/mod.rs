//! The three cache tiers between the engine and the store.
//!
//! Each tier has its own invalidation trigger and nothing else:
//!
//! - [`TextCache`] (blob text, journal tier): refreshed by every
//!   successful read or write of the same id; doubles as the last-good
//!   fallback when a read exhausts its retries.
//! - [`FolderIndex`] (name -> id per folder): TTL-based, because folder
//!   contents change far less often than decisions; explicit invalidation
//!   after link mutations so the next pass sees its own writes.
//! - [`PreviewCache`] (rendered bytes per item x size): bounded LRU with
//!   TTL; never invalidated by writes since source images are immutable.
//!
//! All tiers are in-process and safe under concurrent use; locks are held
//! only for bookkeeping, never across awaits, and poisoning is absorbed.

mod folder;
mod preview;
mod text;

pub use folder::FolderIndex;
pub use preview::{PreviewCache, PreviewKey};
pub use text::TextCache;
