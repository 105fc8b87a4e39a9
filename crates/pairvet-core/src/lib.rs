//! # pairvet-core
//!
//! Log-reconciled decision engine for paired-image triage.
//!
//! Several independent reviewers accept or reject the two images of each
//! record (a hypothesis candidate and an adversarial prototype) while all
//! durable state lives in a remote blob store offering only whole-object
//! read and overwrite. The engine is built around three rules:
//!
//! - decisions are immutable log lines; current state is recovered by a
//!   latest-wins fold over the logs, never stored as mutable rows;
//! - accepted items are mirrored into export folders as link artifacts,
//!   maintained flip-safely inside the save transaction;
//! - the store is fragile, so every call rides a retry budget and a rate
//!   gate, and reads degrade to cached data with a visible stale signal.
//!
//! ## Modules
//!
//! - [`model`]: sides, verdicts, pair keys, reviewers, manifest records
//! - [`config`]: TOML engine tunables and category bindings
//! - [`store`]: the blob store seam plus retry, rate gate, and a test store
//! - [`cache`]: fallback text cache, folder name index, preview LRU
//! - [`journal`]: append-semantics decision logs and write buffering
//! - [`reconcile`]: the latest-wins fold from log text to reviewer state
//! - [`progress`]: resume locator and the advisory progress hint
//! - [`export`]: flip-safe maintenance of accepted-item link artifacts
//! - [`save`]: the ordered, idempotent save transaction
//! - [`session`]: engine wiring and the reviewer session surface
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use pairvet_core::store::InMemoryBlobStore;
//! use pairvet_core::{DecisionStatus, Engine, EngineConfig, Side};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = Arc::new(InMemoryBlobStore::new());
//!     store.seed_text(
//!         "blob-manifest",
//!         r#"{"id":"rec-0","text":"a cat","hypo_id":"h_0.png","adversarial_id":"a_0.png"}"#,
//!     );
//!     store.seed_folder_entry("folder-src-h", "h_0.png", "blob-h0");
//!     store.seed_folder_entry("folder-src-a", "a_0.png", "blob-a0");
//!
//!     let config = EngineConfig::from_toml(
//!         r#"
//!         [categories.demo]
//!         manifest_blob = "blob-manifest"
//!         hypothesis_src = "folder-src-h"
//!         adversarial_src = "folder-src-a"
//!         hypothesis_dst = "folder-dst-h"
//!         adversarial_dst = "folder-dst-a"
//!         hypothesis_log = "log-h"
//!         adversarial_log = "log-a"
//!         progress_folder = "folder-progress"
//!         "#,
//!     )
//!     .unwrap();
//!
//!     let engine = Engine::new(config, store);
//!     let mut session = engine.open_session("demo", "Ana").await.unwrap();
//!
//!     session.decide(Side::Hypothesis, DecisionStatus::Accepted);
//!     session.decide(Side::Adversarial, DecisionStatus::Rejected);
//!     let report = session.save().await;
//!
//!     assert!(report.ok);
//!     assert_eq!(session.progress().completed, 1);
//! }
//! ```

pub mod cache;
pub mod config;
pub mod export;
pub mod journal;
pub mod model;
pub mod progress;
pub mod reconcile;
pub mod save;
pub mod session;
pub mod store;

pub use config::EngineConfig;
pub use model::{DecisionStatus, ItemRecord, PairKey, Reviewer, Side, SideMap};
pub use progress::{ProgressSummary, ResumePoint};
pub use session::{Engine, ReviewSession, SaveReport, SessionError};
pub use store::{BlobId, BlobStore, StoreError};
