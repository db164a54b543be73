//! keel-state: persisted task state for Keel.
//!
//! Backed by [redb](https://docs.rs/redb). Stores the last launched task
//! descriptor and last observed status per task name, and executor
//! descriptors per pod instance.
//!
//! # Architecture
//!
//! Values are JSON-serialized into redb's `&[u8]` columns. Requirement
//! construction reads through the [`TaskStore`] trait; the outer offer
//! loop writes through [`StateStore`] directly.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`).

pub mod error;
pub mod store;
pub mod tables;

pub use error::{StateError, StateResult};
pub use store::{StateStore, TaskStore};
