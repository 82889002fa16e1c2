// src/store/mod.rs

//! Shared context store.
//!
//! - [`model`] is the persisted document (`version`, `data`, `events`,
//!   `artifacts`).
//! - [`context`] is the in-process store handed to tasks.
//! - [`lock`] wraps the cross-process file lock.
//! - [`persist`] holds the atomic write / quarantine / cleanup helpers.

pub mod context;
pub mod lock;
pub mod model;
pub mod persist;

pub use context::{ContextStore, RECOVERED_EVENT, StoreOptions};
pub use lock::{LockMode, LockOptions, ScopedLock};
pub use model::{Artifact, Event, Snapshot};
