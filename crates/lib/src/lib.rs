//! quire-lib: document build orchestration
//!
//! Drives external typesetting engines through their passes and answers
//! SyncTeX queries against the results:
//! - `BuildService`: validated, per-project serialized builds
//! - `orchestrate`: the pass state machine with citation-fingerprint caching
//! - `ArtifactStore`: the last successful build of every project
//! - `SyncBridge`: forward and inverse SyncTeX lookups

pub mod bib;
pub mod build;
pub mod config;
pub mod consts;
pub mod engine;
pub mod log;
pub mod platform;
pub mod process;
pub mod project_lock;
pub mod store;
pub mod sync;
