//! Document builds.
//!
//! A [`BuildRequest`] becomes a [`BuildJob`] with its own scratch directory,
//! is driven through its engine passes by [`orchestrate`], and is turned
//! into a [`BuildResult`] by [`assemble`]. [`BuildService`] ties the steps
//! together under a per-project lock.
//!
//! # Submodules
//!
//! - [`request`] - request validation and main file confinement
//! - [`job`] - per-build scratch state
//! - [`orchestrate`] - the pass state machine
//! - [`assemble`] - artifact lookup and persistence
//! - [`service`] - synchronous and streaming entry points

pub mod assemble;
pub mod job;
pub mod orchestrate;
pub mod request;
pub mod service;
mod types;

pub use job::BuildJob;
pub use orchestrate::PassReport;
pub use request::{BuildRequest, DEFAULT_ENGINE};
pub use service::BuildService;
pub use types::*;
