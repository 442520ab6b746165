mod build;
mod clean;
mod engines;
mod status;
mod sync;

pub use build::{BuildOptions, cmd_build};
pub use clean::cmd_clean;
pub use engines::cmd_engines;
pub use status::cmd_status;
pub use sync::{SyncCommand, cmd_sync};
