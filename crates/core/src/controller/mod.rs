//! Retry controller - the outer playout loop.
//!
//! Drives load → select → launch → record → wait, forever. Catalog and spawn
//! failures back off and are bounded; item-level transmission failures are
//! logged and never count toward any limit.

mod config;
mod runner;
mod types;

pub use config::RetryConfig;
pub use runner::RetryController;
pub use types::{
    ControllerError, ControllerStatus, ExitReason, NowPlayingStatus, Phase, StatusHandle,
};
