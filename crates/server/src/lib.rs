//! Status API for the playout daemon.

pub mod api;
pub mod metrics;
pub mod state;
