//! Transmission supervisor.
//!
//! Launches one external transmitter per item, streams its output into the
//! log and reports how it ended.

mod config;
mod error;
mod ffmpeg;
mod invocation;
mod traits;
mod types;

pub use config::{EncodingProfile, LabelStyle, TransmitConfig};
pub use error::SupervisorError;
pub use ffmpeg::FfmpegSupervisor;
pub use invocation::{escape_drawtext, TransmitInvocation};
pub use traits::{ActiveTransmission, Supervisor};
pub use types::{OutputLine, OutputStream, RunResult, RunState, TransmissionRun};
