//! Supervisor traits.

use async_trait::async_trait;

use super::error::SupervisorError;
use super::types::{RunResult, RunState, TransmissionRun};
use crate::catalog::Item;
use crate::shutdown::ShutdownSignal;

/// Starts and supervises transmissions, one at a time.
///
/// Launching is split from waiting so callers can commit side effects
/// (such as recording the item as played) once the process is confirmed
/// started, before it runs to completion.
#[async_trait]
pub trait Supervisor: Send + Sync {
    /// Name of this supervisor implementation.
    fn name(&self) -> &str;

    /// Current state of the transmission slot.
    fn state(&self) -> RunState;

    /// Check that the transmitter is usable. Called once at startup.
    async fn validate(&self) -> Result<(), SupervisorError>;

    /// Start transmitting `item`.
    ///
    /// Fails with `Busy` while a previous transmission is still active.
    async fn launch(&self, item: &Item) -> Result<Box<dyn ActiveTransmission>, SupervisorError>;

    /// Launch and wait in one step.
    async fn transmit(
        &self,
        item: &Item,
        shutdown: ShutdownSignal,
    ) -> Result<RunResult, SupervisorError> {
        let mut active = self.launch(item).await?;
        active.wait(shutdown).await
    }
}

/// Handle to a started transmission.
///
/// Dropping the handle kills the process and frees the slot.
#[async_trait]
pub trait ActiveTransmission: Send {
    fn run(&self) -> &TransmissionRun;

    /// Block until the process exits, streaming its output meanwhile.
    ///
    /// A non-zero exit yields `TransmissionFailed`; a shutdown request
    /// stops the process and yields `Cancelled`.
    async fn wait(&mut self, shutdown: ShutdownSignal) -> Result<RunResult, SupervisorError>;

    /// Stop the process without waiting for it to finish on its own.
    async fn terminate(&mut self) -> Result<RunResult, SupervisorError>;
}
