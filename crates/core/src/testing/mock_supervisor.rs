//! Mock supervisor for testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::catalog::Item;
use crate::shutdown::ShutdownSignal;
use crate::supervisor::{
    ActiveTransmission, RunResult, RunState, Supervisor, SupervisorError, TransmissionRun,
};

/// Scripted result of one launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockOutcome {
    /// Runs for the configured duration and exits 0.
    Succeed,
    /// Runs for the configured duration and exits with this code.
    Fail(i32),
    /// The transmitter binary cannot be started.
    SpawnFail,
    /// The item's local source is missing.
    SourceMissing,
    /// Runs until shutdown.
    Hang,
}

/// Mock implementation of the Supervisor trait.
///
/// Outcomes are consumed in order; once the queue is empty every launch uses
/// the default outcome. Exclusivity is enforced like the real supervisor so
/// tests can observe `Busy`.
pub struct MockSupervisor {
    outcomes: Mutex<VecDeque<MockOutcome>>,
    default_outcome: Mutex<MockOutcome>,
    run_duration: Mutex<Duration>,
    launched: Mutex<Vec<String>>,
    slot: Arc<Semaphore>,
    running: Arc<AtomicUsize>,
    max_running: Arc<AtomicUsize>,
    state: Arc<Mutex<RunState>>,
}

impl Default for MockSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSupervisor {
    pub fn new() -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::new()),
            default_outcome: Mutex::new(MockOutcome::Succeed),
            run_duration: Mutex::new(Duration::from_secs(1)),
            launched: Mutex::new(Vec::new()),
            slot: Arc::new(Semaphore::new(1)),
            running: Arc::new(AtomicUsize::new(0)),
            max_running: Arc::new(AtomicUsize::new(0)),
            state: Arc::new(Mutex::new(RunState::Idle)),
        }
    }

    pub fn push_outcome(&self, outcome: MockOutcome) {
        self.outcomes.lock().unwrap().push_back(outcome);
    }

    pub fn set_default_outcome(&self, outcome: MockOutcome) {
        *self.default_outcome.lock().unwrap() = outcome;
    }

    /// How long simulated transmissions last.
    pub fn set_run_duration(&self, duration: Duration) {
        *self.run_duration.lock().unwrap() = duration;
    }

    /// Titles of every launch attempt, including failed spawns.
    pub fn launched_titles(&self) -> Vec<String> {
        self.launched.lock().unwrap().clone()
    }

    pub fn launch_count(&self) -> usize {
        self.launched.lock().unwrap().len()
    }

    /// Highest number of simultaneously running transmissions observed.
    pub fn max_concurrent(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    fn next_outcome(&self) -> MockOutcome {
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(*self.default_outcome.lock().unwrap())
    }

    fn set_state(&self, state: RunState) {
        *self.state.lock().unwrap() = state;
    }
}

#[async_trait]
impl Supervisor for MockSupervisor {
    fn name(&self) -> &str {
        "mock"
    }

    fn state(&self) -> RunState {
        *self.state.lock().unwrap()
    }

    async fn validate(&self) -> Result<(), SupervisorError> {
        Ok(())
    }

    async fn launch(&self, item: &Item) -> Result<Box<dyn ActiveTransmission>, SupervisorError> {
        let permit = self
            .slot
            .clone()
            .try_acquire_owned()
            .map_err(|_| SupervisorError::Busy)?;
        self.launched.lock().unwrap().push(item.title.clone());
        self.set_state(RunState::Starting);

        let outcome = self.next_outcome();
        match outcome {
            MockOutcome::SpawnFail => {
                self.set_state(RunState::Failed);
                return Err(SupervisorError::BinaryNotFound {
                    path: PathBuf::from("mock-ffmpeg"),
                });
            }
            MockOutcome::SourceMissing => {
                self.set_state(RunState::Failed);
                return Err(SupervisorError::SourceUnavailable {
                    title: item.title.clone(),
                    locator: item.source.clone(),
                });
            }
            _ => {}
        }

        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
        self.set_state(RunState::Running);

        Ok(Box::new(MockTransmission {
            run: TransmissionRun::new(&item.title, &item.source, None),
            outcome,
            duration: *self.run_duration.lock().unwrap(),
            started: Instant::now(),
            permit: Some(permit),
            running: self.running.clone(),
            state: self.state.clone(),
        }))
    }
}

struct MockTransmission {
    run: TransmissionRun,
    outcome: MockOutcome,
    duration: Duration,
    started: Instant,
    permit: Option<OwnedSemaphorePermit>,
    running: Arc<AtomicUsize>,
    state: Arc<Mutex<RunState>>,
}

impl MockTransmission {
    fn finish(&mut self, exit_code: Option<i32>, state: RunState) -> RunResult {
        if self.permit.take().is_some() {
            self.running.fetch_sub(1, Ordering::SeqCst);
        }
        *self.state.lock().unwrap() = state;
        RunResult {
            run_id: self.run.run_id,
            title: self.run.title.clone(),
            exit_code,
            duration: self.started.elapsed(),
            state,
            output_lines: 0,
        }
    }
}

impl Drop for MockTransmission {
    fn drop(&mut self) {
        if self.permit.take().is_some() {
            self.running.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl ActiveTransmission for MockTransmission {
    fn run(&self) -> &TransmissionRun {
        &self.run
    }

    async fn wait(&mut self, mut shutdown: ShutdownSignal) -> Result<RunResult, SupervisorError> {
        let finished = match self.outcome {
            MockOutcome::Hang => {
                shutdown.triggered().await;
                false
            }
            _ => tokio::select! {
                _ = tokio::time::sleep(self.duration) => true,
                _ = shutdown.triggered() => false,
            },
        };

        if !finished {
            self.finish(None, RunState::Failed);
            return Err(SupervisorError::Cancelled {
                title: self.run.title.clone(),
            });
        }

        match self.outcome {
            MockOutcome::Fail(code) => {
                let result = self.finish(Some(code), RunState::Failed);
                Err(SupervisorError::TransmissionFailed {
                    title: result.title,
                    exit_code: Some(code),
                    duration: result.duration,
                })
            }
            _ => Ok(self.finish(Some(0), RunState::Succeeded)),
        }
    }

    async fn terminate(&mut self) -> Result<RunResult, SupervisorError> {
        Ok(self.finish(None, RunState::Failed))
    }
}
