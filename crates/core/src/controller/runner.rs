//! Retry controller implementation.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::catalog::{Catalog, CatalogSource, Item};
use crate::config::ReloadPolicy;
use crate::guide::{NowPlaying, ProgramGuide};
use crate::history::{HistoryError, PlayHistory};
use crate::metrics;
use crate::scheduler::{Scheduler, Selection};
use crate::shutdown::ShutdownSignal;
use crate::supervisor::{RunResult, Supervisor, SupervisorError, TransmissionRun};

use super::config::RetryConfig;
use super::types::{
    ControllerError, ControllerStatus, ExitReason, NowPlayingStatus, Phase, StatusHandle,
};

/// Whether the loop keeps going after a step.
enum Flow {
    Continue,
    Shutdown,
}

/// Owns the playout loop and every failure counter.
pub struct RetryController {
    config: RetryConfig,
    reload: ReloadPolicy,
    catalog_source: Arc<dyn CatalogSource>,
    scheduler: Scheduler,
    history: PlayHistory,
    supervisor: Arc<dyn Supervisor>,
    guide: Option<Arc<dyn ProgramGuide>>,
    interstitial: Option<Item>,
    shutdown: ShutdownSignal,
    status: StatusHandle,

    // Runtime state
    catalog: Option<Arc<Catalog>>,
    consecutive_catalog_failures: u32,
    consecutive_spawn_failures: u32,
    items_started: u64,
    rotations_completed: u64,
    transmission_failures: u64,
    now_playing: Option<NowPlayingStatus>,
    last_error: Option<String>,
}

impl RetryController {
    /// Create a new controller.
    pub fn new(
        config: RetryConfig,
        catalog_source: Arc<dyn CatalogSource>,
        scheduler: Scheduler,
        history: PlayHistory,
        supervisor: Arc<dyn Supervisor>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            config,
            reload: ReloadPolicy::default(),
            catalog_source,
            scheduler,
            history,
            supervisor,
            guide: None,
            interstitial: None,
            shutdown,
            status: Arc::new(RwLock::new(ControllerStatus::default())),
            catalog: None,
            consecutive_catalog_failures: 0,
            consecutive_spawn_failures: 0,
            items_started: 0,
            rotations_completed: 0,
            transmission_failures: 0,
            now_playing: None,
            last_error: None,
        }
    }

    pub fn with_reload_policy(mut self, reload: ReloadPolicy) -> Self {
        self.reload = reload;
        self
    }

    pub fn with_guide(mut self, guide: Arc<dyn ProgramGuide>) -> Self {
        self.guide = Some(guide);
        self
    }

    /// Transmit `ident` before every catalog item.
    pub fn with_interstitial(mut self, ident: Item) -> Self {
        self.interstitial = Some(ident);
        self
    }

    /// Handle to the live status snapshot.
    pub fn status_handle(&self) -> StatusHandle {
        self.status.clone()
    }

    pub fn history(&self) -> &PlayHistory {
        &self.history
    }

    /// Run until shutdown or a fatal condition.
    pub async fn run(&mut self) -> Result<ExitReason, ControllerError> {
        self.run_until(None).await
    }

    /// Run until shutdown, a fatal condition, or `limit` catalog items have
    /// been started.
    pub async fn run_until(&mut self, limit: Option<u64>) -> Result<ExitReason, ControllerError> {
        info!(
            catalog = %self.catalog_source.describe(),
            policy = ?self.scheduler.policy(),
            reload = ?self.reload,
            supervisor = self.supervisor.name(),
            played_in_rotation = self.history.len(),
            "Playout loop starting"
        );

        let result = self.drive(limit).await;

        self.now_playing = None;
        match &result {
            Ok(reason) => {
                info!(reason = ?reason, items_started = self.items_started, "Playout loop stopped");
                self.refresh_status(Phase::Stopped).await;
            }
            Err(e) => {
                error!(error = %e, "Playout loop failed");
                self.last_error = Some(e.to_string());
                self.refresh_status(Phase::Failed).await;
            }
        }
        result
    }

    async fn drive(&mut self, limit: Option<u64>) -> Result<ExitReason, ControllerError> {
        loop {
            if self.shutdown.is_triggered() {
                return Ok(ExitReason::Shutdown);
            }
            if let Some(limit) = limit {
                if self.items_started >= limit {
                    return Ok(ExitReason::Completed {
                        items: self.items_started,
                    });
                }
            }

            let Some(catalog) = self.current_catalog().await? else {
                return Ok(ExitReason::Shutdown);
            };

            self.refresh_status(Phase::Selecting).await;
            let selection = match self.scheduler.next(&catalog, &mut self.history) {
                Ok(selection) => selection,
                Err(e) => {
                    self.history_failure(e, "rotation reset")?;
                    continue;
                }
            };
            if selection.rotation_reset {
                self.rotations_completed += 1;
                metrics::ROTATIONS_COMPLETED.inc();
            }

            if let Some(ident) = self.interstitial.clone() {
                if let Flow::Shutdown = self.play_interstitial(&ident).await {
                    return Ok(ExitReason::Shutdown);
                }
            }

            if let Flow::Shutdown = self.play_item(&selection, catalog.len()).await? {
                return Ok(ExitReason::Shutdown);
            }
        }
    }

    /// The catalog to schedule from, reloading it as the policy requires.
    /// `None` means shutdown was requested while waiting.
    async fn current_catalog(&mut self) -> Result<Option<Arc<Catalog>>, ControllerError> {
        let reload = match (&self.catalog, self.reload) {
            (None, _) | (Some(_), ReloadPolicy::EveryItem) => true,
            (Some(catalog), ReloadPolicy::EveryRotation) => self
                .history
                .covers(catalog.items().iter().map(|item| item.identity())),
        };
        if !reload {
            return Ok(self.catalog.clone());
        }

        let Some(catalog) = self.load_catalog().await? else {
            return Ok(None);
        };
        let catalog = Arc::new(catalog);
        self.catalog = Some(catalog.clone());
        Ok(Some(catalog))
    }

    async fn load_catalog(&mut self) -> Result<Option<Catalog>, ControllerError> {
        loop {
            self.refresh_status(Phase::LoadingCatalog).await;
            match self.catalog_source.load().await {
                Ok(catalog) => {
                    if self.consecutive_catalog_failures > 0 {
                        info!(
                            failures = self.consecutive_catalog_failures,
                            "Catalog recovered"
                        );
                    }
                    self.consecutive_catalog_failures = 0;
                    metrics::CATALOG_LOADS.with_label_values(&["ok"]).inc();
                    metrics::CATALOG_ITEMS.set(catalog.len() as i64);

                    let previous = self.catalog.as_ref().map(|c| c.len());
                    if previous != Some(catalog.len()) {
                        info!(
                            items = catalog.len(),
                            generation = catalog.generation(),
                            "Catalog loaded"
                        );
                    } else {
                        debug!(
                            items = catalog.len(),
                            generation = catalog.generation(),
                            "Catalog reloaded"
                        );
                    }
                    return Ok(Some(catalog));
                }
                Err(e) => {
                    metrics::CATALOG_LOADS.with_label_values(&[e.kind()]).inc();
                    self.consecutive_catalog_failures += 1;
                    self.last_error = Some(e.to_string());
                    let attempts = self.consecutive_catalog_failures;
                    let max = self.config.max_consecutive_catalog_failures;

                    if attempts >= max {
                        error!(attempts, error = %e, "Catalog still unavailable, giving up");
                        return Err(ControllerError::CatalogExhausted { attempts, last: e });
                    }

                    let backoff = self.config.catalog_backoff_secs;
                    warn!(
                        attempt = attempts,
                        max,
                        backoff_secs = backoff,
                        error = %e,
                        "Catalog unavailable, retrying"
                    );
                    self.refresh_status(Phase::CatalogBackoff).await;
                    if !self.backoff(Duration::from_secs(backoff)).await {
                        return Ok(None);
                    }
                }
            }
        }
    }

    async fn play_interstitial(&mut self, ident: &Item) -> Flow {
        self.refresh_status(Phase::Interstitial).await;
        let mut active = match self.supervisor.launch(ident).await {
            Ok(active) => active,
            Err(e) => {
                warn!(title = %ident.title, error = %e, "Interstitial failed to start");
                return Flow::Continue;
            }
        };
        metrics::TRANSMISSIONS_STARTED
            .with_label_values(&["interstitial"])
            .inc();
        let run = active.run().clone();
        self.set_now_playing(&run, true).await;

        let outcome = active.wait(self.shutdown.clone()).await;
        drop(active);
        self.now_playing = None;
        observe_outcome(&outcome);

        match outcome {
            Err(SupervisorError::Cancelled { .. }) => Flow::Shutdown,
            Err(e) => {
                warn!(title = %ident.title, error = %e, "Interstitial failed");
                Flow::Continue
            }
            Ok(_) => Flow::Continue,
        }
    }

    async fn play_item(
        &mut self,
        selection: &Selection,
        catalog_items: usize,
    ) -> Result<Flow, ControllerError> {
        let item = &selection.item;
        let mut active = match self.supervisor.launch(item).await {
            Ok(active) => active,
            Err(e) if e.is_spawn_failure() => return self.spawn_failure(selection, e).await,
            Err(e) => return Err(ControllerError::Supervisor(e)),
        };

        self.consecutive_spawn_failures = 0;
        self.items_started += 1;
        metrics::TRANSMISSIONS_STARTED
            .with_label_values(&["item"])
            .inc();

        if let Err(e) = self
            .history
            .mark_played_at(item.identity(), Some(selection.position))
        {
            if let Err(fatal) = self.history_failure(e, "mark played") {
                if let Err(te) = active.terminate().await {
                    warn!(error = %te, "Failed to stop transmission");
                }
                return Err(fatal);
            }
        }

        let run = active.run().clone();
        info!(
            title = %item.title,
            run_id = %run.run_id,
            played_in_rotation = self.history.len(),
            catalog_items,
            "Now playing"
        );
        self.set_now_playing(&run, false).await;
        self.publish_guide(item, run.started_at).await;

        let outcome = active.wait(self.shutdown.clone()).await;
        drop(active);
        self.now_playing = None;
        observe_outcome(&outcome);

        match outcome {
            Ok(_) => Ok(Flow::Continue),
            Err(SupervisorError::Cancelled { .. }) => Ok(Flow::Shutdown),
            Err(e) => {
                self.transmission_failures += 1;
                self.last_error = Some(e.to_string());
                warn!(title = %item.title, error = %e, "Transmission failed, moving to the next item");
                Ok(Flow::Continue)
            }
        }
    }

    async fn spawn_failure(
        &mut self,
        selection: &Selection,
        err: SupervisorError,
    ) -> Result<Flow, ControllerError> {
        let item = &selection.item;
        metrics::SPAWN_FAILURES.with_label_values(&[err.kind()]).inc();
        self.consecutive_spawn_failures += 1;
        self.last_error = Some(err.to_string());
        let attempts = self.consecutive_spawn_failures;
        let max = self.config.max_consecutive_spawn_failures;

        if attempts >= max {
            error!(title = %item.title, attempts, error = %err, "Transmitter keeps failing to start, giving up");
            return Err(ControllerError::SpawnExhausted { attempts, last: err });
        }

        // A missing source stays missing; skip it for the rest of the rotation.
        if matches!(err, SupervisorError::SourceUnavailable { .. }) {
            if let Err(e) = self
                .history
                .mark_played_at(item.identity(), Some(selection.position))
            {
                self.history_failure(e, "skip unavailable item")?;
            }
        }

        let backoff = self.config.spawn_backoff_secs;
        warn!(
            title = %item.title,
            attempt = attempts,
            max,
            backoff_secs = backoff,
            error = %err,
            "Transmitter failed to start, backing off"
        );
        self.refresh_status(Phase::SpawnBackoff).await;
        if self.backoff(Duration::from_secs(backoff)).await {
            Ok(Flow::Continue)
        } else {
            Ok(Flow::Shutdown)
        }
    }

    /// Structural storage failures are fatal; anything else is logged and
    /// the in-memory history keeps guarding the rotation.
    fn history_failure(&mut self, err: HistoryError, action: &str) -> Result<(), ControllerError> {
        self.last_error = Some(err.to_string());
        if err.is_structural() {
            metrics::HISTORY_WRITE_FAILURES
                .with_label_values(&["structural"])
                .inc();
            error!(action, error = %err, "Play history cannot be persisted");
            return Err(ControllerError::HistoryUnavailable(err));
        }
        metrics::HISTORY_WRITE_FAILURES
            .with_label_values(&["transient"])
            .inc();
        warn!(action, error = %err, "Play history write failed, continuing");
        Ok(())
    }

    async fn publish_guide(&self, item: &Item, started_at: chrono::DateTime<chrono::Utc>) {
        let Some(guide) = &self.guide else {
            return;
        };
        if let Err(e) = guide.publish(&NowPlaying::new(item, started_at)).await {
            metrics::GUIDE_PUBLISH_FAILURES.inc();
            warn!(title = %item.title, error = %e, "Failed to update programme guide");
        }
    }

    /// Sleep for `duration`. Returns false if shutdown was requested first.
    async fn backoff(&self, duration: Duration) -> bool {
        let mut shutdown = self.shutdown.clone();
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = shutdown.triggered() => false,
        }
    }

    async fn set_now_playing(&mut self, run: &TransmissionRun, interstitial: bool) {
        self.now_playing = Some(NowPlayingStatus {
            title: run.title.clone(),
            run_id: run.run_id,
            started_at: run.started_at,
            interstitial,
        });
        self.refresh_status(if interstitial {
            Phase::Interstitial
        } else {
            Phase::Transmitting
        })
        .await;
    }

    async fn refresh_status(&self, phase: Phase) {
        let mut status = self.status.write().await;
        *status = ControllerStatus {
            phase,
            now_playing: self.now_playing.clone(),
            catalog_items: self.catalog.as_ref().map(|c| c.len()).unwrap_or(0),
            catalog_generation: self.catalog.as_ref().map(|c| c.generation()).unwrap_or(0),
            played_in_rotation: self.history.len(),
            rotations_completed: self.rotations_completed,
            items_started: self.items_started,
            transmission_failures: self.transmission_failures,
            consecutive_catalog_failures: self.consecutive_catalog_failures,
            consecutive_spawn_failures: self.consecutive_spawn_failures,
            last_error: self.last_error.clone(),
        };
    }
}

fn observe_outcome(outcome: &Result<RunResult, SupervisorError>) {
    let (result, duration) = match outcome {
        Ok(run) => ("succeeded", Some(run.duration)),
        Err(SupervisorError::TransmissionFailed { duration, .. }) => ("failed", Some(*duration)),
        Err(SupervisorError::Cancelled { .. }) => ("cancelled", None),
        Err(_) => ("failed", None),
    };
    metrics::TRANSMISSIONS_FINISHED
        .with_label_values(&[result])
        .inc();
    if let Some(duration) = duration {
        metrics::TRANSMISSION_DURATION
            .with_label_values(&[result])
            .observe(duration.as_secs_f64());
    }
}
