//! Playout loop integration tests.
//!
//! These tests drive the retry controller with mock catalog, supervisor and
//! history store:
//! - Catalog backoff bounds and counter resets
//! - Spawn failure backoff and item-level failures
//! - Rotation bookkeeping, resume and interstitials
//! - History persistence failures and shutdown

use std::collections::HashSet;
use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use playout_core::{
    config::GuideConfig,
    controller::{ControllerError, ExitReason, Phase, RetryConfig, RetryController},
    guide::{NowPlaying, XmltvGuide},
    history::PlayHistory,
    scheduler::{Scheduler, SelectionPolicy},
    shutdown::{shutdown_channel, ShutdownSignal, ShutdownTrigger},
    supervisor::{RunState, Supervisor},
    testing::{fixtures, MemoryHistoryStore, MockCatalog, MockOutcome, MockSupervisor},
    CatalogError, ReloadPolicy,
};

/// Test helper wiring a controller to mocks.
struct TestHarness {
    catalog: Arc<MockCatalog>,
    supervisor: Arc<MockSupervisor>,
    store: Arc<MemoryHistoryStore>,
    trigger: ShutdownTrigger,
    signal: ShutdownSignal,
    retry: RetryConfig,
    policy: SelectionPolicy,
}

impl TestHarness {
    fn new(titles: &[&str]) -> Self {
        Self::with_parts(MockCatalog::with_titles(titles), MemoryHistoryStore::new())
    }

    fn with_parts(catalog: MockCatalog, store: MemoryHistoryStore) -> Self {
        let (trigger, signal) = shutdown_channel();
        Self {
            catalog: Arc::new(catalog),
            supervisor: Arc::new(MockSupervisor::new()),
            store: Arc::new(store),
            trigger,
            signal,
            retry: RetryConfig {
                max_consecutive_catalog_failures: 3,
                catalog_backoff_secs: 60,
                spawn_backoff_secs: 10,
                max_consecutive_spawn_failures: 3,
            },
            policy: SelectionPolicy::Random,
        }
    }

    fn controller(&self) -> RetryController {
        let history = PlayHistory::open(self.store.clone()).expect("Failed to open history");
        RetryController::new(
            self.retry.clone(),
            self.catalog.clone(),
            Scheduler::with_seed(self.policy, 42),
            history,
            self.supervisor.clone(),
            self.signal.clone(),
        )
    }

    /// Trigger shutdown after `delay`.
    fn shutdown_after(&self, delay: Duration) {
        let trigger = self.trigger.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            trigger.trigger();
        });
    }
}

fn distinct(titles: &[String]) -> usize {
    titles.iter().collect::<HashSet<_>>().len()
}

// =============================================================================
// Catalog failures
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_empty_catalog_stops_after_max_attempts() {
    let harness = TestHarness::with_parts(MockCatalog::empty(), MemoryHistoryStore::new());
    let mut controller = harness.controller();
    let started = tokio::time::Instant::now();

    let err = controller.run().await.unwrap_err();

    match err {
        ControllerError::CatalogExhausted { attempts, last } => {
            assert_eq!(attempts, 3);
            assert!(matches!(last, CatalogError::Empty { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    // Exactly three loads with a backoff between each, none after the last.
    assert_eq!(harness.catalog.load_count(), 3);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(120));
    assert!(elapsed < Duration::from_secs(180));
    assert_eq!(harness.supervisor.launch_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_single_attempt_limit_never_sleeps() {
    let mut harness = TestHarness::with_parts(
        MockCatalog::failing(CatalogError::Malformed {
            source_name: "movies.json".to_string(),
            reason: "expected value at line 1".to_string(),
        }),
        MemoryHistoryStore::new(),
    );
    harness.retry.max_consecutive_catalog_failures = 1;
    let mut controller = harness.controller();
    let started = tokio::time::Instant::now();

    let err = controller.run().await.unwrap_err();
    assert!(matches!(err, ControllerError::CatalogExhausted { attempts: 1, .. }));
    assert_eq!(harness.catalog.load_count(), 1);
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_catalog_success_resets_failure_counter() {
    let harness = TestHarness::new(&["A", "B", "C"]);
    let empty = || {
        Err(CatalogError::Empty {
            source_name: "mock".to_string(),
            dropped: 2,
        })
    };
    harness.catalog.push_response(empty());
    harness.catalog.push_response(empty());
    harness
        .catalog
        .push_response(Ok(vec![fixtures::item("A"), fixtures::item("B")]));
    harness.catalog.push_response(empty());
    harness.catalog.push_response(empty());

    let mut controller = harness.controller();
    let reason = controller.run_until(Some(2)).await.unwrap();

    assert_eq!(reason, ExitReason::Completed { items: 2 });
    let status = controller.status_handle().read().await.clone();
    assert_eq!(status.consecutive_catalog_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_during_catalog_backoff() {
    let mut harness = TestHarness::with_parts(MockCatalog::empty(), MemoryHistoryStore::new());
    harness.retry.max_consecutive_catalog_failures = 10;
    let mut controller = harness.controller();
    harness.shutdown_after(Duration::from_secs(30));

    let reason = controller.run().await.unwrap();
    assert_eq!(reason, ExitReason::Shutdown);
    assert_eq!(harness.catalog.load_count(), 1);
}

// =============================================================================
// Transmissions
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_full_rotation_without_repeats() {
    let harness = TestHarness::new(&["A", "B", "C", "D", "E"]);
    let mut controller = harness.controller();

    controller.run_until(Some(10)).await.unwrap();

    let launched = harness.supervisor.launched_titles();
    assert_eq!(launched.len(), 10);
    assert_eq!(distinct(&launched[..5]), 5);
    assert_eq!(distinct(&launched[5..]), 5);

    let status = controller.status_handle().read().await.clone();
    assert_eq!(status.rotations_completed, 1);
    assert_eq!(status.items_started, 10);
    assert_eq!(status.phase, Phase::Stopped);
    assert_eq!(harness.supervisor.max_concurrent(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_transmission_failures_never_count_toward_limits() {
    let mut harness = TestHarness::new(&["A", "B", "C"]);
    harness.retry.max_consecutive_catalog_failures = 1;
    harness.retry.max_consecutive_spawn_failures = 1;
    harness.supervisor.set_default_outcome(MockOutcome::Fail(1));
    let mut controller = harness.controller();

    let reason = controller.run_until(Some(5)).await.unwrap();

    assert_eq!(reason, ExitReason::Completed { items: 5 });
    let status = controller.status_handle().read().await.clone();
    assert_eq!(status.transmission_failures, 5);
    // Failed items still count as played for the rotation.
    assert_eq!(distinct(&harness.supervisor.launched_titles()[..3]), 3);
}

#[tokio::test(start_paused = true)]
async fn test_spawn_failures_back_off_then_fatal() {
    let harness = TestHarness::new(&["A", "B"]);
    harness.supervisor.set_default_outcome(MockOutcome::SpawnFail);
    let mut controller = harness.controller();
    let started = tokio::time::Instant::now();

    let err = controller.run().await.unwrap_err();

    assert!(matches!(err, ControllerError::SpawnExhausted { attempts: 3, .. }));
    assert_eq!(harness.supervisor.launch_count(), 3);
    assert!(started.elapsed() >= Duration::from_secs(20));
    // Nothing started, nothing recorded.
    assert!(harness.store.snapshot().played.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_spawn_failure_recovers() {
    let harness = TestHarness::new(&["A", "B", "C"]);
    harness.supervisor.push_outcome(MockOutcome::SpawnFail);
    harness.supervisor.push_outcome(MockOutcome::SpawnFail);
    let mut controller = harness.controller();

    let reason = controller.run_until(Some(1)).await.unwrap();

    assert_eq!(reason, ExitReason::Completed { items: 1 });
    assert_eq!(harness.supervisor.launch_count(), 3);
    assert_eq!(harness.store.snapshot().played.len(), 1);
    let status = controller.status_handle().read().await.clone();
    assert_eq!(status.consecutive_spawn_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn test_missing_source_is_skipped_for_the_rotation() {
    let mut harness = TestHarness::new(&["A", "B"]);
    harness.policy = SelectionPolicy::Sequential;
    harness.supervisor.push_outcome(MockOutcome::SourceMissing);
    let mut controller = harness.controller();

    controller.run_until(Some(1)).await.unwrap();

    assert_eq!(harness.supervisor.launched_titles(), vec!["A", "B"]);
    assert_eq!(harness.store.snapshot().played, vec!["A", "B"]);
}

#[tokio::test(start_paused = true)]
async fn test_resumes_rotation_from_stored_history() {
    let harness = TestHarness::with_parts(
        MockCatalog::with_titles(&["A", "B", "C", "D"]),
        MemoryHistoryStore::with_played(&["A", "B"]),
    );
    let mut controller = harness.controller();

    controller.run_until(Some(2)).await.unwrap();

    let launched: HashSet<String> = harness.supervisor.launched_titles().into_iter().collect();
    let expected: HashSet<String> = ["C", "D"].iter().map(|s| s.to_string()).collect();
    assert_eq!(launched, expected);
}

// =============================================================================
// History persistence
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_structural_history_failure_is_fatal() {
    let harness = TestHarness::new(&["A", "B"]);
    harness.supervisor.set_default_outcome(MockOutcome::Hang);
    let mut controller = harness.controller();
    harness.store.fail_all_saves(ErrorKind::ReadOnlyFilesystem);

    let err = controller.run().await.unwrap_err();

    assert!(matches!(err, ControllerError::HistoryUnavailable(_)));
    assert_eq!(harness.supervisor.launch_count(), 1);
    // The transmission was stopped before giving up.
    assert_eq!(harness.supervisor.state(), RunState::Failed);
    let status = controller.status_handle().read().await.clone();
    assert_eq!(status.phase, Phase::Failed);
    assert!(status.last_error.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_transient_history_failure_continues() {
    let harness = TestHarness::new(&["A", "B", "C"]);
    let mut controller = harness.controller();
    harness.store.fail_next_save(ErrorKind::Interrupted);

    controller.run_until(Some(3)).await.unwrap();

    assert_eq!(distinct(&harness.supervisor.launched_titles()), 3);
    assert_eq!(controller.history().len(), 3);
    assert_eq!(harness.store.snapshot().played.len(), 3);
}

// =============================================================================
// Shutdown
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_shutdown_during_transmission() {
    let harness = TestHarness::new(&["A", "B"]);
    harness.supervisor.set_default_outcome(MockOutcome::Hang);
    let mut controller = harness.controller();
    harness.shutdown_after(Duration::from_secs(5));

    let reason = controller.run().await.unwrap();

    assert_eq!(reason, ExitReason::Shutdown);
    assert_eq!(harness.supervisor.launch_count(), 1);
    // Marked at launch, so the interrupted item is not replayed on restart.
    assert_eq!(harness.store.snapshot().played.len(), 1);
    assert_eq!(harness.supervisor.state(), RunState::Failed);
}

// =============================================================================
// Reload policy, interstitials and guide
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_reload_every_item() {
    let harness = TestHarness::new(&["A", "B", "C"]);
    let mut controller = harness.controller();

    controller.run_until(Some(3)).await.unwrap();
    assert_eq!(harness.catalog.load_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_reload_every_rotation() {
    let harness = TestHarness::new(&["A", "B", "C"]);
    let mut controller = harness
        .controller()
        .with_reload_policy(ReloadPolicy::EveryRotation);

    controller.run_until(Some(3)).await.unwrap();
    assert_eq!(harness.catalog.load_count(), 1);

    controller.run_until(Some(4)).await.unwrap();
    assert_eq!(harness.catalog.load_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_interstitial_precedes_items_and_is_not_recorded() {
    let harness = TestHarness::new(&["A", "B"]);
    let mut controller = harness
        .controller()
        .with_interstitial(fixtures::item("Channel Intro"));

    controller.run_until(Some(2)).await.unwrap();

    let launched = harness.supervisor.launched_titles();
    assert_eq!(launched.len(), 4);
    assert_eq!(launched[0], "Channel Intro");
    assert_eq!(launched[2], "Channel Intro");
    assert!(!controller.history().contains("Channel Intro"));
    assert_eq!(controller.history().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_interstitial_failure_does_not_affect_item() {
    let harness = TestHarness::new(&["A"]);
    harness.supervisor.push_outcome(MockOutcome::Fail(1));
    let mut controller = harness
        .controller()
        .with_interstitial(fixtures::item("Channel Intro"));

    let reason = controller.run_until(Some(1)).await.unwrap();

    assert_eq!(reason, ExitReason::Completed { items: 1 });
    let status = controller.status_handle().read().await.clone();
    assert_eq!(status.transmission_failures, 0);
    assert_eq!(harness.store.snapshot().played, vec!["A"]);
}

#[tokio::test]
async fn test_guide_published_for_started_item() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let harness = TestHarness::new(&["Metropolis"]);
    harness.supervisor.set_run_duration(Duration::from_millis(10));
    let guide = XmltvGuide::new(GuideConfig {
        now_playing_path: dir.path().join("current_movie.json"),
        epg_path: dir.path().join("epg.xml"),
        ..GuideConfig::default()
    });
    let mut controller = harness.controller().with_guide(Arc::new(guide));

    controller.run_until(Some(1)).await.unwrap();

    let json = std::fs::read_to_string(dir.path().join("current_movie.json")).unwrap();
    let now_playing: NowPlaying = serde_json::from_str(&json).unwrap();
    assert_eq!(now_playing.title, "Metropolis");
    let xml = std::fs::read_to_string(dir.path().join("epg.xml")).unwrap();
    assert!(xml.contains("<title lang=\"en\">Metropolis</title>"));
}

#[tokio::test(start_paused = true)]
async fn test_guide_failure_is_not_fatal() {
    let harness = TestHarness::new(&["A"]);
    let guide = XmltvGuide::new(GuideConfig {
        now_playing_path: "/nonexistent/dir/current_movie.json".into(),
        ..GuideConfig::default()
    });
    let mut controller = harness.controller().with_guide(Arc::new(guide));

    let reason = controller.run_until(Some(1)).await.unwrap();
    assert_eq!(reason, ExitReason::Completed { items: 1 });
}
