//! FFmpeg-based supervisor implementation.

use async_trait::async_trait;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

use super::config::TransmitConfig;
use super::error::SupervisorError;
use super::invocation::TransmitInvocation;
use super::traits::{ActiveTransmission, Supervisor};
use super::types::{OutputLine, OutputStream, RunResult, RunState, TransmissionRun};
use crate::catalog::Item;
use crate::shutdown::ShutdownSignal;

/// Longest output line forwarded in one piece.
const MAX_LINE_BYTES: usize = 16 * 1024;

/// How long to wait for output readers once the process has exited.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Runs ffmpeg against the configured sink, one transmission at a time.
pub struct FfmpegSupervisor {
    config: TransmitConfig,
    sink_url: String,
    slot: Arc<Semaphore>,
    state: Arc<Mutex<RunState>>,
    output_tap: Option<mpsc::Sender<OutputLine>>,
}

impl FfmpegSupervisor {
    /// Creates a supervisor. Fails if no sink address is configured.
    pub fn new(config: TransmitConfig) -> Result<Self, SupervisorError> {
        let sink_url = config
            .sink_url
            .clone()
            .filter(|url| !url.trim().is_empty())
            .ok_or(SupervisorError::SinkNotConfigured)?;
        Ok(Self {
            config,
            sink_url,
            slot: Arc::new(Semaphore::new(1)),
            state: Arc::new(Mutex::new(RunState::Idle)),
            output_tap: None,
        })
    }

    /// Also forward every output line to `tx`. Lines are dropped when the
    /// channel is full.
    pub fn with_output_tap(mut self, tx: mpsc::Sender<OutputLine>) -> Self {
        self.output_tap = Some(tx);
        self
    }

    pub fn config(&self) -> &TransmitConfig {
        &self.config
    }

    pub fn invocation(&self, item: &Item) -> TransmitInvocation {
        TransmitInvocation::build(&self.config, &self.sink_url, item)
    }
}

#[async_trait]
impl Supervisor for FfmpegSupervisor {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn state(&self) -> RunState {
        *lock_state(&self.state)
    }

    async fn validate(&self) -> Result<(), SupervisorError> {
        let path = &self.config.ffmpeg_path;
        let output = Command::new(path)
            .arg("-version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    SupervisorError::BinaryNotFound { path: path.clone() }
                } else {
                    SupervisorError::Io(e)
                }
            })?;

        if !output.status.success() {
            return Err(SupervisorError::Io(std::io::Error::other(format!(
                "{} -version exited with {}",
                path.display(),
                output.status
            ))));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let version = stdout.lines().next().unwrap_or("unknown version");
        info!(path = %path.display(), version, "Transmitter available");
        Ok(())
    }

    async fn launch(&self, item: &Item) -> Result<Box<dyn ActiveTransmission>, SupervisorError> {
        let permit = self
            .slot
            .clone()
            .try_acquire_owned()
            .map_err(|_| SupervisorError::Busy)?;
        set_state(&self.state, RunState::Starting);

        if let Some(path) = local_source_path(&item.source) {
            if !tokio::fs::try_exists(path).await.unwrap_or(false) {
                set_state(&self.state, RunState::Failed);
                return Err(SupervisorError::SourceUnavailable {
                    title: item.title.clone(),
                    locator: item.source.clone(),
                });
            }
        }

        let invocation = self.invocation(item);
        debug!(command = %invocation.redacted(&self.sink_url), "Spawning transmitter");

        let mut child = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                set_state(&self.state, RunState::Failed);
                if e.kind() == std::io::ErrorKind::NotFound {
                    SupervisorError::BinaryNotFound {
                        path: invocation.program.clone(),
                    }
                } else {
                    SupervisorError::SpawnFailed {
                        title: item.title.clone(),
                        error: e,
                    }
                }
            })?;

        let title: Arc<str> = Arc::from(item.title.as_str());
        let mut drains = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            drains.push(tokio::spawn(drain_output(
                stdout,
                OutputStream::Stdout,
                title.clone(),
                self.output_tap.clone(),
            )));
        }
        if let Some(stderr) = child.stderr.take() {
            drains.push(tokio::spawn(drain_output(
                stderr,
                OutputStream::Stderr,
                title,
                self.output_tap.clone(),
            )));
        }

        let run = TransmissionRun::new(&item.title, &item.source, child.id());
        set_state(&self.state, RunState::Running);
        info!(
            run_id = %run.run_id,
            title = %run.title,
            pid = ?run.pid,
            "Transmission started"
        );

        Ok(Box::new(FfmpegTransmission {
            child,
            run,
            started: Instant::now(),
            drains,
            permit: Some(permit),
            state: self.state.clone(),
            grace: Duration::from_secs(self.config.stop_grace_secs),
        }))
    }
}

/// A running ffmpeg process. Holds the supervisor's slot until it finishes.
struct FfmpegTransmission {
    child: Child,
    run: TransmissionRun,
    started: Instant,
    drains: Vec<JoinHandle<u64>>,
    permit: Option<OwnedSemaphorePermit>,
    state: Arc<Mutex<RunState>>,
    grace: Duration,
}

impl FfmpegTransmission {
    /// SIGTERM first so ffmpeg can close the stream cleanly, then SIGKILL.
    async fn stop(&mut self) -> std::io::Result<()> {
        if let Some(pid) = self.child.id() {
            if send_sigterm(pid) {
                match timeout(self.grace, self.child.wait()).await {
                    Ok(status) => return status.map(|_| ()),
                    Err(_) => warn!(
                        title = %self.run.title,
                        grace_secs = self.grace.as_secs(),
                        "Transmitter ignored SIGTERM, killing"
                    ),
                }
            }
        }
        self.child.kill().await
    }

    async fn finish(&mut self, exit_code: Option<i32>, state: RunState) -> RunResult {
        let mut output_lines = 0;
        for mut handle in self.drains.drain(..) {
            match timeout(DRAIN_TIMEOUT, &mut handle).await {
                Ok(Ok(lines)) => output_lines += lines,
                Ok(Err(e)) => warn!(error = %e, "Output reader task failed"),
                Err(_) => {
                    warn!(title = %self.run.title, "Output still open after exit, detaching");
                    handle.abort();
                }
            }
        }

        set_state(&self.state, state);
        self.permit.take();

        RunResult {
            run_id: self.run.run_id,
            title: self.run.title.clone(),
            exit_code,
            duration: self.started.elapsed(),
            state,
            output_lines,
        }
    }
}

impl Drop for FfmpegTransmission {
    fn drop(&mut self) {
        // Still holding the slot means neither wait nor terminate finished;
        // kill_on_drop ends the child, so it is no longer on air.
        if self.permit.is_some() {
            set_state(&self.state, RunState::Failed);
        }
    }
}

#[async_trait]
impl ActiveTransmission for FfmpegTransmission {
    fn run(&self) -> &TransmissionRun {
        &self.run
    }

    async fn wait(&mut self, mut shutdown: ShutdownSignal) -> Result<RunResult, SupervisorError> {
        let outcome: Option<std::io::Result<ExitStatus>> = tokio::select! {
            status = self.child.wait() => Some(status),
            _ = shutdown.triggered() => None,
        };

        match outcome {
            Some(Ok(status)) if status.success() => {
                let result = self.finish(status.code(), RunState::Succeeded).await;
                info!(
                    run_id = %result.run_id,
                    title = %result.title,
                    duration_secs = result.duration.as_secs(),
                    "Transmission finished"
                );
                Ok(result)
            }
            Some(Ok(status)) => {
                let result = self.finish(status.code(), RunState::Failed).await;
                Err(SupervisorError::TransmissionFailed {
                    title: result.title,
                    exit_code: result.exit_code,
                    duration: result.duration,
                })
            }
            Some(Err(e)) => {
                self.finish(None, RunState::Failed).await;
                Err(SupervisorError::Io(e))
            }
            None => {
                info!(title = %self.run.title, "Shutdown requested, stopping transmission");
                if let Err(e) = self.stop().await {
                    warn!(error = %e, "Failed to stop transmitter");
                }
                self.finish(None, RunState::Failed).await;
                Err(SupervisorError::Cancelled {
                    title: self.run.title.clone(),
                })
            }
        }
    }

    async fn terminate(&mut self) -> Result<RunResult, SupervisorError> {
        info!(title = %self.run.title, "Terminating transmission");
        let stopped = self.stop().await;
        let exit_code = self
            .child
            .try_wait()
            .ok()
            .flatten()
            .and_then(|status| status.code());
        let result = self.finish(exit_code, RunState::Failed).await;
        stopped?;
        Ok(result)
    }
}

fn lock_state(state: &Mutex<RunState>) -> std::sync::MutexGuard<'_, RunState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn set_state(state: &Mutex<RunState>, next: RunState) {
    *lock_state(state) = next;
}

#[cfg(unix)]
fn send_sigterm(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // SAFETY: kill(2) takes plain integers; pid is our own unreaped child.
    unsafe { libc::kill(pid, libc::SIGTERM) == 0 }
}

#[cfg(not(unix))]
fn send_sigterm(_pid: u32) -> bool {
    false
}

/// Local file behind a locator, if it is one. URLs and ffmpeg protocol
/// specifiers are left to the transmitter.
fn local_source_path(source: &str) -> Option<&Path> {
    if let Some(path) = source.strip_prefix("file://") {
        return Some(Path::new(path));
    }
    if let Some((scheme, _)) = source.split_once(':') {
        if scheme.len() > 1 && scheme.chars().all(|c| c.is_ascii_alphanumeric() || c == '+') {
            return None;
        }
    }
    Some(Path::new(source))
}

/// Forward output as it arrives, split on `\n` and on the `\r` ffmpeg uses
/// for progress updates. Returns the number of lines forwarded.
async fn drain_output<R>(
    mut reader: R,
    stream: OutputStream,
    title: Arc<str>,
    tap: Option<mpsc::Sender<OutputLine>>,
) -> u64
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; 4096];
    let mut pending: Vec<u8> = Vec::new();
    let mut lines = 0;

    loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                debug!(stream = stream.as_str(), error = %e, "Output read failed");
                break;
            }
        };
        for &byte in &chunk[..n] {
            if byte == b'\n' || byte == b'\r' {
                lines += emit_line(&mut pending, stream, &title, tap.as_ref());
            } else {
                pending.push(byte);
                if pending.len() >= MAX_LINE_BYTES {
                    let rest = pending.split_off(char_boundary(&pending));
                    lines += emit_line(&mut pending, stream, &title, tap.as_ref());
                    pending = rest;
                }
            }
        }
    }
    lines += emit_line(&mut pending, stream, &title, tap.as_ref());
    lines
}

/// Longest prefix of `bytes` that does not end inside a UTF-8 sequence.
fn char_boundary(bytes: &[u8]) -> usize {
    let len = bytes.len();
    let Some(lead) = (1..=len.min(4))
        .map(|back| len - back)
        .find(|&i| bytes[i] & 0xC0 != 0x80)
    else {
        return len;
    };
    let width = match bytes[lead] {
        b if b >= 0xF0 => 4,
        b if b >= 0xE0 => 3,
        b if b >= 0xC0 => 2,
        _ => 1,
    };
    if lead > 0 && lead + width > len {
        lead
    } else {
        len
    }
}

fn emit_line(
    pending: &mut Vec<u8>,
    stream: OutputStream,
    title: &str,
    tap: Option<&mpsc::Sender<OutputLine>>,
) -> u64 {
    if pending.iter().all(u8::is_ascii_whitespace) {
        pending.clear();
        return 0;
    }
    let line = String::from_utf8_lossy(pending).trim_end().to_string();
    pending.clear();

    info!(target: "playout::ffmpeg", title, stream = stream.as_str(), "{}", line);
    if let Some(tx) = tap {
        let _ = tx.try_send(OutputLine { stream, line });
    }
    1
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::shutdown::shutdown_channel;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const SOURCE: &str = "http://media.example.com/movie.mp4";

    /// Stand-in transmitter: a shell script that ignores its arguments.
    fn fake_ffmpeg(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("fake-ffmpeg");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    fn supervisor(program: PathBuf) -> FfmpegSupervisor {
        let config = TransmitConfig {
            ffmpeg_path: program,
            sink_url: Some("rtmp://localhost/live/key".to_string()),
            stop_grace_secs: 2,
            ..TransmitConfig::default()
        };
        FfmpegSupervisor::new(config).unwrap()
    }

    fn movie() -> Item {
        Item::new("Movie", SOURCE)
    }

    #[test]
    fn test_new_requires_sink() {
        let result = FfmpegSupervisor::new(TransmitConfig::default());
        assert!(matches!(result, Err(SupervisorError::SinkNotConfigured)));
    }

    #[test]
    fn test_local_source_detection() {
        assert!(local_source_path("http://host/a.mp4").is_none());
        assert!(local_source_path("rtmp://host/live").is_none());
        assert!(local_source_path("pipe:0").is_none());
        assert_eq!(
            local_source_path("/media/a:b.mp4"),
            Some(Path::new("/media/a:b.mp4"))
        );
        assert_eq!(
            local_source_path("file:///media/a.mp4"),
            Some(Path::new("/media/a.mp4"))
        );
    }

    #[test]
    fn test_char_boundary() {
        assert_eq!(char_boundary(b"abc"), 3);
        assert_eq!(char_boundary("abé".as_bytes()), 4);
        assert_eq!(char_boundary(&"abé".as_bytes()[..3]), 2);
        assert_eq!(char_boundary(&"a€".as_bytes()[..3]), 1);
        assert_eq!(char_boundary(&"a🎬".as_bytes()[..4]), 1);
    }

    #[tokio::test]
    async fn test_long_line_split_keeps_characters_whole() {
        let mut input = "a".repeat(MAX_LINE_BYTES - 1);
        input.push_str("é tail\n");
        let (tx, mut rx) = mpsc::channel(8);

        let lines = drain_output(
            input.as_bytes(),
            OutputStream::Stderr,
            Arc::from("Movie"),
            Some(tx),
        )
        .await;

        assert_eq!(lines, 2);
        let first = rx.recv().await.unwrap().line;
        let second = rx.recv().await.unwrap().line;
        assert_eq!(first, "a".repeat(MAX_LINE_BYTES - 1));
        assert_eq!(second, "é tail");
        assert!(!first.contains('\u{FFFD}') && !second.contains('\u{FFFD}'));
    }

    #[tokio::test]
    async fn test_successful_run_forwards_output() {
        let dir = TempDir::new().unwrap();
        let (tx, mut rx) = mpsc::channel(16);
        let supervisor = supervisor(fake_ffmpeg(
            &dir,
            "echo 'frame=  1 fps=0.0' >&2\necho 'to stdout'\nexit 0",
        ))
        .with_output_tap(tx);

        let result = supervisor
            .transmit(&movie(), ShutdownSignal::never())
            .await
            .unwrap();
        assert!(result.succeeded());
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.output_lines, 2);
        assert_eq!(supervisor.state(), RunState::Succeeded);

        let mut lines = Vec::new();
        while let Ok(line) = rx.try_recv() {
            lines.push(line);
        }
        assert!(lines.contains(&OutputLine {
            stream: OutputStream::Stderr,
            line: "frame=  1 fps=0.0".to_string()
        }));
        assert!(lines.contains(&OutputLine {
            stream: OutputStream::Stdout,
            line: "to stdout".to_string()
        }));
    }

    #[tokio::test]
    async fn test_output_streams_before_exit() {
        let dir = TempDir::new().unwrap();
        let (tx, mut rx) = mpsc::channel(16);
        let supervisor =
            supervisor(fake_ffmpeg(&dir, "printf 'progress\\r' >&2\nexec sleep 30")).with_output_tap(tx);

        let mut active = supervisor.launch(&movie()).await.unwrap();
        let line = timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("output before exit")
            .unwrap();
        assert_eq!(line.line, "progress");
        assert_eq!(supervisor.state(), RunState::Running);

        let result = active.terminate().await.unwrap();
        assert_eq!(result.state, RunState::Failed);
        assert_eq!(supervisor.state(), RunState::Failed);
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_transmission_failure() {
        let dir = TempDir::new().unwrap();
        let supervisor = supervisor(fake_ffmpeg(&dir, "echo 'Connection refused' >&2\nexit 3"));

        let err = supervisor
            .transmit(&movie(), ShutdownSignal::never())
            .await
            .unwrap_err();
        match err {
            SupervisorError::TransmissionFailed { exit_code, .. } => {
                assert_eq!(exit_code, Some(3))
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(supervisor.state(), RunState::Failed);

        // Slot is free again.
        assert!(supervisor.launch(&movie()).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let supervisor = supervisor(PathBuf::from("/nonexistent/ffmpeg"));
        let err = supervisor.launch(&movie()).await.err().unwrap();
        assert!(matches!(err, SupervisorError::BinaryNotFound { .. }));
        assert!(err.is_spawn_failure());
        assert_eq!(supervisor.state(), RunState::Failed);

        let err = supervisor.validate().await.unwrap_err();
        assert!(matches!(err, SupervisorError::BinaryNotFound { .. }));
    }

    #[tokio::test]
    async fn test_missing_local_source() {
        let dir = TempDir::new().unwrap();
        let supervisor = supervisor(fake_ffmpeg(&dir, "exit 0"));
        let item = Item::new("Gone", "/nonexistent/movie.mp4");
        let err = supervisor.launch(&item).await.err().unwrap();
        assert!(matches!(err, SupervisorError::SourceUnavailable { .. }));
        assert!(err.is_spawn_failure());
    }

    #[tokio::test]
    async fn test_second_launch_is_busy() {
        let dir = TempDir::new().unwrap();
        let supervisor = supervisor(fake_ffmpeg(&dir, "exec sleep 30"));

        let mut first = supervisor.launch(&movie()).await.unwrap();
        let second = supervisor.launch(&movie()).await;
        assert!(matches!(second, Err(SupervisorError::Busy)));

        first.terminate().await.unwrap();
        let mut third = supervisor.launch(&movie()).await.unwrap();
        third.terminate().await.unwrap();
    }

    #[tokio::test]
    async fn test_dropped_transmission_clears_running_state() {
        let dir = TempDir::new().unwrap();
        let supervisor = supervisor(fake_ffmpeg(&dir, "exec sleep 30"));

        let active = supervisor.launch(&movie()).await.unwrap();
        assert_eq!(supervisor.state(), RunState::Running);
        assert!(supervisor.state().is_active());

        drop(active);
        assert_eq!(supervisor.state(), RunState::Failed);
        assert!(!supervisor.state().is_active());

        let mut next = supervisor.launch(&movie()).await.unwrap();
        assert_eq!(supervisor.state(), RunState::Running);
        next.terminate().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_cancels_running_transmission() {
        let dir = TempDir::new().unwrap();
        let supervisor = supervisor(fake_ffmpeg(&dir, "exec sleep 30"));
        let (trigger, signal) = shutdown_channel();

        let mut active = supervisor.launch(&movie()).await.unwrap();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.trigger();
        });

        let started = Instant::now();
        let err = active.wait(signal).await.unwrap_err();
        assert!(matches!(err, SupervisorError::Cancelled { .. }));
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(supervisor.state(), RunState::Failed);
    }

    #[tokio::test]
    async fn test_validate_runs_version() {
        let dir = TempDir::new().unwrap();
        let supervisor = supervisor(fake_ffmpeg(&dir, "echo 'ffmpeg version 6.1'"));
        assert!(supervisor.validate().await.is_ok());
    }
}
