// ABOUTME: Display process supervisor owning the single renderer child process.
// ABOUTME: Serializes activate/stop, tears down with SIGINT and a bounded wait, watches exits.

use crate::error::{Result, WallError};
use crate::store::ArtifactStore;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{broadcast, oneshot, watch, Mutex};
use tracing::{debug, info, warn};

/// How long a renderer gets to exit after SIGINT before it is abandoned.
pub const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(3);

/// Executable and leading arguments of the renderer. The artifact's absolute
/// path is appended as the final argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RendererCommand {
    program: String,
    args: Vec<String>,
}

impl RendererCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    fn build(&self, artifact: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(artifact)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // An abandoned renderer is left running, never force-killed.
            .kill_on_drop(false);
        cmd
    }
}

/// Observable state of the renderer slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RendererState {
    Idle,
    Running { pid: u32, artifact: String },
    Stopping { pid: u32, artifact: String },
}

impl RendererState {
    pub fn pid(&self) -> Option<u32> {
        match self {
            RendererState::Idle => None,
            RendererState::Running { pid, .. } | RendererState::Stopping { pid, .. } => Some(*pid),
        }
    }

    pub fn artifact(&self) -> Option<&str> {
        match self {
            RendererState::Idle => None,
            RendererState::Running { artifact, .. } | RendererState::Stopping { artifact, .. } => {
                Some(artifact)
            }
        }
    }
}

/// Result of waiting for a signalled renderer.
#[derive(Debug)]
pub enum Teardown {
    /// The process exited; the status is None if it could not be collected.
    Exited(Option<ExitStatus>),
    TimedOut,
}

/// Successful outcome of `stop`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    /// Nothing was running.
    Idle,
    Exited { pid: u32, code: Option<i32> },
}

/// Successful outcome of `activate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activation {
    pub pid: u32,
    pub artifact: String,
    /// Renderer that was torn down to make room, if any.
    pub replaced: Option<u32>,
    /// Set when the previous renderer ignored SIGINT past the teardown window.
    pub abandoned: Option<u32>,
}

/// Lifecycle notifications, also logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    Spawned {
        pid: u32,
        artifact: String,
    },
    Exited {
        pid: u32,
        artifact: String,
        code: Option<i32>,
        /// False when the renderer died on its own rather than by `stop`.
        expected: bool,
    },
    Abandoned {
        pid: u32,
        artifact: String,
    },
}

struct LiveRenderer {
    generation: u64,
    pid: u32,
    artifact: String,
    exit: oneshot::Receiver<Option<ExitStatus>>,
    stopping: Arc<AtomicBool>,
}

struct Inner {
    store: ArtifactStore,
    command: RendererCommand,
    teardown_timeout: Duration,
    slot: Mutex<Option<LiveRenderer>>,
    state: watch::Sender<RendererState>,
    events: broadcast::Sender<SupervisorEvent>,
    generation: AtomicU64,
}

/// Owner of the one renderer process. Cloning yields another handle to the same
/// supervisor; construct it once per service.
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

impl Supervisor {
    pub fn new(store: ArtifactStore, command: RendererCommand) -> Self {
        Self::with_teardown_timeout(store, command, TEARDOWN_TIMEOUT)
    }

    pub fn with_teardown_timeout(
        store: ArtifactStore,
        command: RendererCommand,
        teardown_timeout: Duration,
    ) -> Self {
        let (state, _) = watch::channel(RendererState::Idle);
        let (events, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Inner {
                store,
                command,
                teardown_timeout,
                slot: Mutex::new(None),
                state,
                events,
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Current state without waiting for in-flight transitions.
    pub fn status(&self) -> RendererState {
        self.inner.state.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<RendererState> {
        self.inner.state.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.inner.events.subscribe()
    }

    pub fn command(&self) -> &RendererCommand {
        &self.inner.command
    }

    /// Show `file_name` on the wall, replacing whatever renders now.
    ///
    /// The previous renderer is torn down first. If it outlives the teardown
    /// window it is abandoned and the new renderer starts anyway; the abandoned
    /// pid is reported in `Activation::abandoned`.
    pub async fn activate(&self, file_name: &str) -> Result<Activation> {
        let path = self.inner.store.resolve(file_name)?;

        let mut slot = self.inner.slot.lock().await;

        let mut replaced = None;
        let mut abandoned = None;
        if let Some(live) = slot.take() {
            let pid = live.pid;
            replaced = Some(pid);
            if let Teardown::TimedOut = self.teardown(live).await {
                abandoned = Some(pid);
            }
        }

        let live = self.spawn(&path, file_name)?;
        let activation = Activation {
            pid: live.pid,
            artifact: file_name.to_string(),
            replaced,
            abandoned,
        };
        *slot = Some(live);
        Ok(activation)
    }

    /// Stop the renderer, if any.
    ///
    /// Sends SIGINT and waits up to the teardown window. On timeout the slot is
    /// cleared anyway and `TeardownTimeout` is returned.
    pub async fn stop(&self) -> Result<StopOutcome> {
        let mut slot = self.inner.slot.lock().await;
        let Some(live) = slot.take() else {
            return Ok(StopOutcome::Idle);
        };

        let pid = live.pid;
        match self.teardown(live).await {
            Teardown::Exited(status) => Ok(StopOutcome::Exited {
                pid,
                code: status.and_then(|s| s.code()),
            }),
            Teardown::TimedOut => Err(WallError::TeardownTimeout { pid }),
        }
    }

    /// Stop the renderer on service exit, logging rather than failing on timeout.
    pub async fn shutdown(&self) {
        match self.stop().await {
            Ok(outcome) => debug!(?outcome, "Renderer stopped for shutdown"),
            Err(e) => warn!(error = %e, "Renderer did not stop cleanly on shutdown"),
        }
    }

    /// Caller holds the slot lock and has already taken `live` out of it.
    async fn teardown(&self, mut live: LiveRenderer) -> Teardown {
        live.stopping.store(true, Ordering::SeqCst);
        self.inner.state.send_replace(RendererState::Stopping {
            pid: live.pid,
            artifact: live.artifact.clone(),
        });

        let result = match live.exit.try_recv() {
            // Already gone; do not signal a pid that may have been reused.
            Ok(status) => Teardown::Exited(status),
            Err(oneshot::error::TryRecvError::Closed) => Teardown::Exited(None),
            Err(oneshot::error::TryRecvError::Empty) => {
                interrupt(live.pid);
                match tokio::time::timeout(self.inner.teardown_timeout, &mut live.exit).await {
                    Ok(Ok(status)) => Teardown::Exited(status),
                    Ok(Err(_)) => Teardown::Exited(None),
                    Err(_) => Teardown::TimedOut,
                }
            }
        };

        if let Teardown::TimedOut = result {
            warn!(
                pid = live.pid,
                artifact = %live.artifact,
                timeout_ms = self.inner.teardown_timeout.as_millis() as u64,
                "Renderer ignored SIGINT, abandoning it"
            );
            let _ = self.inner.events.send(SupervisorEvent::Abandoned {
                pid: live.pid,
                artifact: live.artifact.clone(),
            });
        }

        self.inner.state.send_replace(RendererState::Idle);
        result
    }

    fn spawn(&self, path: &Path, file_name: &str) -> Result<LiveRenderer> {
        let mut child = self
            .inner
            .command
            .build(path)
            .spawn()
            .map_err(WallError::Spawn)?;

        let pid = child.id().ok_or_else(|| {
            WallError::Spawn(std::io::Error::new(
                std::io::ErrorKind::Other,
                "renderer exited before reporting a pid",
            ))
        })?;

        info!(
            pid,
            artifact = %file_name,
            program = %self.inner.command.program,
            "Spawned renderer"
        );

        forward_output(&mut child, pid);

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let stopping = Arc::new(AtomicBool::new(false));
        let (exit_tx, exit_rx) = oneshot::channel();

        tokio::spawn(watch_child(
            Arc::downgrade(&self.inner),
            child,
            generation,
            file_name.to_string(),
            Arc::clone(&stopping),
            exit_tx,
        ));

        self.inner.state.send_replace(RendererState::Running {
            pid,
            artifact: file_name.to_string(),
        });
        let _ = self.inner.events.send(SupervisorEvent::Spawned {
            pid,
            artifact: file_name.to_string(),
        });

        Ok(LiveRenderer {
            generation,
            pid,
            artifact: file_name.to_string(),
            exit: exit_rx,
            stopping,
        })
    }
}

/// Waits for one renderer to exit, reports it, and clears the slot if the exit
/// was not requested.
async fn watch_child(
    inner: Weak<Inner>,
    mut child: Child,
    generation: u64,
    artifact: String,
    stopping: Arc<AtomicBool>,
    exit_tx: oneshot::Sender<Option<ExitStatus>>,
) {
    let pid = child.id().unwrap_or_default();
    let status = match child.wait().await {
        Ok(status) => Some(status),
        Err(e) => {
            warn!(pid, error = %e, "Failed to collect renderer exit status");
            None
        }
    };
    let code = status.and_then(|s| s.code());
    let expected = stopping.load(Ordering::SeqCst);

    // Wake a pending teardown before touching the slot lock it holds.
    let _ = exit_tx.send(status);

    if expected {
        info!(pid, artifact = %artifact, ?code, "Renderer exited");
    } else {
        warn!(pid, artifact = %artifact, ?code, "Renderer exited unexpectedly");
    }

    let Some(inner) = inner.upgrade() else {
        return;
    };
    let _ = inner.events.send(SupervisorEvent::Exited {
        pid,
        artifact,
        code,
        expected,
    });

    if expected {
        return;
    }

    let mut slot = inner.slot.lock().await;
    if slot.as_ref().map(|live| live.generation) == Some(generation) {
        slot.take();
        inner.state.send_replace(RendererState::Idle);
    }
}

fn forward_output(child: &mut Child, pid: u32) {
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(pid, "renderer: {}", line);
            }
        });
    }

    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                warn!(pid, "renderer: {}", line);
            }
        });
    }
}

/// Ask the renderer to exit. A process that is already gone is not an error.
#[cfg(unix)]
fn interrupt(pid: u32) {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        warn!(pid, "Renderer pid out of range, not signalling");
        return;
    };
    match kill(Pid::from_raw(raw), Signal::SIGINT) {
        Ok(()) => debug!(pid, "Sent SIGINT to renderer"),
        Err(Errno::ESRCH) => debug!(pid, "Renderer already gone"),
        Err(e) => warn!(pid, error = %e, "Failed to signal renderer"),
    }
}

#[cfg(not(unix))]
fn interrupt(pid: u32) {
    warn!(pid, "Graceful interrupt is unsupported on this platform, waiting for exit");
}
