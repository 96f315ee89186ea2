//! Server lifecycle management.
//!
//! The controller owns at most one running [`StaticFileServer`] and drives
//! it through `Idle -> Starting -> Running -> Stopping -> Idle`, with
//! `Failed` as the idle-after-error state a failed start falls back to.
//! `start` and `stop` are serialized against each other; the lifecycle state
//! lives under its own short-lived lock so `current_state` never waits out a
//! stop in progress.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::server::log::{LogEmitter, LogRecord};
use crate::server::{ShutdownHandle, StaticFileServer};
use crate::utils::error::{StartError, StopError};

/// How long `stop` waits for the serve loop to confirm before detaching.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Lifecycle state as observed by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// No server running.
    Idle,
    /// `start` is validating and binding.
    Starting,
    /// The serving thread is live.
    Running,
    /// `stop` is waiting for the serve loop to unblock.
    Stopping,
    /// No server running after a failed start; `start` may be retried.
    Failed,
}

/// One running server instance: its shutdown signal, its OS thread, and the
/// channel the thread signals completion on.
struct ServerHandle {
    shutdown: ShutdownHandle,
    thread: thread::JoinHandle<()>,
    done_rx: mpsc::Receiver<()>,
}

struct Ops {
    handle: Option<ServerHandle>,
    log_tx: Option<mpsc::Sender<LogRecord>>,
}

/// Owns zero-or-one running server and exposes the control API consumed by
/// the GUI/CLI collaborator.
pub struct ServerLifecycleController {
    ops: Mutex<Ops>,
    state: Mutex<LifecycleState>,
    grace_period: Duration,
}

impl Default for ServerLifecycleController {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerLifecycleController {
    pub fn new() -> Self {
        Self::with_grace_period(DEFAULT_GRACE_PERIOD)
    }

    /// Controller whose `stop` waits at most `grace_period` for shutdown
    /// confirmation.
    pub fn with_grace_period(grace_period: Duration) -> Self {
        Self {
            ops: Mutex::new(Ops {
                handle: None,
                log_tx: None,
            }),
            state: Mutex::new(LifecycleState::Idle),
            grace_period,
        }
    }

    /// Registers the callback that receives every [`LogRecord`].
    ///
    /// Intended to be called once, before `start`. A dedicated forwarder
    /// thread drains the record channel and invokes the callback one record
    /// at a time in generation order, so the callback needs no thread-safety
    /// of its own. Registering again replaces the sink for servers started
    /// afterwards.
    pub fn register_log_sink<F>(&self, sink: F)
    where
        F: Fn(LogRecord) + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<LogRecord>();
        thread::Builder::new()
            .name("dirserve-log-sink".into())
            .spawn(move || {
                // exits once every emitter clone has been dropped
                for record in rx {
                    sink(record);
                }
            })
            .expect("failed to spawn log sink thread");
        self.ops.lock().unwrap().log_tx = Some(tx);
    }

    /// Starts serving `root_directory` on `port`. Non-blocking: returns as
    /// soon as the serving thread is live, leaving it to run until `stop`.
    ///
    /// # Errors
    /// `InvalidPort` for port 0, `InvalidDirectory` if the directory is
    /// missing or unreadable, `AlreadyRunning` if a server is up, and
    /// `PortInUse` if binding fails — in which case the spawned thread has
    /// already been joined and a retry with another port is safe.
    pub fn start(&self, root_directory: impl Into<PathBuf>, port: u16) -> Result<(), StartError> {
        let root = root_directory.into();
        let mut ops = self.ops.lock().unwrap();

        if ops.handle.is_some() {
            return Err(StartError::AlreadyRunning);
        }
        if port == 0 {
            return Err(StartError::InvalidPort);
        }
        if !root.is_dir() || std::fs::read_dir(&root).is_err() {
            return Err(StartError::InvalidDirectory(root));
        }

        self.set_state(LifecycleState::Starting);
        let emitter = LogEmitter::new(ops.log_tx.clone());

        let (server, shutdown) = StaticFileServer::new(root.clone(), port, emitter.clone());
        let (ready_tx, ready_rx) = mpsc::channel::<io::Result<SocketAddr>>();
        let (done_tx, done_rx) = mpsc::channel::<()>();
        let thread = thread::Builder::new()
            .name("dirserve-accept".into())
            .spawn(move || {
                server.serve(&ready_tx);
                let _ = done_tx.send(());
            })
            .expect("failed to spawn server thread");

        // bind happens on the serving thread; wait for its verdict so bind
        // errors surface synchronously to the caller
        let bind_outcome = ready_rx.recv().unwrap_or_else(|_| {
            Err(io::Error::new(
                io::ErrorKind::Other,
                "server thread exited before reporting bind status",
            ))
        });

        match bind_outcome {
            Ok(addr) => {
                emitter.emit(LogRecord::lifecycle(format!(
                    "serving {} at http://{addr}",
                    root.display()
                )));
                info!("serving {} at {addr}", root.display());
                ops.handle = Some(ServerHandle {
                    shutdown,
                    thread,
                    done_rx,
                });
                self.set_state(LifecycleState::Running);
                Ok(())
            }
            Err(source) => {
                // serve() returned right after reporting, so this join is
                // immediate and no thread or socket is left behind
                let _ = thread.join();
                let err = StartError::PortInUse { port, source };
                emitter.emit(LogRecord::lifecycle(format!(
                    "error starting server on port {port}: {err}"
                )));
                error!("start failed: {err}");
                self.set_state(LifecycleState::Failed);
                Err(err)
            }
        }
    }

    /// Stops the running server, waiting up to the grace period for the
    /// listening socket to be released.
    ///
    /// Idempotent: stopping while nothing runs reports `NotRunning` and
    /// changes nothing. On `TimedOut` the shutdown signal has been sent and
    /// the thread detached; the port is released as soon as the loop
    /// notices.
    pub fn stop(&self) -> Result<(), StopError> {
        let mut ops = self.ops.lock().unwrap();
        let Some(handle) = ops.handle.take() else {
            return Err(StopError::NotRunning);
        };

        self.set_state(LifecycleState::Stopping);
        let emitter = LogEmitter::new(ops.log_tx.clone());
        handle.shutdown.request_shutdown();

        match handle.done_rx.recv_timeout(self.grace_period) {
            Ok(()) => {
                let _ = handle.thread.join();
                self.set_state(LifecycleState::Idle);
                // only emitted once the socket is actually released, and
                // through the same channel as the request records, so it is
                // delivered after all of them
                emitter.emit(LogRecord::lifecycle("server stopped".into()));
                info!("server stopped");
                Ok(())
            }
            Err(_) => {
                self.set_state(LifecycleState::Idle);
                emitter.emit(LogRecord::lifecycle(format!(
                    "server did not confirm shutdown within {:?}; detaching",
                    self.grace_period
                )));
                warn!("shutdown confirmation timed out; serving thread detached");
                Err(StopError::TimedOut(self.grace_period))
            }
        }
    }

    /// Current lifecycle state, queryable at any time.
    pub fn current_state(&self) -> LifecycleState {
        *self.state.lock().unwrap()
    }

    fn set_state(&self, state: LifecycleState) {
        *self.state.lock().unwrap() = state;
    }
}

impl Drop for ServerLifecycleController {
    /// Best-effort stop so a host process exiting does not leak a bound
    /// port across process lifetimes.
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
