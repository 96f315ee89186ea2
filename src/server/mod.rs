// src/server/mod.rs
pub mod handler;
pub mod http;
pub mod log;
pub mod static_files;

// Re-export public components
pub use handler::RequestContext;
pub use log::{LogEmitter, LogRecord};

// Import internal dependencies
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::watch;
use tracing::{error, info};

/// Listen backlog for the accept socket.
const BACKLOG: u32 = 128;

/// A static-file server bound to one root directory and one port.
///
/// Construction wires in everything the serve loop needs — root, port and
/// log emitter — so request handling never consults shared mutable state.
/// [`serve`](Self::serve) runs the blocking accept loop on the calling
/// thread; shutdown is requested through the paired [`ShutdownHandle`].
pub struct StaticFileServer {
    root_dir: PathBuf,
    port: u16,
    emitter: LogEmitter,
    shutdown: watch::Receiver<bool>,
}

/// Signals the serve loop to stop. Safe to use from any thread.
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    /// Asks the serve loop to unblock and release the listening socket.
    /// A no-op when the loop is not (or no longer) running.
    pub fn request_shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

impl StaticFileServer {
    /// Creates a server and its shutdown handle. Binding happens inside
    /// [`serve`](Self::serve) so the whole socket lifetime stays on the
    /// serving thread.
    pub fn new(root_dir: PathBuf, port: u16, emitter: LogEmitter) -> (Self, ShutdownHandle) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        (
            Self {
                root_dir,
                port,
                emitter,
                shutdown: shutdown_rx,
            },
            ShutdownHandle { tx: shutdown_tx },
        )
    }

    /// Binds the listener and serves requests until shutdown is requested.
    ///
    /// Blocks the calling thread for the server's entire lifetime; the
    /// controller runs it on a dedicated thread. The bind outcome is
    /// reported through `ready` before any request is served, so the caller
    /// can surface bind errors synchronously. On bind failure no socket and
    /// no task is left behind.
    ///
    /// When the loop exits the listener has been dropped and the port is
    /// free to rebind; in-flight requests are abandoned with the runtime.
    pub fn serve(self, ready: &mpsc::Sender<io::Result<SocketAddr>>) {
        let Self {
            root_dir,
            port,
            emitter,
            mut shutdown,
        } = self;

        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                let _ = ready.send(Err(e));
                return;
            }
        };

        runtime.block_on(async move {
            let listener = match bind_listener(port) {
                Ok(listener) => listener,
                Err(e) => {
                    let _ = ready.send(Err(e));
                    return;
                }
            };
            let addr = match listener.local_addr() {
                Ok(addr) => addr,
                Err(e) => {
                    let _ = ready.send(Err(e));
                    return;
                }
            };
            let _ = ready.send(Ok(addr));
            info!("listening on {addr}");

            let ctx = Arc::new(RequestContext { root_dir, emitter });
            loop {
                tokio::select! {
                    accepted = listener.accept() => match accepted {
                        Ok((stream, peer)) => {
                            let ctx = Arc::clone(&ctx);
                            tokio::spawn(async move {
                                handler::handle_connection(stream, peer, ctx).await;
                            });
                        }
                        Err(e) => error!("failed to accept connection: {e}"),
                    },
                    // fires on request_shutdown() and when the handle is
                    // dropped; both mean stop
                    _ = shutdown.changed() => break,
                }
            }
            info!("accept loop stopped, releasing port {}", addr.port());
        });
    }
}

/// Binds `0.0.0.0:<port>` with `SO_REUSEADDR`. Without it, a stop/start
/// cycle on the same port fails while old connections sit in TIME_WAIT.
fn bind_listener(port: u16) -> io::Result<TcpListener> {
    let socket = TcpSocket::new_v4()?;
    socket.set_reuseaddr(true)?;
    socket.bind(SocketAddr::from(([0, 0, 0, 0], port)))?;
    socket.listen(BACKLOG)
}
