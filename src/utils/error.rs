use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors reported by [`start`](crate::controller::ServerLifecycleController::start).
#[derive(Error, Debug)]
pub enum StartError {
    /// The configured root directory does not exist or cannot be read.
    #[error("directory not found or not readable: {}", .0.display())]
    InvalidDirectory(PathBuf),

    /// The configured port is outside the valid 1-65535 range.
    #[error("port number must be between 1 and 65535")]
    InvalidPort,

    /// Binding the listening socket failed, typically because the port is
    /// already taken or needs elevated privileges. Carries the OS reason.
    #[error("could not bind port {port}: {source}")]
    PortInUse {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// A server is already running under this controller.
    #[error("server is already running")]
    AlreadyRunning,
}

/// Errors reported by [`stop`](crate::controller::ServerLifecycleController::stop).
#[derive(Error, Debug)]
pub enum StopError {
    /// No server is currently running; stopping is a harmless no-op.
    #[error("no server is running")]
    NotRunning,

    /// The serve loop did not confirm shutdown within the grace period.
    /// The shutdown signal has already been sent and the serving thread
    /// detached, so the port is still released as soon as the loop notices.
    #[error("server did not confirm shutdown within {0:?}")]
    TimedOut(Duration),
}

/// Error raised when loading or validating environment configuration.
#[derive(Error, Debug)]
#[error("configuration error: {0}")]
pub struct ConfigError(pub String);
