//! # dirserve
//!
//! A controllable local HTTP static-file server: point it at a directory and
//! a port, and it serves the directory's files while streaming structured
//! access-log records to a registered observer. A narrow control API drives
//! clean start/stop lifecycle transitions, so a GUI, CLI, or test harness can
//! manage the server without touching its internals.
//!
//! ## Features
//! - Static-file delivery with content-type inference, `index.html`
//!   resolution, and directory listings
//! - Root-escape protection: `..`-traversal can never read outside the
//!   served directory
//! - Start/stop lifecycle with a bounded-wait shutdown guarantee
//! - Ordered access-log delivery to a caller-supplied sink, marshalled onto
//!   a single forwarder thread
//! - Environment-based configuration loading
//!
//! ## Dependencies
//! - `tokio` for asynchronous networking on the serving thread
//! - `tracing` for internal diagnostics
//! - `thiserror` for the error taxonomy
//! - `config` + `dotenv` for environment configuration
//! - `jiff` for access-log timestamps

pub mod config;
pub mod controller;
pub mod server;
pub mod utils;

pub use config::ServerConfig;
pub use controller::{LifecycleState, ServerLifecycleController, DEFAULT_GRACE_PERIOD};
pub use server::log::LogRecord;
pub use utils::error::{ConfigError, StartError, StopError};
