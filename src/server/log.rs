//! Access-log records and their delivery channel.
//!
//! Every handled request and every lifecycle transition produces one
//! [`LogRecord`]. Records are handed to a [`LogEmitter`], which forwards them
//! over an unbounded channel without ever blocking the request/response
//! cycle; the controller's forwarder thread drains the channel and invokes
//! the registered sink one record at a time, in generation order.

use std::fmt;
use std::sync::mpsc;

use jiff::Zoned;
use tracing::debug;

/// A single access-log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Peer address for request records, `-` for lifecycle records.
    pub client_address: String,
    /// Local wall-clock time at which the record was generated.
    pub timestamp: String,
    /// Human-readable summary of the request line and response status, or of
    /// the lifecycle event.
    pub summary: String,
}

impl LogRecord {
    /// Builds the record for a handled request.
    pub fn request(client_address: &str, summary: String) -> Self {
        Self {
            client_address: client_address.to_owned(),
            timestamp: local_time(),
            summary,
        }
    }

    /// Builds a synthetic record for a lifecycle event ("serving at ...",
    /// "server stopped", error text).
    pub fn lifecycle(summary: String) -> Self {
        Self {
            client_address: "-".to_owned(),
            timestamp: local_time(),
            summary,
        }
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - - [{}] {}",
            self.client_address, self.timestamp, self.summary
        )
    }
}

fn local_time() -> String {
    Zoned::now().strftime("%d/%b/%Y %H:%M:%S").to_string()
}

/// Cloneable, non-blocking producer side of the log channel.
///
/// Constructed by the controller and injected into the server at
/// construction time; the handler never reaches into shared mutable state to
/// find its sink.
#[derive(Clone)]
pub struct LogEmitter {
    tx: Option<mpsc::Sender<LogRecord>>,
}

impl LogEmitter {
    /// Creates an emitter. With `None` no sink is registered and records are
    /// only surfaced through `tracing`.
    pub fn new(tx: Option<mpsc::Sender<LogRecord>>) -> Self {
        Self { tx }
    }

    /// Emits one record. Never blocks; if the forwarder thread has gone
    /// away the record is dropped silently.
    pub fn emit(&self, record: LogRecord) {
        debug!(target: "dirserve::access", "{record}");
        if let Some(tx) = &self.tx {
            let _ = tx.send(record);
        }
    }
}
