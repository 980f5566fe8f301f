//! Error sink for failures that never reach the caller.
//!
//! The appender's public methods have no failure exit path; everything that
//! goes wrong in the background surfaces through this one-way channel.

use crate::connection::ConnectionError;

/// One-way reporting channel for asynchronous connection failures.
pub trait ErrorSink: Send + Sync {
    /// Reports a failure observed by the dispatch task.
    fn report(&self, err: &ConnectionError);
}

/// Default sink writing to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrSink;

impl ErrorSink for StderrSink {
    fn report(&self, err: &ConnectionError) {
        eprintln!("telemetry connection error: {err}");
    }
}
