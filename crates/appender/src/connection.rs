use crate::event::Envelope;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// Error types for backend connection operations
#[derive(Debug, Error, Clone)]
pub enum ConnectionError {
    /// Connection setup failed (factory rejected the client key)
    #[error("connection setup failed: {0}")]
    Setup(String),
    /// Transport-layer error during send or flush
    #[error("transport error: {0}")]
    Transport(String),
    /// The backend refused or dropped the payload
    #[error("payload rejected: {0}")]
    Rejected(String),
}

/// An established link to the telemetry backend.
///
/// Uses native async fn in traits for `flush`. For dynamic dispatch use
/// [`ConnectionBoxed`]; a blanket impl covers every `Connection`.
///
/// `send` hands the event to the backend's internal buffering and is
/// fire-and-forget from the appender's point of view; it may still fail
/// synchronously on a busy backend, and callers of the appender never see
/// that failure.
pub trait Connection: Send + Sync {
    /// Submits one event to the backend's outbound buffer.
    fn send(&self, event: Envelope) -> Result<(), ConnectionError>;

    /// Completes once all buffered data has been transmitted.
    fn flush(&self) -> impl Future<Output = Result<(), ConnectionError>> + Send;
}

/// Object-safe version of [`Connection`] for dynamic dispatch.
pub trait ConnectionBoxed: Send + Sync {
    /// Submits one event to the backend's outbound buffer.
    fn send(&self, event: Envelope) -> Result<(), ConnectionError>;

    /// Completes once all buffered data has been transmitted (boxed future
    /// for object safety).
    fn flush_boxed(&self) -> Pin<Box<dyn Future<Output = Result<(), ConnectionError>> + Send + '_>>;
}

/// Blanket implementation: any Connection can be used as ConnectionBoxed
impl<T: Connection> ConnectionBoxed for T {
    fn send(&self, event: Envelope) -> Result<(), ConnectionError> {
        Connection::send(self, event)
    }

    fn flush_boxed(&self) -> Pin<Box<dyn Future<Output = Result<(), ConnectionError>> + Send + '_>> {
        Box::pin(self.flush())
    }
}

/// Turns a client identifier into a backend connection, asynchronously.
///
/// Invoked at most once per appender instance. Implementations own any
/// routing decisions based on the identifier string — e.g. a distinguished
/// key prefix selecting an alternate collection endpoint.
pub trait ConnectionFactory: Send + Sync {
    /// Creates a connection for the given client key.
    fn create(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Arc<dyn ConnectionBoxed>, ConnectionError>> + Send;
}

/// Object-safe version of [`ConnectionFactory`] for dynamic dispatch.
pub trait ConnectionFactoryBoxed: Send + Sync {
    /// Creates a connection for the given client key (boxed future for
    /// object safety).
    fn create_boxed<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Arc<dyn ConnectionBoxed>, ConnectionError>> + Send + 'a>>;
}

/// Blanket implementation: any ConnectionFactory can be used as ConnectionFactoryBoxed
impl<T: ConnectionFactory> ConnectionFactoryBoxed for T {
    fn create_boxed<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Arc<dyn ConnectionBoxed>, ConnectionError>> + Send + 'a>>
    {
        Box::pin(self.create(key))
    }
}
