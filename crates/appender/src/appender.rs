//! The telemetry appender.
//!
//! `Appender` accepts events from synchronous call sites and forwards them
//! to a lazily-connected backend. All backend work happens on a single
//! dispatch task: it resolves the connection exactly once, drains queued
//! events, and acknowledges flush requests. Callers never block on the
//! backend and never observe its failures.

use crate::connection::{ConnectionBoxed, ConnectionError, ConnectionFactoryBoxed};
use crate::event::{Envelope, EventData, PropertyValue};
use crate::sink::{ErrorSink, StderrSink};
use crate::validation::{merge_defaults, sanitize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, oneshot};

/// Where the appender's backend connection comes from.
pub enum ClientSource {
    /// Telemetry is off; every operation is a no-op.
    Disabled,
    /// A client key, resolved through the factory on first use.
    Key {
        /// Opaque client identifier handed to the factory.
        key: String,
        /// Factory that turns the key into a connection.
        factory: Arc<dyn ConnectionFactoryBoxed>,
    },
    /// A pre-built connection, bypassing the factory. Intended for tests.
    Established(Arc<dyn ConnectionBoxed>),
}

/// What the dispatch task awaits to obtain its connection.
enum ConnectSource {
    Key {
        key: String,
        factory: Arc<dyn ConnectionFactoryBoxed>,
    },
    Established(Arc<dyn ConnectionBoxed>),
}

impl ConnectSource {
    async fn connect(self) -> Result<Arc<dyn ConnectionBoxed>, ConnectionError> {
        match self {
            Self::Key { key, factory } => factory.create_boxed(&key).await,
            Self::Established(connection) => Ok(connection),
        }
    }
}

/// Commands sent to the dispatch task.
enum Command {
    Track(Envelope),
    Flush(oneshot::Sender<()>),
}

/// Connection lifecycle of one appender instance.
///
/// `Unresolved -> Running` happens on the first `log`/`flush`; the
/// pending -> resolved transition lives inside the dispatch task, which is
/// spawned at most once. `Drained` is terminal and doubles as the disabled
/// state.
enum DispatchState {
    Unresolved(ConnectSource),
    Running(mpsc::UnboundedSender<Command>),
    Drained,
}

/// Forwards structured telemetry events to a backend connection.
///
/// The connection is initialized lazily and exactly once, on the first
/// `log` or `flush`. Events submitted before initialization completes are
/// queued and delivered in submission order once it does. `log` and `flush`
/// never return errors and never panic over backend failures; setup
/// failures surface only through the configured [`ErrorSink`].
///
/// `log` and `flush` must be called from within a Tokio runtime.
pub struct Appender {
    event_prefix: String,
    default_properties: HashMap<String, PropertyValue>,
    state: Mutex<DispatchState>,
    sink: Arc<dyn ErrorSink>,
}

impl Appender {
    /// Creates an appender.
    ///
    /// Never blocks and never contacts the backend. With
    /// [`ClientSource::Disabled`] the instance is permanently inert.
    /// Absent `default_properties` are treated as an empty set; the map is
    /// owned from here on and merged into every event.
    pub fn new(
        event_prefix: impl Into<String>,
        default_properties: Option<HashMap<String, PropertyValue>>,
        source: ClientSource,
    ) -> Self {
        let state = match source {
            ClientSource::Disabled => DispatchState::Drained,
            ClientSource::Key { key, factory } => {
                DispatchState::Unresolved(ConnectSource::Key { key, factory })
            }
            ClientSource::Established(connection) => {
                DispatchState::Unresolved(ConnectSource::Established(connection))
            }
        };

        Self {
            event_prefix: event_prefix.into(),
            default_properties: default_properties.unwrap_or_default(),
            state: Mutex::new(state),
            sink: Arc::new(StderrSink),
        }
    }

    /// Replaces the default stderr error sink. Call before first use.
    pub fn with_error_sink(mut self, sink: Arc<dyn ErrorSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Submits an event. Fire-and-forget: never suspends, never fails.
    ///
    /// `data` is merged with the default properties (event data wins on
    /// collision), sanitized, and sent as `{prefix}/{event_name}`. No-op on
    /// a disabled or flushed instance.
    pub fn log(&self, event_name: &str, data: Option<EventData>) {
        let Some(tx) = self.dispatch_sender() else {
            return;
        };

        let merged = merge_defaults(data.unwrap_or_default(), &self.default_properties);
        let clean = sanitize(merged);
        let envelope = Envelope {
            name: format!("{}/{}", self.event_prefix, event_name),
            properties: clean.properties,
            measurements: clean.measurements,
        };

        // Dispatch task is gone after a failed setup; the event is dropped.
        let _ = tx.send(Command::Track(envelope));
    }

    /// Drains buffered events and permanently disables the instance.
    ///
    /// Resolves once the backend acknowledges that all buffered data is
    /// transmitted; resolves immediately on a disabled or already-flushed
    /// instance. If connection setup failed (or the backend's own flush
    /// fails), the returned future never resolves — no retry is scheduled.
    pub async fn flush(&self) {
        let Some(tx) = self.dispatch_sender() else {
            return;
        };

        let (ack_tx, ack_rx) = oneshot::channel();
        if tx.send(Command::Flush(ack_tx)).is_err() {
            // Setup already failed; the completion signal must not fire.
            std::future::pending::<()>().await;
        }

        match ack_rx.await {
            Ok(()) => self.mark_drained(),
            Err(_) => std::future::pending::<()>().await,
        }
    }

    /// Returns the dispatch channel, spawning the dispatch task on the
    /// `Unresolved -> Running` transition. `None` once drained.
    fn dispatch_sender(&self) -> Option<mpsc::UnboundedSender<Command>> {
        let mut state = self.lock_state();
        match std::mem::replace(&mut *state, DispatchState::Drained) {
            DispatchState::Running(tx) => {
                *state = DispatchState::Running(tx.clone());
                Some(tx)
            }
            DispatchState::Drained => None,
            DispatchState::Unresolved(source) => {
                let (tx, rx) = mpsc::unbounded_channel();
                tokio::spawn(run_dispatch(source, rx, Arc::clone(&self.sink)));
                *state = DispatchState::Running(tx.clone());
                Some(tx)
            }
        }
    }

    fn mark_drained(&self) {
        *self.lock_state() = DispatchState::Drained;
    }

    fn lock_state(&self) -> MutexGuard<'_, DispatchState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// The dispatch task: one per appender instance, spawned at most once.
///
/// Resolves the connection, then drains commands in FIFO order. A setup
/// failure is reported to the sink exactly once; queued and future commands
/// are then dropped, and withheld flush acknowledgements leave their
/// completion signals pending.
async fn run_dispatch(
    source: ConnectSource,
    mut rx: mpsc::UnboundedReceiver<Command>,
    sink: Arc<dyn ErrorSink>,
) {
    let connection = match source.connect().await {
        Ok(connection) => connection,
        Err(err) => {
            sink.report(&err);
            return;
        }
    };

    let mut flushed = false;
    while let Some(command) = rx.recv().await {
        match command {
            Command::Track(envelope) => {
                if flushed {
                    continue;
                }
                // The backend send path can raise on busy systems; a lost
                // event must not disturb the host application.
                let _ = connection.send(envelope);
            }
            Command::Flush(ack) => {
                if flushed {
                    // Connection-level flush runs at most once per instance.
                    let _ = ack.send(());
                    continue;
                }
                match connection.flush_boxed().await {
                    Ok(()) => {
                        flushed = true;
                        let _ = ack.send(());
                    }
                    Err(_) => {
                        // Discarded; withholding the ack leaves this flush
                        // pending while the instance stays usable.
                        drop(ack);
                    }
                }
            }
        }
    }
}
