//! Telemetry Event Appender
//!
//! Forwards structured usage/diagnostic events to a remote telemetry
//! backend while tolerating backend unavailability and deferred connection
//! setup. The backend connection is initialized lazily and exactly once per
//! appender instance; events submitted before initialization completes are
//! queued behind it and delivered once it resolves.
//!
//! Telemetry must never destabilize the host application: `log` and
//! `flush` have no failure exit path. Backend failures are either absorbed
//! or reported through a one-way [`ErrorSink`].
//!
//! The backend itself is consumed as a capability — a [`ConnectionFactory`]
//! that turns a client key into a [`Connection`] — so the transport, retry
//! caching, and wire format live entirely outside this crate.

pub mod appender;
pub mod connection;
pub mod event;
pub mod sink;
pub mod validation;

// Re-export main types
pub use appender::{Appender, ClientSource};
pub use connection::{
    Connection, ConnectionBoxed, ConnectionError, ConnectionFactory, ConnectionFactoryBoxed,
};
pub use event::{Envelope, EventData, PropertyValue};
pub use sink::{ErrorSink, StderrSink};
pub use validation::{merge_defaults, sanitize};
