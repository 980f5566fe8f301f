//! # Telemetry Appender Demo
//!
//! End-to-end demonstration of the appender against a simulated backend.
//!
//! Shows:
//! - A custom `Connection` / `ConnectionFactory` pair using native async traits
//! - Key-prefix routing inside the factory (an `AIF-` key selects the
//!   alternate collection endpoint, as real backends do)
//! - Events logged before the connection resolves, queued and delivered
//! - Default-property merging and payload sanitization
//! - The single flush/drain cycle that ends the appender's life
//!
//! ## Running
//!
//! ```bash
//! cargo run -p telemetry-appender --bin demo
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use telemetry_appender::{
    Appender, ClientSource, Connection, ConnectionBoxed, ConnectionError, ConnectionFactory,
    ConnectionFactoryBoxed, Envelope, EventData, PropertyValue,
};

const DEFAULT_ENDPOINT: &str = "https://collect.example.com/v2/track";
const ALTERNATE_ENDPOINT: &str = "https://mobile.collect.example.com/v1";

/// Simulated backend connection: buffers events, "transmits" on flush.
struct SimulatedConnection {
    endpoint: String,
    buffer: Mutex<Vec<Envelope>>,
    transmitted: AtomicU64,
}

impl SimulatedConnection {
    fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            buffer: Mutex::new(Vec::new()),
            transmitted: AtomicU64::new(0),
        }
    }
}

impl Connection for SimulatedConnection {
    fn send(&self, event: Envelope) -> Result<(), ConnectionError> {
        let json = serde_json::to_string(&event)
            .map_err(|e| ConnectionError::Rejected(e.to_string()))?;
        println!("  [buffer] {json}");
        self.buffer
            .lock()
            .map_err(|_| ConnectionError::Transport("buffer poisoned".to_string()))?
            .push(event);
        Ok(())
    }

    async fn flush(&self) -> Result<(), ConnectionError> {
        // Simulated network round-trip
        tokio::time::sleep(Duration::from_millis(150)).await;
        let drained = {
            let mut buffer = self
                .buffer
                .lock()
                .map_err(|_| ConnectionError::Transport("buffer poisoned".to_string()))?;
            std::mem::take(&mut *buffer)
        };
        self.transmitted
            .fetch_add(drained.len() as u64, Ordering::Relaxed);
        println!(
            "  [flush] transmitted {} event(s) to {}",
            drained.len(),
            self.endpoint
        );
        Ok(())
    }
}

/// Factory with key-prefix endpoint routing and simulated setup latency.
struct SimulatedFactory;

impl ConnectionFactory for SimulatedFactory {
    async fn create(&self, key: &str) -> Result<Arc<dyn ConnectionBoxed>, ConnectionError> {
        println!("  [factory] resolving connection for key {key}...");
        tokio::time::sleep(Duration::from_millis(300)).await;

        // Routing is decided once, here, from the key alone
        let endpoint = if key.starts_with("AIF-") {
            ALTERNATE_ENDPOINT
        } else {
            DEFAULT_ENDPOINT
        };

        println!("  [factory] connected to {endpoint}");
        Ok(Arc::new(SimulatedConnection::new(endpoint)) as Arc<dyn ConnectionBoxed>)
    }
}

#[tokio::main]
async fn main() {
    println!("=== Telemetry Appender Demo ===\n");

    let mut defaults = HashMap::new();
    defaults.insert("app.version".to_string(), PropertyValue::from("1.4.2"));
    defaults.insert("os".to_string(), PropertyValue::from(std::env::consts::OS));

    let appender = Appender::new(
        "demoapp",
        Some(defaults),
        ClientSource::Key {
            key: "AIF-0123456789".to_string(),
            factory: Arc::new(SimulatedFactory) as Arc<dyn ConnectionFactoryBoxed>,
        },
    );

    println!("Logging events while the connection is still resolving:");
    appender.log(
        "startup",
        Some(EventData::new().with_measurement("boot_ms", 812.0)),
    );
    appender.log(
        "editor/open",
        Some(
            EventData::new()
                .with_property("language", "rust")
                .with_property("os", "overridden-by-event"),
        ),
    );
    appender.log("command", Some(EventData::new().with_property("id", "save")));

    println!("\nFlushing (awaits connection setup, then backend drain):");
    appender.flush().await;

    println!("\nAfter flush the appender is permanently disabled:");
    appender.log("ignored", None);
    appender.flush().await;
    println!("  [demo] post-flush log/flush were no-ops");

    println!("\n=== Demo complete ===");
}
