//! Telemetry store adapters.

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::InMemoryTelemetryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteTelemetryStore;
