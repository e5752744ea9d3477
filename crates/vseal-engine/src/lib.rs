//! vseal-engine: the async facade over vseal-crypto
//!
//! [`CryptoEngine`] runs every operation on a bounded pool of blocking
//! workers, publishes its status over a `watch` channel and an event stream,
//! and keeps Prometheus counters plus a periodically sampled
//! [`EncryptionMetrics`](vseal_core::EncryptionMetrics) snapshot.

pub mod engine;
pub mod events;
pub mod metrics;
pub mod telemetry;

pub use engine::CryptoEngine;
pub use events::EngineEvent;
pub use metrics::EngineMetrics;
pub use telemetry::init_logging;
