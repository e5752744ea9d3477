//! Engine metrics
//!
//! Two views over the same counters:
//!   - a Prometheus registry (`vseal_operations_total{operation,outcome}`,
//!     `vseal_operation_duration_seconds{operation}`, `vseal_bytes_processed_total`),
//!     text-encoded on demand
//!   - the [`EncryptionMetrics`] snapshot, whose ops/sec figure is
//!     recomputed by the sampler at every window boundary

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use prometheus_client::{
    encoding::text::encode,
    metrics::{counter::Counter, family::Family, histogram::Histogram},
    registry::Registry,
};
use vseal_core::{EncryptionMetrics, OperationKind};

type Labels = Vec<(String, String)>;

pub struct EngineMetrics {
    registry: Registry,
    operations: Family<Labels, Counter>,
    duration: Family<Labels, Histogram>,
    bytes: Counter,

    total: AtomicU64,
    window: AtomicU64,
    window_started: Mutex<Instant>,
    /// f64 bits of the last sampled rate
    rate: AtomicU64,
    /// Epoch seconds; 0 = never rotated
    last_rotation: AtomicU64,
    supported: AtomicUsize,
}

impl EngineMetrics {
    pub fn new(supported_algorithms: usize) -> Self {
        let mut registry = Registry::default();
        let operations = Family::<Labels, Counter>::default();
        let duration = Family::<Labels, Histogram>::new_with_constructor(|| {
            Histogram::new([0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0])
        });
        let bytes = Counter::default();

        registry.register(
            "vseal_operations",
            "Engine operations by operation and outcome",
            operations.clone(),
        );
        registry.register(
            "vseal_operation_duration_seconds",
            "Operation duration in seconds",
            duration.clone(),
        );
        registry.register(
            "vseal_bytes_processed",
            "Plaintext bytes encrypted or decrypted",
            bytes.clone(),
        );

        Self {
            registry,
            operations,
            duration,
            bytes,
            total: AtomicU64::new(0),
            window: AtomicU64::new(0),
            window_started: Mutex::new(Instant::now()),
            rate: AtomicU64::new(0f64.to_bits()),
            last_rotation: AtomicU64::new(0),
            supported: AtomicUsize::new(supported_algorithms),
        }
    }

    pub fn record(&self, operation: OperationKind, success: bool, elapsed: Duration) {
        let outcome = if success { "success" } else { "failure" };
        self.operations
            .get_or_create(&vec![
                ("operation".to_string(), operation.as_str().to_string()),
                ("outcome".to_string(), outcome.to_string()),
            ])
            .inc();
        self.duration
            .get_or_create(&vec![(
                "operation".to_string(),
                operation.as_str().to_string(),
            )])
            .observe(elapsed.as_secs_f64());

        self.total.fetch_add(1, Ordering::Relaxed);
        self.window.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bytes(&self, bytes: u64) {
        self.bytes.inc_by(bytes);
    }

    pub fn record_rotation(&self, at: u64) {
        self.last_rotation.store(at, Ordering::Relaxed);
    }

    pub fn set_supported_algorithms(&self, count: usize) {
        self.supported.store(count, Ordering::Relaxed);
    }

    /// Close the current window: recompute ops/sec and start a new window.
    pub fn sample(&self) -> EncryptionMetrics {
        let mut started = self
            .window_started
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let elapsed = started.elapsed().as_secs_f64();
        let ops = self.window.swap(0, Ordering::Relaxed);
        *started = Instant::now();
        drop(started);

        let rate = if elapsed > 0.0 {
            ops as f64 / elapsed
        } else {
            0.0
        };
        self.rate.store(rate.to_bits(), Ordering::Relaxed);
        self.snapshot()
    }

    /// Current snapshot. `operations_per_second` is from the last sample.
    pub fn snapshot(&self) -> EncryptionMetrics {
        let last_rotation = self.last_rotation.load(Ordering::Relaxed);
        EncryptionMetrics {
            total_operations: self.total.load(Ordering::Relaxed),
            operations_per_second: f64::from_bits(self.rate.load(Ordering::Relaxed)),
            last_key_rotation: (last_rotation > 0).then_some(last_rotation),
            supported_algorithms: self.supported.load(Ordering::Relaxed),
        }
    }

    /// Prometheus text exposition format
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut body = String::new();
        encode(&mut body, &self.registry)?;
        Ok(body)
    }
}

impl std::fmt::Debug for EngineMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineMetrics")
            .field("snapshot", &self.snapshot())
            .finish_non_exhaustive()
    }
}
