use std::time::Duration;

use vseal_core::{EncryptionMetrics, EngineStatus, OperationKind, RotationStatus};

/// Broadcast to every `CryptoEngine::subscribe` receiver.
///
/// Slow receivers lag and lose the oldest events; the current status is
/// always available from the `watch` channel instead.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    StatusChanged {
        operation: OperationKind,
        status: EngineStatus,
    },
    OperationFinished {
        operation: OperationKind,
        success: bool,
        duration: Duration,
    },
    RotationStatusChanged(RotationStatus),
    /// Periodic sample, every `metrics_update_interval_secs`
    Metrics(EncryptionMetrics),
    ConfigurationChanged {
        supported_algorithms: usize,
    },
    ShutDown,
}
