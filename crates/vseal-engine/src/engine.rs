//! The engine facade.
//!
//! Architecture:
//!   - every operation validates its algorithm against the catalog derived
//!     from the live configuration
//!   - crypto work runs under `spawn_blocking`, gated by a semaphore sized by
//!     `worker_threads`; the caller's task only awaits. Key rotation is
//!     bookkeeping and runs inline under the rotator lock
//!   - status is published over `watch` (latest value) and as
//!     [`EngineEvent`]s over `broadcast`
//!   - a sampler task recomputes [`EncryptionMetrics`] every
//!     `metrics_update_interval_secs` and broadcasts it
//!   - shutdown, per-handle cancellation and the per-operation timeout all
//!     surface as `SystemError`; blocking work already running finishes in
//!     the background and its result is dropped

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;
use vseal_core::{
    now_epoch, Algorithm, AlgorithmFamily, ConfigError, CryptographicKey, DerivedKey,
    EncryptionConfiguration, EncryptionMetrics, EncryptionResult, EngineError, EngineResult,
    EngineStatus, FileDecryptionResult, FileEncryptionResult, IntegrityValidationResult,
    KeyRotationResult, OperationKind, RotationStatus,
};
use vseal_crypto::{
    aead, catalog, integrity, kdf, keys, stream, AsymmetricEngine, CipherEngine, CryptoError,
    KeyRotator, KeyStore, PostQuantumEngine, SymmetricEngine, WrappedKey,
};
use zeroize::Zeroizing;

use crate::events::EngineEvent;
use crate::metrics::EngineMetrics;

const EVENT_CAPACITY: usize = 256;

/// One engine per algorithm family.
fn cipher_for(family: AlgorithmFamily) -> &'static dyn CipherEngine {
    match family {
        AlgorithmFamily::Symmetric => &SymmetricEngine,
        AlgorithmFamily::Asymmetric => &AsymmetricEngine,
        AlgorithmFamily::PostQuantum => &PostQuantumEngine,
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct EngineInner {
    config: RwLock<EncryptionConfiguration>,
    key_store: Arc<KeyStore>,
    rotator: Mutex<KeyRotator>,
    pool: Arc<Semaphore>,
    status: watch::Sender<EngineStatus>,
    events: broadcast::Sender<EngineEvent>,
    metrics: Arc<EngineMetrics>,
    sample_interval: watch::Sender<Duration>,
    shutdown: CancellationToken,
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        // stops the sampler; the key store zeroizes itself
        self.shutdown.cancel();
    }
}

/// Async crypto engine. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct CryptoEngine {
    inner: Arc<EngineInner>,
    cancel: Option<CancellationToken>,
}

impl CryptoEngine {
    /// Build an engine and start its metrics sampler.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: EncryptionConfiguration, key_store: KeyStore) -> anyhow::Result<Self> {
        config.validate()?;
        let runtime = Handle::try_current()
            .map_err(|e| anyhow::anyhow!("CryptoEngine requires a tokio runtime: {e}"))?;

        let workers = config.effective_worker_threads();
        let supported = catalog::supported_algorithms(&config).len();
        let metrics = Arc::new(EngineMetrics::new(supported));
        let (status, _) = watch::channel(EngineStatus::Idle);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (sample_interval, interval_rx) = watch::channel(config.metrics_update_interval());
        let shutdown = CancellationToken::new();

        runtime.spawn(run_sampler(
            metrics.clone(),
            events.clone(),
            interval_rx,
            shutdown.clone(),
        ));

        info!(
            workers,
            default_algorithm = %config.default_algorithm,
            post_quantum = config.enable_post_quantum_crypto,
            performance_optimization = config.performance_optimization,
            "crypto engine started"
        );
        if config.enable_key_escrow {
            warn!("enable_key_escrow is set but no escrow backend exists; keys are not escrowed");
        }

        Ok(Self {
            inner: Arc::new(EngineInner {
                config: RwLock::new(config),
                key_store: Arc::new(key_store),
                rotator: Mutex::new(KeyRotator::new()),
                pool: Arc::new(Semaphore::new(workers)),
                status,
                events,
                metrics,
                sample_interval,
                shutdown,
            }),
            cancel: None,
        })
    }

    /// A handle whose operations stop with `SystemError` once `token` is
    /// cancelled. State is shared with `self`.
    pub fn with_cancellation(&self, token: CancellationToken) -> Self {
        Self {
            inner: self.inner.clone(),
            cancel: Some(token),
        }
    }

    // ── Operations ────────────────────────────────────────────────────────

    /// Encrypt a buffer. `algorithm` defaults to the configured one and must
    /// match the key's algorithm.
    pub async fn encrypt(
        &self,
        data: Vec<u8>,
        algorithm: Option<Algorithm>,
        key: &CryptographicKey,
        associated_data: Option<Vec<u8>>,
    ) -> EngineResult<EncryptionResult> {
        let algorithm = self.resolve(algorithm);
        let supported = self.ensure_supported(algorithm);
        let key = key.clone();
        let len = data.len() as u64;

        let result = self
            .run(OperationKind::Encrypt, move |_| {
                supported?;
                cipher_for(algorithm.family()).encrypt(
                    &data,
                    algorithm,
                    &key,
                    associated_data.as_deref().unwrap_or_default(),
                )
            })
            .await?;
        self.inner.metrics.record_bytes(len);
        Ok(result)
    }

    /// Decrypt with the nonce and tag produced by [`encrypt`](Self::encrypt).
    pub async fn decrypt(
        &self,
        ciphertext: Vec<u8>,
        algorithm: Option<Algorithm>,
        key: &CryptographicKey,
        associated_data: Option<Vec<u8>>,
        nonce: Vec<u8>,
        tag: Vec<u8>,
    ) -> EngineResult<Vec<u8>> {
        let algorithm = self.resolve(algorithm);
        self.decrypt_parts(
            ciphertext,
            algorithm,
            key,
            associated_data,
            Some(nonce),
            Some(tag),
        )
        .await
    }

    /// Decrypt an [`EncryptionResult`] as returned by `encrypt`.
    pub async fn decrypt_result(
        &self,
        sealed: &EncryptionResult,
        key: &CryptographicKey,
        associated_data: Option<Vec<u8>>,
    ) -> EngineResult<Vec<u8>> {
        self.decrypt_parts(
            sealed.ciphertext.clone(),
            sealed.algorithm,
            key,
            associated_data,
            sealed.nonce.clone(),
            sealed.tag.clone(),
        )
        .await
    }

    async fn decrypt_parts(
        &self,
        ciphertext: Vec<u8>,
        algorithm: Algorithm,
        key: &CryptographicKey,
        associated_data: Option<Vec<u8>>,
        nonce: Option<Vec<u8>>,
        tag: Option<Vec<u8>>,
    ) -> EngineResult<Vec<u8>> {
        let supported = self.ensure_supported(algorithm);
        let key = key.clone();
        let len = ciphertext.len() as u64;

        let plaintext = self
            .run(OperationKind::Decrypt, move |_| {
                supported?;
                cipher_for(algorithm.family()).decrypt(
                    &ciphertext,
                    algorithm,
                    &key,
                    associated_data.as_deref().unwrap_or_default(),
                    nonce.as_deref(),
                    tag.as_deref(),
                )
            })
            .await?;
        self.inner.metrics.record_bytes(len);
        Ok(plaintext)
    }

    /// Generate a random key; `key_bits` defaults to the algorithm's size.
    pub async fn generate_key(
        &self,
        algorithm: Option<Algorithm>,
        key_bits: Option<u32>,
    ) -> EngineResult<CryptographicKey> {
        let algorithm = self.resolve(algorithm);
        let supported = self.ensure_supported(algorithm);
        let max_key_age = self.configuration().max_key_age();

        self.run(OperationKind::GenerateKey, move |_| {
            supported?;
            keys::generate_key(algorithm, key_bits, max_key_age)
        })
        .await
    }

    /// PBKDF2-HMAC-SHA256. Without a salt the key store's default salt is
    /// used; without iterations the configured default.
    pub async fn derive_key(
        &self,
        password: impl Into<Vec<u8>>,
        salt: Option<Vec<u8>>,
        iterations: Option<u32>,
        key_len: Option<usize>,
    ) -> EngineResult<DerivedKey> {
        let password = Zeroizing::new(password.into());
        let iterations = iterations.unwrap_or(self.configuration().default_derivation_iterations);
        let key_len = key_len.unwrap_or(kdf::DEFAULT_KEY_LEN);
        let key_store = self.inner.key_store.clone();

        self.run(OperationKind::DeriveKey, move |_| {
            let salt = salt.as_deref().unwrap_or(key_store.default_salt());
            kdf::derive_key(&password, salt, iterations, key_len)
        })
        .await
    }

    /// Encrypt a file into the chunked container.
    ///
    /// Without a key, a fresh one is generated. Either way the key is
    /// returned in the result and must be kept to decrypt.
    pub async fn encrypt_file(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        algorithm: Option<Algorithm>,
        key: Option<CryptographicKey>,
    ) -> EngineResult<FileEncryptionResult> {
        let input = input.as_ref().to_path_buf();
        let output = output.as_ref().to_path_buf();
        let algorithm = self.resolve(algorithm);
        let supported = self.ensure_supported(algorithm);
        let config = self.configuration();
        let (chunk_size, max_key_age) = (config.chunk_size, config.max_key_age());

        let result = self
            .run(OperationKind::EncryptFile, move |cancelled| {
                supported?;
                aead::aead_shape(algorithm)?;
                let key = match key {
                    Some(key) => {
                        keys::check_key(&key, algorithm)?;
                        key
                    }
                    None => keys::generate_key(algorithm, None, max_key_age)?,
                };
                let summary = stream::encrypt_file(&input, &output, &key, chunk_size, cancelled)?;
                info!(
                    %algorithm,
                    input = %input.display(),
                    output = %output.display(),
                    bytes = summary.bytes,
                    chunks = summary.chunks,
                    "file encrypted"
                );
                Ok(FileEncryptionResult {
                    output_path: output,
                    metadata: summary.metadata,
                    key,
                    bytes_processed: summary.bytes,
                    chunks: summary.chunks,
                })
            })
            .await?;
        self.inner.metrics.record_bytes(result.bytes_processed);
        Ok(result)
    }

    /// Decrypt a container written by [`encrypt_file`](Self::encrypt_file).
    pub async fn decrypt_file(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        key: &CryptographicKey,
    ) -> EngineResult<FileDecryptionResult> {
        let input = input.as_ref().to_path_buf();
        let output = output.as_ref().to_path_buf();
        let supported = self.ensure_supported(key.algorithm);
        let key = key.clone();

        let result = self
            .run(OperationKind::DecryptFile, move |cancelled| {
                supported?;
                let summary = stream::decrypt_file(&input, &output, &key, cancelled)?;
                info!(
                    algorithm = %summary.metadata.algorithm,
                    input = %input.display(),
                    output = %output.display(),
                    bytes = summary.bytes,
                    chunks = summary.chunks,
                    "file decrypted"
                );
                Ok(FileDecryptionResult {
                    output_path: output,
                    metadata: summary.metadata,
                    bytes_written: summary.bytes,
                    chunks: summary.chunks,
                })
            })
            .await?;
        self.inner.metrics.record_bytes(result.bytes_written);
        Ok(result)
    }

    /// Retire the active key id and issue a new one.
    ///
    /// Nothing is re-encrypted, so this is bookkeeping only: it runs inline
    /// under the rotator lock and never waits on the worker pool.
    pub async fn rotate_keys(&self) -> EngineResult<KeyRotationResult> {
        let op = OperationKind::RotateKeys;
        self.refuse_if_shut_down(op)?;
        let algorithm = self.configuration().default_algorithm;

        let started = Instant::now();
        self.set_status(op, op.busy_status());
        let (result, status) = {
            let mut rotator = lock(&self.inner.rotator);
            let result = rotator.begin().and_then(|ticket| {
                let _ = self
                    .inner
                    .events
                    .send(EngineEvent::RotationStatusChanged(RotationStatus::Rotating));
                rotator.complete(ticket, Uuid::new_v4(), algorithm, now_epoch())
            });
            (result, rotator.status())
        };

        if let Ok(rotation) = &result {
            self.inner.metrics.record_rotation(rotation.rotated_at);
        }
        let _ = self
            .inner
            .events
            .send(EngineEvent::RotationStatusChanged(status));
        self.finish(op, started, result.map_err(|e| e.into_engine_error(op)))
    }

    /// SHA-256 `data` and compare against `expected_hash` when given.
    pub async fn validate_integrity(
        &self,
        data: Vec<u8>,
        algorithm: Option<Algorithm>,
        expected_hash: Option<String>,
    ) -> EngineResult<IntegrityValidationResult> {
        let algorithm = self.resolve(algorithm);
        let supported = self.ensure_supported(algorithm);

        self.run(OperationKind::ValidateIntegrity, move |_| {
            supported?;
            Ok(integrity::validate_integrity(
                &data,
                algorithm,
                expected_hash.as_deref(),
            ))
        })
        .await
    }

    /// Encrypt a key under the engine's key store for storage at rest.
    pub async fn wrap_key(&self, key: &CryptographicKey) -> EngineResult<WrappedKey> {
        let key = key.clone();
        let key_store = self.inner.key_store.clone();
        self.run(OperationKind::WrapKey, move |_| key_store.wrap_key(&key))
            .await
    }

    pub async fn unwrap_key(&self, wrapped: WrappedKey) -> EngineResult<CryptographicKey> {
        let key_store = self.inner.key_store.clone();
        self.run(OperationKind::UnwrapKey, move |_| key_store.unwrap_key(&wrapped))
            .await
    }

    // ── Catalog, configuration, observation ───────────────────────────────

    pub fn supported_algorithms(&self) -> BTreeSet<Algorithm> {
        catalog::supported_algorithms(&self.configuration())
    }

    pub fn configuration(&self) -> EncryptionConfiguration {
        self.inner
            .config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swap in a new configuration. The worker pool keeps its original size.
    pub fn update_configuration(&self, config: EncryptionConfiguration) -> Result<(), ConfigError> {
        config.validate()?;
        let supported = catalog::supported_algorithms(&config).len();
        if config.enable_key_escrow {
            warn!("enable_key_escrow is set but no escrow backend exists; keys are not escrowed");
        }
        self.inner
            .sample_interval
            .send_replace(config.metrics_update_interval());

        {
            let mut current = self
                .inner
                .config
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if current.worker_threads != config.worker_threads {
                warn!(
                    old = current.worker_threads,
                    new = config.worker_threads,
                    "worker_threads only takes effect on restart"
                );
            }
            *current = config;
        }

        self.inner.metrics.set_supported_algorithms(supported);
        let _ = self.inner.events.send(EngineEvent::ConfigurationChanged {
            supported_algorithms: supported,
        });
        info!(supported_algorithms = supported, "configuration updated");
        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.inner.events.subscribe()
    }

    pub fn status(&self) -> EngineStatus {
        *self.inner.status.borrow()
    }

    pub fn status_watch(&self) -> watch::Receiver<EngineStatus> {
        self.inner.status.subscribe()
    }

    pub fn rotation_status(&self) -> RotationStatus {
        lock(&self.inner.rotator).status()
    }

    pub fn active_key_id(&self) -> Uuid {
        lock(&self.inner.rotator).active_key_id()
    }

    /// Whether `key_rotation_interval_secs` has passed since the last rotation.
    pub fn rotation_due(&self) -> bool {
        let interval = self.configuration().key_rotation_interval();
        lock(&self.inner.rotator).rotation_due(now_epoch(), interval)
    }

    pub fn metrics(&self) -> EncryptionMetrics {
        self.inner.metrics.snapshot()
    }

    /// Prometheus text exposition of the engine counters.
    pub fn encode_metrics(&self) -> EngineResult<String> {
        self.inner
            .metrics
            .encode()
            .map_err(|e| EngineError::SystemError(format!("encoding metrics: {e}")))
    }

    /// Stop the sampler and refuse further work. Idempotent.
    pub fn shutdown(&self) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }
        self.inner.shutdown.cancel();
        self.inner.pool.close();
        let _ = self.inner.events.send(EngineEvent::ShutDown);
        info!("crypto engine shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    // ── Internals ─────────────────────────────────────────────────────────

    fn resolve(&self, algorithm: Option<Algorithm>) -> Algorithm {
        algorithm.unwrap_or_else(|| self.configuration().default_algorithm)
    }

    fn ensure_supported(&self, algorithm: Algorithm) -> Result<(), CryptoError> {
        catalog::ensure_supported(&self.configuration(), algorithm)
    }

    fn set_status(&self, operation: OperationKind, status: EngineStatus) {
        self.inner.status.send_replace(status);
        let _ = self
            .inner
            .events
            .send(EngineEvent::StatusChanged { operation, status });
    }

    fn refuse_if_shut_down(&self, op: OperationKind) -> EngineResult<()> {
        if self.inner.shutdown.is_cancelled() {
            return Err(EngineError::SystemError(format!(
                "engine is shut down, {op} refused"
            )));
        }
        Ok(())
    }

    /// Run `work` on the worker pool with status, metrics, cancellation
    /// and timeout handling. `work` receives a check that turns true once the
    /// caller has stopped waiting.
    async fn run<T, F>(&self, op: OperationKind, work: F) -> EngineResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn Fn() -> bool) -> Result<T, CryptoError> + Send + 'static,
    {
        self.refuse_if_shut_down(op)?;
        let started = Instant::now();
        self.set_status(op, op.busy_status());
        let result = self.execute(op, work).await;
        self.finish(op, started, result)
    }

    /// Record the outcome of `op`: counters, final status, event and log.
    fn finish<T>(
        &self,
        op: OperationKind,
        started: Instant,
        result: EngineResult<T>,
    ) -> EngineResult<T> {
        let elapsed = started.elapsed();
        let success = result.is_ok();

        self.inner.metrics.record(op, success, elapsed);
        self.set_status(
            op,
            if success {
                EngineStatus::Completed
            } else {
                EngineStatus::Failed
            },
        );
        let _ = self.inner.events.send(EngineEvent::OperationFinished {
            operation: op,
            success,
            duration: elapsed,
        });
        match &result {
            Ok(_) => debug!(
                operation = %op,
                elapsed_ms = elapsed.as_millis() as u64,
                "operation complete"
            ),
            Err(e) => warn!(operation = %op, error = %e, "operation failed"),
        }
        result
    }

    async fn execute<T, F>(&self, op: OperationKind, work: F) -> EngineResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn Fn() -> bool) -> Result<T, CryptoError> + Send + 'static,
    {
        let abandoned = self.inner.shutdown.child_token();
        let worker_abandoned = abandoned.clone();
        let pool = self.inner.pool.clone();

        let task = async move {
            let permit = pool
                .acquire_owned()
                .await
                .map_err(|_| EngineError::SystemError("worker pool closed".into()))?;
            let handle = tokio::task::spawn_blocking(move || {
                let _permit = permit; // released when the work completes
                work(&|| worker_abandoned.is_cancelled())
            });
            match handle.await {
                Ok(result) => result.map_err(|e| e.into_engine_error(op)),
                Err(e) => Err(EngineError::SystemError(format!("{op} worker failed: {e}"))),
            }
        };

        let timeout = self.configuration().operation_timeout();
        let result = tokio::select! {
            biased;
            _ = self.inner.shutdown.cancelled() => {
                Err(EngineError::SystemError(format!("engine shut down during {op}")))
            }
            _ = cancelled(self.cancel.as_ref()) => {
                Err(EngineError::SystemError(format!("{op} cancelled")))
            }
            _ = expired(timeout) => {
                Err(EngineError::SystemError(format!(
                    "{op} timed out after {}s",
                    timeout.unwrap_or_default().as_secs()
                )))
            }
            result = task => result,
        };
        // tell abandoned blocking work to stop early
        abandoned.cancel();
        result
    }
}

impl std::fmt::Debug for CryptoEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoEngine")
            .field("status", &self.status())
            .field("metrics", &self.metrics())
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}

async fn cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

async fn expired(timeout: Option<Duration>) {
    match timeout {
        Some(timeout) => tokio::time::sleep(timeout).await,
        None => std::future::pending().await,
    }
}

async fn run_sampler(
    metrics: Arc<EngineMetrics>,
    events: broadcast::Sender<EngineEvent>,
    mut interval_rx: watch::Receiver<Duration>,
    shutdown: CancellationToken,
) {
    let mut period = *interval_rx.borrow_and_update();
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            changed = interval_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let next = *interval_rx.borrow_and_update();
                if next != period {
                    period = next;
                    ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
                    debug!(interval_secs = period.as_secs(), "metrics interval changed");
                }
            }
            _ = ticker.tick() => {
                let snapshot = metrics.sample();
                let _ = events.send(EngineEvent::Metrics(snapshot));
            }
        }
    }
    debug!("metrics sampler stopped");
}
