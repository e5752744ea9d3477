//! Key rotation bookkeeping.
//!
//! The rotator tracks the identity of the engine's active key and walks
//! `Current → Rotating → Current` (or `Failed`). At most one rotation runs
//! at a time; a second `begin` while one is in flight is refused.

use std::time::Duration;

use uuid::Uuid;
use vseal_core::{now_epoch, Algorithm, KeyRotationResult, RotationStatus};

use crate::error::{CryptoError, Result};

#[derive(Debug)]
pub struct KeyRotator {
    active_key_id: Uuid,
    created_at: u64,
    last_rotation: Option<u64>,
    status: RotationStatus,
}

/// Proof that a rotation was started. Consumed by `complete`.
#[derive(Debug)]
#[must_use = "a started rotation must be completed"]
pub struct RotationTicket {
    old_key_id: Uuid,
}

impl RotationTicket {
    pub fn old_key_id(&self) -> Uuid {
        self.old_key_id
    }
}

impl Default for KeyRotator {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyRotator {
    pub fn new() -> Self {
        Self::with_active_key(Uuid::new_v4(), now_epoch())
    }

    pub fn with_active_key(active_key_id: Uuid, created_at: u64) -> Self {
        Self {
            active_key_id,
            created_at,
            last_rotation: None,
            status: RotationStatus::Current,
        }
    }

    pub fn active_key_id(&self) -> Uuid {
        self.active_key_id
    }

    pub fn status(&self) -> RotationStatus {
        self.status
    }

    /// Unix epoch seconds of the last successful rotation.
    pub fn last_rotation(&self) -> Option<u64> {
        self.last_rotation
    }

    pub fn begin(&mut self) -> Result<RotationTicket> {
        if self.status == RotationStatus::Rotating {
            return Err(CryptoError::Rotation(format!(
                "rotation of key {} already in progress",
                self.active_key_id
            )));
        }
        self.status = RotationStatus::Rotating;
        tracing::info!(key_id = %self.active_key_id, "key rotation started");
        Ok(RotationTicket {
            old_key_id: self.active_key_id,
        })
    }

    pub fn complete(
        &mut self,
        ticket: RotationTicket,
        new_key_id: Uuid,
        algorithm: Algorithm,
        now: u64,
    ) -> Result<KeyRotationResult> {
        if new_key_id == ticket.old_key_id {
            self.status = RotationStatus::Failed;
            return Err(CryptoError::Rotation(format!(
                "new key id {new_key_id} equals the retired one"
            )));
        }

        self.active_key_id = new_key_id;
        self.last_rotation = Some(now);
        self.status = RotationStatus::Current;
        tracing::info!(
            old_key_id = %ticket.old_key_id,
            new_key_id = %new_key_id,
            "key rotation complete"
        );

        Ok(KeyRotationResult {
            old_key_id: ticket.old_key_id,
            new_key_id,
            rotated_at: now,
            algorithm,
            success: true,
        })
    }

    /// Begin and complete in one step with a fresh key id.
    pub fn rotate(&mut self, algorithm: Algorithm, now: u64) -> Result<KeyRotationResult> {
        let ticket = self.begin()?;
        self.complete(ticket, Uuid::new_v4(), algorithm, now)
    }

    /// Whether `interval` has elapsed since the last rotation (or since the
    /// active key was created, if it was never rotated).
    pub fn rotation_due(&self, now: u64, interval: Duration) -> bool {
        let since = self.last_rotation.unwrap_or(self.created_at);
        now.saturating_sub(since) >= interval.as_secs()
    }
}
