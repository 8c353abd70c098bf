//! Rotation protocol: install a new signing key, retire the old one and
//! schedule its removal once every token it signed has expired.
//!
//! ```text
//! rotate()
//!   ├─ Keystore::generate        new key Active, previous key Retiring (atomic)
//!   ├─ previous key?             no  -> done (first rotation)
//!   └─ schedule removal          due = retired_at + token lifetime
//!                                 (fire-and-forget, runs on the removal worker)
//! ```

use crate::{
    algorithm::KeySpec,
    config::MAX_PERIOD_SECONDS,
    error::{RotationError, RotationResult},
    key::{Key, KeyId},
    keystore::Keystore,
    scheduler::{PendingRemoval, RemovalScheduler},
    trigger::RotationTrigger,
};
use std::{sync::Arc, time::Duration};
use tokio::{runtime::Handle, time::Instant};
use tracing::{debug, error, info, warn};

/// Removal arranged by a rotation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledRemoval {
    /// Retiring key
    pub id: KeyId,
    /// When it stopped signing
    pub retired_at: Instant,
    /// When it will be purged
    pub due_at: Instant,
}

/// Result of one rotation cycle
#[derive(Debug, Clone)]
pub struct RotationOutcome {
    /// Newly active key
    pub active: Arc<Key>,
    /// Removal of the previous key; `None` on the first rotation
    pub removal: Option<ScheduledRemoval>,
}

/// Sole writer of the keystore.
///
/// Created once per process with an empty keystore; [`shutdown`](Self::shutdown)
/// cancels every removal still pending.
#[derive(Debug)]
pub struct RotationManager {
    keystore: Arc<Keystore>,
    spec: KeySpec,
    grace: Duration,
    removals: RemovalScheduler,
}

impl RotationManager {
    /// Manager rotating `keystore` with keys of `spec`. Retired keys stay
    /// verifiable for `token_lifetime`.
    ///
    /// Must be called from within a Tokio runtime, which hosts the removal
    /// worker.
    ///
    /// # Errors
    /// - `RotationError::Runtime` outside a Tokio runtime
    /// - `RotationError::Config` if `token_lifetime` is zero or longer than
    ///   [`MAX_PERIOD_SECONDS`]
    pub fn new(
        keystore: Arc<Keystore>,
        spec: KeySpec,
        token_lifetime: Duration,
    ) -> RotationResult<Self> {
        let runtime = Handle::try_current().map_err(|e| RotationError::Runtime(e.to_string()))?;
        Self::with_runtime(keystore, spec, token_lifetime, &runtime)
    }

    /// Same as [`new`](Self::new) with an explicit runtime handle
    ///
    /// # Errors
    /// Returns `RotationError::Config` for an out-of-range `token_lifetime`.
    pub fn with_runtime(
        keystore: Arc<Keystore>,
        spec: KeySpec,
        token_lifetime: Duration,
        runtime: &Handle,
    ) -> RotationResult<Self> {
        if token_lifetime.is_zero() || token_lifetime > Duration::from_secs(MAX_PERIOD_SECONDS) {
            return Err(RotationError::config(format!(
                "token lifetime of {}s is outside 1..={MAX_PERIOD_SECONDS}s",
                token_lifetime.as_secs()
            )));
        }
        let removals = RemovalScheduler::spawn(Arc::clone(&keystore), runtime);
        Ok(Self {
            keystore,
            spec,
            grace: token_lifetime,
            removals,
        })
    }

    /// Run one rotation cycle.
    ///
    /// # Errors
    /// - `RotationError::Generation` if no key pair could be produced; the
    ///   previous key stays active and nothing is scheduled. Not retried.
    /// - `RotationError::Config` if the removal deadline is not representable;
    ///   checked before the keystore changes.
    /// - `RotationError::ShutDown` after [`shutdown`](Self::shutdown).
    pub fn rotate(&self) -> RotationResult<RotationOutcome> {
        if self.removals.is_shut_down() {
            return Err(RotationError::ShutDown);
        }

        let now = Instant::now();
        let due_at = now.checked_add(self.grace).ok_or_else(|| {
            RotationError::config(format!(
                "removal deadline {}s ahead overflows the clock",
                self.grace.as_secs()
            ))
        })?;

        let generated = self.keystore.generate_at(&self.spec, now).map_err(|e| {
            error!(
                error = %e,
                algorithm = %self.spec.algorithm(),
                "Key rotation failed; previous signing key remains active"
            );
            e
        })?;
        info!(
            kid = %generated.key.id(),
            algorithm = %generated.key.algorithm(),
            "Successfully generated new key pair"
        );

        let removal = generated.retired.map(|retired| {
            if self.removals.schedule(retired.id.clone(), due_at) {
                info!(
                    kid = %retired.id,
                    due_in_secs = self.grace.as_secs(),
                    "Signing key retiring; removal scheduled"
                );
            } else {
                warn!(kid = %retired.id, "Removal not scheduled: manager is shutting down");
            }
            ScheduledRemoval {
                id: retired.id,
                retired_at: retired.retired_at,
                due_at,
            }
        });

        Ok(RotationOutcome {
            active: generated.key,
            removal,
        })
    }

    /// Drive rotations from `trigger` until it ends or the manager shuts down.
    ///
    /// A failed cycle is logged and the next tick is awaited; retry policy
    /// belongs to whoever feeds the trigger.
    pub async fn run<T: RotationTrigger>(&self, mut trigger: T) {
        loop {
            tokio::select! {
                biased;
                () = self.removals.cancelled() => break,
                fired = trigger.fired() => {
                    if !fired {
                        break;
                    }
                    // rotate() already logged the failure; wait for the next tick.
                    if let Err(e) = self.rotate() {
                        debug!(error = %e, "Scheduled rotation skipped");
                    }
                }
            }
        }
        info!("Rotation trigger loop stopped");
    }

    /// Key currently used for signing
    #[must_use]
    pub fn current_key(&self) -> Option<Arc<Key>> {
        self.keystore.active()
    }

    /// Removals waiting for their deadline, earliest first
    #[must_use]
    pub fn pending_removals(&self) -> Vec<PendingRemoval> {
        self.removals.pending()
    }

    /// Grace period applied to retiring keys
    #[must_use]
    pub fn grace_period(&self) -> Duration {
        self.grace
    }

    /// The managed keystore
    #[must_use]
    pub fn keystore(&self) -> &Arc<Keystore> {
        &self.keystore
    }

    /// Cancel pending removals and stop the removal worker.
    ///
    /// Returns how many removals were cancelled. Idempotent; removals that
    /// already fired are unaffected.
    pub async fn shutdown(&self) -> usize {
        let cancelled = self.removals.shutdown().await;
        if cancelled > 0 {
            info!(cancelled, "Cancelled pending key removals");
        }
        cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        algorithm::Algorithm,
        crypto::{KeyGenerator, KeyMaterial, OsKeyGenerator},
        key::KeyStatus,
    };
    use std::sync::atomic::{AtomicBool, Ordering};

    const LIFETIME: Duration = Duration::from_secs(3600);

    struct Switchable {
        fail: Arc<AtomicBool>,
    }

    impl KeyGenerator for Switchable {
        fn generate(&self, spec: &KeySpec) -> RotationResult<KeyMaterial> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(RotationError::generation("entropy source unavailable"));
            }
            OsKeyGenerator.generate(spec)
        }
    }

    fn manager() -> RotationManager {
        RotationManager::new(
            Arc::new(Keystore::new()),
            KeySpec::signing(Algorithm::Es256),
            LIFETIME,
        )
        .unwrap()
    }

    #[test]
    fn requires_a_runtime() {
        let err = RotationManager::new(Arc::new(Keystore::new()), KeySpec::default(), LIFETIME)
            .unwrap_err();
        assert!(matches!(err, RotationError::Runtime(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn rejects_unbounded_lifetimes() {
        for lifetime in [
            Duration::ZERO,
            Duration::from_secs(MAX_PERIOD_SECONDS + 1),
            Duration::from_secs(u64::MAX),
        ] {
            let err = RotationManager::new(Arc::new(Keystore::new()), KeySpec::default(), lifetime)
                .unwrap_err();
            assert!(matches!(err, RotationError::Config(_)));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn longest_lifetime_rotates_and_schedules() {
        let grace = Duration::from_secs(MAX_PERIOD_SECONDS);
        let manager =
            RotationManager::new(Arc::new(Keystore::new()), KeySpec::default(), grace).unwrap();
        manager.rotate().unwrap();
        let removal = manager.rotate().unwrap().removal.unwrap();
        assert_eq!(removal.due_at, removal.retired_at + grace);
        assert_eq!(manager.pending_removals().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn first_rotation_schedules_nothing() {
        let manager = manager();
        let outcome = manager.rotate().unwrap();
        assert!(outcome.removal.is_none());
        assert!(manager.pending_removals().is_empty());
        assert_eq!(
            manager.current_key().map(|k| k.id().clone()),
            Some(outcome.active.id().clone())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn removal_is_due_one_lifetime_after_retirement() {
        let manager = manager();
        let k1 = manager.rotate().unwrap().active;
        let outcome = manager.rotate().unwrap();

        let removal = outcome.removal.unwrap();
        assert_eq!(&removal.id, k1.id());
        assert_eq!(removal.due_at, removal.retired_at + LIFETIME);
        assert_eq!(manager.pending_removals().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_generation_keeps_previous_key_active() {
        let fail = Arc::new(AtomicBool::new(false));
        let keystore = Arc::new(Keystore::with_generator(Switchable {
            fail: Arc::clone(&fail),
        }));
        let manager =
            RotationManager::new(Arc::clone(&keystore), KeySpec::default(), LIFETIME).unwrap();
        let k1 = manager.rotate().unwrap().active;

        fail.store(true, Ordering::SeqCst);
        assert!(matches!(manager.rotate(), Err(RotationError::Generation(_))));
        assert_eq!(keystore.status(k1.id()), Some(KeyStatus::Active));
        assert_eq!(keystore.len(), 1);
        assert!(manager.pending_removals().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_pending_and_blocks_rotation() {
        let manager = manager();
        manager.rotate().unwrap();
        manager.rotate().unwrap();
        manager.rotate().unwrap();

        assert_eq!(manager.shutdown().await, 2);
        assert_eq!(manager.shutdown().await, 0);
        assert!(manager.pending_removals().is_empty());
        assert!(matches!(manager.rotate(), Err(RotationError::ShutDown)));
    }
}
