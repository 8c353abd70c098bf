//! Sources of rotation ticks

use crate::error::{RotationError, RotationResult};
use std::future::Future;
use std::time::Duration;
use tokio::{
    sync::mpsc,
    time::{interval_at, Instant, Interval, MissedTickBehavior},
};

/// Something that decides when the next rotation happens.
pub trait RotationTrigger: Send {
    /// Resolves to `true` when a rotation is due, `false` once the schedule
    /// has ended.
    fn fired(&mut self) -> impl Future<Output = bool> + Send;
}

impl RotationTrigger for mpsc::Receiver<()> {
    async fn fired(&mut self) -> bool {
        self.recv().await.is_some()
    }
}

/// Fixed-period trigger. The first tick comes one full period after
/// creation, since the key installed at startup is still fresh.
#[derive(Debug)]
pub struct IntervalTrigger {
    interval: Interval,
}

impl IntervalTrigger {
    /// Tick every `period`
    ///
    /// # Errors
    /// Returns `RotationError::Config` if `period` is zero or its first tick
    /// lies beyond what the clock can represent.
    ///
    /// # Panics
    /// Panics when called outside a Tokio runtime.
    pub fn new(period: Duration) -> RotationResult<Self> {
        if period.is_zero() {
            return Err(RotationError::config("rotation interval must be positive"));
        }
        let first_tick = Instant::now().checked_add(period).ok_or_else(|| {
            RotationError::config(format!(
                "rotation interval of {}s overflows the clock",
                period.as_secs()
            ))
        })?;
        let mut interval = interval_at(first_tick, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Ok(Self { interval })
    }

    /// Configured period
    #[must_use]
    pub fn period(&self) -> Duration {
        self.interval.period()
    }
}

impl RotationTrigger for IntervalTrigger {
    async fn fired(&mut self) -> bool {
        self.interval.tick().await;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn interval_waits_one_period_before_first_tick() {
        let period = Duration::from_secs(60);
        let start = Instant::now();
        let mut trigger = IntervalTrigger::new(period).unwrap();

        assert!(trigger.fired().await);
        assert_eq!(Instant::now() - start, period);
        assert!(trigger.fired().await);
        assert_eq!(Instant::now() - start, period * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn unusable_periods_are_errors() {
        for period in [Duration::ZERO, Duration::from_secs(u64::MAX)] {
            assert!(matches!(
                IntervalTrigger::new(period),
                Err(RotationError::Config(_))
            ));
        }
    }

    #[tokio::test]
    async fn channel_trigger_ends_when_senders_drop() {
        let (tx, mut rx) = mpsc::channel(1);
        tx.send(()).await.unwrap();
        drop(tx);

        assert!(rx.fired().await);
        assert!(!rx.fired().await);
    }
}
