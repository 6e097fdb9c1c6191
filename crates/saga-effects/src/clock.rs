use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::error::{EffectError, Result};

/// Source of "now" and of cancellable delays.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Waits for `duration`, or returns `EffectError::Cancelled` as soon as
    /// `cancel` fires.
    async fn delay(&self, duration: Duration, cancel: &CancellationToken) -> Result<()>;
}

/// Wall-clock time backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn delay(&self, duration: Duration, cancel: &CancellationToken) -> Result<()> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(EffectError::Cancelled),
            () = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

#[cfg(any(test, feature = "testing"))]
pub use manual::ManualClock;

#[cfg(any(test, feature = "testing"))]
mod manual {
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{DateTime, TimeDelta, Utc};
    use tokio::sync::watch;
    use tokio_util::sync::CancellationToken;

    use super::Clock;
    use crate::error::{EffectError, Result};

    /// Virtual clock that only moves when [`ManualClock::advance`] is called.
    ///
    /// Pending delays resolve once the virtual time reaches their deadline.
    #[derive(Debug)]
    pub struct ManualClock {
        now: watch::Sender<DateTime<Utc>>,
    }

    impl Default for ManualClock {
        fn default() -> Self {
            Self::new(Utc::now())
        }
    }

    impl ManualClock {
        #[must_use]
        pub fn new(start: DateTime<Utc>) -> Self {
            let (now, _) = watch::channel(start);
            Self { now }
        }

        pub fn advance(&self, duration: Duration) {
            let delta = to_delta(duration);
            self.now.send_modify(|now| {
                *now = now.checked_add_signed(delta).unwrap_or(DateTime::<Utc>::MAX_UTC);
            });
        }

        /// Number of delays currently waiting on this clock.
        #[must_use]
        pub fn waiters(&self) -> usize {
            self.now.receiver_count()
        }
    }

    fn to_delta(duration: Duration) -> TimeDelta {
        TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
    }

    #[async_trait]
    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.borrow()
        }

        async fn delay(&self, duration: Duration, cancel: &CancellationToken) -> Result<()> {
            let deadline = self
                .now()
                .checked_add_signed(to_delta(duration))
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            let mut now = self.now.subscribe();
            loop {
                if *now.borrow_and_update() >= deadline {
                    return Ok(());
                }
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Err(EffectError::Cancelled),
                    changed = now.changed() => {
                        if changed.is_err() {
                            return Err(EffectError::Cancelled);
                        }
                    }
                }
            }
        }
    }
}
