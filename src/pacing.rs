//! Pacing and cancellation.
//!
//! Every wait in the agent goes through one [`Pacer`] so that pacing policy
//! lives in one place and cancellation is honored at every suspension point.
//! A cancelled pause surfaces as [`SkimmerError::Cancelled`], which callers
//! propagate with `?` until the scheduler turns it into a clean stop.

use std::sync::Mutex;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio_util::sync::CancellationToken;

use crate::app::{Result, SkimmerError};

pub struct Pacer {
    cancel: CancellationToken,
    rng: Mutex<StdRng>,
}

impl Pacer {
    pub fn new(cancel: CancellationToken) -> Self {
        Self::with_rng(cancel, StdRng::from_entropy())
    }

    /// Construct with a seeded generator, for deterministic tests.
    pub fn with_rng(cancel: CancellationToken, rng: StdRng) -> Self {
        Self {
            cancel,
            rng: Mutex::new(rng),
        }
    }

    /// Fail fast if the run has been cancelled, without sleeping.
    pub fn ensure_active(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(SkimmerError::Cancelled);
        }
        Ok(())
    }

    /// Sleep for a fixed interval, waking early on cancellation.
    pub async fn pause(&self, duration: Duration) -> Result<()> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(SkimmerError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    /// Sleep for a duration drawn uniformly from `[min, max]`.
    pub async fn pause_between(&self, min: Duration, max: Duration) -> Result<()> {
        self.pause(self.draw_between(min, max)).await
    }

    /// Draw a uniform duration from `[min, max]`; an inverted range
    /// collapses to `min`.
    pub(crate) fn draw_between(&self, min: Duration, max: Duration) -> Duration {
        if max <= min {
            return min;
        }
        let mut rng = self.rng.lock().expect("pacer rng poisoned");
        rng.gen_range(min..=max)
    }
}
