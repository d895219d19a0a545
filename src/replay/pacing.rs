//! Inter-packet delay reproduction.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::types::Timeval;

/// How recorded inter-packet gaps are reproduced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DelayMode {
    /// Replay as fast as the transport allows.
    #[default]
    None,
    /// Sleep for each packet's recorded delta, scaled by the modifier.
    Delta,
}

/// Sleep needed before a step whose recorded gap is `ts_diff`, given that
/// `elapsed` has already passed since the previous step. `None` when the
/// scaled gap has already been used up.
pub fn delay_for(ts_diff: Timeval, elapsed: Duration, factor: f64) -> Option<Duration> {
    let target = ts_diff.scale(factor).to_duration()?;
    target.checked_sub(elapsed).filter(|d| !d.is_zero())
}

/// Tracks step completion times and sleeps the scaled recorded deltas.
#[derive(Debug, Clone)]
pub struct Pacer {
    mode: DelayMode,
    factor: f64,
    last: Option<Instant>,
}

impl Pacer {
    pub fn new(mode: DelayMode, factor: f64) -> Self {
        Self { mode, factor, last: None }
    }

    pub fn mode(&self) -> DelayMode {
        self.mode
    }

    /// Wait out whatever remains of `ts_diff` before the step at `pos`.
    pub async fn pace(&mut self, pos: usize, ts_diff: Timeval) {
        if self.mode == DelayMode::None {
            return;
        }
        let elapsed = self.last.map(|t| t.elapsed()).unwrap_or_default();

        match delay_for(ts_diff, elapsed, self.factor) {
            Some(delay) => {
                debug!("[{}] sleeping {:?}", pos, delay);
                tokio::time::sleep(delay).await;
            }
            None if ts_diff > Timeval::ZERO && self.last.is_some() => {
                warn!(
                    "[{}] elapsed {:?} already exceeds delta {} (x{}), not sleeping",
                    pos, elapsed, ts_diff, self.factor
                );
            }
            None => {}
        }
    }

    /// Record that a step just completed.
    pub fn mark(&mut self) {
        self.last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn delay_is_scaled_remainder() {
        let diff = Timeval::from_micros(100_000);
        assert_eq!(delay_for(diff, Duration::ZERO, 2.0), Some(Duration::from_micros(200_000)));
        assert_eq!(
            delay_for(diff, Duration::from_micros(50_000), 2.0),
            Some(Duration::from_micros(150_000))
        );
        assert_eq!(delay_for(diff, Duration::from_micros(200_000), 2.0), None);
        assert_eq!(delay_for(diff, Duration::from_secs(1), 2.0), None);
        assert_eq!(delay_for(Timeval::ZERO, Duration::ZERO, 1.0), None);
    }

    #[test]
    fn negative_deltas_never_sleep() {
        assert_eq!(delay_for(Timeval::from_micros(-5), Duration::ZERO, 1.0), None);
    }

    #[tokio::test(start_paused = true)]
    async fn pacer_sleeps_remaining_gap() {
        let mut pacer = Pacer::new(DelayMode::Delta, 2.0);
        pacer.mark();
        let start = Instant::now();
        pacer.pace(2, Timeval::from_micros(100_000)).await;
        assert!(start.elapsed() >= Duration::from_micros(200_000));
    }

    #[tokio::test(start_paused = true)]
    async fn first_position_sleeps_an_overridden_delta() {
        let mut pacer = Pacer::new(DelayMode::Delta, 1.5);
        let start = Instant::now();
        pacer.pace(1, Timeval::from_micros(200_000)).await;
        assert!(start.elapsed() >= Duration::from_micros(300_000));

        // a recorded first delta is zero and never sleeps
        let mut pacer = Pacer::new(DelayMode::Delta, 1.5);
        let start = Instant::now();
        pacer.pace(1, Timeval::ZERO).await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_pacer_never_sleeps() {
        let mut pacer = Pacer::new(DelayMode::None, 2.0);
        pacer.mark();
        let start = Instant::now();
        pacer.pace(2, Timeval::new(5, 0)).await;
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(pacer.mode(), DelayMode::None);
    }

    proptest! {
        #[test]
        fn sleep_never_exceeds_scaled_delta(
            usec in 0i64..10_000_000,
            elapsed in 0u64..10_000_000,
            factor in 0.1f64..4.0,
        ) {
            let diff = Timeval::from_micros(usec);
            if let Some(delay) = delay_for(diff, Duration::from_micros(elapsed), factor) {
                let target = diff.scale(factor).to_duration().unwrap_or_default();
                prop_assert!(delay <= target);
                prop_assert_eq!(delay + Duration::from_micros(elapsed), target);
            }
        }
    }
}
