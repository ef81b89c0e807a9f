// Copyright © EVM Load Emitter Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::time_service::TimeService;
use parking_lot::Mutex;
use std::{cmp::max, time::Duration};

/// A pacing signal shared by several workers.
///
/// Ticks are `1 / rate` apart, the first one an interval after creation.
/// Every [`Pacer::wait`] consumes exactly one tick, no matter which worker
/// asks, so the combined rate of all waiters is `rate`. Ticks that pass while
/// nobody waits are dropped, not accumulated.
#[derive(Debug)]
pub struct Pacer {
    interval: Duration,
    next_tick: Mutex<Duration>,
    time_service: TimeService,
}

impl Pacer {
    /// `rate` is ticks per second; zero means no pacing.
    pub fn new(rate: u64, time_service: TimeService) -> Self {
        let interval = if rate == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(1_000_000_000 / rate)
        };
        Self {
            interval,
            next_tick: Mutex::new(time_service.now() + interval),
            time_service,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub async fn wait(&self) {
        let tick = {
            let mut next_tick = self.next_tick.lock();
            let tick = max(*next_tick, self.time_service.now());
            *next_tick = tick + self.interval;
            tick
        };
        self.time_service.sleep_until(tick).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;

    #[tokio::test]
    async fn test_single_waiter_is_paced() {
        let time = TimeService::mock();
        let pacer = Pacer::new(10, time.clone());
        assert_eq!(pacer.interval(), Duration::from_millis(100));

        for _ in 0..5 {
            pacer.wait().await;
        }
        assert_eq!(time.now(), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_waiters_share_the_rate() {
        let time = TimeService::mock();
        let pacer = Pacer::new(10, time.clone());

        // 4 workers x 5 ticks at 10/s: the last tick is 2s in
        join_all((0..4).map(|_| async {
            for _ in 0..5 {
                pacer.wait().await;
            }
        }))
        .await;
        assert_eq!(time.now(), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_missed_ticks_are_dropped() {
        let time = TimeService::mock();
        let pacer = Pacer::new(10, time.clone());
        time.sleep(Duration::from_secs(3)).await;

        pacer.wait().await;
        assert_eq!(time.now(), Duration::from_secs(3));
        pacer.wait().await;
        assert_eq!(time.now(), Duration::from_millis(3100));
    }

    #[tokio::test]
    async fn test_zero_rate_does_not_wait() {
        let time = TimeService::mock();
        let pacer = Pacer::new(0, time.clone());
        pacer.wait().await;
        pacer.wait().await;
        assert_eq!(time.now(), Duration::ZERO);
    }
}
