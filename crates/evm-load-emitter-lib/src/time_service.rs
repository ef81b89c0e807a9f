// Copyright © EVM Load Emitter Contributors
// SPDX-License-Identifier: Apache-2.0

//! Clock abstraction used for pacing, polling delays and timestamps.
//!
//! [`TimeService::Real`] delegates to tokio's timer and the system clock.
//! [`TimeService::Mock`] keeps a virtual clock that jumps forward whenever a
//! task sleeps, so paced loops run to completion without wall-clock delay.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

#[derive(Clone, Debug)]
pub enum TimeService {
    Real(RealTimeService),
    Mock(MockTimeService),
}

impl TimeService {
    pub fn real() -> Self {
        TimeService::Real(RealTimeService::new())
    }

    pub fn mock() -> Self {
        TimeService::Mock(MockTimeService::new())
    }

    /// Monotonic time elapsed since the service was created.
    pub fn now(&self) -> Duration {
        match self {
            TimeService::Real(real) => real.start.elapsed(),
            TimeService::Mock(mock) => mock.now(),
        }
    }

    /// Wall-clock time since the unix epoch.
    pub fn now_unix_time(&self) -> Duration {
        match self {
            TimeService::Real(_) => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default(),
            TimeService::Mock(mock) => mock.unix_base + mock.now(),
        }
    }

    pub async fn sleep(&self, duration: Duration) {
        match self {
            TimeService::Real(_) => tokio::time::sleep(duration).await,
            TimeService::Mock(mock) => mock.sleep(duration).await,
        }
    }

    /// Sleeps until [`TimeService::now`] reaches `deadline`.
    pub async fn sleep_until(&self, deadline: Duration) {
        let now = self.now();
        if deadline > now {
            self.sleep(deadline - now).await;
        }
    }
}

#[derive(Clone, Debug)]
pub struct RealTimeService {
    start: Instant,
}

impl RealTimeService {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for RealTimeService {
    fn default() -> Self {
        Self::new()
    }
}

// 2023-11-14T22:13:20Z
const MOCK_UNIX_BASE_SECS: u64 = 1_700_000_000;

#[derive(Clone, Debug)]
pub struct MockTimeService {
    elapsed_nanos: Arc<AtomicU64>,
    unix_base: Duration,
}

impl MockTimeService {
    pub fn new() -> Self {
        Self {
            elapsed_nanos: Arc::new(AtomicU64::new(0)),
            unix_base: Duration::from_secs(MOCK_UNIX_BASE_SECS),
        }
    }

    pub fn now(&self) -> Duration {
        Duration::from_nanos(self.elapsed_nanos.load(Ordering::SeqCst))
    }

    /// Moves the virtual clock forward by `duration`.
    pub fn advance(&self, duration: Duration) {
        self.elapsed_nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
    }

    /// Concurrent sleepers don't add up: the clock only moves to the latest
    /// deadline any of them asked for.
    async fn sleep(&self, duration: Duration) {
        let deadline = self.now() + duration;
        self.elapsed_nanos
            .fetch_max(deadline.as_nanos() as u64, Ordering::SeqCst);
        tokio::task::yield_now().await;
    }
}

impl Default for MockTimeService {
    fn default() -> Self {
        Self::new()
    }
}
