//! Cancellable repeating fetch → apply task bound to a screen.
//!
//! A [`Poller`] owns one spawned task that ticks at a fixed period and runs
//! one [`SyncCycle`] per tick:
//!
//! ```text
//! Idle → Fetching → Applying → Idle
//!           └──→ Error ──────→ Idle
//! ```
//!
//! Cycles of one poller never overlap: the next tick is only awaited after
//! the previous apply has returned, and ticks missed meanwhile are delayed,
//! not bunched. Failures and timeouts are logged and retried on the next
//! tick. Once cancelled (explicitly or by dropping the handle) the task
//! stops at its next suspension point, and a fetch that resolves after
//! cancellation is discarded instead of applied.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Fetching,
    Applying,
    Error,
    Stopped,
}

/// The work a poller repeats.
#[async_trait]
pub trait SyncCycle: Send + 'static {
    type Output: Send + 'static;

    /// All I/O of one cycle. Dropped mid-flight on cancellation.
    async fn fetch(&mut self) -> Result<Self::Output>;

    /// Publish a fetched result to view state. Never called after
    /// cancellation.
    fn apply(&mut self, output: Self::Output);
}

pub struct Poller {
    name: &'static str,
    stop: CancellationToken,
    task: Option<JoinHandle<()>>,
    state: watch::Receiver<LoopState>,
}

impl Poller {
    pub fn spawn<C: SyncCycle>(
        name: &'static str,
        period: Duration,
        fetch_timeout: Duration,
        cycle: C,
    ) -> Self {
        let stop = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(LoopState::Idle);

        let task = tokio::spawn(run(
            name,
            period,
            fetch_timeout,
            cycle,
            stop.child_token(),
            state_tx,
        ));

        Self {
            name,
            stop,
            task: Some(task),
            state: state_rx,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn state(&self) -> LoopState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<LoopState> {
        self.state.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.stop.is_cancelled()
            && self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop ticking. Does not wait for the task to wind down.
    pub fn cancel(&self) {
        self.stop.cancel();
    }

    /// Stop ticking and wait until the task has exited, so nothing this
    /// poller started can still apply afterwards.
    pub async fn shutdown(mut self) {
        self.stop.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

async fn run<C: SyncCycle>(
    name: &'static str,
    period: Duration,
    fetch_timeout: Duration,
    mut cycle: C,
    stop: CancellationToken,
    state: watch::Sender<LoopState>,
) {
    info!(
        poller = name,
        period_ms = period.as_millis() as u64,
        "poller started"
    );

    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {}
        }

        state.send_replace(LoopState::Fetching);
        let outcome = tokio::select! {
            biased;
            _ = stop.cancelled() => {
                debug!(poller = name, "cancelled during fetch");
                break;
            }
            outcome = time::timeout(fetch_timeout, cycle.fetch()) => outcome,
        };

        match outcome {
            Ok(Ok(output)) => {
                if stop.is_cancelled() {
                    debug!(poller = name, "discarding result fetched after cancellation");
                    break;
                }
                state.send_replace(LoopState::Applying);
                cycle.apply(output);
            }
            Ok(Err(e)) => {
                state.send_replace(LoopState::Error);
                warn!(poller = name, error = %e, "sync cycle failed, retrying next tick");
            }
            Err(_) => {
                state.send_replace(LoopState::Error);
                warn!(
                    poller = name,
                    timeout_ms = fetch_timeout.as_millis() as u64,
                    "sync cycle timed out, retrying next tick"
                );
            }
        }
        state.send_replace(LoopState::Idle);
    }

    state.send_replace(LoopState::Stopped);
    info!(poller = name, "poller stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use tokio::sync::Notify;
    use vetchat_store::StoreError;

    use crate::error::SyncError;

    #[derive(Default)]
    struct Counters {
        fetches: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        applied: Mutex<Vec<usize>>,
    }

    struct TestCycle {
        counters: Arc<Counters>,
        fail_first: usize,
        delay: Duration,
        gate: Option<Arc<Notify>>,
    }

    impl TestCycle {
        fn new(counters: &Arc<Counters>) -> Self {
            Self {
                counters: counters.clone(),
                fail_first: 0,
                delay: Duration::ZERO,
                gate: None,
            }
        }
    }

    #[async_trait]
    impl SyncCycle for TestCycle {
        type Output = usize;

        async fn fetch(&mut self) -> Result<usize> {
            let n = self.counters.fetches.fetch_add(1, Ordering::SeqCst) + 1;
            let now = self.counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.counters.max_in_flight.fetch_max(now, Ordering::SeqCst);

            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if !self.delay.is_zero() {
                time::sleep(self.delay).await;
            }
            self.counters.in_flight.fetch_sub(1, Ordering::SeqCst);

            if n <= self.fail_first {
                return Err(SyncError::StoreUnavailable(StoreError::Unavailable(
                    "offline".into(),
                )));
            }
            Ok(n)
        }

        fn apply(&mut self, output: usize) {
            self.counters.applied.lock().unwrap().push(output);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_and_applies() {
        let counters = Arc::new(Counters::default());
        let poller = Poller::spawn(
            "test",
            Duration::from_secs(1),
            Duration::from_secs(5),
            TestCycle::new(&counters),
        );

        time::sleep(Duration::from_millis(3_500)).await;
        assert!(poller.is_running());
        poller.shutdown().await;

        // Immediate first tick, then one per second.
        assert_eq!(*counters.applied.lock().unwrap(), vec![1, 2, 3, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_are_retried_next_tick() {
        let counters = Arc::new(Counters::default());
        let mut cycle = TestCycle::new(&counters);
        cycle.fail_first = 2;
        let poller = Poller::spawn("test", Duration::from_secs(1), Duration::from_secs(5), cycle);

        time::sleep(Duration::from_millis(2_500)).await;
        assert_eq!(poller.state(), LoopState::Idle);
        poller.shutdown().await;

        assert_eq!(*counters.applied.lock().unwrap(), vec![3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycles_never_overlap() {
        let counters = Arc::new(Counters::default());
        let mut cycle = TestCycle::new(&counters);
        cycle.delay = Duration::from_millis(2_500);
        let poller = Poller::spawn("test", Duration::from_secs(1), Duration::from_secs(10), cycle);

        time::sleep(Duration::from_secs(10)).await;
        poller.shutdown().await;

        assert_eq!(counters.max_in_flight.load(Ordering::SeqCst), 1);
        assert!(counters.fetches.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fails_cycle_and_retries() {
        let counters = Arc::new(Counters::default());
        let mut cycle = TestCycle::new(&counters);
        cycle.delay = Duration::from_secs(30);
        let poller = Poller::spawn("test", Duration::from_secs(1), Duration::from_secs(2), cycle);

        time::sleep(Duration::from_millis(7_000)).await;
        assert!(poller.is_running());
        poller.shutdown().await;

        // Each fetch is abandoned at its 2s deadline and a new one starts on
        // the following tick; none of them is applied.
        assert!(counters.fetches.load(Ordering::SeqCst) >= 3);
        assert!(counters.applied.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_result_discarded_after_cancel() {
        let counters = Arc::new(Counters::default());
        let gate = Arc::new(Notify::new());
        let mut cycle = TestCycle::new(&counters);
        cycle.gate = Some(gate.clone());
        let poller = Poller::spawn("test", Duration::from_secs(1), Duration::from_secs(60), cycle);

        time::sleep(Duration::from_millis(100)).await;
        assert_eq!(poller.state(), LoopState::Fetching);

        poller.cancel();
        gate.notify_waiters();
        poller.shutdown().await;

        assert!(counters.applied.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_the_task() {
        let counters = Arc::new(Counters::default());
        let poller = Poller::spawn(
            "test",
            Duration::from_secs(1),
            Duration::from_secs(5),
            TestCycle::new(&counters),
        );
        let mut states = poller.subscribe_state();
        time::sleep(Duration::from_millis(1_500)).await;
        drop(poller);

        while *states.borrow_and_update() != LoopState::Stopped {
            if states.changed().await.is_err() {
                break;
            }
        }
        let fetched = counters.fetches.load(Ordering::SeqCst);
        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(counters.fetches.load(Ordering::SeqCst), fetched);
    }
}
