//! Phase-locked flash scheduling
//!
//! [`PhaseScheduler`] runs one cancellable loop at a time. On start it
//! anchors to the shared reference timestamp:
//!
//! ```text
//! elapsed   = now - reference
//! position  = elapsed mod (2 * period)
//! phase     = EVEN_ON_ODD_OFF if position < period else EVEN_OFF_ODD_ON
//! ```
//!
//! so every device lands on the same global cycle no matter when it joins.
//! Each iteration then publishes the phase, actuates, sleeps for the lit or
//! dark duration and flips the phase.
//!
//! Stopping cancels the pending sleep and waits for any in-flight actuation
//! to finish, so once [`PhaseScheduler::stop`] returns the callback will not
//! run again. Stop requests from several callers coalesce.

mod countdown;

pub use countdown::{StartTime, format_countdown};

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::clock::Clock;
use crate::types::{CycleTiming, FlashTiming, Phase};

struct RunningLoop {
    cancel: CancellationToken,
    /// Held while the loop checks cancellation and actuates
    actuation: Arc<Mutex<()>>,
    handle: JoinHandle<()>,
}

impl RunningLoop {
    /// Cancel and wait out an actuation that passed its cancellation check
    fn halt(self) {
        self.cancel.cancel();
        drop(self.actuation.lock());
    }
}

/// Single-timeline flash scheduler
pub struct PhaseScheduler {
    clock: Arc<dyn Clock>,
    phase_tx: Arc<watch::Sender<Phase>>,
    reference: Mutex<Option<i64>>,
    running: Mutex<Option<RunningLoop>>,
}

impl PhaseScheduler {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let (phase_tx, _) = watch::channel(Phase::Stopped);
        Self {
            clock,
            phase_tx: Arc::new(phase_tx),
            reference: Mutex::new(None),
            running: Mutex::new(None),
        }
    }

    /// Start a loop driving `on_change` with the desired lit state
    ///
    /// Any running loop is stopped first, under the same lock that installs
    /// the new one, so concurrent starts leave exactly one loop behind.
    /// `on_change` must not call back into [`stop`](Self::stop). Must be
    /// called within a tokio runtime.
    pub fn start<F>(&self, timing: FlashTiming, seat_is_even: bool, on_change: F)
    where
        F: FnMut(bool) + Send + 'static,
    {
        let mut running = self.running.lock();
        if let Some(previous) = running.take() {
            previous.halt();
        }
        self.phase_tx.send_replace(Phase::Stopped);

        let cycle = timing.cycle();
        let elapsed = self.clock.monotonic_ms() - timing.reference_timestamp;
        let phase = cycle.initial_phase(elapsed);

        let cancel = CancellationToken::new();
        let actuation = Arc::new(Mutex::new(()));
        let handle = tokio::spawn(Self::run_loop(
            cycle,
            phase,
            seat_is_even,
            on_change,
            Arc::clone(&self.phase_tx),
            cancel.clone(),
            Arc::clone(&actuation),
        ));

        info!(
            seat = if seat_is_even { "even" } else { "odd" },
            frequency = timing.frequency,
            period_ms = cycle.period_ms,
            on_ms = cycle.on_ms,
            initial_phase = %phase,
            "Flash timing started"
        );
        *running = Some(RunningLoop { cancel, actuation, handle });
    }

    async fn run_loop<F>(
        cycle: CycleTiming,
        mut phase: Phase,
        seat_is_even: bool,
        mut on_change: F,
        phase_tx: Arc<watch::Sender<Phase>>,
        cancel: CancellationToken,
        actuation: Arc<Mutex<()>>,
    ) where
        F: FnMut(bool) + Send + 'static,
    {
        let mut transitions = 0u64;

        loop {
            let lit_slot = phase.should_flash(seat_is_even);
            // A lit slot rounded down to nothing is skipped, not actuated
            let lit = lit_slot && cycle.on_ms > 0;
            {
                let _guard = actuation.lock();
                if cancel.is_cancelled() {
                    break;
                }
                phase_tx.send_replace(phase);
                on_change(lit);
            }
            transitions += 1;
            trace!(%phase, lit, "Phase transition");

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(cycle.slot_duration(lit_slot)) => {}
            }
            phase = phase.flipped();
        }

        debug!(transitions, "Flash loop ended");
    }

    /// Stop the running loop, if any, and publish `Stopped`
    ///
    /// Safe to call from any thread, any number of times, concurrently with
    /// the loop. Callers are expected to force their output dark afterwards.
    pub fn stop(&self) {
        let mut running = self.running.lock();
        if let Some(previous) = running.take() {
            previous.halt();
            debug!("Flash timing stopped");
        }
        self.phase_tx.send_replace(Phase::Stopped);
    }

    /// Store the reference used by the next start
    ///
    /// A running loop keeps the anchor it started with until restarted.
    pub fn synchronize(&self, timestamp_ms: i64) {
        *self.reference.lock() = Some(timestamp_ms);
        debug!(timestamp = timestamp_ms, "Synchronized with timestamp");
    }

    /// Last synchronized reference, if any
    pub fn reference_timestamp(&self) -> Option<i64> {
        *self.reference.lock()
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().as_ref().is_some_and(|running| !running.handle.is_finished())
    }

    pub fn current_phase(&self) -> Phase {
        *self.phase_tx.borrow()
    }

    /// Phases, current value first
    pub fn subscribe(&self) -> WatchStream<Phase> {
        WatchStream::new(self.phase_tx.subscribe())
    }

    /// Where this seat is within the global cycle right now, in ms
    ///
    /// Even seats start their cycle at the reference; odd seats one period
    /// later, so both read 0 at the start of their own lit slot.
    pub fn seat_cycle_offset(&self, cycle: CycleTiming, seat_is_even: bool, reference: i64) -> u64 {
        let elapsed = self.clock.monotonic_ms() - reference;
        let shift = if seat_is_even { 0 } else { cycle.period_ms as i64 };
        cycle.cycle_position(elapsed + shift)
    }
}

impl Drop for PhaseScheduler {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, SystemClock};
    use futures::StreamExt;
    use std::time::Duration;

    type Calls = Arc<Mutex<Vec<(u64, bool)>>>;

    /// Callback recording (virtual ms since start, lit)
    fn recorder(origin: tokio::time::Instant) -> (Calls, impl FnMut(bool) + Send + 'static) {
        let calls: Calls = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&calls);
        let callback = move |lit| {
            sink.lock().push((origin.elapsed().as_millis() as u64, lit));
        };
        (calls, callback)
    }

    #[tokio::test(start_paused = true)]
    async fn even_seat_alternates_on_shared_cycle() {
        let clock = SystemClock::new();
        let scheduler = PhaseScheduler::new(Arc::new(clock.clone()));
        let (calls, callback) = recorder(tokio::time::Instant::now());

        // reference at 0, now at 0: cycle position 0 => EVEN_ON_ODD_OFF
        scheduler.start(FlashTiming::new(2, 0.5, 0), true, callback);
        tokio::time::sleep(Duration::from_millis(1_100)).await;
        scheduler.stop();

        let calls = calls.lock().clone();
        assert_eq!(
            calls,
            vec![(0, true), (250, false), (500, true), (750, false), (1_000, true)]
        );
        assert_eq!(scheduler.current_phase(), Phase::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn odd_seat_is_dark_in_first_phase() {
        let scheduler = PhaseScheduler::new(Arc::new(SystemClock::new()));
        let (calls, callback) = recorder(tokio::time::Instant::now());

        scheduler.start(FlashTiming::new(1, 0.3, 0), false, callback);
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        scheduler.stop();

        // dark slot 700ms (off), then lit slot 300ms (on), then dark again
        let calls = calls.lock().clone();
        assert_eq!(calls, vec![(0, false), (700, true), (1_000, false)]);
    }

    #[tokio::test(start_paused = true)]
    async fn late_joiner_anchors_to_reference() {
        let clock = ManualClock::new(2_500, 0);
        let scheduler = PhaseScheduler::new(Arc::new(clock));
        let mut phases = scheduler.subscribe();
        assert_eq!(phases.next().await, Some(Phase::Stopped));

        // 2500ms after reference at 1Hz: 2500 mod 2000 = 500 < 1000
        scheduler.start(FlashTiming::new(1, 0.5, 0), true, |_| {});
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(phases.next().await, Some(Phase::EvenOnOddOff));
        scheduler.stop();
        assert_eq!(phases.next().await, Some(Phase::Stopped));
    }

    #[tokio::test(start_paused = true)]
    async fn joiner_in_second_half_starts_odd_phase() {
        let clock = ManualClock::new(1_500, 0);
        let scheduler = PhaseScheduler::new(Arc::new(clock));
        let (calls, callback) = recorder(tokio::time::Instant::now());

        scheduler.start(FlashTiming::new(1, 0.5, 0), true, callback);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(scheduler.current_phase(), Phase::EvenOffOddOn);
        scheduler.stop();
        assert_eq!(calls.lock().first(), Some(&(0, false)));
    }

    #[tokio::test(start_paused = true)]
    async fn no_callbacks_after_stop_returns() {
        let scheduler = PhaseScheduler::new(Arc::new(SystemClock::new()));
        let (calls, callback) = recorder(tokio::time::Instant::now());

        scheduler.start(FlashTiming::new(10, 0.5, 0), true, callback);
        tokio::time::sleep(Duration::from_millis(120)).await;
        scheduler.stop();
        let seen = calls.lock().len();

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(calls.lock().len(), seen);
        assert!(!scheduler.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent_and_coalesces() {
        let scheduler = Arc::new(PhaseScheduler::new(Arc::new(SystemClock::new())));
        scheduler.start(FlashTiming::new(5, 0.5, 0), true, |_| {});
        tokio::time::sleep(Duration::from_millis(50)).await;

        let other = Arc::clone(&scheduler);
        let concurrent = tokio::spawn(async move { other.stop() });
        scheduler.stop();
        concurrent.await.unwrap();
        scheduler.stop();

        assert_eq!(scheduler.current_phase(), Phase::Stopped);
        assert!(!scheduler.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn starting_again_replaces_the_running_loop() {
        let scheduler = PhaseScheduler::new(Arc::new(SystemClock::new()));
        let (first, first_cb) = recorder(tokio::time::Instant::now());
        let (second, second_cb) = recorder(tokio::time::Instant::now());

        scheduler.start(FlashTiming::new(2, 0.5, 0), true, first_cb);
        tokio::time::sleep(Duration::from_millis(100)).await;
        scheduler.start(FlashTiming::new(2, 0.5, 0), true, second_cb);
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        scheduler.stop();

        assert_eq!(first.lock().len(), 1);
        assert!(second.lock().len() >= 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_starts_leave_a_single_loop() {
        let scheduler = Arc::new(PhaseScheduler::new(Arc::new(SystemClock::new())));
        let actuations = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let barrier = Arc::new(tokio::sync::Barrier::new(8));

        let starters: Vec<_> = (0..8)
            .map(|_| {
                let scheduler = Arc::clone(&scheduler);
                let actuations = Arc::clone(&actuations);
                let barrier = Arc::clone(&barrier);
                tokio::spawn(async move {
                    barrier.wait().await;
                    scheduler.start(FlashTiming::new(10, 0.5, 0), true, move |_| {
                        actuations.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    });
                })
            })
            .collect();
        for starter in starters {
            starter.await.unwrap();
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
        scheduler.stop();
        let seen = actuations.load(std::sync::atomic::Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(actuations.load(std::sync::atomic::Ordering::SeqCst), seen);
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn synchronize_only_affects_next_start() {
        let clock = ManualClock::new(0, 0);
        let scheduler = PhaseScheduler::new(Arc::new(clock));
        assert_eq!(scheduler.reference_timestamp(), None);

        scheduler.synchronize(42_000);
        assert_eq!(scheduler.reference_timestamp(), Some(42_000));
        assert!(!scheduler.is_running());
    }

    #[test]
    fn odd_seats_are_offset_by_one_period() {
        let clock = ManualClock::new(2_250, 0);
        let scheduler = PhaseScheduler::new(Arc::new(clock));
        let cycle = CycleTiming::new(1, 0.5);
        assert_eq!(scheduler.seat_cycle_offset(cycle, true, 0), 250);
        assert_eq!(scheduler.seat_cycle_offset(cycle, false, 0), 1_250);
    }
}
