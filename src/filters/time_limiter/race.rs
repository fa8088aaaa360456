//! Racing a continuation against a deadline.
//!
//! # Responsibilities
//! - Arm a one-shot timer that triggers the request's cancel signal
//! - Run the continuation to completion on the calling task
//! - Decide, exactly once, whether the continuation or the timer won
//!
//! # Design Decisions
//! - The timer is a separately spawned task; the continuation is never
//!   dropped or preempted when it fires, only signalled
//! - The winner is decided by a single compare-and-swap on a shared verdict.
//!   The timer only cancels the request if it claimed the verdict first; the
//!   continuation's result only counts if it claimed it first. A continuation
//!   returning after the deadline claims for the timer, however late the
//!   timer task is scheduled
//! - The timer task is aborted as soon as the race is over, including when
//!   the race future itself is dropped
//! - No response side effects here; see `finalize.rs`

use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::pipeline::{CancelHandle, CancelReason};

const PENDING: u8 = 0;
const COMPLETED: u8 = 1;
const FIRED: u8 = 2;

/// Which side of the race won.
#[derive(Debug)]
pub enum RaceOutcome<T> {
    /// The continuation finished before the deadline.
    Completed(T),
    /// The deadline passed first. Carries the continuation's late value,
    /// which is superseded and must not be reported.
    TimedOut(T),
}

impl<T> RaceOutcome<T> {
    pub fn is_timed_out(&self) -> bool {
        matches!(self, RaceOutcome::TimedOut(_))
    }
}

#[derive(Debug)]
struct Verdict(AtomicU8);

impl Verdict {
    fn new() -> Self {
        Self(AtomicU8::new(PENDING))
    }

    /// Claim the race for `winner`. Only the first claim succeeds.
    fn claim(&self, winner: u8) -> bool {
        self.0
            .compare_exchange(PENDING, winner, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Aborts the timer task on drop.
#[derive(Debug)]
struct TimerGuard(JoinHandle<()>);

impl Drop for TimerGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// A deadline for one continuation.
#[derive(Debug, Clone, Copy)]
pub struct DeadlineRace {
    timeout: Duration,
}

impl DeadlineRace {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `continuation` under the deadline.
    ///
    /// The continuation always runs to completion. A zero timeout counts as
    /// already expired: the signal is triggered before the continuation starts.
    /// A `TimedOut` outcome implies `cancel` is triggered.
    ///
    /// Must be called within a Tokio runtime.
    pub async fn run<F, T>(&self, cancel: &CancelHandle, continuation: F) -> RaceOutcome<T>
    where
        F: Future<Output = T>,
    {
        let verdict = Arc::new(Verdict::new());
        let deadline = Instant::now() + self.timeout;

        let _timer = if self.timeout.is_zero() {
            verdict.claim(FIRED);
            cancel.cancel(CancelReason::Timeout);
            None
        } else {
            let verdict = Arc::clone(&verdict);
            let cancel = cancel.clone();
            let timeout = self.timeout;
            Some(TimerGuard(tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                if verdict.claim(FIRED) {
                    cancel.cancel(CancelReason::Timeout);
                }
            })))
        };

        let value = continuation.await;

        // The timer task may not have been polled yet, e.g. when the
        // continuation blocked the worker past the deadline.
        if Instant::now() >= deadline {
            verdict.claim(FIRED);
        }

        if verdict.claim(COMPLETED) {
            RaceOutcome::Completed(value)
        } else {
            // The timer may have claimed the verdict without having
            // triggered the signal yet.
            cancel.cancel(CancelReason::Timeout);
            RaceOutcome::TimedOut(value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_fast_continuation_completes() {
        let cancel = CancelHandle::new();
        let race = DeadlineRace::new(Duration::from_millis(200));

        let outcome = race
            .run(&cancel, async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                "ok"
            })
            .await;

        assert!(matches!(outcome, RaceOutcome::Completed("ok")));
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(!cancel.is_cancelled(), "timer must be disarmed after completion");
    }

    #[tokio::test]
    async fn test_slow_continuation_times_out() {
        let cancel = CancelHandle::new();
        let race = DeadlineRace::new(Duration::from_millis(20));

        let outcome = race
            .run(&cancel, async {
                tokio::time::sleep(Duration::from_millis(150)).await;
                "late"
            })
            .await;

        assert!(matches!(outcome, RaceOutcome::TimedOut("late")));
        assert_eq!(cancel.reason(), Some(CancelReason::Timeout));
    }

    #[tokio::test]
    async fn test_timeout_does_not_preempt() {
        let cancel = CancelHandle::new();
        let race = DeadlineRace::new(Duration::from_millis(10));
        let start = Instant::now();

        // Ignores the signal entirely.
        let outcome = race
            .run(&cancel, async {
                tokio::time::sleep(Duration::from_millis(100)).await;
            })
            .await;

        assert!(outcome.is_timed_out());
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_blocking_continuation_past_deadline_times_out() {
        let cancel = CancelHandle::new();
        let race = DeadlineRace::new(Duration::from_millis(20));

        // Never yields, so the timer task cannot run before it returns.
        let outcome = race
            .run(&cancel, async {
                std::thread::sleep(Duration::from_millis(150));
                "late"
            })
            .await;

        assert!(matches!(outcome, RaceOutcome::TimedOut("late")));
        assert_eq!(cancel.reason(), Some(CancelReason::Timeout));
    }

    #[tokio::test]
    async fn test_cooperative_continuation_stops_early() {
        let cancel = CancelHandle::new();
        let observer = cancel.clone();
        let race = DeadlineRace::new(Duration::from_millis(20));
        let start = Instant::now();

        let outcome = race
            .run(&cancel, async move {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(5)) => "finished",
                    _ = observer.cancelled() => "aborted",
                }
            })
            .await;

        assert!(matches!(outcome, RaceOutcome::TimedOut("aborted")));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_zero_timeout_is_already_expired() {
        let cancel = CancelHandle::new();
        let observer = cancel.clone();
        let mut ran = false;

        let outcome = DeadlineRace::new(Duration::ZERO)
            .run(&cancel, async {
                ran = true;
                observer.is_cancelled()
            })
            .await;

        assert!(ran, "continuation always runs");
        assert!(matches!(outcome, RaceOutcome::TimedOut(true)));
    }

    #[tokio::test]
    async fn test_errors_surface_only_when_completed() {
        let cancel = CancelHandle::new();
        let outcome: RaceOutcome<Result<(), &str>> = DeadlineRace::new(Duration::from_secs(1))
            .run(&cancel, async { Err("boom") })
            .await;
        assert!(matches!(outcome, RaceOutcome::Completed(Err("boom"))));

        let cancel = CancelHandle::new();
        let outcome: RaceOutcome<Result<(), &str>> = DeadlineRace::new(Duration::from_millis(5))
            .run(&cancel, async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Err("boom")
            })
            .await;
        assert!(outcome.is_timed_out());
    }

    #[tokio::test]
    async fn test_dropped_race_disarms_timer() {
        let cancel = CancelHandle::new();
        let race = DeadlineRace::new(Duration::from_millis(50));

        let dropped = tokio::time::timeout(
            Duration::from_millis(10),
            race.run(&cancel, tokio::time::sleep(Duration::from_secs(5))),
        )
        .await;
        assert!(dropped.is_err());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_photo_finish_has_exactly_one_winner() {
        for _ in 0..200 {
            let cancel = CancelHandle::new();
            let race = DeadlineRace::new(Duration::from_millis(1));

            let outcome = race
                .run(&cancel, tokio::time::sleep(Duration::from_millis(1)))
                .await;

            match outcome {
                RaceOutcome::Completed(()) => {
                    tokio::task::yield_now().await;
                    assert!(!cancel.is_cancelled(), "completed race must not cancel");
                }
                RaceOutcome::TimedOut(()) => {
                    assert_eq!(cancel.reason(), Some(CancelReason::Timeout));
                }
            }
        }
    }
}
