//! Circuit breaker guarding the primary upstream.
//!
//! # States
//! - Closed: normal operation, every request may try the primary
//! - Open: primary assumed down, admission denied until the cooldown ends
//! - Half-Open: a bounded number of probes test whether the primary recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open:      failure policy trips
//! Open → Half-Open:   first admission check at or after open_until (that check is the first probe)
//! Half-Open → Closed: first probe outcome is a success
//! Half-Open → Open:   first probe outcome is a failure
//! Open/Half-Open → Closed: force_close from an out-of-band probe
//! ```
//!
//! # Design Decisions
//! - All reads-then-writes happen under one write lock; snapshots take the read lock
//! - Every transition bumps a generation counter. Permits carry the generation
//!   they were granted in and reports from an older generation are ignored, so
//!   the first outcome after a transition is the only one that counts
//! - `force_close` takes the generation the caller observed before probing and
//!   is a no-op if any transition happened since. Whichever of a probe report or
//!   a force-close reaches the lock first decides the next state
//! - A half-open permit dropped without a report (the caller was cancelled)
//!   counts as a failed probe, so the breaker can never stall in Half-Open
//! - Upstream calls never happen while the lock is held

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::time::Instant;

use crate::config::BreakerConfig;
use crate::observability::metrics;
use crate::resilience::policy::{self, FailurePolicy};
use crate::upstream::CallError;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }
}

/// Result of one attempt against the primary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure(String),
    /// Counted as a failure, labelled separately.
    Timeout,
}

impl Outcome {
    pub fn is_failure(&self) -> bool {
        !matches!(self, Outcome::Success)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failure(_) => "failure",
            Outcome::Timeout => "timeout",
        }
    }
}

impl From<&CallError> for Outcome {
    fn from(err: &CallError) -> Self {
        match err {
            CallError::Timeout(_) => Outcome::Timeout,
            other => Outcome::Failure(other.to_string()),
        }
    }
}

/// Permission to call the primary, returned by [`Breaker::admit_primary`].
///
/// Must be handed back to [`Breaker::report_outcome`] once the call resolves.
/// Dropping an unreported half-open permit reopens the breaker.
#[derive(Debug)]
#[must_use = "a granted permit must be reported back to the breaker"]
pub struct Permit<'a> {
    breaker: &'a Breaker,
    generation: u64,
    probe: bool,
    settled: bool,
}

impl Permit<'_> {
    /// True if this permit was drawn from the half-open probe budget.
    pub fn is_probe(&self) -> bool {
        self.probe
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled && self.probe {
            self.breaker.abandon_probe(self.generation);
        }
    }
}

/// Why admission was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Denial {
    /// State at the moment of denial (Open or HalfOpen).
    pub state: BreakerState,
    /// Generation at the moment of denial; pass to `force_close`.
    pub generation: u64,
}

#[derive(Debug)]
pub enum Admission<'a> {
    Granted(Permit<'a>),
    Denied(Denial),
}

impl Admission<'_> {
    pub fn is_granted(&self) -> bool {
        matches!(self, Admission::Granted(_))
    }
}

/// Read-only view of the breaker.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub state: BreakerState,
    pub policy: &'static str,
    /// Failures counted by the policy (Closed only).
    pub failure_count: u32,
    /// Outcomes retained by the policy (Closed only).
    pub sample_count: u32,
    /// Probes still admissible (Half-Open only).
    pub half_open_budget: u32,
    /// Cooldown deadline in unix millis (Open only).
    pub open_until_ms: Option<u64>,
    pub open_remaining_ms: Option<u64>,
    pub now_ms: u64,
    pub generation: u64,
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    policy: Box<dyn FailurePolicy>,
    open_until: Option<Instant>,
    half_open_budget: u32,
    generation: u64,
}

/// Failure-aware admission control for the primary upstream.
#[derive(Debug)]
pub struct Breaker {
    open_cooldown: Duration,
    half_open_probe_count: u32,
    inner: RwLock<Inner>,
}

impl Breaker {
    /// Create a closed breaker with no recorded failures.
    pub fn new(policy: Box<dyn FailurePolicy>, open_cooldown: Duration, half_open_probe_count: u32) -> Self {
        metrics::set_breaker_state(BreakerState::Closed);
        Self {
            open_cooldown,
            half_open_probe_count: half_open_probe_count.max(1),
            inner: RwLock::new(Inner {
                state: BreakerState::Closed,
                policy,
                open_until: None,
                half_open_budget: 0,
                generation: 0,
            }),
        }
    }

    pub fn from_config(config: &BreakerConfig) -> Self {
        Self::new(
            policy::from_config(&config.policy),
            Duration::from_millis(config.open_cooldown_ms),
            config.half_open_probe_count,
        )
    }

    /// Decide whether the caller may call the primary.
    ///
    /// Performs the Open → Half-Open transition once the cooldown has elapsed;
    /// the call that performs it is granted the first probe.
    pub fn admit_primary(&self) -> Admission<'_> {
        let now = Instant::now();
        let mut inner = self.write();

        match inner.state {
            BreakerState::Closed => Admission::Granted(self.permit(inner.generation, false)),
            BreakerState::Open => {
                let cooled = inner.open_until.map_or(true, |until| now >= until);
                if !cooled {
                    return Admission::Denied(Denial {
                        state: BreakerState::Open,
                        generation: inner.generation,
                    });
                }
                self.transition(&mut inner, BreakerState::HalfOpen, now);
                inner.half_open_budget -= 1;
                Admission::Granted(self.permit(inner.generation, true))
            }
            BreakerState::HalfOpen => {
                if inner.half_open_budget == 0 {
                    return Admission::Denied(Denial {
                        state: BreakerState::HalfOpen,
                        generation: inner.generation,
                    });
                }
                inner.half_open_budget -= 1;
                Admission::Granted(self.permit(inner.generation, true))
            }
        }
    }

    /// Record the outcome of a call made under `permit`.
    ///
    /// Reports whose permit predates the latest transition are ignored.
    /// Returns true if the report was applied.
    pub fn report_outcome(&self, mut permit: Permit<'_>, outcome: &Outcome) -> bool {
        permit.settled = true;
        let now = Instant::now();
        let mut inner = self.write();

        if permit.generation != inner.generation {
            tracing::debug!(
                permit_generation = permit.generation,
                generation = inner.generation,
                outcome = outcome.label(),
                "Ignoring stale breaker report"
            );
            return false;
        }

        match inner.state {
            BreakerState::Closed => {
                if inner.policy.record(outcome.is_failure()) {
                    tracing::warn!(
                        policy = inner.policy.name(),
                        failures = inner.policy.failure_count(),
                        samples = inner.policy.sample_count(),
                        "Failure policy tripped"
                    );
                    self.transition(&mut inner, BreakerState::Open, now);
                }
                true
            }
            BreakerState::HalfOpen => {
                let next = if outcome.is_failure() {
                    BreakerState::Open
                } else {
                    BreakerState::Closed
                };
                self.transition(&mut inner, next, now);
                true
            }
            // Open never hands out permits in its own generation.
            BreakerState::Open => false,
        }
    }

    /// Resolve a half-open probe whose caller went away before reporting.
    fn abandon_probe(&self, generation: u64) {
        let now = Instant::now();
        let mut inner = self.write();
        if inner.generation != generation || inner.state != BreakerState::HalfOpen {
            return;
        }
        tracing::warn!(generation, "Half-open probe abandoned without an outcome");
        self.transition(&mut inner, BreakerState::Open, now);
    }

    /// Close the breaker after an out-of-band probe succeeded.
    ///
    /// `observed_generation` is the generation seen before the probe started.
    /// If the breaker has transitioned since, the earlier decision stands and
    /// this is a no-op. Returns true if the breaker was closed by this call.
    pub fn force_close(&self, observed_generation: u64) -> bool {
        let now = Instant::now();
        let mut inner = self.write();

        if inner.generation != observed_generation {
            tracing::debug!(
                observed_generation,
                generation = inner.generation,
                "Force close superseded by a newer transition"
            );
            return false;
        }

        match inner.state {
            BreakerState::Closed => false,
            BreakerState::Open | BreakerState::HalfOpen => {
                tracing::info!(from = inner.state.as_str(), "Forcing breaker closed");
                self.transition(&mut inner, BreakerState::Closed, now);
                true
            }
        }
    }

    /// Consistent read-only view. Never transitions.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let now = Instant::now();
        let wall_now = SystemTime::now();
        let inner = self.read();

        let (open_until_ms, open_remaining_ms) = match (inner.state, inner.open_until) {
            (BreakerState::Open, Some(until)) => {
                let remaining = until.saturating_duration_since(now);
                (Some(unix_millis(wall_now + remaining)), Some(remaining.as_millis() as u64))
            }
            _ => (None, None),
        };

        let closed = inner.state == BreakerState::Closed;
        BreakerSnapshot {
            state: inner.state,
            policy: inner.policy.name(),
            failure_count: if closed { inner.policy.failure_count() } else { 0 },
            sample_count: if closed { inner.policy.sample_count() } else { 0 },
            half_open_budget: if inner.state == BreakerState::HalfOpen {
                inner.half_open_budget
            } else {
                0
            },
            open_until_ms,
            open_remaining_ms,
            now_ms: unix_millis(wall_now),
            generation: inner.generation,
        }
    }

    pub fn state(&self) -> BreakerState {
        self.read().state
    }

    pub fn generation(&self) -> u64 {
        self.read().generation
    }

    pub fn open_cooldown(&self) -> Duration {
        self.open_cooldown
    }

    fn transition(&self, inner: &mut Inner, to: BreakerState, now: Instant) {
        let from = inner.state;
        inner.state = to;
        inner.generation += 1;

        match to {
            BreakerState::Closed => {
                inner.policy.reset();
                inner.open_until = None;
                inner.half_open_budget = 0;
            }
            BreakerState::Open => {
                inner.open_until = Some(now + self.open_cooldown);
                inner.half_open_budget = 0;
            }
            BreakerState::HalfOpen => {
                inner.open_until = None;
                inner.half_open_budget = self.half_open_probe_count;
            }
        }

        tracing::info!(
            from = from.as_str(),
            to = to.as_str(),
            generation = inner.generation,
            "Breaker state transition"
        );
        metrics::record_breaker_transition(from, to);
    }

    fn permit(&self, generation: u64, probe: bool) -> Permit<'_> {
        Permit {
            breaker: self,
            generation,
            probe,
            settled: false,
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }
}

fn unix_millis(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::policy::{ConsecutiveFailures, SlidingWindow};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Barrier};

    fn consecutive(threshold: u32, cooldown: Duration, probes: u32) -> Breaker {
        Breaker::new(Box::new(ConsecutiveFailures::new(threshold)), cooldown, probes)
    }

    fn fail(breaker: &Breaker) {
        match breaker.admit_primary() {
            Admission::Granted(permit) => {
                breaker.report_outcome(permit, &Outcome::Failure("boom".into()));
            }
            Admission::Denied(_) => panic!("expected admission"),
        }
    }

    fn granted(admission: Admission<'_>) -> Permit<'_> {
        match admission {
            Admission::Granted(permit) => permit,
            Admission::Denied(denial) => panic!("expected admission, denied in {:?}", denial.state),
        }
    }

    #[test]
    fn test_starts_closed() {
        let breaker = consecutive(5, Duration::from_secs(30), 1);
        let snap = breaker.snapshot();
        assert_eq!(snap.state, BreakerState::Closed);
        assert_eq!(snap.failure_count, 0);
        assert!(snap.open_until_ms.is_none());
        assert!(breaker.admit_primary().is_granted());
    }

    #[test]
    fn test_opens_only_on_consecutive_failures() {
        let breaker = consecutive(3, Duration::from_secs(30), 1);
        fail(&breaker);
        fail(&breaker);
        let permit = granted(breaker.admit_primary());
        breaker.report_outcome(permit, &Outcome::Success);
        assert_eq!(breaker.snapshot().failure_count, 0);

        fail(&breaker);
        fail(&breaker);
        assert_eq!(breaker.state(), BreakerState::Closed);
        fail(&breaker);
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.admit_primary().is_granted());
    }

    #[test]
    fn test_timeout_counts_as_failure() {
        let breaker = consecutive(1, Duration::from_secs(30), 1);
        let permit = granted(breaker.admit_primary());
        breaker.report_outcome(permit, &Outcome::Timeout);
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[test]
    fn test_sliding_window_waits_for_full_window() {
        let breaker = Breaker::new(Box::new(SlidingWindow::new(10, 0.5)), Duration::from_secs(30), 1);
        for _ in 0..9 {
            fail(&breaker);
        }
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert_eq!(breaker.snapshot().sample_count, 9);
        fail(&breaker);
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_denies_until_cooldown_then_single_probe() {
        let cooldown = Duration::from_secs(30);
        let breaker = consecutive(1, cooldown, 1);
        fail(&breaker);

        tokio::time::advance(cooldown - Duration::from_millis(1)).await;
        assert!(!breaker.admit_primary().is_granted());

        tokio::time::advance(Duration::from_millis(1)).await;
        let permit = granted(breaker.admit_primary());
        assert!(permit.is_probe());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        assert_eq!(breaker.snapshot().half_open_budget, 0);

        // Budget exhausted.
        match breaker.admit_primary() {
            Admission::Denied(denial) => assert_eq!(denial.state, BreakerState::HalfOpen),
            Admission::Granted(_) => panic!("second probe must be denied"),
        };
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_success_closes() {
        let cooldown = Duration::from_secs(5);
        let breaker = consecutive(2, cooldown, 1);
        fail(&breaker);
        fail(&breaker);
        tokio::time::advance(cooldown).await;

        let permit = granted(breaker.admit_primary());
        assert!(breaker.report_outcome(permit, &Outcome::Success));
        let snap = breaker.snapshot();
        assert_eq!(snap.state, BreakerState::Closed);
        assert_eq!(snap.failure_count, 0);
        assert!(breaker.admit_primary().is_granted());
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_failure_reopens_with_fresh_deadline() {
        let cooldown = Duration::from_secs(5);
        let breaker = consecutive(1, cooldown, 1);
        fail(&breaker);
        tokio::time::advance(cooldown).await;

        let permit = granted(breaker.admit_primary());
        breaker.report_outcome(permit, &Outcome::Failure("still down".into()));
        let snap = breaker.snapshot();
        assert_eq!(snap.state, BreakerState::Open);
        assert_eq!(snap.open_remaining_ms, Some(cooldown.as_millis() as u64));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_probe_outcome_wins() {
        let cooldown = Duration::from_secs(1);
        let breaker = consecutive(1, cooldown, 2);
        fail(&breaker);
        tokio::time::advance(cooldown).await;

        let first = granted(breaker.admit_primary());
        let second = granted(breaker.admit_primary());
        assert!(!breaker.admit_primary().is_granted());

        assert!(breaker.report_outcome(first, &Outcome::Success));
        assert!(!breaker.report_outcome(second, &Outcome::Failure("late".into())));
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn test_late_closed_reports_ignored_after_open() {
        let breaker = consecutive(1, Duration::from_secs(30), 1);
        let slow = granted(breaker.admit_primary());
        fail(&breaker);
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.report_outcome(slow, &Outcome::Success));
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[test]
    fn test_force_close_from_open() {
        let breaker = consecutive(1, Duration::from_secs(30), 1);
        fail(&breaker);
        let generation = breaker.snapshot().generation;
        assert!(breaker.force_close(generation));
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert!(breaker.admit_primary().is_granted());
    }

    #[test]
    fn test_force_close_noop_when_closed() {
        let breaker = consecutive(1, Duration::from_secs(30), 1);
        assert!(!breaker.force_close(breaker.generation()));
        assert_eq!(breaker.generation(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_close_vs_probe_report() {
        let cooldown = Duration::from_secs(1);
        let breaker = consecutive(1, cooldown, 1);
        fail(&breaker);
        let observed_open = breaker.generation();
        tokio::time::advance(cooldown).await;

        // A formal probe is admitted and fails before the prober reports back.
        let permit = granted(breaker.admit_primary());
        breaker.report_outcome(permit, &Outcome::Failure("down".into()));
        assert!(!breaker.force_close(observed_open));
        assert_eq!(breaker.state(), BreakerState::Open);

        // Now the prober wins the race against an outstanding probe.
        tokio::time::advance(cooldown).await;
        let permit = granted(breaker.admit_primary());
        assert!(breaker.force_close(breaker.generation()));
        assert!(!breaker.report_outcome(permit, &Outcome::Failure("stale".into())));
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn test_snapshot_does_not_transition() {
        let breaker = consecutive(1, Duration::ZERO, 1);
        fail(&breaker);
        let before = breaker.snapshot();
        let after = breaker.snapshot();
        assert_eq!(before.state, BreakerState::Open);
        assert_eq!(after.state, BreakerState::Open);
        assert_eq!(before.generation, after.generation);
    }

    #[test]
    fn test_half_open_admits_exactly_probe_count_under_contention() {
        let probes = 3;
        let breaker = Arc::new(consecutive(1, Duration::ZERO, probes));
        fail(&breaker);

        let threads = 32;
        let admitting = Arc::new(Barrier::new(threads));
        let holding = Arc::new(Barrier::new(threads));
        let admitted = Arc::new(AtomicU32::new(0));

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let breaker = breaker.clone();
                let admitting = admitting.clone();
                let holding = holding.clone();
                let admitted = admitted.clone();
                std::thread::spawn(move || {
                    admitting.wait();
                    let admission = breaker.admit_primary();
                    if admission.is_granted() {
                        admitted.fetch_add(1, Ordering::SeqCst);
                    }
                    // Keep permits alive until every thread has tried.
                    holding.wait();
                    drop(admission);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(admitted.load(Ordering::SeqCst), probes);
        // None of the probes reported, so the first dropped one reopened.
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_probe_permit_reopens() {
        let cooldown = Duration::from_secs(5);
        let breaker = consecutive(1, cooldown, 1);
        fail(&breaker);
        tokio::time::advance(cooldown).await;

        let permit = granted(breaker.admit_primary());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        drop(permit);

        let snap = breaker.snapshot();
        assert_eq!(snap.state, BreakerState::Open);
        assert_eq!(snap.open_remaining_ms, Some(cooldown.as_millis() as u64));

        tokio::time::advance(cooldown).await;
        let permit = granted(breaker.admit_primary());
        assert!(breaker.report_outcome(permit, &Outcome::Success));
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn test_dropped_closed_permit_is_not_counted() {
        let breaker = consecutive(1, Duration::from_secs(30), 1);
        drop(granted(breaker.admit_primary()));
        let snap = breaker.snapshot();
        assert_eq!(snap.state, BreakerState::Closed);
        assert_eq!(snap.failure_count, 0);
        assert_eq!(snap.generation, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_stale_probe_permit_is_ignored() {
        let cooldown = Duration::from_secs(1);
        let breaker = consecutive(1, cooldown, 2);
        fail(&breaker);
        tokio::time::advance(cooldown).await;

        let first = granted(breaker.admit_primary());
        let second = granted(breaker.admit_primary());
        assert!(breaker.report_outcome(first, &Outcome::Success));
        drop(second);
        assert_eq!(breaker.state(), BreakerState::Closed);
    }
}
