//! Failure classification policies.
//!
//! # Responsibilities
//! - Decide, from outcomes observed while closed, when the breaker trips
//! - Expose failure/sample counts for snapshots
//!
//! # Design Decisions
//! - Policies are plain state owned by the breaker; the breaker's lock guards them
//! - Policies never see half-open outcomes
//! - History is cleared whenever the breaker re-enters Closed

use std::collections::VecDeque;
use std::fmt::Debug;

use crate::config::PolicyConfig;

/// Strategy that decides when a closed breaker should open.
pub trait FailurePolicy: Debug + Send + Sync {
    /// Short name for logs and snapshots.
    fn name(&self) -> &'static str;

    /// Record one outcome. Returns true if the breaker should open.
    fn record(&mut self, failed: bool) -> bool;

    /// Forget all recorded outcomes.
    fn reset(&mut self);

    /// Failures currently counted against the threshold.
    fn failure_count(&self) -> u32;

    /// Outcomes currently retained.
    fn sample_count(&self) -> u32;
}

/// Opens after `threshold` failures in a row. Any success resets the count.
#[derive(Debug, Clone)]
pub struct ConsecutiveFailures {
    threshold: u32,
    failures: u32,
}

impl ConsecutiveFailures {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            failures: 0,
        }
    }
}

impl FailurePolicy for ConsecutiveFailures {
    fn name(&self) -> &'static str {
        "consecutive"
    }

    fn record(&mut self, failed: bool) -> bool {
        if failed {
            self.failures = self.failures.saturating_add(1);
        } else {
            self.failures = 0;
        }
        self.failures >= self.threshold
    }

    fn reset(&mut self) {
        self.failures = 0;
    }

    fn failure_count(&self) -> u32 {
        self.failures
    }

    fn sample_count(&self) -> u32 {
        self.failures
    }
}

/// Opens when the failure rate over the last `window` outcomes reaches
/// `failure_rate`. Never opens before `window` outcomes have been seen.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    window: usize,
    failure_rate: f64,
    samples: VecDeque<bool>,
    failures: usize,
}

impl SlidingWindow {
    pub fn new(window: u32, failure_rate: f64) -> Self {
        let window = window.max(1) as usize;
        Self {
            window,
            failure_rate,
            samples: VecDeque::with_capacity(window),
            failures: 0,
        }
    }
}

impl FailurePolicy for SlidingWindow {
    fn name(&self) -> &'static str {
        "sliding_window"
    }

    fn record(&mut self, failed: bool) -> bool {
        if self.samples.len() == self.window {
            if let Some(true) = self.samples.pop_front() {
                self.failures -= 1;
            }
        }
        self.samples.push_back(failed);
        if failed {
            self.failures += 1;
        }

        if self.samples.len() < self.window {
            return false;
        }
        (self.failures as f64 / self.window as f64) >= self.failure_rate
    }

    fn reset(&mut self) {
        self.samples.clear();
        self.failures = 0;
    }

    fn failure_count(&self) -> u32 {
        self.failures as u32
    }

    fn sample_count(&self) -> u32 {
        self.samples.len() as u32
    }
}

/// Build the configured policy.
pub fn from_config(config: &PolicyConfig) -> Box<dyn FailurePolicy> {
    match *config {
        PolicyConfig::Consecutive { threshold } => Box::new(ConsecutiveFailures::new(threshold)),
        PolicyConfig::SlidingWindow { window, failure_rate } => {
            Box::new(SlidingWindow::new(window, failure_rate))
        }
    }
}
