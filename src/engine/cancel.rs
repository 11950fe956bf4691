//! Cooperative cancellation and run budgets.

#![allow(missing_docs)]

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::config::ExecutionConfig;

/// Which budget stopped work early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Budget {
    /// Explicit [`CancelToken::cancel`].
    Cancelled,
    RunTime,
    OperationTime,
    TotalCases,
}

impl fmt::Display for Budget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cancelled => "cancelled",
            Self::RunTime => "run time budget",
            Self::OperationTime => "operation time budget",
            Self::TotalCases => "total case budget",
        })
    }
}

/// Shared stop signal, checked between cases.
///
/// Run-wide budgets trip the token for every operation. The per-operation
/// deadline is passed in by the caller and never trips the token.
#[derive(Debug)]
pub struct CancelToken {
    stopped: AtomicBool,
    reason: Mutex<Option<Budget>>,
    run_deadline: Option<Instant>,
    max_cases: u64,
    cases: AtomicU64,
}

impl CancelToken {
    /// A token with no budgets.
    pub fn unlimited() -> Self {
        Self {
            stopped: AtomicBool::new(false),
            reason: Mutex::new(None),
            run_deadline: None,
            max_cases: 0,
            cases: AtomicU64::new(0),
        }
    }

    /// A token enforcing the run-wide budgets of `config`, starting now.
    pub fn from_config(config: &ExecutionConfig) -> Self {
        Self {
            run_deadline: deadline(config.run_timeout_ms),
            max_cases: config.max_total_cases,
            ..Self::unlimited()
        }
    }

    pub fn cancel(&self) {
        self.trip(Budget::Cancelled);
    }

    fn trip(&self, budget: Budget) {
        let mut reason = self.reason.lock();
        if reason.is_none() {
            *reason = Some(budget);
        }
        self.stopped.store(true, Ordering::Release);
    }

    /// First budget that stopped the run, if any.
    pub fn reason(&self) -> Option<Budget> {
        *self.reason.lock()
    }

    /// Why work should stop now, if it should.
    pub fn check(&self, operation_deadline: Option<Instant>) -> Option<Budget> {
        if self.stopped.load(Ordering::Acquire) {
            return self.reason();
        }
        let now = Instant::now();
        if self.run_deadline.is_some_and(|at| now >= at) {
            self.trip(Budget::RunTime);
            return Some(Budget::RunTime);
        }
        if operation_deadline.is_some_and(|at| now >= at) {
            return Some(Budget::OperationTime);
        }
        None
    }

    /// Reserve one case against the total budget.
    pub fn charge_case(&self) -> Result<(), Budget> {
        if self.max_cases == 0 {
            self.cases.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }
        let charged = self
            .cases
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                (used < self.max_cases).then_some(used + 1)
            });
        match charged {
            Ok(_) => Ok(()),
            Err(_) => {
                self.trip(Budget::TotalCases);
                Err(Budget::TotalCases)
            }
        }
    }

    /// Cases charged so far.
    pub fn cases_charged(&self) -> u64 {
        self.cases.load(Ordering::Relaxed)
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::unlimited()
    }
}

/// Deadline `ms` from now; zero disables.
pub fn deadline(ms: u64) -> Option<Instant> {
    (ms > 0).then(|| Instant::now() + Duration::from_millis(ms))
}
