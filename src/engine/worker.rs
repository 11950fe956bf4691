//! Random-phase worker pool.
//!
//! Case indices are fed through a bounded channel to scoped worker threads.
//! Every index is evaluated independently, so the result for index `i` does
//! not depend on which worker ran it. Once a stopping verdict is recorded,
//! higher indices are skipped but every lower index still runs, which keeps
//! the folded verdict identical for any worker count.

#![allow(missing_docs)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use crossbeam_channel as channel;
use parking_lot::Mutex;

use crate::compare::equivalence::{Checker, Mismatch};
use crate::engine::cancel::Budget;
use crate::execute::executor::Executor;
use crate::execute::outcome::{CaseRun, Execution};
use crate::generate::binder::{CaseShape, Draw, InputCase};

/// Judgement of one case.
#[derive(Debug, Clone, PartialEq)]
pub enum CaseVerdict {
    Passed,
    Failed(Box<(Mismatch, Execution)>),
    Discarded(String),
    Anomaly(String),
    /// The random generator skipped every attempt.
    Exhausted { attempts: u32 },
    /// A budget ran out before the case started.
    Stopped(Budget),
}

impl CaseVerdict {
    /// Whether no higher index needs to run after this one.
    pub fn stops(&self, fail_fast: bool) -> bool {
        match self {
            Self::Failed(_) => fail_fast,
            Self::Exhausted { .. } | Self::Stopped(_) => true,
            Self::Passed | Self::Discarded(_) | Self::Anomaly(_) => false,
        }
    }
}

/// Execute `case` for operation `index` and score it.
pub fn judge(executor: &Executor<'_>, checker: &Checker, index: usize, case: &InputCase) -> CaseVerdict {
    match executor.run(index, case) {
        CaseRun::Ran(execution) => match executor.verify(checker, index, &execution) {
            Ok(None) => CaseVerdict::Passed,
            Ok(Some(mismatch)) => CaseVerdict::Failed(Box::new((mismatch, *execution))),
            Err(details) => CaseVerdict::Anomaly(details),
        },
        CaseRun::Discarded(reason) => CaseVerdict::Discarded(reason),
        CaseRun::Anomaly(details) => CaseVerdict::Anomaly(details),
    }
}

/// Draw random case `case_index` for operation `index`, then judge it.
pub fn draw_and_judge(
    executor: &Executor<'_>,
    checker: &Checker,
    index: usize,
    shape: &CaseShape<'_>,
    case_index: usize,
) -> (Option<InputCase>, CaseVerdict) {
    match executor.binder().random(shape, case_index) {
        Draw::Case(case) => {
            let verdict = judge(executor, checker, index, &case);
            (Some(case), verdict)
        }
        Draw::Exhausted { attempts } => (None, CaseVerdict::Exhausted { attempts }),
        Draw::Anomaly(details) => (None, CaseVerdict::Anomaly(details)),
    }
}

/// Scoped worker pool for one random phase.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    pub parallelism: usize,
}

impl WorkerPool {
    pub fn new(parallelism: usize) -> Self {
        Self { parallelism }
    }

    /// Evaluate indices `0..count`. Slot `i` is `None` when index `i` was
    /// skipped because a lower index already stopped the stream.
    pub fn run<T, F>(&self, count: usize, evaluate: F) -> Vec<Option<T>>
    where
        T: Send,
        F: Fn(usize) -> (T, bool) + Sync,
    {
        if count == 0 {
            return Vec::new();
        }
        let workers = self.parallelism.clamp(1, count);
        if workers == 1 {
            return run_sequential(count, &evaluate);
        }

        let lowest_stop = AtomicUsize::new(usize::MAX);
        let results: Mutex<Vec<Option<T>>> = Mutex::new((0..count).map(|_| None).collect());
        let (work_tx, work_rx) = channel::bounded::<usize>(workers * 4);

        let spawned = thread::scope(|scope| {
            let mut spawned = 0;
            for id in 0..workers {
                let work_rx = work_rx.clone();
                let lowest_stop = &lowest_stop;
                let results = &results;
                let evaluate = &evaluate;
                let worker = thread::Builder::new()
                    .name(format!("eqe-worker-{id}"))
                    .spawn_scoped(scope, move || {
                        worker_thread(&work_rx, lowest_stop, results, evaluate);
                    });
                if worker.is_ok() {
                    spawned += 1;
                }
            }
            // Drop the original receiver so a send fails if every worker died.
            drop(work_rx);

            if spawned > 0 {
                for index in 0..count {
                    if index > lowest_stop.load(Ordering::Acquire) {
                        break;
                    }
                    if work_tx.send(index).is_err() {
                        break;
                    }
                }
            }
            drop(work_tx);
            spawned
        });

        if spawned == 0 {
            return run_sequential(count, &evaluate);
        }
        results.into_inner()
    }
}

fn run_sequential<T, F>(count: usize, evaluate: &F) -> Vec<Option<T>>
where
    F: Fn(usize) -> (T, bool),
{
    let mut results: Vec<Option<T>> = (0..count).map(|_| None).collect();
    for (index, slot) in results.iter_mut().enumerate() {
        let (value, stop) = evaluate(index);
        *slot = Some(value);
        if stop {
            break;
        }
    }
    results
}

/// Worker loop: pull indices until the channel closes, skipping anything
/// above the lowest stopping index seen so far.
fn worker_thread<T, F>(
    work_rx: &channel::Receiver<usize>,
    lowest_stop: &AtomicUsize,
    results: &Mutex<Vec<Option<T>>>,
    evaluate: &F,
) where
    F: Fn(usize) -> (T, bool),
{
    while let Ok(index) = work_rx.recv() {
        if index > lowest_stop.load(Ordering::Acquire) {
            continue;
        }
        let (value, stop) = evaluate(index);
        if stop {
            lowest_stop.fetch_min(index, Ordering::AcqRel);
        }
        if let Some(slot) = results.lock().get_mut(index) {
            *slot = Some(value);
        }
    }
}
