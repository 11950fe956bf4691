//! Comparison session: runs every contract operation against a candidate
//! and folds case verdicts into a [`ComparisonReport`].

#![allow(missing_docs)]

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;

use crate::compare::equivalence::Checker;
use crate::contract::{Contract, ContractOperation, match_operations};
use crate::core::config::Config;
use crate::core::errors::{EqeError, Result};
use crate::engine::cancel::{Budget, CancelToken, deadline};
use crate::engine::verdict::{Anomaly, ComparisonReport, Discrepancy, Tally, Verdict};
use crate::engine::worker::{CaseVerdict, WorkerPool, draw_and_judge, judge};
use crate::execute::executor::{Executor, Side};
use crate::generate::binder::{Binder, Phase};
use crate::generate::registry::TypeRegistry;
use crate::logger::sink::{EngineEvent, EventLogHandle};
use crate::model::implementation::Implementation;

/// A reference implementation, its contract and the settings to compare
/// candidates with. Reusable across candidates.
pub struct Engine {
    contract: Arc<Contract>,
    reference: Arc<dyn Implementation>,
    config: Config,
    registry: Arc<TypeRegistry>,
    events: Option<EventLogHandle>,
}

/// Per-comparison context shared by every operation.
struct Run<'a> {
    executor: Executor<'a>,
    checker: Checker,
    token: &'a CancelToken,
    comparison: String,
}

impl Engine {
    /// Validate `config` and the contract's generators against `reference`.
    pub fn new(contract: Arc<Contract>, reference: Arc<dyn Implementation>, config: Config) -> Result<Self> {
        config.validate()?;
        let surface = reference.describe();
        for op in contract.operations() {
            if surface.find(&op.id()) != Some(&op.signature) {
                return Err(EqeError::declaration(format!(
                    "reference does not describe {} as declared in the contract",
                    op.signature
                )));
            }
        }
        let registry = Arc::clone(contract.registry());
        let engine = Self {
            contract,
            reference,
            config,
            registry,
            events: None,
        };
        engine.check_generators()?;
        Ok(engine)
    }

    /// Shadow the contract's generator bindings for the comparisons run by
    /// this engine.
    pub fn with_overrides<F>(mut self, configure: F) -> Result<Self>
    where
        F: FnOnce(&mut TypeRegistry) -> Result<()>,
    {
        let mut overlay = TypeRegistry::overlay(Arc::clone(self.contract.registry()));
        configure(&mut overlay)?;
        self.registry = Arc::new(overlay);
        self.check_generators()?;
        Ok(self)
    }

    /// Send structured events to a running logger thread.
    #[must_use]
    pub fn with_event_log(mut self, events: EventLogHandle) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn contract(&self) -> &Contract {
        &self.contract
    }

    /// Compare `candidate` under the configured run budgets.
    ///
    /// A contract mismatch is returned as an error before any case runs.
    pub fn compare(&self, candidate: &dyn Implementation) -> Result<ComparisonReport> {
        let token = CancelToken::from_config(&self.config.execution);
        self.compare_with(candidate, &token)
    }

    /// Like [`Engine::compare`], but a contract mismatch becomes a report
    /// with a single `missing_operation` verdict.
    pub fn report(&self, candidate: &dyn Implementation) -> Result<ComparisonReport> {
        match self.compare(candidate) {
            Err(EqeError::ContractMismatch { operation, details }) => {
                self.mismatch_report(candidate, &operation, details)
            }
            other => other,
        }
    }

    /// Compare `candidate`, stopping cooperatively when `token` trips.
    pub fn compare_with(&self, candidate: &dyn Implementation, token: &CancelToken) -> Result<ComparisonReport> {
        let started_at = Utc::now();
        let started = Instant::now();
        let comparison = format!("{} vs {}", self.reference.label(), candidate.label());
        let config_hash = self.config.stable_hash()?;
        self.emit(EngineEvent::ComparisonStarted {
            comparison: comparison.clone(),
            seed: self.config.generation.seed,
            config_hash: config_hash.clone(),
            operations: self.contract.operations().len(),
        });

        let matching = match match_operations(
            &self.contract,
            &candidate.describe(),
            self.config.comparison.reject_extra_operations,
        ) {
            Ok(matching) => matching,
            Err(err) => {
                self.emit(EngineEvent::ContractMismatch {
                    comparison,
                    code: err.code().to_string(),
                    message: err.to_string(),
                });
                return Err(err);
            }
        };

        let (reference_signatures, candidate_signatures) = Executor::signatures(&self.contract, &matching);
        let run = Run {
            executor: Executor::new(
                &self.contract,
                &self.registry,
                &self.config.generation,
                Side {
                    implementation: self.reference.as_ref(),
                    signatures: &reference_signatures,
                },
                Side {
                    implementation: candidate,
                    signatures: &candidate_signatures,
                },
                self.config.execution.receiver_retries,
            ),
            checker: Checker::from_config(&self.config.comparison),
            token,
            comparison,
        };

        let verdicts: Vec<Verdict> = self
            .contract
            .operations()
            .iter()
            .enumerate()
            .map(|(index, op)| self.compare_operation(&run, index, op))
            .collect();

        let stopped_by = token
            .reason()
            .or_else(|| verdicts.iter().find_map(|v| v.stopped_by));
        let report = ComparisonReport {
            reference: self.reference.label().to_string(),
            candidate: candidate.label().to_string(),
            seed: self.config.generation.seed,
            config_hash,
            started_at,
            elapsed_ms: elapsed_ms(started),
            completed: stopped_by.is_none(),
            stopped_by,
            verdicts,
        };
        self.emit(EngineEvent::ComparisonFinished {
            comparison: run.comparison,
            equivalent: report.is_equivalent(),
            cases_run: report.total_cases(),
            discarded: report.total_discarded(),
            duration_ms: report.elapsed_ms,
        });
        Ok(report)
    }

    fn compare_operation(&self, run: &Run<'_>, index: usize, op: &ContractOperation) -> Verdict {
        let started = Instant::now();
        let operation = op.id().to_string();
        let op_deadline = deadline(self.config.execution.operation_timeout_ms);
        let fail_fast = self.config.execution.fail_fast;
        self.emit(EngineEvent::OperationStarted {
            comparison: run.comparison.clone(),
            operation: operation.clone(),
        });

        let mut tally = Tally::default();
        let shape = op.shape();
        let deterministic = run.executor.binder().deterministic(&shape);
        let mut stopped = false;
        for case in &deterministic {
            let verdict = match admit(run.token, op_deadline) {
                Some(budget) => CaseVerdict::Stopped(budget),
                None => judge(&run.executor, &run.checker, index, case),
            };
            stopped = verdict.stops(fail_fast);
            self.record(&mut tally, run, &operation, case.phase, case.index, verdict);
            if stopped {
                break;
            }
        }

        let random = self.random_count(op, deterministic.len());
        if !stopped && random > 0 {
            let pool = WorkerPool::new(self.config.execution.parallelism);
            let results = pool.run(random, |case_index| {
                let verdict = match admit(run.token, op_deadline) {
                    Some(budget) => CaseVerdict::Stopped(budget),
                    None => draw_and_judge(&run.executor, &run.checker, index, &shape, case_index).1,
                };
                let stop = verdict.stops(fail_fast);
                (verdict, stop)
            });
            for (case_index, slot) in results.into_iter().enumerate() {
                let Some(verdict) = slot else {
                    break;
                };
                let stop = verdict.stops(fail_fast);
                self.record(&mut tally, run, &operation, Phase::Random, case_index, verdict);
                if stop {
                    break;
                }
            }
        }

        let verdict = tally.into_verdict(op.signature.clone(), elapsed_ms(started));
        self.emit(EngineEvent::OperationFinished {
            comparison: run.comparison.clone(),
            operation,
            status: verdict.status.to_string(),
            cases_run: verdict.cases_run,
            discarded: verdict.discarded,
            duration_ms: verdict.elapsed_ms,
        });
        verdict
    }

    fn record(
        &self,
        tally: &mut Tally,
        run: &Run<'_>,
        operation: &str,
        phase: Phase,
        case_index: usize,
        verdict: CaseVerdict,
    ) {
        match verdict {
            CaseVerdict::Passed => tally.cases_run += 1,
            CaseVerdict::Failed(failed) => {
                tally.cases_run += 1;
                if tally.discrepancy.is_none() {
                    let (mismatch, execution) = *failed;
                    self.emit(EngineEvent::DiscrepancyFound {
                        comparison: run.comparison.clone(),
                        operation: operation.to_string(),
                        kind: mismatch.kind.as_str().to_string(),
                        phase: phase.to_string(),
                        case_index,
                        details: mismatch.details.clone(),
                    });
                    tally.discrepancy = Some(Discrepancy::observed(mismatch, execution));
                }
            }
            CaseVerdict::Discarded(_) => tally.discarded += 1,
            CaseVerdict::Anomaly(details) => {
                self.emit(EngineEvent::Anomaly {
                    comparison: run.comparison.clone(),
                    operation: operation.to_string(),
                    phase: phase.to_string(),
                    case_index,
                    details: details.clone(),
                });
                tally.anomalies.push(Anomaly {
                    phase,
                    case_index,
                    details,
                });
            }
            CaseVerdict::Exhausted { attempts } => {
                let details = format!("random case {case_index} skipped on all {attempts} attempts");
                self.emit(EngineEvent::GenerationExhausted {
                    comparison: run.comparison.clone(),
                    operation: operation.to_string(),
                    details: details.clone(),
                });
                tally.diagnostic = Some(details);
            }
            CaseVerdict::Stopped(budget) => {
                self.emit(EngineEvent::BudgetExceeded {
                    comparison: run.comparison.clone(),
                    operation: Some(operation.to_string()),
                    budget: budget.to_string(),
                });
                tally.stopped_by = Some(budget);
            }
        }
    }

    /// Length of the random tail: none for argument-free operations, the
    /// remainder of an explicit case limit, or the configured default.
    fn random_count(&self, op: &ContractOperation, deterministic: usize) -> usize {
        if !op.needs_receiver() && op.shape().is_empty() {
            return 0;
        }
        op.limit.map_or(self.config.generation.random_cases, |limit| {
            limit.saturating_sub(deterministic)
        })
    }

    /// Every operation with a random tail, and every construction path a
    /// bound operation may need, must have a random source per position.
    fn check_generators(&self) -> Result<()> {
        let binder = Binder::new(&self.registry, &self.config.generation);
        let mut receivers_drawn = false;
        for op in self.contract.operations() {
            let shape = op.shape();
            if self.random_count(op, binder.deterministic(&shape).len()) == 0 {
                continue;
            }
            receivers_drawn |= op.needs_receiver();
            binder
                .check_random(&shape)
                .map_err(|details| EqeError::declaration(format!("{}: {details}", op.id())))?;
        }

        let has_bound = self.contract.operations().iter().any(ContractOperation::needs_receiver);
        for &path in self.contract.construction_paths() {
            let Some(ctor) = self.contract.operation(path) else {
                continue;
            };
            let shape = ctor.shape();
            let needs_random = receivers_drawn || (has_bound && binder.deterministic(&shape).is_empty());
            if needs_random {
                binder.check_random(&shape).map_err(|details| {
                    EqeError::declaration(format!("receiver construction via {}: {details}", ctor.id()))
                })?;
            }
        }
        Ok(())
    }

    fn mismatch_report(
        &self,
        candidate: &dyn Implementation,
        operation: &str,
        details: String,
    ) -> Result<ComparisonReport> {
        let signature = self
            .contract
            .operations()
            .iter()
            .map(|op| op.signature.clone())
            .chain(candidate.describe().operations)
            .find(|signature| signature.id().to_string() == operation);
        Ok(ComparisonReport {
            reference: self.reference.label().to_string(),
            candidate: candidate.label().to_string(),
            seed: self.config.generation.seed,
            config_hash: self.config.stable_hash()?,
            started_at: Utc::now(),
            elapsed_ms: 0,
            verdicts: signature
                .map(|signature| Verdict::missing(signature, details))
                .into_iter()
                .collect(),
            completed: true,
            stopped_by: None,
        })
    }

    fn emit(&self, event: EngineEvent) {
        if let Some(events) = &self.events {
            events.send(event);
        }
    }
}

/// Budget check and case charge before a case starts.
fn admit(token: &CancelToken, operation_deadline: Option<Instant>) -> Option<Budget> {
    token
        .check(operation_deadline)
        .or_else(|| token.charge_case().err())
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::equivalence::DiscrepancyKind;
    use crate::contract::ContractBuilder;
    use crate::engine::verdict::VerdictStatus;
    use crate::model::implementation::{Raised, Receiver};
    use crate::model::signature::{Signature, Surface};
    use crate::model::types::TypeDesc;
    use crate::model::value::Value;
    use crate::resource::Resources;

    /// `add(int, int) -> long` and `neg(int) -> int`, with a wrong answer
    /// for `add(1, 1)` when `broken` is set.
    struct Calc {
        label: &'static str,
        broken: bool,
        surface: Surface,
    }

    fn calc_surface() -> Surface {
        Surface::new()
            .with(Signature::static_op("add", vec![TypeDesc::Int, TypeDesc::Int], TypeDesc::Long))
            .with(Signature::static_op("neg", vec![TypeDesc::Int], TypeDesc::Int))
    }

    fn calc(label: &'static str, broken: bool) -> Calc {
        Calc {
            label,
            broken,
            surface: calc_surface(),
        }
    }

    impl Implementation for Calc {
        fn label(&self) -> &str {
            self.label
        }

        fn describe(&self) -> Surface {
            self.surface.clone()
        }

        fn invoke(
            &self,
            op: &Signature,
            _receiver: Option<&mut dyn Receiver>,
            args: &mut [Value],
            _resources: &mut Resources,
        ) -> std::result::Result<Value, Raised> {
            let arg = |i: usize| args[i].as_int().unwrap_or_default();
            match op.name.as_str() {
                "add" if self.broken && arg(0) == 1 && arg(1) == 1 => Ok(Value::Int(3)),
                "add" => Ok(Value::Int(arg(0) + arg(1))),
                "neg" => Ok(Value::Int(-arg(0))),
                other => Err(Raised::failure("Unsupported", other.to_string())),
            }
        }
    }

    fn engine(config: Config) -> Engine {
        let reference = calc("reference", false);
        let contract = ContractBuilder::new(&reference).build().unwrap();
        Engine::new(Arc::new(contract), Arc::new(reference), config).unwrap()
    }

    fn small_config() -> Config {
        let mut config = Config::default();
        config.generation.random_cases = 32;
        config.execution.parallelism = 2;
        config
    }

    #[test]
    fn identical_candidate_is_equivalent() {
        let engine = engine(small_config());
        let report = engine.compare(&calc("candidate", false)).unwrap();
        assert!(report.is_equivalent(), "{}", report.summary());
        assert!(report.completed);
        assert_eq!(report.verdicts.len(), 2);
        assert!(report.verdicts.iter().all(|v| v.cases_run > 32));
    }

    #[test]
    fn wrong_value_is_reported_with_its_case() {
        let engine = engine(small_config());
        let report = engine.compare(&calc("candidate", true)).unwrap();
        let verdict = report.verdict("add(int, int)").unwrap();
        assert_eq!(verdict.status, VerdictStatus::NotEquivalent);
        let discrepancy = verdict.discrepancy.as_ref().unwrap();
        assert_eq!(discrepancy.kind, DiscrepancyKind::ValueMismatch);
        let execution = discrepancy.execution.as_ref().unwrap();
        assert_eq!(execution.case.arguments, vec![Value::Int(1), Value::Int(1)]);
        assert_eq!(execution.candidate.result, Ok(Value::Int(3)));
        assert!(report.verdict("neg(int)").unwrap().is_equivalent());
    }

    #[test]
    fn missing_operation_is_a_contract_mismatch() {
        let engine = engine(small_config());
        let mut candidate = calc("candidate", false);
        candidate.surface = Surface::new().with(Signature::static_op(
            "add",
            vec![TypeDesc::Int, TypeDesc::Int],
            TypeDesc::Long,
        ));
        let err = engine.compare(&candidate).unwrap_err();
        assert_eq!(err.code(), "EQE-2001");

        let report = engine.report(&candidate).unwrap();
        assert_eq!(report.verdicts.len(), 1);
        assert_eq!(report.verdicts[0].operation, "neg(int)");
        let discrepancy = report.verdicts[0].discrepancy.as_ref().unwrap();
        assert_eq!(discrepancy.kind, DiscrepancyKind::MissingOperation);
    }

    #[test]
    fn case_budget_stops_run_early() {
        let mut config = small_config();
        config.execution.max_total_cases = 5;
        let report = engine(config).compare(&calc("candidate", false)).unwrap();
        assert!(!report.completed);
        assert_eq!(report.stopped_by, Some(Budget::TotalCases));
        assert_eq!(report.total_cases(), 5);
    }

    #[test]
    fn cancelled_token_runs_nothing() {
        let engine = engine(small_config());
        let token = CancelToken::unlimited();
        token.cancel();
        let report = engine.compare_with(&calc("candidate", false), &token).unwrap();
        assert_eq!(report.total_cases(), 0);
        assert_eq!(report.stopped_by, Some(Budget::Cancelled));
    }

    #[test]
    fn reference_must_describe_the_contract() {
        let reference = calc("reference", false);
        let contract = ContractBuilder::new(&reference).build().unwrap();
        let mut other = calc("other", false);
        other.surface = Surface::new();
        let err = Engine::new(Arc::new(contract), Arc::new(other), Config::default())
            .err()
            .unwrap();
        assert!(err.is_contract_error());
    }

    #[test]
    fn overrides_shadow_contract_generators() {
        use crate::generate::registry::{Generator, GeneratorKind};

        let mut config = small_config();
        config.generation.random_cases = 0;
        let engine = engine(config)
            .with_overrides(|registry| {
                registry.register(
                    TypeDesc::Int,
                    GeneratorKind::Simple,
                    Generator::values([Value::Int(1)]),
                )
            })
            .unwrap();
        let report = engine.compare(&calc("candidate", true)).unwrap();
        let verdict = report.verdict("add(int, int)").unwrap();
        let execution = verdict.discrepancy.as_ref().unwrap().execution.as_ref().unwrap();
        assert_eq!(execution.case.phase, Phase::Simple);
        assert_eq!(execution.case.index, 0);
    }

    #[test]
    fn events_reach_the_log() {
        use crate::core::config::LoggingConfig;
        use crate::logger::sink::spawn_event_log;

        let dir = tempfile::tempdir().unwrap();
        let logging = LoggingConfig {
            enabled: true,
            jsonl_path: dir.path().join("events.jsonl"),
            ..LoggingConfig::default()
        };
        let (handle, join) = spawn_event_log(&logging).unwrap();
        let engine = engine(small_config()).with_event_log(handle.clone());
        engine.compare(&calc("candidate", true)).unwrap();
        handle.shutdown();
        join.join().unwrap();

        let contents = std::fs::read_to_string(dir.path().join("events.jsonl")).unwrap();
        assert!(contents.contains("\"comparison_start\""));
        assert!(contents.contains("\"discrepancy\""));
        assert!(contents.contains("\"value_mismatch\""));
        assert!(contents.contains("\"comparison_complete\""));
    }
}
