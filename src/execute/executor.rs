//! Runs one case against both implementations in isolation.
//!
//! Each side gets its own receiver, its own resource instances built from
//! the case's content, and its own copy of the arguments. Panics inside an
//! implementation are caught and recorded as failures of kind `panic`;
//! panics in contract callbacks (filters, verifiers, resource providers)
//! become anomalies of the case.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};

use crate::compare::equivalence::{Checker, Mismatch, Verification};
use crate::contract::{Contract, ContractOperation, OperationMatch};
use crate::core::config::GenerationConfig;
use crate::core::errors::panic_message;
use crate::execute::outcome::{CaseRun, Execution, Outcome, PANIC_KIND, Stage};
use crate::generate::binder::{Binder, CaseShape, Draw, InputCase, Phase};
use crate::generate::registry::TypeRegistry;
use crate::model::implementation::{Failure, Implementation, Raised, Receiver};
use crate::model::signature::Signature;
use crate::model::types::TypeDesc;
use crate::model::value::Value;
use crate::resource::{Resource, Resources};

/// One side of a comparison: an implementation and its signatures, indexed
/// by contract operation.
#[derive(Clone, Copy)]
pub struct Side<'a> {
    pub implementation: &'a dyn Implementation,
    pub signatures: &'a [Signature],
}

enum Constructed {
    Receiver(Box<dyn Receiver>),
    Failed(Failure),
    Skipped,
}

/// Executes cases for every operation of a matched contract.
pub struct Executor<'a> {
    contract: &'a Contract,
    registry: &'a TypeRegistry,
    binder: Binder<'a>,
    reference: Side<'a>,
    candidate: Side<'a>,
    receiver_retries: usize,
    /// Deterministic cases of each construction path, by contract index.
    construction_cases: BTreeMap<usize, Vec<InputCase>>,
}

impl<'a> Executor<'a> {
    pub fn new(
        contract: &'a Contract,
        registry: &'a TypeRegistry,
        generation: &GenerationConfig,
        reference: Side<'a>,
        candidate: Side<'a>,
        receiver_retries: usize,
    ) -> Self {
        let binder = Binder::new(registry, generation);
        let construction_cases = contract
            .construction_paths()
            .iter()
            .filter_map(|&path| {
                contract
                    .operation(path)
                    .map(|op| (path, binder.deterministic(&op.shape())))
            })
            .collect();
        Self {
            contract,
            registry,
            binder,
            reference,
            candidate,
            receiver_retries,
            construction_cases,
        }
    }

    /// Signatures to dispatch on each side, in contract order.
    pub fn signatures(contract: &Contract, matching: &OperationMatch) -> (Vec<Signature>, Vec<Signature>) {
        let reference = contract
            .operations()
            .iter()
            .map(|op| op.signature.clone())
            .collect();
        let candidate = contract
            .operations()
            .iter()
            .enumerate()
            .map(|(index, op)| {
                matching
                    .candidate_for(index)
                    .cloned()
                    .unwrap_or_else(|| op.signature.clone())
            })
            .collect();
        (reference, candidate)
    }

    pub fn binder(&self) -> &Binder<'a> {
        &self.binder
    }

    /// Execute `case` for contract operation `index` on both sides.
    pub fn run(&self, index: usize, case: &InputCase) -> CaseRun {
        let Some(op) = self.contract.operation(index) else {
            return CaseRun::Anomaly(format!("no contract operation at index {index}"));
        };
        match self.admits(op, &case.arguments) {
            Ok(true) => {}
            Ok(false) => return CaseRun::Discarded(format!("{} filtered the case", op.id())),
            Err(details) => return CaseRun::Anomaly(details),
        }
        if op.needs_receiver() {
            return self.run_bound(index, op, case);
        }

        let mut ref_resources = match self.instantiate(op, case, Resources::new()) {
            Ok(resources) => resources,
            Err(details) => return CaseRun::Anomaly(details),
        };
        let mut cand_resources = match self.instantiate(op, case, Resources::new()) {
            Ok(resources) => resources,
            Err(details) => return CaseRun::Anomaly(details),
        };
        let Some(reference) = self.perform(self.reference, index, None, case, &mut ref_resources) else {
            return CaseRun::Discarded("reference skipped the case".to_string());
        };
        let Some(candidate) = self.perform(self.candidate, index, None, case, &mut cand_resources) else {
            return CaseRun::Discarded("candidate skipped the case".to_string());
        };
        CaseRun::Ran(Box::new(Execution {
            case: case.clone(),
            receiver_case: None,
            reference,
            candidate,
        }))
    }

    fn run_bound(&self, index: usize, op: &ContractOperation, case: &InputCase) -> CaseRun {
        for retry in 0..=self.receiver_retries {
            let (path, receiver_case) = match self.receiver_case(case, retry) {
                Ok(Some(found)) => found,
                Ok(None) => continue,
                Err(run) => return run,
            };
            let Some(ctor) = self.contract.operation(path) else {
                return CaseRun::Anomaly(format!("construction path {path} is not an operation"));
            };
            match self.admits(ctor, &receiver_case.arguments) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(details) => return CaseRun::Anomaly(details),
            }

            let mut ref_resources = match self.world(ctor, &receiver_case, op, case) {
                Ok(resources) => resources,
                Err(details) => return CaseRun::Anomaly(details),
            };
            let mut ref_args = receiver_case.arguments.clone();
            let Constructed::Receiver(mut ref_receiver) =
                construct(self.reference, path, &mut ref_args, &mut ref_resources)
            else {
                continue;
            };

            let mut cand_resources = match self.world(ctor, &receiver_case, op, case) {
                Ok(resources) => resources,
                Err(details) => return CaseRun::Anomaly(details),
            };
            let mut cand_args = receiver_case.arguments.clone();
            let mut cand_receiver = match construct(self.candidate, path, &mut cand_args, &mut cand_resources) {
                Constructed::Receiver(receiver) => receiver,
                Constructed::Skipped => {
                    return CaseRun::Discarded("candidate skipped receiver construction".to_string());
                }
                Constructed::Failed(failure) => {
                    let reference = observe(
                        Stage::Construction,
                        Ok(Value::Null),
                        Some(&*ref_receiver),
                        &ref_resources,
                        BTreeMap::new(),
                    );
                    let candidate = observe(
                        Stage::Construction,
                        Err(failure),
                        None,
                        &cand_resources,
                        BTreeMap::new(),
                    );
                    return CaseRun::Ran(Box::new(Execution {
                        case: case.clone(),
                        receiver_case: Some(receiver_case),
                        reference,
                        candidate,
                    }));
                }
            };

            let Some(reference) =
                self.perform(self.reference, index, Some(&mut *ref_receiver), case, &mut ref_resources)
            else {
                return CaseRun::Discarded("reference skipped the case".to_string());
            };
            let Some(candidate) =
                self.perform(self.candidate, index, Some(&mut *cand_receiver), case, &mut cand_resources)
            else {
                return CaseRun::Discarded("candidate skipped the case".to_string());
            };
            return CaseRun::Ran(Box::new(Execution {
                case: case.clone(),
                receiver_case: Some(receiver_case),
                reference,
                candidate,
            }));
        }

        CaseRun::Discarded(format!(
            "no receiver could be built in {} attempts",
            self.receiver_retries + 1
        ))
    }

    /// Call the operation under test on one side. `None` when the side
    /// skipped the case.
    fn perform(
        &self,
        side: Side<'_>,
        index: usize,
        mut receiver: Option<&mut dyn Receiver>,
        case: &InputCase,
        resources: &mut Resources,
    ) -> Option<Outcome> {
        let params = self
            .contract
            .operation(index)
            .map_or(&[][..], |op| op.signature.params.as_slice());
        let mut args = case.arguments.clone();

        let constructs = side
            .signatures
            .get(index)
            .is_some_and(Signature::constructs_receiver);
        if constructs {
            let built = construct(side, index, &mut args, resources);
            let arguments = self.post_call_arguments(&case.arguments, &args, params);
            return match built {
                Constructed::Skipped => None,
                Constructed::Receiver(built) => Some(observe(
                    Stage::Invocation,
                    Ok(Value::Null),
                    Some(&*built),
                    resources,
                    arguments,
                )),
                Constructed::Failed(failure) => Some(observe(
                    Stage::Invocation,
                    Err(failure),
                    None,
                    resources,
                    arguments,
                )),
            };
        }

        let result = match side.signatures.get(index) {
            None => Err(missing_signature(index)),
            Some(signature) => {
                let called = catch_unwind(AssertUnwindSafe(|| {
                    side.implementation
                        .invoke(signature, receiver.as_deref_mut(), &mut args, resources)
                }));
                match called {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(Raised::Skip)) => return None,
                    Ok(Err(Raised::Failure(failure))) => Err(failure),
                    Err(payload) => Err(Failure::new(PANIC_KIND, panic_message(payload.as_ref()))),
                }
            }
        };
        let arguments = self.post_call_arguments(&case.arguments, &args, params);
        Some(observe(
            Stage::Invocation,
            result,
            receiver.as_deref(),
            resources,
            arguments,
        ))
    }

    /// Arguments as the call left them. Positions of cheap-copy types are
    /// diffed against the input and kept only when the call changed them;
    /// every other position is kept as is.
    fn post_call_arguments(&self, inputs: &[Value], args: &[Value], params: &[TypeDesc]) -> BTreeMap<usize, Value> {
        args.iter()
            .zip(params)
            .enumerate()
            .filter(|&(position, (value, ty))| !self.registry.is_cheap_copy(ty) || inputs.get(position) != Some(value))
            .map(|(position, (value, _))| (position, value.clone()))
            .collect()
    }

    /// Run the operation's parameter filter, if any.
    fn admits(&self, op: &ContractOperation, arguments: &[Value]) -> Result<bool, String> {
        let Some(filter) = &op.filter else {
            return Ok(true);
        };
        catch_unwind(AssertUnwindSafe(|| filter(arguments))).map_err(|payload| {
            format!(
                "parameter filter for {} panicked: {}",
                op.id(),
                panic_message(payload.as_ref())
            )
        })
    }

    /// Score an executed case with the operation's verifier, or the standard
    /// check when it has none. Construction-stage outcomes always get the
    /// standard check. `Err` when the verifier panicked.
    pub fn verify(&self, checker: &Checker, index: usize, execution: &Execution) -> Result<Option<Mismatch>, String> {
        let constructing =
            execution.reference.stage == Stage::Construction || execution.candidate.stage == Stage::Construction;
        let verifier = self
            .contract
            .operation(index)
            .and_then(|op| op.verifier.as_ref().map(|verifier| (op, verifier)));
        let Some((op, verifier)) = verifier.filter(|_| !constructing) else {
            return Ok(checker.check(&execution.reference, &execution.candidate));
        };
        let verification = Verification::new(checker, &execution.case, &execution.reference, &execution.candidate);
        catch_unwind(AssertUnwindSafe(|| verifier(&verification))).map_err(|payload| {
            format!("verifier for {} panicked: {}", op.id(), panic_message(payload.as_ref()))
        })
    }

    /// Pick the construction path and case for attempt `retry`. `Ok(None)`
    /// when the receiver generator is exhausted for this attempt.
    fn receiver_case(&self, case: &InputCase, retry: usize) -> Result<Option<(usize, InputCase)>, CaseRun> {
        let paths = self.contract.construction_paths();
        if paths.is_empty() {
            return Err(CaseRun::Anomaly("no construction path for bound operation".to_string()));
        }
        let slot = case.index.wrapping_add(retry);
        let path = paths[slot % paths.len()];
        let Some(ctor) = self.contract.operation(path) else {
            return Err(CaseRun::Anomaly(format!("construction path {path} is not an operation")));
        };

        if case.phase != Phase::Random
            && let Some(cases) = self.construction_cases.get(&path).filter(|c| !c.is_empty())
        {
            return Ok(Some((path, cases[slot % cases.len()].clone())));
        }

        let scope = format!("{}#receiver#{retry}", ctor.scope);
        let shape = CaseShape {
            scope: &scope,
            ..ctor.shape()
        };
        match self.binder.random(&shape, case.index) {
            Draw::Case(found) => Ok(Some((path, found))),
            Draw::Exhausted { .. } => Ok(None),
            Draw::Anomaly(details) => Err(CaseRun::Anomaly(format!("receiver generation: {details}"))),
        }
    }

    /// Resources for a bound call: the construction path's provisions,
    /// then the bound operation's, which replace same-named ones.
    fn world(
        &self,
        ctor: &ContractOperation,
        receiver_case: &InputCase,
        op: &ContractOperation,
        case: &InputCase,
    ) -> Result<Resources, String> {
        let resources = self.instantiate(ctor, receiver_case, Resources::new())?;
        self.instantiate(op, case, resources)
    }

    fn instantiate(
        &self,
        op: &ContractOperation,
        case: &InputCase,
        mut resources: Resources,
    ) -> Result<Resources, String> {
        for (name, content) in op.resources.iter().zip(&case.resources) {
            let resource = self.instantiate_one(name, content)?;
            resources.insert(name.clone(), resource);
        }
        Ok(resources)
    }

    fn instantiate_one(&self, name: &str, content: &Value) -> Result<Box<dyn Resource>, String> {
        let provider = self
            .contract
            .provider(name)
            .ok_or_else(|| format!("no provider for resource {name}"))?;
        match catch_unwind(AssertUnwindSafe(|| provider.instantiate(content))) {
            Ok(Ok(resource)) => Ok(resource),
            Ok(Err(err)) => Err(format!("resource {name} could not be instantiated: {err}")),
            Err(payload) => Err(format!(
                "resource provider {name} panicked: {}",
                panic_message(payload.as_ref())
            )),
        }
    }
}

/// Capture one side's observable state after a call.
fn observe(
    stage: Stage,
    mut result: Result<Value, Failure>,
    receiver: Option<&dyn Receiver>,
    resources: &Resources,
    arguments: BTreeMap<usize, Value>,
) -> Outcome {
    let receiver = match receiver.map(|r| catch_unwind(AssertUnwindSafe(|| r.state()))) {
        None => None,
        Some(Ok(state)) => Some(state),
        Some(Err(payload)) => {
            if result.is_ok() {
                result = Err(Failure::new(
                    PANIC_KIND,
                    format!("state snapshot panicked: {}", panic_message(payload.as_ref())),
                ));
            }
            None
        }
    };
    Outcome {
        stage,
        result,
        receiver,
        resources: resources.snapshot(),
        arguments,
    }
}

fn construct(side: Side<'_>, index: usize, args: &mut [Value], resources: &mut Resources) -> Constructed {
    let Some(signature) = side.signatures.get(index) else {
        return Constructed::Failed(missing_signature(index));
    };
    let built = catch_unwind(AssertUnwindSafe(|| {
        side.implementation.construct(signature, args, resources)
    }));
    match built {
        Ok(Ok(receiver)) => Constructed::Receiver(receiver),
        Ok(Err(Raised::Skip)) => Constructed::Skipped,
        Ok(Err(Raised::Failure(failure))) => Constructed::Failed(failure),
        Err(payload) => Constructed::Failed(Failure::new(PANIC_KIND, panic_message(payload.as_ref()))),
    }
}

fn missing_signature(index: usize) -> Failure {
    Failure::new("Unsupported", format!("no signature for operation {index}"))
}
