//! Equivalence of outcomes and values.

#![allow(missing_docs)]

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::config::ComparisonConfig;
use crate::execute::outcome::{Outcome, Stage};
use crate::generate::binder::InputCase;
use crate::model::value::Value;

/// Custom verification for one operation. Replaces the standard check;
/// call [`Verification::standard`] to extend it instead.
pub type VerifyFn = Arc<dyn Fn(&Verification<'_>) -> Option<Mismatch> + Send + Sync>;

/// Class of behavioral difference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscrepancyKind {
    ValueMismatch,
    FailureKindMismatch,
    StateMismatch,
    ResourceMismatch,
    ArgumentMismatch,
    /// Rejected by an operation's custom verifier.
    VerificationFailed,
    MissingOperation,
}

impl DiscrepancyKind {
    /// Stable snake_case label, as serialized.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ValueMismatch => "value_mismatch",
            Self::FailureKindMismatch => "failure_kind_mismatch",
            Self::StateMismatch => "state_mismatch",
            Self::ResourceMismatch => "resource_mismatch",
            Self::ArgumentMismatch => "argument_mismatch",
            Self::VerificationFailed => "verification_failed",
            Self::MissingOperation => "missing_operation",
        }
    }
}

impl fmt::Display for DiscrepancyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ValueMismatch => "value mismatch",
            Self::FailureKindMismatch => "failure kind mismatch",
            Self::StateMismatch => "receiver state mismatch",
            Self::ResourceMismatch => "resource mismatch",
            Self::ArgumentMismatch => "argument mismatch",
            Self::VerificationFailed => "verification failed",
            Self::MissingOperation => "missing operation",
        })
    }
}

/// First observed difference between two outcomes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mismatch {
    pub kind: DiscrepancyKind,
    pub details: String,
}

impl Mismatch {
    pub fn new(kind: DiscrepancyKind, details: impl Into<String>) -> Self {
        Self {
            kind,
            details: details.into(),
        }
    }

    /// A custom verifier's rejection.
    pub fn verification(details: impl Into<String>) -> Self {
        Self::new(DiscrepancyKind::VerificationFailed, details)
    }
}

/// Everything a custom verifier sees for one executed case.
pub struct Verification<'a> {
    pub case: &'a InputCase,
    pub reference: &'a Outcome,
    pub candidate: &'a Outcome,
    checker: &'a Checker,
}

impl<'a> Verification<'a> {
    pub fn new(checker: &'a Checker, case: &'a InputCase, reference: &'a Outcome, candidate: &'a Outcome) -> Self {
        Self {
            case,
            reference,
            candidate,
            checker,
        }
    }

    /// Result of the standard check for this case.
    pub fn standard(&self) -> Option<Mismatch> {
        self.checker.check(self.reference, self.candidate)
    }

    /// Deep equality under the configured tolerance.
    pub fn values_equal(&self, a: &Value, b: &Value) -> bool {
        self.checker.values_equal(a, b)
    }
}

/// Float tolerance. Two floats are equal when either bound holds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerance {
    pub abs: f64,
    pub rel: f64,
}

impl Tolerance {
    pub const EXACT: Self = Self { abs: 0.0, rel: 0.0 };

    pub fn floats_equal(self, a: f64, b: f64) -> bool {
        if a.is_nan() || b.is_nan() {
            return a.is_nan() && b.is_nan();
        }
        if a == b {
            return true;
        }
        let diff = (a - b).abs();
        diff <= self.abs || diff <= self.rel * a.abs().max(b.abs())
    }
}

impl From<&ComparisonConfig> for Tolerance {
    fn from(config: &ComparisonConfig) -> Self {
        Self {
            abs: config.abs_tolerance,
            rel: config.rel_tolerance,
        }
    }
}

/// Scores outcome pairs.
#[derive(Debug, Clone, Copy)]
pub struct Checker {
    tolerance: Tolerance,
}

impl Checker {
    pub fn new(tolerance: Tolerance) -> Self {
        Self { tolerance }
    }

    pub fn from_config(config: &ComparisonConfig) -> Self {
        Self::new(Tolerance::from(config))
    }

    /// Deep structural equality under the configured tolerance.
    pub fn values_equal(&self, a: &Value, b: &Value) -> bool {
        let tol = self.tolerance;
        match (a, b) {
            (Value::Float(x), Value::Float(y)) => tol.floats_equal(*x, *y),
            (Value::List(xs), Value::List(ys)) => {
                xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| self.values_equal(x, y))
            }
            (Value::Set(xs), Value::Set(ys)) => multiset_equal(xs, ys, |x, y| self.values_equal(x, y)),
            (Value::Map(xs), Value::Map(ys)) => multiset_equal(xs, ys, |(xk, xv), (yk, yv)| {
                self.values_equal(xk, yk) && self.values_equal(xv, yv)
            }),
            (
                Value::Record { name: xn, fields: xf },
                Value::Record { name: yn, fields: yf },
            ) => {
                xn == yn
                    && xf.len() == yf.len()
                    && xf
                        .iter()
                        .zip(yf)
                        .all(|((xk, xv), (yk, yv))| xk == yk && self.values_equal(xv, yv))
            }
            _ => a == b,
        }
    }

    /// First difference between two outcomes, checked in order: result,
    /// receiver state, resource content, then post-call arguments.
    pub fn check(&self, reference: &Outcome, candidate: &Outcome) -> Option<Mismatch> {
        if let Some(mismatch) = self.check_result(reference, candidate) {
            return Some(mismatch);
        }

        if !self.options_equal(reference.receiver.as_ref(), candidate.receiver.as_ref()) {
            return Some(Mismatch::new(
                DiscrepancyKind::StateMismatch,
                format!(
                    "receiver state {} vs {}",
                    render(reference.receiver.as_ref()),
                    render(candidate.receiver.as_ref())
                ),
            ));
        }

        let names = reference.resources.keys().chain(candidate.resources.keys());
        for name in names {
            let (a, b) = (reference.resources.get(name), candidate.resources.get(name));
            if !self.options_equal(a, b) {
                return Some(Mismatch::new(
                    DiscrepancyKind::ResourceMismatch,
                    format!("resource {name}: {} vs {}", render(a), render(b)),
                ));
            }
        }

        let positions = reference.arguments.keys().chain(candidate.arguments.keys());
        for position in positions {
            let (a, b) = (
                reference.arguments.get(position),
                candidate.arguments.get(position),
            );
            if !self.options_equal(a, b) {
                return Some(Mismatch::new(
                    DiscrepancyKind::ArgumentMismatch,
                    format!("argument {position} after call: {} vs {}", render(a), render(b)),
                ));
            }
        }
        None
    }

    fn check_result(&self, reference: &Outcome, candidate: &Outcome) -> Option<Mismatch> {
        let during = if reference.stage == Stage::Construction || candidate.stage == Stage::Construction {
            " during receiver construction"
        } else {
            ""
        };
        match (&reference.result, &candidate.result) {
            (Err(expected), Err(actual)) if expected.kind != actual.kind => Some(Mismatch::new(
                DiscrepancyKind::FailureKindMismatch,
                format!("expected failure {}, got {}{during}", expected.kind, actual.kind),
            )),
            (Err(_), Err(_)) => None,
            (Err(expected), Ok(value)) => Some(Mismatch::new(
                DiscrepancyKind::FailureKindMismatch,
                format!("expected failure {}, got value {value}{during}", expected.kind),
            )),
            (Ok(value), Err(actual)) => Some(Mismatch::new(
                DiscrepancyKind::FailureKindMismatch,
                format!("expected value {value}, got failure {actual}{during}"),
            )),
            (Ok(expected), Ok(actual)) if !self.values_equal(expected, actual) => Some(Mismatch::new(
                DiscrepancyKind::ValueMismatch,
                format!("expected {expected}, got {actual}"),
            )),
            (Ok(_), Ok(_)) => None,
        }
    }

    fn options_equal(&self, a: Option<&Value>, b: Option<&Value>) -> bool {
        match (a, b) {
            (Some(a), Some(b)) => self.values_equal(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl Default for Checker {
    fn default() -> Self {
        Self::from_config(&ComparisonConfig::default())
    }
}

fn multiset_equal<T>(xs: &[T], ys: &[T], eq: impl Fn(&T, &T) -> bool) -> bool {
    if xs.len() != ys.len() {
        return false;
    }
    let mut taken = vec![false; ys.len()];
    xs.iter().all(|x| {
        let found = ys
            .iter()
            .enumerate()
            .find(|(i, y)| !taken[*i] && eq(x, y))
            .map(|(i, _)| i);
        match found {
            Some(i) => {
                taken[i] = true;
                true
            }
            None => false,
        }
    })
}

fn render(value: Option<&Value>) -> String {
    value.map_or_else(|| "absent".to_string(), ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::implementation::Failure;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn returned(value: Value) -> Outcome {
        Outcome {
            stage: Stage::Invocation,
            result: Ok(value),
            receiver: None,
            resources: BTreeMap::new(),
            arguments: BTreeMap::new(),
        }
    }

    fn raised(kind: &str, message: &str) -> Outcome {
        Outcome {
            result: Err(Failure::new(kind, message)),
            ..returned(Value::Null)
        }
    }

    #[test]
    fn same_failure_kind_with_different_message_is_equal() {
        let checker = Checker::default();
        assert_eq!(checker.check(&raised("NotFound", "a"), &raised("NotFound", "b")), None);
        let mismatch = checker
            .check(&raised("NotFound", "a"), &raised("Denied", "a"))
            .expect("kinds differ");
        assert_eq!(mismatch.kind, DiscrepancyKind::FailureKindMismatch);
    }

    #[test]
    fn one_sided_failure_is_never_equal() {
        let checker = Checker::default();
        let mismatch = checker
            .check(&raised("NotFound", ""), &returned(Value::Null))
            .expect("only one side failed");
        assert_eq!(mismatch.kind, DiscrepancyKind::FailureKindMismatch);
        assert!(checker.check(&returned(Value::Null), &raised("NotFound", "")).is_some());
    }

    #[test]
    fn result_checked_before_state() {
        let checker = Checker::default();
        let mut a = returned(Value::Int(1));
        let mut b = returned(Value::Int(2));
        a.receiver = Some(Value::Int(0));
        b.receiver = Some(Value::Int(9));
        let mismatch = checker.check(&a, &b).expect("differs");
        assert_eq!(mismatch.kind, DiscrepancyKind::ValueMismatch);

        b.result = Ok(Value::Int(1));
        let mismatch = checker.check(&a, &b).expect("state differs");
        assert_eq!(mismatch.kind, DiscrepancyKind::StateMismatch);
    }

    #[test]
    fn resources_and_arguments_are_compared() {
        let checker = Checker::default();
        let mut a = returned(Value::Null);
        let mut b = returned(Value::Null);
        a.arguments.insert(0, Value::list([Value::Int(1)]));
        b.arguments.insert(0, Value::list([]));
        assert_eq!(
            checker.check(&a, &b).map(|m| m.kind),
            Some(DiscrepancyKind::ArgumentMismatch)
        );

        a.resources.insert("fs".to_string(), Value::map([]));
        assert_eq!(
            checker.check(&a, &b).map(|m| m.kind),
            Some(DiscrepancyKind::ResourceMismatch)
        );
    }

    #[test]
    fn sets_and_maps_ignore_order() {
        let checker = Checker::default();
        let a = Value::set([Value::Int(1), Value::Int(2), Value::Int(2)]);
        let b = Value::set([Value::Int(2), Value::Int(1), Value::Int(2)]);
        let c = Value::set([Value::Int(1), Value::Int(1), Value::Int(2)]);
        assert!(checker.values_equal(&a, &b));
        assert!(!checker.values_equal(&a, &c));

        let m1 = Value::map([(Value::str("a"), Value::Int(1)), (Value::str("b"), Value::Int(2))]);
        let m2 = Value::map([(Value::str("b"), Value::Int(2)), (Value::str("a"), Value::Int(1))]);
        assert!(checker.values_equal(&m1, &m2));
        assert!(!checker.values_equal(&Value::list([Value::Int(1), Value::Int(2)]), &Value::list([Value::Int(2), Value::Int(1)])));
    }

    #[test]
    fn float_tolerance_and_nan() {
        let checker = Checker::new(Tolerance { abs: 1e-6, rel: 0.0 });
        assert!(checker.values_equal(&Value::Float(1.0), &Value::Float(1.0 + 1e-7)));
        assert!(!checker.values_equal(&Value::Float(1.0), &Value::Float(1.1)));
        assert!(checker.values_equal(&Value::Float(f64::NAN), &Value::Float(f64::NAN)));
        assert!(!checker.values_equal(&Value::Float(f64::NAN), &Value::Float(0.0)));
        assert!(!checker.values_equal(&Value::Int(1), &Value::Float(1.0)));

        let relative = Checker::new(Tolerance { abs: 0.0, rel: 1e-3 });
        assert!(relative.values_equal(&Value::Float(1000.0), &Value::Float(1000.5)));
        assert!(!Checker::new(Tolerance::EXACT).values_equal(&Value::Float(1000.0), &Value::Float(1000.5)));
    }

    #[test]
    fn records_compare_by_name_and_fields() {
        let checker = Checker::default();
        let a = Value::record("Point", [("x", Value::Int(1)), ("y", Value::Float(0.5))]);
        let b = Value::record("Point", [("x", Value::Int(1)), ("y", Value::Float(0.5))]);
        let c = Value::record("Pair", [("x", Value::Int(1)), ("y", Value::Float(0.5))]);
        assert!(checker.values_equal(&a, &b));
        assert!(!checker.values_equal(&a, &c));
    }

    #[test]
    fn verification_extends_standard_check() {
        use crate::generate::binder::Phase;
        use crate::generate::complexity::Complexity;

        let case = InputCase {
            phase: Phase::Simple,
            index: 0,
            complexity: Complexity::default(),
            arguments: vec![Value::Int(4)],
            resources: Vec::new(),
        };
        let checker = Checker::default();
        // Accept any even result, but keep the standard failure-kind rules.
        let verify: VerifyFn = Arc::new(|v: &Verification<'_>| match &v.candidate.result {
            Ok(Value::Int(n)) if n % 2 == 0 => None,
            Ok(other) => Some(Mismatch::verification(format!("{other} is odd"))),
            Err(_) => v.standard(),
        });

        let reference = returned(Value::Int(8));
        let (two, three, boom) = (returned(Value::Int(2)), returned(Value::Int(3)), raised("Boom", ""));
        assert_eq!(verify(&Verification::new(&checker, &case, &reference, &two)), None);
        assert_eq!(
            verify(&Verification::new(&checker, &case, &reference, &three)).map(|m| m.kind),
            Some(DiscrepancyKind::VerificationFailed)
        );
        assert_eq!(
            verify(&Verification::new(&checker, &case, &reference, &boom)).map(|m| m.kind),
            Some(DiscrepancyKind::FailureKindMismatch)
        );
    }

    fn leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::Int),
            any::<f64>().prop_map(Value::Float),
            "[a-z]{0,6}".prop_map(Value::Str),
        ]
    }

    fn value() -> impl Strategy<Value = Value> {
        leaf().prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::List),
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Set),
                prop::collection::vec((inner.clone(), inner), 0..3).prop_map(Value::Map),
            ]
        })
    }

    proptest! {
        #[test]
        fn equality_is_reflexive(v in value()) {
            prop_assert!(Checker::new(Tolerance::EXACT).values_equal(&v, &v));
        }

        #[test]
        fn set_equality_ignores_permutation(items in prop::collection::vec(value(), 0..6)) {
            let mut reversed = items.clone();
            reversed.reverse();
            let checker = Checker::new(Tolerance::EXACT);
            prop_assert!(checker.values_equal(&Value::Set(items), &Value::Set(reversed)));
        }
    }
}
