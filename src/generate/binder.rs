//! Parameter binder: turns registry entries into an operation's case stream.
//!
//! Stream order is simple, fixed, edge (pure edge products, then mixed
//! simple/edge products), then an unbounded random tail. Deterministic cases
//! are deduplicated across phases, first occurrence wins.

#![allow(missing_docs)]

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::core::config::GenerationConfig;
use crate::core::errors::panic_message;
use crate::generate::complexity::Complexity;
use crate::generate::registry::{Generated, GeneratorKind, TupleSource, TypeRegistry};
use crate::generate::seed::case_rng;
use crate::model::types::TypeDesc;
use crate::model::value::Value;

/// Per-phase cap on deterministic products.
pub const MAX_PHASE_CASES: usize = 1024;

/// Position of a case in the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Simple,
    Fixed,
    Edge,
    Random,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Simple => "simple",
            Self::Fixed => "fixed",
            Self::Edge => "edge",
            Self::Random => "random",
        })
    }
}

/// One generated input: visible arguments plus hidden resource contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputCase {
    pub phase: Phase,
    /// Ordinal within the phase.
    pub index: usize,
    pub complexity: Complexity,
    pub arguments: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<Value>,
}

impl fmt::Display for InputCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} #{} {}",
            self.phase,
            self.index,
            crate::model::value::render_tuple(&self.arguments)
        )?;
        if !self.resources.is_empty() {
            write!(
                f,
                " with resources {}",
                crate::model::value::render_tuple(&self.resources)
            )?;
        }
        Ok(())
    }
}

/// What the binder needs to know about an operation.
#[derive(Debug, Clone, Copy)]
pub struct CaseShape<'a> {
    /// Operation name, for tuple-binding scopes.
    pub operation: &'a str,
    /// Visible parameter types.
    pub params: &'a [TypeDesc],
    /// Resource content types, appended as hidden positions.
    pub hidden: &'a [TypeDesc],
    /// Seed scope; unique per operation identity.
    pub scope: &'a str,
}

impl CaseShape<'_> {
    fn positions(&self) -> impl Iterator<Item = &TypeDesc> {
        self.params.iter().chain(self.hidden)
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty() && self.hidden.is_empty()
    }
}

/// Outcome of drawing one random case.
#[derive(Debug, Clone, PartialEq)]
pub enum Draw {
    Case(InputCase),
    /// Every attempt up to the ceiling was skipped.
    Exhausted { attempts: u32 },
    /// The generator misbehaved: panicked or produced an ill-typed value.
    Anomaly(String),
}

type Drawn = (Vec<Value>, Vec<Value>);

/// Stateless case generator over a registry.
#[derive(Debug, Clone, Copy)]
pub struct Binder<'a> {
    registry: &'a TypeRegistry,
    seed: u64,
    attempt_ceiling: u32,
    max_complexity: u32,
}

impl<'a> Binder<'a> {
    pub fn new(registry: &'a TypeRegistry, config: &GenerationConfig) -> Self {
        Self {
            registry,
            seed: config.seed,
            attempt_ceiling: config.attempt_ceiling.max(1),
            max_complexity: config.max_complexity,
        }
    }

    /// Simple, fixed and edge cases, in order and deduplicated.
    pub fn deterministic(&self, shape: &CaseShape<'_>) -> Vec<InputCase> {
        let visible = shape.params.len();
        let simple_sets: Vec<Vec<Value>> = shape
            .positions()
            .map(|ty| self.registry.values(ty, GeneratorKind::Simple))
            .collect();
        let edge_sets: Vec<Vec<Value>> = shape
            .positions()
            .map(|ty| self.registry.values(ty, GeneratorKind::Edge))
            .collect();

        let simple = cartesian(&simple_sets);
        let fixed = self.fixed_tuples(shape, &simple_sets);

        let pure_edge = cartesian(&edge_sets);
        let mut mixed = Vec::new();
        if edge_sets.iter().any(|set| !set.is_empty()) {
            let union: Vec<Vec<Value>> = simple_sets
                .iter()
                .zip(&edge_sets)
                .map(|(s, e)| {
                    let mut all = s.clone();
                    all.extend(e.iter().filter(|v| !s.contains(v)).cloned());
                    all
                })
                .collect();
            mixed = cartesian(&union)
                .into_iter()
                .filter(|tuple| !simple.contains(tuple) && !pure_edge.contains(tuple))
                .collect();
        }

        let mut seen: Vec<Vec<Value>> = Vec::new();
        let mut out = Vec::new();
        let phases = [
            (Phase::Simple, simple),
            (Phase::Fixed, fixed),
            (Phase::Edge, pure_edge.into_iter().chain(mixed).collect()),
        ];
        for (phase, tuples) in phases {
            let mut index = 0;
            for mut tuple in tuples {
                if seen.contains(&tuple) {
                    continue;
                }
                seen.push(tuple.clone());
                let resources = tuple.split_off(visible);
                out.push(InputCase {
                    phase,
                    index,
                    complexity: Complexity::default(),
                    arguments: tuple,
                    resources,
                });
                index += 1;
            }
        }
        out
    }

    fn fixed_tuples(&self, shape: &CaseShape<'_>, simple_sets: &[Vec<Value>]) -> Vec<Vec<Value>> {
        let (visible_simple, hidden_simple) = simple_sets.split_at(shape.params.len());
        let visible = self.visible_fixed(shape, visible_simple);
        let hidden = per_position_fixed(self.registry, shape.hidden, hidden_simple);
        if visible.is_none() && hidden.is_none() {
            return Vec::new();
        }
        let visible = visible.unwrap_or_else(|| cartesian(visible_simple));
        let hidden = hidden.unwrap_or_else(|| cartesian(hidden_simple));
        join(&visible, &hidden)
    }

    fn visible_fixed(&self, shape: &CaseShape<'_>, simple_sets: &[Vec<Value>]) -> Option<Vec<Vec<Value>>> {
        let tuples = self
            .registry
            .tuple(shape.operation, shape.params, GeneratorKind::Fixed);
        if let Some(TupleSource::Values(values)) = tuples.scoped {
            return Some(values);
        }
        if let Some(found) = per_position_fixed(self.registry, shape.params, simple_sets) {
            return Some(found);
        }
        match tuples.wildcard {
            Some(TupleSource::Values(values)) => Some(values),
            _ => None,
        }
    }

    /// Random case `index`, retrying skipped draws with fresh sub-seeds.
    pub fn random(&self, shape: &CaseShape<'_>, index: usize) -> Draw {
        let complexity = Complexity::for_index(index, self.max_complexity);
        for attempt in 0..self.attempt_ceiling {
            let mut rng = case_rng(self.seed, shape.scope, index, attempt);
            let drawn = catch_unwind(AssertUnwindSafe(|| self.draw(shape, complexity, &mut rng)));
            match drawn {
                Ok(Ok(Generated::Value((arguments, resources)))) => {
                    if let Some(details) = type_error(shape, &arguments, &resources) {
                        return Draw::Anomaly(details);
                    }
                    return Draw::Case(InputCase {
                        phase: Phase::Random,
                        index,
                        complexity,
                        arguments,
                        resources,
                    });
                }
                Ok(Ok(Generated::Skip)) => {}
                Ok(Err(details)) => return Draw::Anomaly(details),
                Err(payload) => {
                    return Draw::Anomaly(format!(
                        "generator panicked: {}",
                        panic_message(payload.as_ref())
                    ));
                }
            }
        }
        Draw::Exhausted {
            attempts: self.attempt_ceiling,
        }
    }

    fn draw(
        &self,
        shape: &CaseShape<'_>,
        complexity: Complexity,
        rng: &mut StdRng,
    ) -> Result<Generated<Drawn>, String> {
        let tuples = self
            .registry
            .tuple(shape.operation, shape.params, GeneratorKind::Random);
        let any_explicit = shape
            .params
            .iter()
            .any(|ty| self.registry.explicit(ty, GeneratorKind::Random).is_some());

        let tuple_fn = match (tuples.scoped, tuples.wildcard) {
            (Some(TupleSource::Random(f)), _) => Some(f),
            (_, Some(TupleSource::Random(f))) if !any_explicit => Some(f),
            _ => None,
        };

        let arguments = match tuple_fn {
            Some(f) => match f(complexity, rng) {
                Generated::Value(tuple) => {
                    if tuple.len() != shape.params.len() {
                        return Err(format!(
                            "tuple generator produced {} values for {} parameters",
                            tuple.len(),
                            shape.params.len()
                        ));
                    }
                    tuple
                }
                Generated::Skip => return Ok(Generated::Skip),
            },
            None => match self.per_position_random(shape.params, complexity, rng)? {
                Generated::Value(values) => values,
                Generated::Skip => return Ok(Generated::Skip),
            },
        };

        Ok(self
            .per_position_random(shape.hidden, complexity, rng)?
            .map(|resources| (arguments, resources)))
    }

    fn per_position_random(
        &self,
        types: &[TypeDesc],
        complexity: Complexity,
        rng: &mut StdRng,
    ) -> Result<Generated<Vec<Value>>, String> {
        let mut values = Vec::with_capacity(types.len());
        for ty in types {
            let f = self
                .registry
                .random(ty)
                .ok_or_else(|| format!("no random generator for {ty}"))?;
            match f(complexity, rng) {
                Generated::Value(value) => values.push(value),
                Generated::Skip => return Ok(Generated::Skip),
            }
        }
        Ok(Generated::Value(values))
    }

    /// Whether every position of `shape` has a random source.
    pub fn check_random(&self, shape: &CaseShape<'_>) -> Result<(), String> {
        let tuples = self
            .registry
            .tuple(shape.operation, shape.params, GeneratorKind::Random);
        let tuple_covers = tuples.scoped.is_some() || tuples.wildcard.is_some();
        let missing = shape
            .params
            .iter()
            .filter(|_| !tuple_covers)
            .chain(shape.hidden)
            .find(|ty| self.registry.random(ty).is_none());
        match missing {
            Some(ty) => Err(format!("no random generator for {ty}")),
            None => Ok(()),
        }
    }
}

fn per_position_fixed(
    registry: &TypeRegistry,
    types: &[TypeDesc],
    simple_sets: &[Vec<Value>],
) -> Option<Vec<Vec<Value>>> {
    let explicit: Vec<Option<Vec<Value>>> = types
        .iter()
        .map(|ty| {
            registry
                .explicit(ty, GeneratorKind::Fixed)
                .and_then(|g| g.as_values().map(<[Value]>::to_vec))
        })
        .collect();
    if explicit.iter().all(Option::is_none) {
        return None;
    }
    let sets: Vec<Vec<Value>> = explicit
        .into_iter()
        .zip(simple_sets)
        .map(|(fixed, simple)| fixed.unwrap_or_else(|| simple.clone()))
        .collect();
    Some(cartesian(&sets))
}

fn type_error(shape: &CaseShape<'_>, arguments: &[Value], resources: &[Value]) -> Option<String> {
    shape
        .positions()
        .zip(arguments.iter().chain(resources))
        .find(|(ty, value)| !value.conforms_to(ty))
        .map(|(ty, value)| format!("generated value {value} does not conform to {ty}"))
}

/// Cartesian product, last position varying fastest, capped at
/// [`MAX_PHASE_CASES`]. Zero positions yield one empty tuple.
pub fn cartesian(sets: &[Vec<Value>]) -> Vec<Vec<Value>> {
    if sets.iter().any(Vec::is_empty) {
        return Vec::new();
    }
    let mut out = vec![Vec::with_capacity(sets.len())];
    for set in sets {
        let mut next = Vec::with_capacity((out.len() * set.len()).min(MAX_PHASE_CASES));
        'outer: for prefix in &out {
            for value in set {
                if next.len() == MAX_PHASE_CASES {
                    break 'outer;
                }
                let mut tuple = prefix.clone();
                tuple.push(value.clone());
                next.push(tuple);
            }
        }
        out = next;
    }
    out
}

fn join(left: &[Vec<Value>], right: &[Vec<Value>]) -> Vec<Vec<Value>> {
    let mut out = Vec::new();
    'outer: for l in left {
        for r in right {
            if out.len() == MAX_PHASE_CASES {
                break 'outer;
            }
            let mut tuple = l.clone();
            tuple.extend(r.iter().cloned());
            out.push(tuple);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::registry::{Generator, Scope, TupleBinding};
    use std::sync::Arc;

    fn config() -> GenerationConfig {
        GenerationConfig {
            seed: 124,
            random_cases: 16,
            attempt_ceiling: 8,
            max_complexity: 8,
        }
    }

    fn shape<'a>(params: &'a [TypeDesc], hidden: &'a [TypeDesc]) -> CaseShape<'a> {
        CaseShape {
            operation: "op",
            params,
            hidden,
            scope: "op(..)",
        }
    }

    #[test]
    fn cartesian_orders_last_position_fastest() {
        let sets = vec![
            vec![Value::Int(1), Value::Int(2)],
            vec![Value::Bool(true), Value::Bool(false)],
        ];
        let product = cartesian(&sets);
        assert_eq!(
            product,
            vec![
                vec![Value::Int(1), Value::Bool(true)],
                vec![Value::Int(1), Value::Bool(false)],
                vec![Value::Int(2), Value::Bool(true)],
                vec![Value::Int(2), Value::Bool(false)],
            ]
        );
        assert_eq!(cartesian(&[]), vec![Vec::<Value>::new()]);
        assert!(cartesian(&[vec![Value::Int(1)], vec![]]).is_empty());
    }

    #[test]
    fn phases_are_ordered_and_deduplicated() {
        let mut registry = TypeRegistry::new();
        registry
            .register(
                TypeDesc::Int,
                GeneratorKind::Fixed,
                Generator::values([Value::Int(0), Value::Int(42)]),
            )
            .expect("register");
        let binder = Binder::new(&registry, &config());
        let params = [TypeDesc::Int];
        let cases = binder.deterministic(&shape(&params, &[]));

        let phases: Vec<Phase> = cases.iter().map(|c| c.phase).collect();
        assert!(phases.windows(2).all(|w| w[0] <= w[1]), "{phases:?}");

        let args: Vec<Value> = cases.iter().map(|c| c.arguments[0].clone()).collect();
        assert_eq!(
            args,
            vec![
                Value::Int(-1),
                Value::Int(0),
                Value::Int(1),
                Value::Int(42),
                Value::Int(i64::from(i32::MIN)),
                Value::Int(i64::from(i32::MAX)),
            ]
        );
    }

    #[test]
    fn mixed_edge_products_follow_pure_edges() {
        let registry = TypeRegistry::new();
        let binder = Binder::new(&registry, &config());
        let params = [TypeDesc::Int, TypeDesc::Bool];
        let cases = binder.deterministic(&shape(&params, &[]));
        let edge: Vec<&InputCase> = cases.iter().filter(|c| c.phase == Phase::Edge).collect();
        // Bool has no edges, so there is no pure edge product; every edge case
        // pairs an int edge with a bool simple.
        assert_eq!(edge.len(), 4);
        assert!(edge.iter().all(|c| {
            matches!(c.arguments[0], Value::Int(v) if v == i64::from(i32::MIN) || v == i64::from(i32::MAX))
        }));
    }

    #[test]
    fn scoped_fixed_tuple_beats_type_wide_fixed() {
        let mut registry = TypeRegistry::new();
        registry
            .register(TypeDesc::Int, GeneratorKind::Fixed, Generator::values([Value::Int(9)]))
            .expect("type-wide");
        registry
            .register_tuple(TupleBinding {
                scope: Scope::operations(["op"]),
                params: vec![TypeDesc::Int],
                kind: GeneratorKind::Fixed,
                source: TupleSource::Values(vec![vec![Value::Int(77)]]),
            })
            .expect("scoped");
        let binder = Binder::new(&registry, &config());
        let params = [TypeDesc::Int];
        let fixed: Vec<Value> = binder
            .deterministic(&shape(&params, &[]))
            .into_iter()
            .filter(|c| c.phase == Phase::Fixed)
            .map(|c| c.arguments[0].clone())
            .collect();
        assert_eq!(fixed, vec![Value::Int(77)]);
    }

    #[test]
    fn hidden_positions_split_into_resources() {
        let mut registry = TypeRegistry::new();
        let fs = TypeDesc::named("filesystem");
        let content = Value::map([(Value::str("/a"), Value::str("x"))]);
        registry
            .register(fs.clone(), GeneratorKind::Fixed, Generator::values([content.clone()]))
            .expect("fixed content");
        let binder = Binder::new(&registry, &config());
        let hidden = [fs];
        let cases = binder.deterministic(&shape(&[], &hidden));
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].phase, Phase::Fixed);
        assert!(cases[0].arguments.is_empty());
        assert_eq!(cases[0].resources, vec![content]);
    }

    #[test]
    fn random_is_deterministic_and_complexity_grows() {
        let registry = TypeRegistry::new();
        let binder = Binder::new(&registry, &config());
        let params = [TypeDesc::list(TypeDesc::Int), TypeDesc::Str];
        let first: Vec<Draw> = (0..10).map(|i| binder.random(&shape(&params, &[]), i)).collect();
        let second: Vec<Draw> = (0..10).map(|i| binder.random(&shape(&params, &[]), i)).collect();
        assert_eq!(first, second);

        let levels: Vec<u32> = first
            .iter()
            .map(|d| match d {
                Draw::Case(case) => case.complexity.level(),
                other => panic!("unexpected draw {other:?}"),
            })
            .collect();
        assert!(levels.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(levels[0], 1);
    }

    #[test]
    fn always_skip_exhausts_after_ceiling() {
        let mut registry = TypeRegistry::new();
        registry
            .register(
                TypeDesc::Int,
                GeneratorKind::Random,
                Generator::random(|_, _| Generated::Skip),
            )
            .expect("register");
        let binder = Binder::new(&registry, &config());
        let params = [TypeDesc::Int];
        assert_eq!(
            binder.random(&shape(&params, &[]), 0),
            Draw::Exhausted { attempts: 8 }
        );
    }

    #[test]
    fn ill_typed_or_panicking_generators_are_anomalies() {
        let mut registry = TypeRegistry::new();
        registry
            .register(
                TypeDesc::Int,
                GeneratorKind::Random,
                Generator::random(|_, _| Generated::Value(Value::str("nope"))),
            )
            .expect("register");
        registry
            .register(
                TypeDesc::Long,
                GeneratorKind::Random,
                Generator::random(|_, _| panic!("generator bug")),
            )
            .expect("register");
        let binder = Binder::new(&registry, &config());

        let ints = [TypeDesc::Int];
        assert!(matches!(binder.random(&shape(&ints, &[]), 0), Draw::Anomaly(d) if d.contains("conform")));
        let longs = [TypeDesc::Long];
        assert!(matches!(binder.random(&shape(&longs, &[]), 0), Draw::Anomaly(d) if d.contains("generator bug")));
    }

    #[test]
    fn wildcard_random_tuple_used_without_type_bindings() {
        let mut registry = TypeRegistry::new();
        registry
            .register_tuple(TupleBinding {
                scope: Scope::Wildcard,
                params: vec![TypeDesc::Int, TypeDesc::Int],
                kind: GeneratorKind::Random,
                source: TupleSource::Random(Arc::new(|_: Complexity, _: &mut StdRng| {
                    Generated::Value(vec![Value::Int(5), Value::Int(6)])
                })),
            })
            .expect("wildcard");
        let binder = Binder::new(&registry, &config());
        let params = [TypeDesc::Int, TypeDesc::Int];
        match binder.random(&shape(&params, &[]), 3) {
            Draw::Case(case) => assert_eq!(case.arguments, vec![Value::Int(5), Value::Int(6)]),
            other => panic!("unexpected draw {other:?}"),
        }
    }

    #[test]
    fn check_random_reports_missing_generators() {
        let registry = TypeRegistry::new();
        let binder = Binder::new(&registry, &config());
        let params = [TypeDesc::named("Grid")];
        let err = binder.check_random(&shape(&params, &[])).expect_err("missing");
        assert!(err.contains("Grid"));
        assert!(binder.check_random(&shape(&[TypeDesc::Int], &[])).is_ok());
    }
}
