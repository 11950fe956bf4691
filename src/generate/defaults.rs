//! Built-in generators for primitive and container types.

use std::sync::Arc;

use rand::Rng;
use rand::rngs::StdRng;

use crate::generate::complexity::Complexity;
use crate::generate::registry::{Generated, Generator, GeneratorKind, RandomFn, TypeRegistry};
use crate::model::types::TypeDesc;
use crate::model::value::Value;

const ALPHANUMERIC: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789 ";

/// Odds (one in N) that a random optional is null.
const NULL_ODDS: u32 = 8;

/// Built-in generator for `(ty, kind)`, composed from the registry's element
/// generators for containers. `Named` types have none.
pub fn builtin(registry: &TypeRegistry, ty: &TypeDesc, kind: GeneratorKind) -> Option<Generator> {
    match kind {
        GeneratorKind::Simple => non_empty(simple(registry, ty)),
        GeneratorKind::Edge => non_empty(edge(registry, ty)),
        GeneratorKind::Fixed => None,
        GeneratorKind::Random => random(registry, ty).map(Generator::Random),
    }
}

fn non_empty(values: Vec<Value>) -> Option<Generator> {
    (!values.is_empty()).then_some(Generator::Values(values))
}

fn simple(registry: &TypeRegistry, ty: &TypeDesc) -> Vec<Value> {
    match ty {
        TypeDesc::Bool => vec![Value::Bool(true), Value::Bool(false)],
        TypeDesc::Int | TypeDesc::Long => vec![Value::Int(-1), Value::Int(0), Value::Int(1)],
        TypeDesc::Double => vec![Value::Float(-0.1), Value::Float(0.0), Value::Float(0.1)],
        TypeDesc::Char => vec![Value::Char('A'), Value::Char('0')],
        TypeDesc::Str => ["t", "gwa", "8 circle", ""].into_iter().map(Value::from).collect(),
        TypeDesc::Bytes => vec![Value::Bytes(Vec::new()), Value::Bytes(vec![0])],
        TypeDesc::List(inner) | TypeDesc::Array(inner) => {
            let elements = registry.values(inner, GeneratorKind::Simple);
            let mut out = vec![Value::List(Vec::new())];
            if !elements.is_empty() {
                out.push(Value::List(elements));
            }
            out
        }
        TypeDesc::Set(inner) => {
            let mut elements = registry.values(inner, GeneratorKind::Simple);
            dedup(&mut elements);
            let mut out = vec![Value::Set(Vec::new())];
            if !elements.is_empty() {
                out.push(Value::Set(elements));
            }
            out
        }
        TypeDesc::Map(key, value) => {
            let mut keys = registry.values(key, GeneratorKind::Simple);
            dedup(&mut keys);
            let values = registry.values(value, GeneratorKind::Simple);
            let mut out = vec![Value::Map(Vec::new())];
            if let Some(first) = values.first() {
                out.push(Value::Map(
                    keys.into_iter().map(|k| (k, first.clone())).collect(),
                ));
            }
            out
        }
        TypeDesc::Optional(inner) => registry.values(inner, GeneratorKind::Simple),
        TypeDesc::Unit | TypeDesc::Named(_) | TypeDesc::Receiver => Vec::new(),
    }
}

fn edge(registry: &TypeRegistry, ty: &TypeDesc) -> Vec<Value> {
    match ty {
        TypeDesc::Int => vec![
            Value::Int(i64::from(i32::MIN)),
            Value::Int(i64::from(i32::MAX)),
        ],
        TypeDesc::Long => vec![Value::Int(i64::MIN), Value::Int(i64::MAX)],
        TypeDesc::Double => vec![Value::Float(f64::MIN), Value::Float(f64::MAX)],
        TypeDesc::Optional(inner) => {
            let mut out = vec![Value::Null];
            out.extend(registry.values(inner, GeneratorKind::Edge));
            out
        }
        _ => Vec::new(),
    }
}

fn random(registry: &TypeRegistry, ty: &TypeDesc) -> Option<RandomFn> {
    let f: RandomFn = match ty {
        TypeDesc::Bool => Arc::new(|_: Complexity, rng: &mut StdRng| Generated::Value(Value::Bool(rng.random_bool(0.5)))),
        TypeDesc::Int => Arc::new(|c: Complexity, rng: &mut StdRng| Generated::Value(Value::Int(random_int(c, rng)))),
        TypeDesc::Long => Arc::new(|c: Complexity, rng: &mut StdRng| Generated::Value(Value::Int(random_long(c, rng)))),
        TypeDesc::Double => Arc::new(|c: Complexity, rng: &mut StdRng| {
            #[allow(clippy::cast_precision_loss)]
            let whole = random_int(c, rng) as f64;
            Generated::Value(Value::Float(whole * rng.random::<f64>() * rng.random::<f64>()))
        }),
        TypeDesc::Char => Arc::new(|_: Complexity, rng: &mut StdRng| Generated::Value(Value::Char(random_char(rng)))),
        TypeDesc::Str => Arc::new(|c: Complexity, rng: &mut StdRng| Generated::Value(Value::Str(random_alphanumeric(c, rng)))),
        TypeDesc::Bytes => Arc::new(|c: Complexity, rng: &mut StdRng| {
            let len = rng.random_range(0..=c.level() as usize * 2);
            Generated::Value(Value::Bytes((0..len).map(|_| rng.random()).collect()))
        }),
        TypeDesc::List(inner) => sequence(registry, inner, false, Value::List)?,
        TypeDesc::Array(inner) => sequence(registry, inner, true, Value::List)?,
        TypeDesc::Set(inner) => sequence(registry, inner, false, |mut items| {
            dedup(&mut items);
            Value::Set(items)
        })?,
        TypeDesc::Map(key, value) => {
            let key_fn = registry.random(key)?;
            let value_fn = registry.random(value)?;
            let nested = is_container(key) || is_container(value);
            Arc::new(move |c: Complexity, rng: &mut StdRng| {
                let inner = if nested { c.nested() } else { c };
                let size = rng.random_range(0..container_bound(c));
                let mut entries: Vec<(Value, Value)> = Vec::with_capacity(size);
                for _ in 0..size {
                    let Generated::Value(k) = key_fn(inner, rng) else {
                        return Generated::Skip;
                    };
                    let Generated::Value(v) = value_fn(inner, rng) else {
                        return Generated::Skip;
                    };
                    if !entries.iter().any(|(existing, _)| *existing == k) {
                        entries.push((k, v));
                    }
                }
                Generated::Value(Value::Map(entries))
            })
        }
        TypeDesc::Optional(inner) => {
            let inner_fn = registry.random(inner)?;
            Arc::new(move |c: Complexity, rng: &mut StdRng| {
                if rng.random_ratio(1, NULL_ODDS) {
                    Generated::Value(Value::Null)
                } else {
                    inner_fn(c, rng)
                }
            })
        }
        TypeDesc::Unit | TypeDesc::Named(_) | TypeDesc::Receiver => return None,
    };
    Some(f)
}

fn sequence(
    registry: &TypeRegistry,
    inner: &TypeDesc,
    non_empty: bool,
    wrap: impl Fn(Vec<Value>) -> Value + Send + Sync + 'static,
) -> Option<RandomFn> {
    let element_fn = registry.random(inner)?;
    let nested = is_container(inner);
    Some(Arc::new(move |c: Complexity, rng: &mut StdRng| {
        let bound = container_bound(c);
        let size = if non_empty {
            rng.random_range(1..=bound)
        } else {
            rng.random_range(0..bound)
        };
        let element_complexity = if nested { c.nested() } else { c };
        let mut items = Vec::with_capacity(size);
        for _ in 0..size {
            match element_fn(element_complexity, rng) {
                Generated::Value(value) => items.push(value),
                Generated::Skip => return Generated::Skip,
            }
        }
        Generated::Value(wrap(items))
    }))
}

fn is_container(ty: &TypeDesc) -> bool {
    matches!(
        ty,
        TypeDesc::List(_) | TypeDesc::Array(_) | TypeDesc::Set(_) | TypeDesc::Map(..)
    )
}

/// Exclusive upper bound on random container sizes.
fn container_bound(c: Complexity) -> usize {
    (c.level() as usize * 2).max(2)
}

fn dedup(values: &mut Vec<Value>) {
    let mut seen: Vec<Value> = Vec::with_capacity(values.len());
    values.retain(|value| {
        if seen.contains(value) {
            false
        } else {
            seen.push(value.clone());
            true
        }
    });
}

/// Uniform integer centred on zero, spanning `8^level` values, clamped to 32 bits.
pub fn random_int(c: Complexity, rng: &mut StdRng) -> i64 {
    let span = c.power(8);
    centred(span, rng).clamp(i64::from(i32::MIN), i64::from(i32::MAX))
}

/// Uniform integer centred on zero, spanning `16^level` values.
pub fn random_long(c: Complexity, rng: &mut StdRng) -> i64 {
    centred(c.power(16), rng)
}

fn centred(span: u64, rng: &mut StdRng) -> i64 {
    let span = span.clamp(1, i64::MAX as u64);
    let drawn = rng.random_range(0..span);
    let half = span / 2;
    i64::try_from(drawn).unwrap_or(i64::MAX) - i64::try_from(half).unwrap_or(i64::MAX)
}

fn random_char(rng: &mut StdRng) -> char {
    char::from(ALPHANUMERIC[rng.random_range(0..ALPHANUMERIC.len())])
}

/// Alphanumeric-or-space string of length below `2 * level + 1`.
pub fn random_alphanumeric(c: Complexity, rng: &mut StdRng) -> String {
    let len = rng.random_range(0..=c.level() as usize * 2);
    (0..len).map(|_| random_char(rng)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn draw(registry: &TypeRegistry, ty: &TypeDesc, c: u32, seed: u64) -> Value {
        let f = registry.random(ty).expect("builtin random exists");
        let mut rng = StdRng::seed_from_u64(seed);
        match f(Complexity::new(c), &mut rng) {
            Generated::Value(value) => value,
            Generated::Skip => panic!("builtin generators never skip"),
        }
    }

    #[test]
    fn primitive_simple_defaults() {
        let registry = TypeRegistry::new();
        assert_eq!(
            registry.values(&TypeDesc::Int, GeneratorKind::Simple),
            vec![Value::Int(-1), Value::Int(0), Value::Int(1)]
        );
        assert_eq!(registry.values(&TypeDesc::Str, GeneratorKind::Simple).len(), 4);
        assert!(registry.values(&TypeDesc::named("Grid"), GeneratorKind::Simple).is_empty());
    }

    #[test]
    fn list_simple_uses_element_simples() {
        let mut registry = TypeRegistry::new();
        registry
            .register(
                TypeDesc::Int,
                GeneratorKind::Simple,
                Generator::values([Value::Int(5)]),
            )
            .expect("register");
        assert_eq!(
            registry.values(&TypeDesc::list(TypeDesc::Int), GeneratorKind::Simple),
            vec![Value::List(vec![]), Value::List(vec![Value::Int(5)])]
        );
    }

    #[test]
    fn arrays_simple_empty_but_random_non_empty() {
        let registry = TypeRegistry::new();
        let array = TypeDesc::array(TypeDesc::Int);
        assert_eq!(registry.values(&array, GeneratorKind::Simple)[0], Value::List(vec![]));
        for seed in 0..50 {
            let drawn = draw(&registry, &array, 1, seed);
            assert!(drawn.as_list().is_some_and(|items| !items.is_empty()), "{drawn}");
        }
    }

    #[test]
    fn optional_edge_includes_null() {
        let registry = TypeRegistry::new();
        let edges = registry.values(&TypeDesc::optional(TypeDesc::Int), GeneratorKind::Edge);
        assert_eq!(edges[0], Value::Null);
        assert_eq!(edges.len(), 3);
        assert!(registry.values(&TypeDesc::Str, GeneratorKind::Edge).is_empty());
    }

    #[test]
    fn random_int_magnitude_scales_with_complexity() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..200 {
            let v = random_int(Complexity::new(1), &mut rng);
            assert!((-4..4).contains(&v), "level 1 spans 8 values, got {v}");
        }
        for _ in 0..200 {
            let v = random_int(Complexity::new(8), &mut rng);
            assert!(i32::try_from(v).is_ok());
        }
    }

    #[test]
    fn random_values_conform_to_their_types() {
        let registry = TypeRegistry::new();
        let types = [
            TypeDesc::Bool,
            TypeDesc::Int,
            TypeDesc::Long,
            TypeDesc::Double,
            TypeDesc::Char,
            TypeDesc::Str,
            TypeDesc::Bytes,
            TypeDesc::list(TypeDesc::Str),
            TypeDesc::array(TypeDesc::array(TypeDesc::Int)),
            TypeDesc::set(TypeDesc::Int),
            TypeDesc::map(TypeDesc::Str, TypeDesc::list(TypeDesc::Long)),
            TypeDesc::optional(TypeDesc::Double),
        ];
        for ty in &types {
            for seed in 0..20 {
                let value = draw(&registry, ty, 1 + (seed as u32 % 8), seed);
                assert!(value.conforms_to(ty), "{value} does not conform to {ty}");
            }
        }
    }

    #[test]
    fn arrays_are_never_empty_at_top_level() {
        let registry = TypeRegistry::new();
        for seed in 0..50 {
            let value = draw(&registry, &TypeDesc::array(TypeDesc::Int), 1, seed);
            assert!(!value.as_list().expect("list").is_empty());
        }
    }

    #[test]
    fn string_length_bounded_by_complexity() {
        let mut rng = StdRng::seed_from_u64(11);
        for level in 1..=8 {
            let s = random_alphanumeric(Complexity::new(level), &mut rng);
            assert!(s.len() <= level as usize * 2);
        }
    }

    #[test]
    fn named_types_have_no_random_default() {
        let registry = TypeRegistry::new();
        assert!(registry.random(&TypeDesc::named("Grid")).is_none());
        assert!(registry.random(&TypeDesc::list(TypeDesc::named("Grid"))).is_none());
    }
}
