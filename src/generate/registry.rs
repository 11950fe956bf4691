//! Generator registry: per-type and per-operation input sources.
//!
//! Lookups walk the overlay chain (batch overrides first, then the
//! contract's registrations), then provider defaults, then the built-in
//! defaults in [`crate::generate::defaults`].

#![allow(missing_docs)]

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::core::errors::{EqeError, Result};
use crate::generate::complexity::Complexity;
use crate::generate::defaults;
use crate::model::types::TypeDesc;
use crate::model::value::Value;

/// Which phase a generator feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneratorKind {
    Simple,
    Fixed,
    Edge,
    Random,
}

impl fmt::Display for GeneratorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Simple => "simple",
            Self::Fixed => "fixed",
            Self::Edge => "edge",
            Self::Random => "random",
        })
    }
}

/// Result of one random draw.
#[derive(Debug, Clone, PartialEq)]
pub enum Generated<T = Value> {
    Value(T),
    /// The generator declines this draw; the case is retried with a fresh seed.
    Skip,
}

impl<T> Generated<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Generated<U> {
        match self {
            Self::Value(value) => Generated::Value(f(value)),
            Self::Skip => Generated::Skip,
        }
    }
}

/// Random source for a single type.
pub type RandomFn = Arc<dyn Fn(Complexity, &mut StdRng) -> Generated + Send + Sync>;

/// Random source for a whole argument tuple.
pub type TupleRandomFn = Arc<dyn Fn(Complexity, &mut StdRng) -> Generated<Vec<Value>> + Send + Sync>;

/// Source of values for one type.
#[derive(Clone)]
pub enum Generator {
    /// Literal list, used by the simple, fixed and edge phases.
    Values(Vec<Value>),
    /// Complexity-scaled random function, used by the random phase.
    Random(RandomFn),
}

impl Generator {
    pub fn values(values: impl IntoIterator<Item = Value>) -> Self {
        Self::Values(values.into_iter().collect())
    }

    pub fn random<F>(f: F) -> Self
    where
        F: Fn(Complexity, &mut StdRng) -> Generated + Send + Sync + 'static,
    {
        Self::Random(Arc::new(f))
    }

    pub fn as_values(&self) -> Option<&[Value]> {
        match self {
            Self::Values(values) => Some(values),
            Self::Random(_) => None,
        }
    }

    pub fn as_random(&self) -> Option<&RandomFn> {
        match self {
            Self::Random(f) => Some(f),
            Self::Values(_) => None,
        }
    }
}

impl fmt::Debug for Generator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Values(values) => f.debug_tuple("Values").field(values).finish(),
            Self::Random(_) => f.write_str("Random(..)"),
        }
    }
}

/// Which operations a tuple binding applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Operations(BTreeSet<String>),
    Wildcard,
}

impl Scope {
    pub fn operations<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Operations(names.into_iter().map(Into::into).collect())
    }

    fn covers(&self, name: &str) -> bool {
        match self {
            Self::Operations(names) => names.contains(name),
            Self::Wildcard => true,
        }
    }

    fn overlaps(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Wildcard, Self::Wildcard) => true,
            (Self::Operations(a), Self::Operations(b)) => !a.is_disjoint(b),
            _ => false,
        }
    }
}

/// Source of whole argument tuples.
#[derive(Clone)]
pub enum TupleSource {
    Values(Vec<Vec<Value>>),
    Random(TupleRandomFn),
}

impl fmt::Debug for TupleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Values(values) => f.debug_tuple("Values").field(values).finish(),
            Self::Random(_) => f.write_str("Random(..)"),
        }
    }
}

/// Tuple-level binding for operations with a given parameter type list.
#[derive(Debug, Clone)]
pub struct TupleBinding {
    pub scope: Scope,
    pub params: Vec<TypeDesc>,
    pub kind: GeneratorKind,
    pub source: TupleSource,
}

/// Tuple bindings applicable to one operation and kind.
#[derive(Debug, Clone, Default)]
pub struct TupleMatch {
    /// Binding scoped to the operation by name.
    pub scoped: Option<TupleSource>,
    /// Wildcard binding.
    pub wildcard: Option<TupleSource>,
}

/// Registry of generators, optionally layered over a parent.
#[derive(Default)]
pub struct TypeRegistry {
    parent: Option<Arc<TypeRegistry>>,
    explicit: BTreeMap<(TypeDesc, GeneratorKind), Generator>,
    provided: BTreeMap<(TypeDesc, GeneratorKind), Generator>,
    tuples: Vec<TupleBinding>,
    cheap_copy: BTreeSet<TypeDesc>,
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("layered", &self.parent.is_some())
            .field("explicit", &self.explicit.keys().collect::<Vec<_>>())
            .field("provided", &self.provided.keys().collect::<Vec<_>>())
            .field("tuples", &self.tuples.len())
            .field("cheap_copy", &self.cheap_copy)
            .finish()
    }
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty layer whose registrations shadow `parent`.
    pub fn overlay(parent: Arc<Self>) -> Self {
        Self {
            parent: Some(parent),
            ..Self::default()
        }
    }

    /// Bind a type-wide generator.
    pub fn register(&mut self, ty: TypeDesc, kind: GeneratorKind, generator: Generator) -> Result<()> {
        if ty.mentions_receiver() {
            return Err(EqeError::declaration(format!(
                "cannot register generators for receiver type {ty}"
            )));
        }
        check_generator(&ty, kind, &generator)?;
        let key = (ty, kind);
        if self.explicit.contains_key(&key) {
            return Err(EqeError::declaration(format!(
                "duplicate {} generator for type {}",
                key.1, key.0
            )));
        }
        self.explicit.insert(key, generator);
        Ok(())
    }

    /// Bind a provider default. Explicit registrations win over these.
    pub fn register_default(&mut self, ty: TypeDesc, kind: GeneratorKind, generator: Generator) -> Result<()> {
        check_generator(&ty, kind, &generator)?;
        self.provided.insert((ty, kind), generator);
        Ok(())
    }

    /// Bind a tuple-level generator for operations with `params`.
    pub fn register_tuple(&mut self, binding: TupleBinding) -> Result<()> {
        if !matches!(binding.kind, GeneratorKind::Fixed | GeneratorKind::Random) {
            return Err(EqeError::declaration(format!(
                "tuple bindings support fixed and random phases only, got {}",
                binding.kind
            )));
        }
        if let Scope::Operations(names) = &binding.scope
            && names.is_empty()
        {
            return Err(EqeError::declaration("tuple binding names no operations"));
        }
        match (&binding.kind, &binding.source) {
            (GeneratorKind::Fixed, TupleSource::Values(_))
            | (GeneratorKind::Random, TupleSource::Random(_)) => {}
            _ => {
                return Err(EqeError::declaration(format!(
                    "{} tuple binding has the wrong source shape",
                    binding.kind
                )));
            }
        }
        if let TupleSource::Values(tuples) = &binding.source {
            if tuples.is_empty() {
                return Err(EqeError::declaration("fixed tuple binding is empty"));
            }
            for tuple in tuples {
                check_tuple(&binding.params, tuple)?;
            }
            if has_duplicates(tuples) {
                return Err(EqeError::declaration(format!(
                    "fixed tuple binding for ({}) contains duplicates",
                    join_types(&binding.params)
                )));
            }
        }
        let conflict = self.tuples.iter().any(|existing| {
            existing.kind == binding.kind
                && existing.params == binding.params
                && existing.scope.overlaps(&binding.scope)
        });
        if conflict {
            return Err(EqeError::declaration(format!(
                "conflicting {} tuple bindings for ({})",
                binding.kind,
                join_types(&binding.params)
            )));
        }
        self.tuples.push(binding);
        Ok(())
    }

    /// Snapshot positions of `ty` by diffing against the input instead of
    /// recording them on every call. Mutations are still compared.
    pub fn mark_cheap_copy(&mut self, ty: TypeDesc) {
        self.cheap_copy.insert(ty);
    }

    /// Scalars are copied on every call; registered types opt in.
    pub fn is_cheap_copy(&self, ty: &TypeDesc) -> bool {
        matches!(
            ty,
            TypeDesc::Unit
                | TypeDesc::Bool
                | TypeDesc::Int
                | TypeDesc::Long
                | TypeDesc::Double
                | TypeDesc::Char
                | TypeDesc::Str
        ) || self.cheap_copy.contains(ty)
            || self.parent.as_ref().is_some_and(|p| p.is_cheap_copy(ty))
    }

    /// Every applicable generator for `(ty, kind)`, highest precedence first.
    pub fn resolve(&self, ty: &TypeDesc, kind: GeneratorKind) -> Vec<Generator> {
        let mut out = Vec::new();
        let mut layer = Some(self);
        while let Some(registry) = layer {
            if let Some(generator) = registry.explicit.get(&(ty.clone(), kind)) {
                out.push(generator.clone());
            }
            layer = registry.parent.as_deref();
        }
        if let Some(generator) = self.default_for(ty, kind) {
            out.push(generator);
        }
        out
    }

    /// Highest-precedence explicit registration, ignoring defaults.
    pub fn explicit(&self, ty: &TypeDesc, kind: GeneratorKind) -> Option<Generator> {
        self.explicit
            .get(&(ty.clone(), kind))
            .cloned()
            .or_else(|| self.parent.as_ref().and_then(|p| p.explicit(ty, kind)))
    }

    /// Provider default, then built-in default.
    pub fn default_for(&self, ty: &TypeDesc, kind: GeneratorKind) -> Option<Generator> {
        self.provided_for(ty, kind)
            .or_else(|| defaults::builtin(self, ty, kind))
    }

    fn provided_for(&self, ty: &TypeDesc, kind: GeneratorKind) -> Option<Generator> {
        self.provided
            .get(&(ty.clone(), kind))
            .cloned()
            .or_else(|| self.parent.as_ref().and_then(|p| p.provided_for(ty, kind)))
    }

    /// Literal values of the winning generator, or nothing.
    pub fn values(&self, ty: &TypeDesc, kind: GeneratorKind) -> Vec<Value> {
        self.resolve(ty, kind)
            .into_iter()
            .find_map(|g| g.as_values().map(<[Value]>::to_vec))
            .unwrap_or_default()
    }

    /// Winning random function, if any.
    pub fn random(&self, ty: &TypeDesc) -> Option<RandomFn> {
        self.resolve(ty, GeneratorKind::Random)
            .into_iter()
            .find_map(|g| g.as_random().cloned())
    }

    /// Tuple bindings applicable to `operation` with `params`.
    pub fn tuple(&self, operation: &str, params: &[TypeDesc], kind: GeneratorKind) -> TupleMatch {
        let mut found = TupleMatch::default();
        let mut layer = Some(self);
        while let Some(registry) = layer {
            for binding in &registry.tuples {
                if binding.kind != kind || binding.params != params || !binding.scope.covers(operation) {
                    continue;
                }
                match binding.scope {
                    Scope::Operations(_) if found.scoped.is_none() => {
                        found.scoped = Some(binding.source.clone());
                    }
                    Scope::Wildcard if found.wildcard.is_none() => {
                        found.wildcard = Some(binding.source.clone());
                    }
                    _ => {}
                }
            }
            layer = registry.parent.as_deref();
        }
        found
    }

    /// Every type with an explicit registration, across layers.
    pub fn registered_types(&self) -> BTreeSet<TypeDesc> {
        let mut types: BTreeSet<TypeDesc> = self.explicit.keys().map(|(ty, _)| ty.clone()).collect();
        if let Some(parent) = &self.parent {
            types.extend(parent.registered_types());
        }
        types
    }

    /// Parameter lists of every tuple binding, across layers.
    pub fn tuple_bindings(&self) -> Vec<&TupleBinding> {
        let mut out: Vec<&TupleBinding> = self.tuples.iter().collect();
        if let Some(parent) = &self.parent {
            out.extend(parent.tuple_bindings());
        }
        out
    }
}

fn check_generator(ty: &TypeDesc, kind: GeneratorKind, generator: &Generator) -> Result<()> {
    match (kind, generator) {
        (GeneratorKind::Random, Generator::Random(_)) => Ok(()),
        (GeneratorKind::Random, Generator::Values(_)) => Err(EqeError::declaration(format!(
            "random generator for {ty} must be a function"
        ))),
        (_, Generator::Random(_)) => Err(EqeError::declaration(format!(
            "{kind} generator for {ty} must be a value list"
        ))),
        (_, Generator::Values(values)) => {
            if values.is_empty() {
                return Err(EqeError::declaration(format!(
                    "{kind} values for {ty} are empty"
                )));
            }
            if let Some(bad) = values.iter().find(|v| !v.conforms_to(ty)) {
                return Err(EqeError::declaration(format!(
                    "{kind} value {bad} does not conform to {ty}"
                )));
            }
            if kind == GeneratorKind::Simple && values.contains(&Value::Null) {
                return Err(EqeError::declaration(format!(
                    "simple values for {ty} may not contain null"
                )));
            }
            if has_duplicates(values) {
                return Err(EqeError::declaration(format!(
                    "{kind} values for {ty} contain duplicates"
                )));
            }
            Ok(())
        }
    }
}

fn check_tuple(params: &[TypeDesc], tuple: &[Value]) -> Result<()> {
    if tuple.len() != params.len() {
        return Err(EqeError::declaration(format!(
            "tuple of {} values cannot bind ({})",
            tuple.len(),
            join_types(params)
        )));
    }
    for (value, ty) in tuple.iter().zip(params) {
        if !value.conforms_to(ty) {
            return Err(EqeError::declaration(format!(
                "tuple value {value} does not conform to {ty}"
            )));
        }
    }
    Ok(())
}

fn has_duplicates<T: PartialEq>(items: &[T]) -> bool {
    items
        .iter()
        .enumerate()
        .any(|(i, item)| items[..i].contains(item))
}

pub(crate) fn join_types(types: &[TypeDesc]) -> String {
    types
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
