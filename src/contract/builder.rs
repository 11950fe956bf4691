//! Contract declaration: registrations layered over the reference surface.
//!
//! Builder methods never fail eagerly; the first declaration error is kept
//! and returned from [`ContractBuilder::build`].

#![allow(missing_docs)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use rand::rngs::StdRng;

use crate::compare::equivalence::{Mismatch, Verification, VerifyFn};
use crate::contract::{Contract, ContractOperation, FilterFn};
use crate::core::errors::{EqeError, Result};
use crate::generate::complexity::Complexity;
use crate::generate::registry::{
    Generated, Generator, GeneratorKind, Scope, TupleBinding, TupleSource, TypeRegistry, join_types,
};
use crate::model::implementation::Implementation;
use crate::model::signature::{OperationId, OperationKind, Surface};
use crate::model::types::TypeDesc;
use crate::model::value::Value;
use crate::resource::ResourceProvider;

/// Where a resource is provisioned.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Provision {
    Operation(String),
    Everywhere,
}

/// Declarative contract builder.
pub struct ContractBuilder {
    surface: Surface,
    registry: TypeRegistry,
    providers: BTreeMap<String, Arc<dyn ResourceProvider>>,
    provisions: Vec<(Provision, String)>,
    limits: BTreeMap<String, usize>,
    factories: BTreeSet<String>,
    filters: BTreeMap<OperationId, FilterFn>,
    verifiers: BTreeMap<OperationId, VerifyFn>,
    error: Option<EqeError>,
}

impl ContractBuilder {
    /// Start from the reference implementation's described surface.
    pub fn new(reference: &dyn Implementation) -> Self {
        Self::from_surface(reference.describe())
    }

    pub fn from_surface(surface: Surface) -> Self {
        Self {
            surface,
            registry: TypeRegistry::new(),
            providers: BTreeMap::new(),
            provisions: Vec::new(),
            limits: BTreeMap::new(),
            factories: BTreeSet::new(),
            filters: BTreeMap::new(),
            verifiers: BTreeMap::new(),
            error: None,
        }
    }

    fn record(&mut self, outcome: Result<()>) {
        if let Err(err) = outcome
            && self.error.is_none()
        {
            self.error = Some(err);
        }
    }

    #[must_use]
    pub fn simple(mut self, ty: TypeDesc, values: impl IntoIterator<Item = Value>) -> Self {
        let outcome = self
            .registry
            .register(ty, GeneratorKind::Simple, Generator::values(values));
        self.record(outcome);
        self
    }

    #[must_use]
    pub fn edge(mut self, ty: TypeDesc, values: impl IntoIterator<Item = Value>) -> Self {
        let outcome = self
            .registry
            .register(ty, GeneratorKind::Edge, Generator::values(values));
        self.record(outcome);
        self
    }

    #[must_use]
    pub fn fixed(mut self, ty: TypeDesc, values: impl IntoIterator<Item = Value>) -> Self {
        let outcome = self
            .registry
            .register(ty, GeneratorKind::Fixed, Generator::values(values));
        self.record(outcome);
        self
    }

    /// Fixed values computed by a producer. The producer runs twice and
    /// must return identical lists both times.
    #[must_use]
    pub fn fixed_from<F>(mut self, ty: TypeDesc, producer: F) -> Self
    where
        F: Fn() -> Vec<Value>,
    {
        let outcome = stable_output(&format!("fixed values for {ty}"), &producer).and_then(|values| {
            self.registry
                .register(ty, GeneratorKind::Fixed, Generator::Values(values))
        });
        self.record(outcome);
        self
    }

    #[must_use]
    pub fn random<F>(mut self, ty: TypeDesc, f: F) -> Self
    where
        F: Fn(Complexity, &mut StdRng) -> Generated + Send + Sync + 'static,
    {
        let outcome = self
            .registry
            .register(ty, GeneratorKind::Random, Generator::random(f));
        self.record(outcome);
        self
    }

    /// Fixed argument tuples for operations with parameter list `params`.
    #[must_use]
    pub fn fixed_tuples(mut self, scope: Scope, params: Vec<TypeDesc>, tuples: Vec<Vec<Value>>) -> Self {
        let outcome = self.registry.register_tuple(TupleBinding {
            scope,
            params,
            kind: GeneratorKind::Fixed,
            source: TupleSource::Values(tuples),
        });
        self.record(outcome);
        self
    }

    /// Fixed argument tuples computed by a producer, checked for stability
    /// like [`Self::fixed_from`].
    #[must_use]
    pub fn fixed_tuples_from<F>(mut self, scope: Scope, params: Vec<TypeDesc>, producer: F) -> Self
    where
        F: Fn() -> Vec<Vec<Value>>,
    {
        let label = format!("fixed tuples for ({})", join_types(&params));
        let outcome = stable_output(&label, &producer).and_then(|tuples| {
            self.registry.register_tuple(TupleBinding {
                scope,
                params,
                kind: GeneratorKind::Fixed,
                source: TupleSource::Values(tuples),
            })
        });
        self.record(outcome);
        self
    }

    /// Random argument tuples for operations with parameter list `params`.
    #[must_use]
    pub fn random_tuples<F>(mut self, scope: Scope, params: Vec<TypeDesc>, f: F) -> Self
    where
        F: Fn(Complexity, &mut StdRng) -> Generated<Vec<Value>> + Send + Sync + 'static,
    {
        let outcome = self.registry.register_tuple(TupleBinding {
            scope,
            params,
            kind: GeneratorKind::Random,
            source: TupleSource::Random(Arc::new(f)),
        });
        self.record(outcome);
        self
    }

    /// Cap the total cases for every overload named `operation`.
    #[must_use]
    pub fn limit(mut self, operation: impl Into<String>, cases: usize) -> Self {
        self.limits.insert(operation.into(), cases);
        self
    }

    /// Treat `ty` as cheap to copy: its argument positions are recorded
    /// only when a call changes them.
    #[must_use]
    pub fn cheap_copy(mut self, ty: TypeDesc) -> Self {
        self.registry.mark_cheap_copy(ty);
        self
    }

    /// Make a resource kind available. Its default contents feed the
    /// registry below any explicit registration for its content type.
    #[must_use]
    pub fn resource_provider<P>(mut self, provider: P) -> Self
    where
        P: ResourceProvider + 'static,
    {
        let provider: Arc<dyn ResourceProvider> = Arc::new(provider);
        let ty = provider.content_type();
        let mut outcome = Ok(());
        let simple = provider.simple_contents();
        if !simple.is_empty() {
            outcome = outcome.and_then(|()| {
                self.registry
                    .register_default(ty.clone(), GeneratorKind::Simple, Generator::Values(simple))
            });
        }
        let edge = provider.edge_contents();
        if !edge.is_empty() {
            outcome = outcome.and_then(|()| {
                self.registry
                    .register_default(ty.clone(), GeneratorKind::Edge, Generator::Values(edge))
            });
        }
        let random_source = Arc::clone(&provider);
        outcome = outcome.and_then(|()| {
            self.registry.register_default(
                ty,
                GeneratorKind::Random,
                Generator::random(move |c, rng| {
                    random_source
                        .random_content(c, rng)
                        .map_or(Generated::Skip, Generated::Value)
                }),
            )
        });
        self.record(outcome);
        self.providers.insert(provider.name().to_string(), provider);
        self
    }

    /// Inject resource `name` into every call of operations named `operation`.
    #[must_use]
    pub fn provide_resource(mut self, operation: impl Into<String>, name: impl Into<String>) -> Self {
        self.provisions
            .push((Provision::Operation(operation.into()), name.into()));
        self
    }

    /// Inject resource `name` into every operation of the contract.
    #[must_use]
    pub fn provide_resource_everywhere(mut self, name: impl Into<String>) -> Self {
        self.provisions.push((Provision::Everywhere, name.into()));
        self
    }

    /// Allow operations named `name` to match across constructor and
    /// receiver-factory kinds.
    #[must_use]
    pub fn designate_factory(mut self, name: impl Into<String>) -> Self {
        self.factories.insert(name.into());
        self
    }

    /// Discard cases of operation `name(params)` whose arguments fail
    /// `predicate`. Applies to construction paths too, where a rejected
    /// receiver case is replaced by the next one.
    #[must_use]
    pub fn filter_parameters<F>(mut self, name: impl Into<String>, params: Vec<TypeDesc>, predicate: F) -> Self
    where
        F: Fn(&[Value]) -> bool + Send + Sync + 'static,
    {
        let id = OperationId {
            name: name.into(),
            params,
        };
        let outcome = self.target(&id, "parameter filter", self.filters.contains_key(&id));
        self.record(outcome);
        self.filters.insert(id, Arc::new(predicate));
        self
    }

    /// Judge cases of operation `name(params)` with `verify` instead of the
    /// standard check.
    #[must_use]
    pub fn verify<F>(mut self, name: impl Into<String>, params: Vec<TypeDesc>, verify: F) -> Self
    where
        F: Fn(&Verification<'_>) -> Option<Mismatch> + Send + Sync + 'static,
    {
        let id = OperationId {
            name: name.into(),
            params,
        };
        let outcome = self.target(&id, "verifier", self.verifiers.contains_key(&id));
        self.record(outcome);
        self.verifiers.insert(id, Arc::new(verify));
        self
    }

    fn target(&self, id: &OperationId, what: &str, taken: bool) -> Result<()> {
        if self.surface.find(id).is_none() {
            return Err(EqeError::declaration(format!("{what} for {id} matches no operation")));
        }
        if taken {
            return Err(EqeError::declaration(format!("duplicate {what} for {id}")));
        }
        Ok(())
    }

    /// Validate every declaration and freeze the contract.
    pub fn build(self) -> Result<Contract> {
        if let Some(err) = self.error {
            return Err(err);
        }
        validate_surface(&self.surface)?;
        self.validate_names()?;
        self.validate_usage()?;

        let mut operations = Vec::with_capacity(self.surface.operations.len());
        let mut construction = Vec::new();
        for signature in self.surface.operations {
            let mut resources: Vec<String> = Vec::new();
            for (provision, name) in &self.provisions {
                let applies = match provision {
                    Provision::Everywhere => true,
                    Provision::Operation(op) => *op == signature.name,
                };
                if applies && !resources.contains(name) {
                    resources.push(name.clone());
                }
            }
            let resource_types = resources
                .iter()
                .filter_map(|name| self.providers.get(name).map(|p| p.content_type()))
                .collect();
            let designated = signature.is_receiver_factory() && self.factories.contains(&signature.name);
            if signature.kind == OperationKind::Constructor || designated {
                construction.push(operations.len());
            }
            let id = signature.id();
            operations.push(ContractOperation {
                scope: id.to_string(),
                limit: self.limits.get(&signature.name).copied(),
                filter: self.filters.get(&id).cloned(),
                verifier: self.verifiers.get(&id).cloned(),
                signature,
                resources,
                resource_types,
            });
        }

        if construction.is_empty() && operations.iter().any(ContractOperation::needs_receiver) {
            return Err(EqeError::declaration(
                "bound operations require at least one constructor or designated receiver factory",
            ));
        }

        Ok(Contract {
            operations,
            construction,
            registry: Arc::new(self.registry),
            providers: self.providers,
            factories: self.factories,
        })
    }

    fn validate_names(&self) -> Result<()> {
        let names: BTreeSet<&str> = self
            .surface
            .operations
            .iter()
            .map(|op| op.name.as_str())
            .collect();

        for name in self.limits.keys() {
            if !names.contains(name.as_str()) {
                return Err(EqeError::declaration(format!(
                    "case limit names unknown operation {name}"
                )));
            }
        }

        for name in &self.factories {
            let constructs = self
                .surface
                .overloads(name)
                .any(crate::model::signature::Signature::constructs_receiver);
            if !constructs {
                return Err(EqeError::declaration(format!(
                    "designated factory {name} is not a constructor or receiver factory"
                )));
            }
        }

        for (provision, resource) in &self.provisions {
            if !self.providers.contains_key(resource) {
                return Err(EqeError::declaration(format!(
                    "no provider registered for resource {resource}"
                )));
            }
            if let Provision::Operation(op) = provision
                && !names.contains(op.as_str())
            {
                return Err(EqeError::declaration(format!(
                    "resource {resource} provisioned for unknown operation {op}"
                )));
            }
        }
        for (provision, resource) in &self.provisions {
            if *provision != Provision::Everywhere
                && self
                    .provisions
                    .iter()
                    .any(|(p, r)| *p == Provision::Everywhere && r == resource)
            {
                return Err(EqeError::declaration(format!(
                    "resource {resource} provisioned both per operation and everywhere"
                )));
            }
        }

        for binding in self.registry.tuple_bindings() {
            let Scope::Operations(scoped) = &binding.scope else {
                continue;
            };
            for name in scoped {
                let binds = self
                    .surface
                    .overloads(name)
                    .any(|op| op.params == binding.params);
                if !binds {
                    return Err(EqeError::declaration(format!(
                        "{} tuple binding for {name}({}) matches no operation",
                        binding.kind,
                        join_types(&binding.params)
                    )));
                }
            }
        }
        Ok(())
    }

    /// Registered types must be used by some parameter or resource.
    fn validate_usage(&self) -> Result<()> {
        let mut used = BTreeSet::new();
        for op in &self.surface.operations {
            for param in &op.params {
                collect_types(param, &mut used);
            }
        }
        for provider in self.providers.values() {
            collect_types(&provider.content_type(), &mut used);
        }
        for ty in self.registry.registered_types() {
            if !used.contains(&ty) {
                return Err(EqeError::declaration(format!(
                    "generators registered for {ty}, which no operation uses"
                )));
            }
        }
        Ok(())
    }
}

fn validate_surface(surface: &Surface) -> Result<()> {
    let mut seen = BTreeSet::new();
    for op in &surface.operations {
        if !seen.insert(op.id()) {
            return Err(EqeError::declaration(format!(
                "operation {} declared twice",
                op.id()
            )));
        }
        if let Some(param) = op.params.iter().find(|p| p.mentions_receiver()) {
            return Err(EqeError::declaration(format!(
                "operation {} takes receiver-typed parameter {param}",
                op.id()
            )));
        }
        if op.returns != TypeDesc::Receiver && op.returns.mentions_receiver() {
            return Err(EqeError::declaration(format!(
                "operation {} returns nested receiver type {}",
                op.id(),
                op.returns
            )));
        }
        if op.kind == OperationKind::Bound && op.returns == TypeDesc::Receiver {
            return Err(EqeError::declaration(format!(
                "bound operation {} cannot return a receiver",
                op.id()
            )));
        }
    }
    Ok(())
}

fn collect_types(ty: &TypeDesc, out: &mut BTreeSet<TypeDesc>) {
    out.insert(ty.clone());
    match ty {
        TypeDesc::List(inner) | TypeDesc::Array(inner) | TypeDesc::Set(inner) | TypeDesc::Optional(inner) => {
            collect_types(inner, out);
        }
        TypeDesc::Map(key, value) => {
            collect_types(key, out);
            collect_types(value, out);
        }
        _ => {}
    }
}

fn stable_output<T: PartialEq>(label: &str, producer: &dyn Fn() -> T) -> Result<T> {
    let first = producer();
    let second = producer();
    if first == second {
        Ok(first)
    } else {
        Err(EqeError::declaration(format!(
            "{label} differ between evaluations; fixed data must be deterministic"
        )))
    }
}
