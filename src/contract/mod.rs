//! The comparable contract: operations, construction paths, generators and
//! resource provisioning, derived once from the reference implementation.

#![allow(missing_docs)]

pub mod builder;
pub mod matcher;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::compare::equivalence::VerifyFn;
use crate::generate::binder::CaseShape;
use crate::generate::registry::TypeRegistry;
use crate::model::signature::{OperationId, OperationKind, Signature, Surface};
use crate::model::types::TypeDesc;
use crate::model::value::Value;
use crate::resource::ResourceProvider;

pub use builder::ContractBuilder;
pub use matcher::{MatchedOperation, OperationMatch, match_operations};

/// Input predicate evaluated before a case runs. `false` discards the case.
pub type FilterFn = Arc<dyn Fn(&[Value]) -> bool + Send + Sync>;

/// One reference operation with everything needed to generate its cases.
#[derive(Clone)]
pub struct ContractOperation {
    pub signature: Signature,
    /// Provisioned resource names, in injection order.
    pub resources: Vec<String>,
    /// Content type of each provisioned resource.
    pub resource_types: Vec<TypeDesc>,
    /// Total case budget; only the random tail is truncated.
    pub limit: Option<usize>,
    /// Seed scope, unique per operation identity.
    pub scope: String,
    pub filter: Option<FilterFn>,
    pub verifier: Option<VerifyFn>,
}

impl fmt::Debug for ContractOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContractOperation")
            .field("signature", &self.signature)
            .field("resources", &self.resources)
            .field("limit", &self.limit)
            .field("filtered", &self.filter.is_some())
            .field("verified", &self.verifier.is_some())
            .finish_non_exhaustive()
    }
}

impl ContractOperation {
    pub fn id(&self) -> OperationId {
        self.signature.id()
    }

    pub fn shape(&self) -> CaseShape<'_> {
        CaseShape {
            operation: &self.signature.name,
            params: &self.signature.params,
            hidden: &self.resource_types,
            scope: &self.scope,
        }
    }

    pub fn needs_receiver(&self) -> bool {
        self.signature.kind == OperationKind::Bound
    }
}

/// Immutable contract shared by every comparison against one reference.
pub struct Contract {
    operations: Vec<ContractOperation>,
    construction: Vec<usize>,
    registry: Arc<TypeRegistry>,
    providers: BTreeMap<String, Arc<dyn ResourceProvider>>,
    factories: BTreeSet<String>,
}

impl fmt::Debug for Contract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Contract")
            .field("operations", &self.operations.iter().map(ContractOperation::id).collect::<Vec<_>>())
            .field("construction", &self.construction)
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .field("factories", &self.factories)
            .finish_non_exhaustive()
    }
}

impl Contract {
    pub fn operations(&self) -> &[ContractOperation] {
        &self.operations
    }

    pub fn operation(&self, index: usize) -> Option<&ContractOperation> {
        self.operations.get(index)
    }

    /// Indexes of operations that build receivers, in declaration order.
    pub fn construction_paths(&self) -> &[usize] {
        &self.construction
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    pub fn provider(&self, name: &str) -> Option<&Arc<dyn ResourceProvider>> {
        self.providers.get(name)
    }

    /// Whether `name` may match across constructor/factory kinds.
    pub fn is_designated_factory(&self, name: &str) -> bool {
        self.factories.contains(name)
    }

    /// The reference surface the contract was derived from.
    pub fn surface(&self) -> Surface {
        Surface {
            operations: self.operations.iter().map(|op| op.signature.clone()).collect(),
        }
    }
}
