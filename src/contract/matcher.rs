//! Pairs every contract operation with its candidate counterpart.

#![allow(missing_docs)]

use std::collections::BTreeSet;

use serde::Serialize;

use crate::contract::Contract;
use crate::core::errors::{EqeError, Result};
use crate::model::signature::{OperationKind, Signature, Surface};

/// A contract operation and the candidate signature it dispatches to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchedOperation {
    /// Index into [`Contract::operations`].
    pub reference: usize,
    pub candidate: Signature,
}

/// The full pairing, one entry per contract operation in contract order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OperationMatch {
    pub matched: Vec<MatchedOperation>,
}

impl OperationMatch {
    /// Candidate signature for contract operation `reference`.
    pub fn candidate_for(&self, reference: usize) -> Option<&Signature> {
        self.matched
            .iter()
            .find(|m| m.reference == reference)
            .map(|m| &m.candidate)
    }

    pub fn len(&self) -> usize {
        self.matched.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matched.is_empty()
    }
}

/// Match the contract against a candidate surface.
///
/// Identity is name plus parameter types. Return types must be equal and
/// kinds must agree, except that a designated factory may stand in for a
/// constructor on either side.
pub fn match_operations(contract: &Contract, candidate: &Surface, reject_extra: bool) -> Result<OperationMatch> {
    let mut ids = BTreeSet::new();
    for op in &candidate.operations {
        if !ids.insert(op.id()) {
            return Err(EqeError::ContractMismatch {
                operation: op.id().to_string(),
                details: "candidate declares the operation more than once".to_string(),
            });
        }
    }

    let mut matched = Vec::with_capacity(contract.operations().len());
    let mut used = BTreeSet::new();
    for (index, op) in contract.operations().iter().enumerate() {
        let reference = &op.signature;
        let Some(found) = candidate.find(&reference.id()) else {
            return Err(mismatch(reference, missing_details(reference, candidate)));
        };
        if found.returns != reference.returns {
            return Err(mismatch(
                reference,
                format!(
                    "candidate returns {}, reference returns {}",
                    found.returns, reference.returns
                ),
            ));
        }
        if !kinds_compatible(contract, reference, found) {
            return Err(mismatch(
                reference,
                format!(
                    "candidate is a {} operation, reference is {}",
                    found.kind, reference.kind
                ),
            ));
        }
        used.insert(found.id());
        matched.push(MatchedOperation {
            reference: index,
            candidate: found.clone(),
        });
    }

    if reject_extra
        && let Some(extra) = candidate.operations.iter().find(|op| !used.contains(&op.id()))
    {
        return Err(EqeError::ContractMismatch {
            operation: extra.id().to_string(),
            details: "candidate operation has no reference counterpart".to_string(),
        });
    }

    Ok(OperationMatch { matched })
}

fn kinds_compatible(contract: &Contract, reference: &Signature, candidate: &Signature) -> bool {
    if reference.kind == candidate.kind {
        return true;
    }
    if !contract.is_designated_factory(&reference.name) {
        return false;
    }
    let constructor_vs_factory = |a: &Signature, b: &Signature| {
        a.kind == OperationKind::Constructor && b.is_receiver_factory()
    };
    constructor_vs_factory(reference, candidate) || constructor_vs_factory(candidate, reference)
}

fn missing_details(reference: &Signature, candidate: &Surface) -> String {
    let overloads: Vec<String> = candidate
        .overloads(&reference.name)
        .map(|op| op.id().to_string())
        .collect();
    if overloads.is_empty() {
        "candidate has no operation with this name".to_string()
    } else {
        format!(
            "no overload with matching parameters; candidate offers {}",
            overloads.join(", ")
        )
    }
}

fn mismatch(reference: &Signature, details: String) -> EqeError {
    EqeError::ContractMismatch {
        operation: reference.id().to_string(),
        details,
    }
}
