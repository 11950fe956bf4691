//! Operation signatures and implementation surfaces.

#![allow(missing_docs)]

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::types::TypeDesc;

/// How an operation is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Free function with no receiver.
    Static,
    /// Invoked on a receiver instance, possibly mutating it.
    Bound,
    /// Produces a new receiver instance.
    Constructor,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Static => "static",
            Self::Bound => "bound",
            Self::Constructor => "constructor",
        })
    }
}

/// A named, typed entry point of an implementation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    pub params: Vec<TypeDesc>,
    pub returns: TypeDesc,
    pub kind: OperationKind,
    /// Failure kinds the operation may raise. Informational; raising an
    /// undeclared kind is compared like any other.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<String>,
}

impl Signature {
    /// A static operation.
    pub fn static_op(name: impl Into<String>, params: Vec<TypeDesc>, returns: TypeDesc) -> Self {
        Self {
            name: name.into(),
            params,
            returns,
            kind: OperationKind::Static,
            failures: Vec::new(),
        }
    }

    /// A receiver-bound operation.
    pub fn bound(name: impl Into<String>, params: Vec<TypeDesc>, returns: TypeDesc) -> Self {
        Self {
            name: name.into(),
            params,
            returns,
            kind: OperationKind::Bound,
            failures: Vec::new(),
        }
    }

    /// A constructor. Its return type is always the receiver type.
    pub fn constructor(name: impl Into<String>, params: Vec<TypeDesc>) -> Self {
        Self {
            name: name.into(),
            params,
            returns: TypeDesc::Receiver,
            kind: OperationKind::Constructor,
            failures: Vec::new(),
        }
    }

    /// Declare failure kinds the operation may raise.
    #[must_use]
    pub fn raises<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.failures.extend(kinds.into_iter().map(Into::into));
        self
    }

    /// Identity used for matching: name plus parameter types.
    pub fn id(&self) -> OperationId {
        OperationId {
            name: self.name.clone(),
            params: self.params.clone(),
        }
    }

    /// Static operation returning a receiver.
    pub fn is_receiver_factory(&self) -> bool {
        self.kind == OperationKind::Static && self.returns == TypeDesc::Receiver
    }

    /// Constructor or receiver factory.
    pub fn constructs_receiver(&self) -> bool {
        self.kind == OperationKind::Constructor || self.is_receiver_factory()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} -> {}", self.kind, self.id(), self.returns)
    }
}

/// Operation identity: name and ordered parameter types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperationId {
    pub name: String,
    pub params: Vec<TypeDesc>,
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{param}")?;
        }
        f.write_str(")")
    }
}

/// The public surface an implementation exposes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Surface {
    pub operations: Vec<Signature>,
}

impl Surface {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, signature: Signature) -> Self {
        self.operations.push(signature);
        self
    }

    pub fn find(&self, id: &OperationId) -> Option<&Signature> {
        self.operations
            .iter()
            .find(|op| op.name == id.name && op.params == id.params)
    }

    pub fn overloads<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Signature> + 'a {
        self.operations.iter().filter(move |op| op.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_renders_name_and_params() {
        let sig = Signature::static_op("add", vec![TypeDesc::Int, TypeDesc::Long], TypeDesc::Long);
        assert_eq!(sig.id().to_string(), "add(int, long)");
        assert_eq!(sig.to_string(), "static add(int, long) -> long");
    }

    #[test]
    fn factories_construct_receivers() {
        let factory = Signature::static_op("of", vec![TypeDesc::Int], TypeDesc::Receiver);
        let ctor = Signature::constructor("new", vec![]);
        let plain = Signature::static_op("of", vec![TypeDesc::Int], TypeDesc::Int);
        assert!(factory.is_receiver_factory());
        assert!(factory.constructs_receiver());
        assert!(ctor.constructs_receiver());
        assert!(!plain.constructs_receiver());
    }

    #[test]
    fn surface_finds_overload_by_param_types() {
        let surface = Surface::new()
            .with(Signature::static_op("f", vec![TypeDesc::Int], TypeDesc::Int))
            .with(Signature::static_op("f", vec![TypeDesc::Str], TypeDesc::Int));
        let id = OperationId {
            name: "f".to_string(),
            params: vec![TypeDesc::Str],
        };
        assert_eq!(surface.find(&id).map(|s| s.params.clone()), Some(vec![TypeDesc::Str]));
        assert_eq!(surface.overloads("f").count(), 2);
    }
}
