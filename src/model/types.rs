//! Declared types of operation parameters, returns and resource contents.

#![allow(missing_docs)]

use std::fmt;

use serde::{Deserialize, Serialize};

/// Type descriptor for values crossing the implementation boundary.
///
/// Two signatures match only when their parameter descriptors are equal
/// position by position, so descriptors must be structurally comparable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeDesc {
    /// No value. Used as the return type of procedures.
    Unit,
    Bool,
    /// 32-bit signed integer.
    Int,
    /// 64-bit signed integer.
    Long,
    Double,
    Char,
    Str,
    Bytes,
    List(Box<TypeDesc>),
    /// Fixed-shape sequence. Compared like a list. Simple values include
    /// the empty array; random draws always have a non-empty top level.
    Array(Box<TypeDesc>),
    Set(Box<TypeDesc>),
    Map(Box<TypeDesc>, Box<TypeDesc>),
    /// A value of the inner type or `Null`.
    Optional(Box<TypeDesc>),
    /// User-defined or resource content type. Has no built-in generators.
    Named(String),
    /// The implementation's own instance type.
    Receiver,
}

impl TypeDesc {
    pub fn list(element: Self) -> Self {
        Self::List(Box::new(element))
    }

    pub fn array(element: Self) -> Self {
        Self::Array(Box::new(element))
    }

    pub fn set(element: Self) -> Self {
        Self::Set(Box::new(element))
    }

    pub fn map(key: Self, value: Self) -> Self {
        Self::Map(Box::new(key), Box::new(value))
    }

    pub fn optional(inner: Self) -> Self {
        Self::Optional(Box::new(inner))
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    /// Whether the type mentions the receiver type anywhere.
    pub fn mentions_receiver(&self) -> bool {
        match self {
            Self::Receiver => true,
            Self::List(inner) | Self::Array(inner) | Self::Set(inner) | Self::Optional(inner) => {
                inner.mentions_receiver()
            }
            Self::Map(key, value) => key.mentions_receiver() || value.mentions_receiver(),
            _ => false,
        }
    }

    /// Array nesting depth: `int[][]` is 2, `int` is 0.
    pub fn array_depth(&self) -> u32 {
        match self {
            Self::Array(inner) => 1 + inner.array_depth(),
            _ => 0,
        }
    }
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unit => f.write_str("unit"),
            Self::Bool => f.write_str("bool"),
            Self::Int => f.write_str("int"),
            Self::Long => f.write_str("long"),
            Self::Double => f.write_str("double"),
            Self::Char => f.write_str("char"),
            Self::Str => f.write_str("String"),
            Self::Bytes => f.write_str("bytes"),
            Self::List(inner) => write!(f, "List<{inner}>"),
            Self::Array(inner) => write!(f, "{inner}[]"),
            Self::Set(inner) => write!(f, "Set<{inner}>"),
            Self::Map(key, value) => write!(f, "Map<{key}, {value}>"),
            Self::Optional(inner) => write!(f, "{inner}?"),
            Self::Named(name) => f.write_str(name),
            Self::Receiver => f.write_str("Self"),
        }
    }
}
