//! The boundary between the engine and the implementations it compares.

#![allow(missing_docs)]

use std::any::Any;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::signature::{Signature, Surface};
use crate::model::value::Value;
use crate::resource::Resources;

/// A failure raised by an implementation. Only `kind` takes part in
/// equivalence; `message` is kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: String,
    pub message: String,
}

impl Failure {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            f.write_str(&self.kind)
        } else {
            write!(f, "{}: {}", self.kind, self.message)
        }
    }
}

/// Non-value exit from an invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Raised {
    /// Ordinary failure, compared by kind.
    Failure(Failure),
    /// The implementation declares the inputs inapplicable. The case is
    /// discarded from both sides.
    Skip,
}

impl Raised {
    pub fn failure(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failure(Failure::new(kind, message))
    }
}

impl From<Failure> for Raised {
    fn from(value: Failure) -> Self {
        Self::Failure(value)
    }
}

/// Upcast helper so implementors never write `as_any` by hand.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// An instance produced by a constructor or receiver factory.
pub trait Receiver: AsAny + Send + fmt::Debug {
    /// Observable state, compared after every bound call.
    fn state(&self) -> Value;
}

impl dyn Receiver + '_ {
    /// Downcast to the implementation's concrete receiver type.
    pub fn downcast_mut<T: Receiver>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }

    pub fn downcast_ref<T: Receiver>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

/// A reference or candidate implementation.
///
/// Arguments are passed as a mutable slice; whatever the implementation
/// leaves in it is compared after the call.
pub trait Implementation: Send + Sync {
    /// Label used in reports and logs.
    fn label(&self) -> &str {
        "implementation"
    }

    /// Enumerate the public surface.
    fn describe(&self) -> Surface;

    /// Run a constructor or receiver factory.
    fn construct(
        &self,
        op: &Signature,
        args: &mut [Value],
        resources: &mut Resources,
    ) -> Result<Box<dyn Receiver>, Raised> {
        let _ = (args, resources);
        Err(Raised::failure(
            "Unsupported",
            format!("{} cannot construct receivers", op.id()),
        ))
    }

    /// Run a static or bound operation.
    fn invoke(
        &self,
        op: &Signature,
        receiver: Option<&mut dyn Receiver>,
        args: &mut [Value],
        resources: &mut Resources,
    ) -> Result<Value, Raised>;
}
