//! Virtual resources: isolated, snapshot-able stand-ins for external state.
//!
//! Content for each provisioned resource is generated like an extra argument.
//! Every case instantiates a fresh resource per side from the same content,
//! so neither side can observe the other's effects.

#![allow(missing_docs)]

pub mod filesystem;
pub mod output;

use std::collections::BTreeMap;
use std::fmt;

use rand::rngs::StdRng;

use crate::core::errors::Result;
use crate::generate::complexity::Complexity;
use crate::model::implementation::AsAny;
use crate::model::types::TypeDesc;
use crate::model::value::Value;

pub use filesystem::{FILESYSTEM, FilesystemProvider, VirtualFilesystem};
pub use output::{CapturedOutput, OUTPUT, OutputProvider};

/// A live resource instance handed to an implementation.
pub trait Resource: AsAny + Send + fmt::Debug {
    /// Final observable content, compared between sides.
    fn snapshot(&self) -> Value;
}

/// Factory for one kind of resource.
pub trait ResourceProvider: Send + Sync {
    /// Name used for provisioning and in reports.
    fn name(&self) -> &str;

    /// Type of the generated content value.
    fn content_type(&self) -> TypeDesc;

    /// Build a fresh instance holding `content`.
    fn instantiate(&self, content: &Value) -> Result<Box<dyn Resource>>;

    /// Default contents for the simple phase.
    fn simple_contents(&self) -> Vec<Value> {
        Vec::new()
    }

    /// Default contents for the edge phase.
    fn edge_contents(&self) -> Vec<Value> {
        Vec::new()
    }

    /// Default random content, if the provider can make one.
    fn random_content(&self, complexity: Complexity, rng: &mut StdRng) -> Option<Value> {
        let _ = (complexity, rng);
        None
    }
}

/// The resources provisioned for one side of one case.
#[derive(Debug, Default)]
pub struct Resources {
    entries: Vec<(String, Box<dyn Resource>)>,
}

impl Resources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, resource: Box<dyn Resource>) {
        let name = name.into();
        self.entries.retain(|(existing, _)| *existing != name);
        self.entries.push((name, resource));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// Typed access to a named resource.
    pub fn get<T: Resource>(&mut self, name: &str) -> Option<&mut T> {
        self.entries
            .iter_mut()
            .find(|(existing, _)| existing == name)
            .and_then(|(_, resource)| resource.as_mut().as_any_mut().downcast_mut::<T>())
    }

    /// The provisioned virtual filesystem, if any.
    pub fn filesystem(&mut self) -> Option<&mut VirtualFilesystem> {
        self.get::<VirtualFilesystem>(FILESYSTEM)
    }

    /// The provisioned captured console, if any.
    pub fn output(&mut self) -> Option<&mut CapturedOutput> {
        self.get::<CapturedOutput>(OUTPUT)
    }

    /// Content of every resource, keyed by name.
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.entries
            .iter()
            .map(|(name, resource)| (name.clone(), resource.snapshot()))
            .collect()
    }
}
