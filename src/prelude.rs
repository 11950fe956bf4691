//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use equivalence_engine::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{EqeError, Result};

// Model
pub use crate::model::implementation::{Failure, Implementation, Raised, Receiver};
pub use crate::model::signature::{OperationKind, Signature, Surface};
pub use crate::model::types::TypeDesc;
pub use crate::model::value::Value;

// Generation
pub use crate::generate::complexity::Complexity;
pub use crate::generate::registry::{Generated, Generator, GeneratorKind, Scope, TypeRegistry};

// Resources
pub use crate::resource::{
    CapturedOutput, FILESYSTEM, FilesystemProvider, OUTPUT, OutputProvider, Resource, ResourceProvider, Resources,
    VirtualFilesystem,
};

// Contract
pub use crate::contract::{Contract, ContractBuilder};

// Comparison
pub use crate::compare::equivalence::{DiscrepancyKind, Mismatch, Verification};
pub use crate::engine::{Budget, CancelToken, ComparisonReport, Engine, Verdict, VerdictStatus};
pub use crate::logger::sink::{EventLogHandle, spawn_event_log};
