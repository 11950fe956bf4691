//! Observable result of running one case on one side.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::generate::binder::InputCase;
use crate::model::implementation::Failure;
use crate::model::value::Value;

/// Failure kind recorded when an implementation panics.
pub const PANIC_KIND: &str = "panic";

/// Where on the call path the outcome was captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Building the receiver for a bound call.
    Construction,
    /// The operation under test.
    Invocation,
}

/// Everything one side exposed for one case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub stage: Stage,
    pub result: Result<Value, Failure>,
    /// Receiver state after the call, for bound operations and constructors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<Value>,
    /// Final content of every provisioned resource.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub resources: BTreeMap<String, Value>,
    /// Post-call arguments. Cheap-copy positions appear only when the call
    /// changed them.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub arguments: BTreeMap<usize, Value>,
}

impl Outcome {
    pub fn failure(&self) -> Option<&Failure> {
        self.result.as_ref().err()
    }

    pub fn panicked(&self) -> bool {
        self.failure().is_some_and(|f| f.kind == PANIC_KIND)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.stage == Stage::Construction {
            f.write_str("construction ")?;
        }
        match &self.result {
            Ok(value) => write!(f, "returned {value}")?,
            Err(failure) => write!(f, "raised {failure}")?,
        }
        if let Some(state) = &self.receiver {
            write!(f, ", state {state}")?;
        }
        for (name, content) in &self.resources {
            write!(f, ", {name} {content}")?;
        }
        for (position, value) in &self.arguments {
            write!(f, ", arg{position} {value}")?;
        }
        Ok(())
    }
}

/// Both sides of one executed case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub case: InputCase,
    /// Case used to build the receiver, for bound operations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_case: Option<InputCase>,
    pub reference: Outcome,
    pub candidate: Outcome,
}

/// What happened to one case.
#[derive(Debug, Clone, PartialEq)]
pub enum CaseRun {
    Ran(Box<Execution>),
    /// Skipped by an implementation or unbuildable receiver; not scored.
    Discarded(String),
    /// Engine-side problem; aborts this case only.
    Anomaly(String),
}
