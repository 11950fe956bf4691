#![forbid(unsafe_code)]

//! Equivalence engine: differential testing of a candidate implementation
//! against a trusted reference.
//!
//! The engine works in four steps:
//! 1. **Match** every reference operation to a candidate operation by name,
//!    parameter types, return type and kind.
//! 2. **Generate** a case stream per operation: simple, fixed and edge cases,
//!    then a seeded random tail of increasing complexity.
//! 3. **Execute** each case on both sides with isolated receivers, arguments
//!    and virtual resources.
//! 4. **Compare** results, failure kinds, receiver state, resource content
//!    and mutated arguments, then fold everything into per-operation verdicts.
//!
//! # Library usage
//!
//! Use the [`prelude`] for convenient access to the most common types:
//!
//! ```rust,no_run
//! use equivalence_engine::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use equivalence_engine::core::config::Config;
//! use equivalence_engine::contract::builder::ContractBuilder;
//! ```

pub mod prelude;

pub mod compare;
pub mod contract;
pub mod core;
pub mod engine;
pub mod execute;
pub mod generate;
pub mod logger;
pub mod model;
pub mod resource;
