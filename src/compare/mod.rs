//! Equivalence checking between reference and candidate outcomes.

pub mod equivalence;

pub use equivalence::{Checker, DiscrepancyKind, Mismatch, Tolerance};
