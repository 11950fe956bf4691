//! Case execution against reference and candidate implementations.

pub mod executor;
pub mod outcome;

pub use executor::{Executor, Side};
pub use outcome::{CaseRun, Execution, Outcome, PANIC_KIND, Stage};
