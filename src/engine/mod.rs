//! Comparison sessions: per-operation case streams, the random-phase worker
//! pool, budgets and verdict aggregation.

pub mod cancel;
pub mod session;
pub mod verdict;
pub mod worker;

pub use cancel::{Budget, CancelToken};
pub use session::Engine;
pub use verdict::{Anomaly, ComparisonReport, Discrepancy, Verdict, VerdictStatus};
