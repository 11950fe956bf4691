//! Structured JSONL event log fed by a dedicated logger thread.

pub mod jsonl;
pub mod sink;

pub use sink::{EngineEvent, EventLogHandle, spawn_event_log, spawn_if_enabled};
