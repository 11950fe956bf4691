//! Event sink: a dedicated logger thread owning the [`JsonlWriter`].
//!
//! Engine threads send [`EngineEvent`]s through a bounded crossbeam channel.
//! `try_send()` keeps comparison workers from ever blocking on logging
//! back-pressure; events that do not fit are counted and reported later.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::core::config::LoggingConfig;
use crate::core::errors::{EqeError, Result};
use crate::logger::jsonl::{EventType, JsonlConfig, JsonlWriter, LogEntry, Severity};

// ──────────────────── public event type ────────────────────

/// Everything the engine reports while comparing.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    ComparisonStarted {
        comparison: String,
        seed: u64,
        config_hash: String,
        operations: usize,
    },
    ComparisonFinished {
        comparison: String,
        equivalent: bool,
        cases_run: usize,
        discarded: usize,
        duration_ms: u64,
    },
    OperationStarted {
        comparison: String,
        operation: String,
    },
    OperationFinished {
        comparison: String,
        operation: String,
        status: String,
        cases_run: usize,
        discarded: usize,
        duration_ms: u64,
    },
    DiscrepancyFound {
        comparison: String,
        operation: String,
        kind: String,
        phase: String,
        case_index: usize,
        details: String,
    },
    GenerationExhausted {
        comparison: String,
        operation: String,
        details: String,
    },
    Anomaly {
        comparison: String,
        operation: String,
        phase: String,
        case_index: usize,
        details: String,
    },
    ContractMismatch {
        comparison: String,
        code: String,
        message: String,
    },
    BudgetExceeded {
        comparison: String,
        operation: Option<String>,
        budget: String,
    },
    /// Sentinel asking the logger thread to flush and exit.
    Shutdown,
}

// ──────────────────── public handle ────────────────────

/// Cloneable, thread-safe handle for sending events.
#[derive(Debug, Clone)]
pub struct EventLogHandle {
    tx: Sender<EngineEvent>,
    dropped_events: Arc<AtomicU64>,
}

impl EventLogHandle {
    /// Send an event without blocking. A full channel drops the event and
    /// bumps the dropped-events counter.
    pub fn send(&self, event: EngineEvent) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(event) {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Events dropped due to channel back-pressure.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Ask the logger thread to flush and exit.
    pub fn shutdown(&self) {
        let _ = self.tx.send(EngineEvent::Shutdown);
    }
}

// ──────────────────── spawn ────────────────────

/// Spawn the logger thread for `config` and return a handle to it.
///
/// The thread runs until `handle.shutdown()` is called or every handle is
/// dropped.
pub fn spawn_event_log(config: &LoggingConfig) -> Result<(EventLogHandle, thread::JoinHandle<()>)> {
    spawn_with(JsonlConfig::from(config), config.channel_capacity)
}

/// Spawn the logger thread only when `config.enabled` is set.
pub fn spawn_if_enabled(config: &LoggingConfig) -> Result<Option<(EventLogHandle, thread::JoinHandle<()>)>> {
    if !config.enabled {
        return Ok(None);
    }
    spawn_event_log(config).map(Some)
}

fn spawn_with(
    jsonl_config: JsonlConfig,
    channel_capacity: usize,
) -> Result<(EventLogHandle, thread::JoinHandle<()>)> {
    let (tx, rx) = bounded::<EngineEvent>(channel_capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    let dropped_clone = Arc::clone(&dropped);

    let handle = EventLogHandle {
        tx,
        dropped_events: dropped,
    };

    let join = thread::Builder::new()
        .name("eqe-logger".to_string())
        .spawn(move || logger_thread_main(&rx, jsonl_config, &dropped_clone))
        .map_err(|e| EqeError::Runtime {
            details: format!("failed to spawn logger thread: {e}"),
        })?;

    Ok((handle, join))
}

// ──────────────────── logger thread ────────────────────

fn logger_thread_main(rx: &Receiver<EngineEvent>, jsonl_config: JsonlConfig, dropped: &AtomicU64) {
    let mut jsonl = JsonlWriter::open(jsonl_config);

    while let Ok(event) = rx.recv() {
        let d = dropped.swap(0, Ordering::Relaxed);
        if d > 0 {
            let warn = LogEntry::new(EventType::EngineAnomaly, Severity::Warning)
                .details(format!("{d} log events dropped due to back-pressure"));
            jsonl.write_entry(&warn);
        }

        if matches!(event, EngineEvent::Shutdown) {
            break;
        }
        jsonl.write_entry(&event_to_log_entry(event));
    }

    jsonl.flush();
    jsonl.fsync();
}

// ──────────────────── event conversion ────────────────────

fn event_to_log_entry(event: EngineEvent) -> LogEntry {
    match event {
        EngineEvent::ComparisonStarted {
            comparison,
            seed,
            config_hash,
            operations,
        } => {
            let mut e = LogEntry::new(EventType::ComparisonStart, Severity::Info)
                .details(format!("{operations} operations"));
            e.comparison = Some(comparison);
            e.seed = Some(seed);
            e.config_hash = Some(config_hash);
            e
        }
        EngineEvent::ComparisonFinished {
            comparison,
            equivalent,
            cases_run,
            discarded,
            duration_ms,
        } => {
            let severity = if equivalent {
                Severity::Info
            } else {
                Severity::Warning
            };
            let mut e = LogEntry::new(EventType::ComparisonComplete, severity);
            e.comparison = Some(comparison);
            e.status = Some(if equivalent { "equivalent" } else { "not_equivalent" }.to_string());
            e.cases_run = Some(cases_run);
            e.discarded = Some(discarded);
            e.duration_ms = Some(duration_ms);
            e
        }
        EngineEvent::OperationStarted {
            comparison,
            operation,
        } => {
            let mut e = LogEntry::new(EventType::OperationStart, Severity::Info).operation(operation);
            e.comparison = Some(comparison);
            e
        }
        EngineEvent::OperationFinished {
            comparison,
            operation,
            status,
            cases_run,
            discarded,
            duration_ms,
        } => {
            let mut e = LogEntry::new(EventType::OperationVerdict, Severity::Info).operation(operation);
            e.comparison = Some(comparison);
            e.status = Some(status);
            e.cases_run = Some(cases_run);
            e.discarded = Some(discarded);
            e.duration_ms = Some(duration_ms);
            e
        }
        EngineEvent::DiscrepancyFound {
            comparison,
            operation,
            kind,
            phase,
            case_index,
            details,
        } => {
            let mut e = LogEntry::new(EventType::Discrepancy, Severity::Warning)
                .operation(operation)
                .details(details);
            e.comparison = Some(comparison);
            e.discrepancy_kind = Some(kind);
            e.phase = Some(phase);
            e.case_index = Some(case_index);
            e
        }
        EngineEvent::GenerationExhausted {
            comparison,
            operation,
            details,
        } => {
            let mut e = LogEntry::new(EventType::GenerationExhausted, Severity::Warning)
                .operation(operation)
                .details(details);
            e.comparison = Some(comparison);
            e
        }
        EngineEvent::Anomaly {
            comparison,
            operation,
            phase,
            case_index,
            details,
        } => {
            let mut e = LogEntry::new(EventType::EngineAnomaly, Severity::Warning)
                .operation(operation)
                .details(details);
            e.comparison = Some(comparison);
            e.phase = Some(phase);
            e.case_index = Some(case_index);
            e
        }
        EngineEvent::ContractMismatch {
            comparison,
            code,
            message,
        } => {
            let mut e = LogEntry::new(EventType::ContractMismatch, Severity::Critical);
            e.comparison = Some(comparison);
            e.error_code = Some(code);
            e.error_message = Some(message);
            e
        }
        EngineEvent::BudgetExceeded {
            comparison,
            operation,
            budget,
        } => {
            let mut e = LogEntry::new(EventType::BudgetExceeded, Severity::Warning).details(budget);
            e.comparison = Some(comparison);
            e.operation = operation;
            e
        }
        EngineEvent::Shutdown => LogEntry::new(EventType::ComparisonComplete, Severity::Info),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(dir: &std::path::Path) -> JsonlConfig {
        JsonlConfig {
            path: dir.join("events.jsonl"),
            fallback_path: None,
            max_size_bytes: 10 * 1024 * 1024,
            max_rotated_files: 3,
            fsync_interval_secs: 60,
        }
    }

    #[test]
    fn spawn_and_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, join) = spawn_with(test_config(dir.path()), 64).unwrap();
        handle.send(EngineEvent::ComparisonStarted {
            comparison: "ref vs cand".to_string(),
            seed: 124,
            config_hash: "abc".to_string(),
            operations: 3,
        });
        handle.shutdown();
        join.join().unwrap();

        let contents = std::fs::read_to_string(dir.path().join("events.jsonl")).unwrap();
        assert!(contents.contains("comparison_start"));
        assert!(contents.contains("\"seed\":124"));
    }

    #[test]
    fn handles_are_cloneable_across_threads() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, join) = spawn_with(test_config(dir.path()), 64).unwrap();
        let h2 = handle.clone();

        let sender = thread::spawn(move || {
            h2.send(EngineEvent::DiscrepancyFound {
                comparison: "ref vs cand".to_string(),
                operation: "add(int, int)".to_string(),
                kind: "value_mismatch".to_string(),
                phase: "simple".to_string(),
                case_index: 0,
                details: "expected 1, got 2".to_string(),
            });
        });
        sender.join().unwrap();
        handle.send(EngineEvent::OperationFinished {
            comparison: "ref vs cand".to_string(),
            operation: "add(int, int)".to_string(),
            status: "not_equivalent".to_string(),
            cases_run: 1,
            discarded: 0,
            duration_ms: 2,
        });
        handle.shutdown();
        join.join().unwrap();

        let contents = std::fs::read_to_string(dir.path().join("events.jsonl")).unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.contains("\"discrepancy_kind\":\"value_mismatch\""));
    }

    #[test]
    fn contract_mismatch_is_critical() {
        let entry = event_to_log_entry(EngineEvent::ContractMismatch {
            comparison: "ref vs cand".to_string(),
            code: "EQE-2001".to_string(),
            message: "missing f(int)".to_string(),
        });
        assert_eq!(entry.severity, Severity::Critical);
        assert_eq!(entry.error_code.as_deref(), Some("EQE-2001"));
    }

    #[test]
    fn disabled_logging_spawns_nothing() {
        let config = LoggingConfig::default();
        assert!(!config.enabled);
        assert!(spawn_if_enabled(&config).unwrap().is_none());
    }

    #[test]
    fn dropped_events_start_at_zero() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, join) = spawn_with(test_config(dir.path()), 1).unwrap();
        assert_eq!(handle.dropped_events(), 0);
        handle.shutdown();
        join.join().unwrap();
    }
}
