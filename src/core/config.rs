//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{EqeError, Result};
use crate::generate::complexity::Complexity;

/// Full engine configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub generation: GenerationConfig,
    pub execution: ExecutionConfig,
    pub comparison: ComparisonConfig,
    pub logging: LoggingConfig,
}

/// Input generation knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GenerationConfig {
    /// Base seed; every random value is a pure function of this seed,
    /// the operation and the case index.
    pub seed: u64,
    /// Random-tail length for operations without an explicit case limit.
    pub random_cases: usize,
    /// Consecutive generator skips tolerated before an operation is exhausted.
    pub attempt_ceiling: u32,
    /// Complexity cap for the random phase.
    pub max_complexity: u32,
}

/// Execution and budget knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Worker threads for the random phase.
    pub parallelism: usize,
    /// Receiver construction attempts before a bound case is abandoned.
    pub receiver_retries: usize,
    /// Stop an operation at its first discrepancy.
    pub fail_fast: bool,
    /// Whole-run wall-clock budget; 0 disables.
    pub run_timeout_ms: u64,
    /// Per-operation wall-clock budget; 0 disables.
    pub operation_timeout_ms: u64,
    /// Total executed cases across the run; 0 disables.
    pub max_total_cases: u64,
}

/// Equivalence knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ComparisonConfig {
    pub abs_tolerance: f64,
    pub rel_tolerance: f64,
    /// Treat candidate operations without a reference counterpart as a mismatch.
    pub reject_extra_operations: bool,
}

/// Structured event log settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub enabled: bool,
    pub jsonl_path: PathBuf,
    pub fallback_path: Option<PathBuf>,
    pub max_size_bytes: u64,
    pub max_rotated_files: u32,
    pub channel_capacity: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            seed: 124,
            random_cases: 256,
            attempt_ceiling: 64,
            max_complexity: Complexity::MAX,
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            parallelism: std::thread::available_parallelism()
                .map_or(2, std::num::NonZeroUsize::get)
                .min(8),
            receiver_retries: 4,
            fail_fast: true,
            run_timeout_ms: 0,
            operation_timeout_ms: 0,
            max_total_cases: 0,
        }
    }
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            abs_tolerance: 1e-9,
            rel_tolerance: 1e-9,
            reject_extra_operations: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            jsonl_path: env::temp_dir().join("equivalence_engine").join("events.jsonl"),
            fallback_path: None,
            max_size_bytes: 16 * 1024 * 1024,
            max_rotated_files: 3,
            channel_capacity: 1024,
        }
    }
}

impl Config {
    /// Load config from an optional TOML file, then apply env overrides.
    ///
    /// Without a path, defaults are used. An explicit path that does not exist
    /// is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut cfg = match path {
            Some(path) if path.exists() => {
                let raw = fs::read_to_string(path).map_err(|source| EqeError::io(path, source))?;
                toml::from_str(&raw)?
            }
            Some(path) => {
                return Err(EqeError::MissingConfig {
                    path: path.to_path_buf(),
                });
            }
            None => Self::default(),
        };

        cfg.apply_env_overrides_from(env_var)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse config from TOML text, then validate. Env is not consulted.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Deterministic hash of the effective config for event logs.
    ///
    /// FNV-1a over the canonical JSON form, stable across processes and
    /// machines. Worker count never changes verdicts, so it is left out.
    pub fn stable_hash(&self) -> Result<String> {
        let mut hashed = self.clone();
        hashed.execution.parallelism = 1;
        let canonical = serde_json::to_string(&hashed)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        // generation
        set_u64(&mut lookup, "EQE_GENERATION_SEED", &mut self.generation.seed)?;
        set_usize(
            &mut lookup,
            "EQE_GENERATION_RANDOM_CASES",
            &mut self.generation.random_cases,
        )?;
        set_u32(
            &mut lookup,
            "EQE_GENERATION_ATTEMPT_CEILING",
            &mut self.generation.attempt_ceiling,
        )?;
        set_u32(
            &mut lookup,
            "EQE_GENERATION_MAX_COMPLEXITY",
            &mut self.generation.max_complexity,
        )?;

        // execution
        set_usize(
            &mut lookup,
            "EQE_EXECUTION_PARALLELISM",
            &mut self.execution.parallelism,
        )?;
        set_usize(
            &mut lookup,
            "EQE_EXECUTION_RECEIVER_RETRIES",
            &mut self.execution.receiver_retries,
        )?;
        set_bool(
            &mut lookup,
            "EQE_EXECUTION_FAIL_FAST",
            &mut self.execution.fail_fast,
        )?;
        set_u64(
            &mut lookup,
            "EQE_EXECUTION_RUN_TIMEOUT_MS",
            &mut self.execution.run_timeout_ms,
        )?;
        set_u64(
            &mut lookup,
            "EQE_EXECUTION_OPERATION_TIMEOUT_MS",
            &mut self.execution.operation_timeout_ms,
        )?;
        set_u64(
            &mut lookup,
            "EQE_EXECUTION_MAX_TOTAL_CASES",
            &mut self.execution.max_total_cases,
        )?;

        // comparison
        set_f64(
            &mut lookup,
            "EQE_COMPARISON_ABS_TOLERANCE",
            &mut self.comparison.abs_tolerance,
        )?;
        set_f64(
            &mut lookup,
            "EQE_COMPARISON_REL_TOLERANCE",
            &mut self.comparison.rel_tolerance,
        )?;
        set_bool(
            &mut lookup,
            "EQE_COMPARISON_REJECT_EXTRA_OPERATIONS",
            &mut self.comparison.reject_extra_operations,
        )?;

        // logging
        set_bool(&mut lookup, "EQE_LOGGING_ENABLED", &mut self.logging.enabled)?;
        if let Some(raw) = lookup("EQE_LOGGING_JSONL_PATH") {
            self.logging.jsonl_path = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("EQE_LOGGING_FALLBACK_PATH") {
            self.logging.fallback_path = Some(PathBuf::from(raw));
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.generation.attempt_ceiling == 0 {
            return Err(EqeError::InvalidConfig {
                details: "generation.attempt_ceiling must be >= 1".to_string(),
            });
        }
        if !(Complexity::MIN..=Complexity::MAX).contains(&self.generation.max_complexity) {
            return Err(EqeError::InvalidConfig {
                details: format!(
                    "generation.max_complexity must be in [{}, {}], got {}",
                    Complexity::MIN,
                    Complexity::MAX,
                    self.generation.max_complexity
                ),
            });
        }

        if self.execution.parallelism == 0 {
            return Err(EqeError::InvalidConfig {
                details: "execution.parallelism must be >= 1".to_string(),
            });
        }
        if self.execution.receiver_retries == 0 {
            return Err(EqeError::InvalidConfig {
                details: "execution.receiver_retries must be >= 1".to_string(),
            });
        }

        for (name, val) in [
            ("abs_tolerance", self.comparison.abs_tolerance),
            ("rel_tolerance", self.comparison.rel_tolerance),
        ] {
            if !val.is_finite() || val < 0.0 {
                return Err(EqeError::InvalidConfig {
                    details: format!("comparison.{name} must be finite and >= 0.0, got {val}"),
                });
            }
        }

        if self.logging.enabled && self.logging.channel_capacity == 0 {
            return Err(EqeError::InvalidConfig {
                details: "logging.channel_capacity must be >= 1".to_string(),
            });
        }

        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn parse_env<T>(name: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|error| EqeError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })
}

fn set_f64<F>(lookup: &mut F, name: &str, slot: &mut f64) -> Result<()>
where
    F: FnMut(&str) -> Option<String>,
{
    if let Some(raw) = lookup(name) {
        *slot = parse_env(name, &raw)?;
    }
    Ok(())
}

fn set_u64<F>(lookup: &mut F, name: &str, slot: &mut u64) -> Result<()>
where
    F: FnMut(&str) -> Option<String>,
{
    if let Some(raw) = lookup(name) {
        *slot = parse_env(name, &raw)?;
    }
    Ok(())
}

fn set_u32<F>(lookup: &mut F, name: &str, slot: &mut u32) -> Result<()>
where
    F: FnMut(&str) -> Option<String>,
{
    if let Some(raw) = lookup(name) {
        *slot = parse_env(name, &raw)?;
    }
    Ok(())
}

fn set_usize<F>(lookup: &mut F, name: &str, slot: &mut usize) -> Result<()>
where
    F: FnMut(&str) -> Option<String>,
{
    if let Some(raw) = lookup(name) {
        *slot = parse_env(name, &raw)?;
    }
    Ok(())
}

fn set_bool<F>(lookup: &mut F, name: &str, slot: &mut bool) -> Result<()>
where
    F: FnMut(&str) -> Option<String>,
{
    if let Some(raw) = lookup(name) {
        *slot = parse_env(name, &raw)?;
    }
    Ok(())
}
