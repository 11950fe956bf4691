//! EQE-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, EqeError>;

/// Top-level error type for the equivalence engine.
#[derive(Debug, Error)]
pub enum EqeError {
    #[error("[EQE-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[EQE-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[EQE-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[EQE-1101] invalid contract declaration: {details}")]
    ContractDeclaration { details: String },

    #[error("[EQE-2001] contract mismatch on {operation}: {details}")]
    ContractMismatch { operation: String, details: String },

    #[error("[EQE-2002] generation exhausted for {operation}: {details}")]
    GenerationExhausted { operation: String, details: String },

    #[error("[EQE-2003] resource failure in {resource}: {details}")]
    Resource { resource: String, details: String },

    #[error("[EQE-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[EQE-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[EQE-3003] channel closed in component {component}")]
    ChannelClosed { component: &'static str },

    #[error("[EQE-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl EqeError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "EQE-1001",
            Self::MissingConfig { .. } => "EQE-1002",
            Self::ConfigParse { .. } => "EQE-1003",
            Self::ContractDeclaration { .. } => "EQE-1101",
            Self::ContractMismatch { .. } => "EQE-2001",
            Self::GenerationExhausted { .. } => "EQE-2002",
            Self::Resource { .. } => "EQE-2003",
            Self::Serialization { .. } => "EQE-2101",
            Self::Io { .. } => "EQE-3002",
            Self::ChannelClosed { .. } => "EQE-3003",
            Self::Runtime { .. } => "EQE-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. } | Self::ChannelClosed { .. } | Self::Runtime { .. }
        )
    }

    /// Whether the error means the candidate cannot be compared at all.
    #[must_use]
    pub const fn is_contract_error(&self) -> bool {
        matches!(
            self,
            Self::ContractDeclaration { .. } | Self::ContractMismatch { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Convenience constructor for contract declaration errors.
    #[must_use]
    pub fn declaration(details: impl Into<String>) -> Self {
        Self::ContractDeclaration {
            details: details.into(),
        }
    }
}

impl From<serde_json::Error> for EqeError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for EqeError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

/// Human-readable text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}
