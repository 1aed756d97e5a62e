//! Error types for destroy claim validation and execution

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("schema validation failed: {message}")]
    SchemaValidation { message: String, errors: Vec<String> },

    #[error("mode not supported: {0}")]
    ModeUnsupported(String),

    #[error("version not supported: {0}")]
    VersionUnsupported(String),

    #[error("unsupported destroy reasons: {}", reasons.join(", "))]
    ReasonUnsupported { reasons: Vec<String> },

    #[error("{message}: {}", missing.join(", "))]
    ReferenceMissing { message: String, missing: Vec<String> },

    #[error("{message}: {}", ids.join(", "))]
    ConditionValidation { message: String, ids: Vec<String> },

    #[error("extensions not supported: {}", names.join(", "))]
    ExtensionUnsupported { names: Vec<String> },

    #[error("deadlocks in destroy claim found: {}", format_cycles(cycles))]
    DeadlockDetected { cycles: Vec<Vec<String>> },

    #[error("destroy claim validation failed ({} errors)", errors.len())]
    ClaimValidation { errors: Vec<Error> },

    #[error("{0}")]
    Claim(String),

    #[error("support error: {0}")]
    Support(String),

    #[error("condition expression error: {0}")]
    Logic(String),

    #[error("signature error: {0}")]
    Signature(String),

    #[error(transparent)]
    Callback(#[from] anyhow::Error),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

fn format_cycles(cycles: &[Vec<String>]) -> String {
    cycles
        .iter()
        .map(|c| c.join(" -> "))
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn schema_validation(message: impl Into<String>, errors: Vec<String>) -> Self {
        Self::SchemaValidation {
            message: message.into(),
            errors,
        }
    }

    pub fn reference_missing(message: impl Into<String>, missing: Vec<String>) -> Self {
        Self::ReferenceMissing {
            message: message.into(),
            missing,
        }
    }

    pub fn condition_validation(message: impl Into<String>, ids: Vec<String>) -> Self {
        Self::ConditionValidation {
            message: message.into(),
            ids,
        }
    }

    pub fn claim(message: impl Into<String>) -> Self {
        Self::Claim(message.into())
    }

    pub fn support(message: impl Into<String>) -> Self {
        Self::Support(message.into())
    }

    pub fn logic(message: impl Into<String>) -> Self {
        Self::Logic(message.into())
    }

    pub fn signature(message: impl Into<String>) -> Self {
        Self::Signature(message.into())
    }

    /// Errors accumulated by a failed validation, empty for every other variant.
    pub fn validation_errors(&self) -> &[Error] {
        match self {
            Self::ClaimValidation { errors } => errors,
            _ => &[],
        }
    }
}
