//! Workflow error taxonomy
//!
//! Every failure a submission can hit collapses into one of three
//! user-visible kinds. Internal detail is kept on the error for logging, and
//! the message shown to the requester is sanitised.

use crate::classifier::ClassificationError;
use crate::resolver::LookupError;
use crate::upload::UploadError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

static SECRET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(password|token|key|secret)[=:]\s*\S+").expect("secret pattern is valid")
});

static PATH_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(/[a-zA-Z0-9._-]+){2,}").expect("path pattern is valid")
});

const MAX_MESSAGE_LEN: usize = 500;

/// User-visible failure category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    MissingInput,
    ClassificationFailed,
    ResolutionFailed,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::MissingInput => "missing_input",
            FailureKind::ClassificationFailed => "classification_failed",
            FailureKind::ResolutionFailed => "resolution_failed",
        }
    }
}

/// Why a submission did not complete
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Missing input: {message}")]
    MissingInput { message: String },

    #[error("Error in image classification: {0}")]
    Classification(#[from] ClassificationError),

    #[error("Error in image classification: {0}")]
    Staging(#[from] UploadError),

    #[error("Could not identify responsible personnel: {0}")]
    Resolution(#[from] LookupError),
}

impl WorkflowError {
    pub fn missing_input<S: Into<String>>(message: S) -> Self {
        Self::MissingInput {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            WorkflowError::MissingInput { .. } => FailureKind::MissingInput,
            WorkflowError::Classification(_) | WorkflowError::Staging(_) => {
                FailureKind::ClassificationFailed
            }
            WorkflowError::Resolution(_) => FailureKind::ResolutionFailed,
        }
    }

    /// Message safe to show the requester
    pub fn to_failure_response(&self) -> FailureResponse {
        let message = match self {
            WorkflowError::MissingInput { message } => message.clone(),
            // Staging failures are local I/O problems, not the requester's concern
            WorkflowError::Staging(_) => {
                "Error in image classification: the upload could not be processed".to_string()
            }
            other => other.to_string(),
        };

        FailureResponse {
            error: self.kind(),
            message: sanitize_error_message(&message),
            retry: "/".to_string(),
        }
    }
}

/// Body returned to the requester on failure; `retry` points back at the form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureResponse {
    pub error: FailureKind,
    pub message: String,
    pub retry: String,
}

/// Redact secrets and filesystem paths, cap length
pub fn sanitize_error_message(message: &str) -> String {
    let sanitized = SECRET_PATTERN.replace_all(message, "${1}=***");
    let mut sanitized = PATH_PATTERN
        .replace_all(&sanitized, "/***REDACTED***")
        .to_string();

    if sanitized.len() > MAX_MESSAGE_LEN {
        let suffix = "...[truncated]";
        let mut cut = MAX_MESSAGE_LEN - suffix.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized = format!("{}{}", &sanitized[..cut], suffix);
    }

    sanitized
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;
