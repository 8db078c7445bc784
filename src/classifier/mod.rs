//! Classifier adapter abstraction
//!
//! The classification model is an external, pre-trained collaborator. This
//! module defines the seam the request workflow talks to: a [`Classifier`]
//! turns a staged upload into a [`ClassificationTag`] or a
//! [`ClassificationError`].

pub mod format;
pub mod http;

use crate::upload::UploadedImage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub use format::inspect_image;
pub use http::{HttpClassifier, HttpClassifierConfig};

/// Category label produced by the classifier, normalised to lowercase
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassificationTag(String);

impl ClassificationTag {
    /// Build a tag from a raw model label
    pub fn parse(label: &str) -> Result<Self, ClassificationError> {
        let normalised = label.trim().to_lowercase();
        if normalised.is_empty() {
            return Err(ClassificationError::InvalidResponse(
                "model returned an empty label".to_string(),
            ));
        }
        Ok(Self(normalised))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClassificationTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reasons the model could not produce a label
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ClassificationError {
    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("Image could not be decoded: {0}")]
    CorruptImage(String),

    #[error("Classification model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Invalid response from classification model: {0}")]
    InvalidResponse(String),

    #[error("Classification timed out after {0}ms")]
    Timeout(u64),
}

/// Opaque image classification capability
///
/// Implementations are constructed once at startup and shared across requests
/// behind an `Arc`; they must not keep per-request state.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Adapter name used in logs and health output
    fn name(&self) -> &str;

    /// Classify a staged upload
    async fn classify(&self, image: &UploadedImage)
        -> Result<ClassificationTag, ClassificationError>;

    /// Check that the model backend is reachable
    async fn health_check(&self) -> Result<(), ClassificationError>;
}
