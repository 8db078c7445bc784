//! Mock implementations for testing
//!
//! Provides a scripted [`Classifier`] so the workflow and HTTP surface can be
//! exercised without a model server.

use crate::classifier::{ClassificationError, ClassificationTag, Classifier};
use crate::upload::UploadedImage;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Mock classifier returning a fixed label or error
#[derive(Debug)]
pub struct MockClassifier {
    outcome: Result<String, ClassificationError>,
    healthy: bool,
    delay: Option<Duration>,
    calls: AtomicUsize,
    saw_staged_file: AtomicBool,
    seen_paths: Mutex<Vec<PathBuf>>,
}

impl MockClassifier {
    fn build(outcome: Result<String, ClassificationError>, healthy: bool) -> Self {
        Self {
            outcome,
            healthy,
            delay: None,
            calls: AtomicUsize::new(0),
            saw_staged_file: AtomicBool::new(false),
            seen_paths: Mutex::new(Vec::new()),
        }
    }

    pub fn with_label(label: impl Into<String>) -> Self {
        Self::build(Ok(label.into()), true)
    }

    pub fn with_failure(error: ClassificationError) -> Self {
        Self::build(Err(error), true)
    }

    /// Fails both classification and health checks
    pub fn unhealthy() -> Self {
        Self::build(
            Err(ClassificationError::ModelUnavailable(
                "Mock model offline".to_string(),
            )),
            false,
        )
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Whether the staged file existed on disk while classification ran
    pub fn saw_staged_file(&self) -> bool {
        self.saw_staged_file.load(Ordering::SeqCst)
    }

    /// Paths of every staged upload this mock was handed
    pub fn seen_paths(&self) -> Vec<PathBuf> {
        self.seen_paths
            .lock()
            .map(|paths| paths.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Classifier for MockClassifier {
    fn name(&self) -> &str {
        "mock"
    }

    async fn classify(
        &self,
        image: &UploadedImage,
    ) -> Result<ClassificationTag, ClassificationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(path) = image.path() {
            if path.exists() {
                self.saw_staged_file.store(true, Ordering::SeqCst);
            }
            if let Ok(mut paths) = self.seen_paths.lock() {
                paths.push(path.to_path_buf());
            }
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.outcome {
            Ok(label) => ClassificationTag::parse(label),
            Err(e) => Err(e.clone()),
        }
    }

    async fn health_check(&self) -> Result<(), ClassificationError> {
        if self.healthy {
            Ok(())
        } else {
            Err(ClassificationError::ModelUnavailable(
                "Mock health check failure".to_string(),
            ))
        }
    }
}
