//! Request workflow: validate, stage, classify, resolve, route
//!
//! ```text
//! Received → Validated → Classified → Resolved → Completed
//!     └──────────┴────────────┴───────────┴──→ Failed(kind)
//! ```
//!
//! The staged upload is discarded as soon as the classifier returns, whatever
//! the outcome, so no image outlives the classification step.

pub mod state;

pub use state::{ImagePart, StateTransition, Submission, WorkflowOutcome, WorkflowState};

use crate::classifier::{ClassificationError, ClassificationTag, Classifier};
use crate::error::{WorkflowError, WorkflowResult};
use crate::observability::metrics::metrics;
use crate::resolver::{ResponsibilityResolver, TicketReference};
use crate::routing::{RoutingDirective, RoutingPolicy};
use crate::{classify_span, submission_span};
use crate::upload::{UploadStore, UploadedImage};
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn, Instrument, Span};
use uuid::Uuid;

pub const MISSING_INPUT_MESSAGE: &str = "Please provide both an image and a PNR number.";

const DEFAULT_CLASSIFY_TIMEOUT: Duration = Duration::from_secs(30);

/// Drives one submission through the state machine.
///
/// Holds only shared, immutable collaborators; a single instance serves every
/// request concurrently.
pub struct RequestWorkflow {
    classifier: Arc<dyn Classifier>,
    resolver: Arc<dyn ResponsibilityResolver>,
    uploads: UploadStore,
    policy: RoutingPolicy,
    classify_timeout: Duration,
}

/// Trace recorder that enforces legal transitions
struct Tracker {
    trace: Vec<StateTransition>,
}

impl Tracker {
    fn new() -> Self {
        Self {
            trace: vec![StateTransition {
                state: WorkflowState::Received,
                at: Utc::now(),
            }],
        }
    }

    fn current(&self) -> WorkflowState {
        self.trace
            .last()
            .map(|t| t.state)
            .unwrap_or(WorkflowState::Received)
    }

    fn advance(&mut self, next: WorkflowState) {
        let current = self.current();
        debug_assert!(
            current.can_transition_to(next),
            "illegal transition {current} -> {next}"
        );
        debug!(from = %current, to = %next, "Workflow transition");
        self.trace.push(StateTransition {
            state: next,
            at: Utc::now(),
        });
    }
}

impl RequestWorkflow {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        resolver: Arc<dyn ResponsibilityResolver>,
        uploads: UploadStore,
        policy: RoutingPolicy,
    ) -> Self {
        Self {
            classifier,
            resolver,
            uploads,
            policy,
            classify_timeout: DEFAULT_CLASSIFY_TIMEOUT,
        }
    }

    /// Bound on a single classifier call
    pub fn with_classify_timeout(mut self, timeout: Duration) -> Self {
        self.classify_timeout = timeout;
        self
    }

    pub fn classifier(&self) -> &Arc<dyn Classifier> {
        &self.classifier
    }

    pub fn policy(&self) -> &RoutingPolicy {
        &self.policy
    }

    pub fn uploads(&self) -> &UploadStore {
        &self.uploads
    }

    /// Run a submission to a terminal state
    pub async fn run(&self, submission: Submission) -> WorkflowOutcome {
        let request_id = Uuid::new_v4();
        let span = submission_span!(request_id = %request_id);

        async move {
            let started = Instant::now();
            metrics().submission_received();

            let mut tracker = Tracker::new();
            let result = self.drive(submission, &mut tracker).await;

            match &result {
                Ok(directive) => {
                    tracker.advance(WorkflowState::Completed);
                    Span::current().record("outcome", directive.view.path());
                    metrics().submission_completed(started.elapsed(), directive.is_escalation());
                    info!(
                        view = ?directive.view,
                        classification = %directive.classification,
                        duration_ms = started.elapsed().as_millis() as u64,
                        "Submission routed"
                    );
                }
                Err(e) => {
                    let kind = e.kind();
                    tracker.advance(WorkflowState::Failed(kind));
                    Span::current().record("outcome", kind.as_str());
                    metrics().submission_failed(kind, started.elapsed());
                    warn!(
                        failure = kind.as_str(),
                        error = %e,
                        duration_ms = started.elapsed().as_millis() as u64,
                        "Submission failed"
                    );
                }
            }

            WorkflowOutcome {
                request_id,
                trace: tracker.trace,
                result,
            }
        }
        .instrument(span)
        .await
    }

    async fn drive(
        &self,
        submission: Submission,
        tracker: &mut Tracker,
    ) -> WorkflowResult<RoutingDirective> {
        let (image, ticket) = validate(submission)?;
        tracker.advance(WorkflowState::Validated);
        Span::current().record("ticket", tracing::field::display(&ticket));

        let staged = self.uploads.stage(image.filename.as_deref(), image.bytes)?;
        let classified = self.classify(&staged).await;
        if let Err(e) = staged.discard() {
            error!(error = %e, "Failed to remove staged upload");
        }
        let tag = classified?;
        tracker.advance(WorkflowState::Classified);

        let record = self.resolver.resolve(&tag, &ticket).map_err(|e| {
            if self.policy.is_escalation(&tag) {
                metrics().unresolved_escalation();
                warn!(
                    ticket = %ticket,
                    classification = %tag,
                    "Escalation-category incident could not be matched to personnel"
                );
            }
            e
        })?;
        tracker.advance(WorkflowState::Resolved);

        Ok(self.policy.direct(tag, record))
    }

    async fn classify(&self, image: &UploadedImage) -> Result<ClassificationTag, ClassificationError> {
        let started = Instant::now();
        let span = classify_span!(adapter = self.classifier.name(), size = image.len());
        let call = self.classifier.classify(image).instrument(span);
        let result = match tokio::time::timeout(self.classify_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ClassificationError::Timeout(
                self.classify_timeout.as_millis() as u64,
            )),
        };
        metrics().classification_finished(started.elapsed(), result.is_ok());
        result
    }
}

/// `Received → Validated`: both inputs must be present and non-empty
fn validate(submission: Submission) -> WorkflowResult<(ImagePart, TicketReference)> {
    let image = submission.image.filter(|image| !image.bytes.is_empty());
    let ticket = submission
        .ticket
        .as_deref()
        .and_then(TicketReference::parse);

    match (image, ticket) {
        (Some(image), Some(ticket)) => Ok((image, ticket)),
        _ => Err(WorkflowError::missing_input(MISSING_INPUT_MESSAGE)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use crate::routing::View;
    use crate::testing::fixtures::{png_bytes, sample_roster};
    use crate::testing::mocks::MockClassifier;

    fn workflow(classifier: Arc<MockClassifier>, dir: &std::path::Path) -> RequestWorkflow {
        RequestWorkflow::new(
            classifier,
            Arc::new(sample_roster()),
            UploadStore::open(dir).unwrap(),
            RoutingPolicy::new(ClassificationTag::parse("violence").unwrap()),
        )
    }

    fn submission(ticket: &str) -> Submission {
        Submission::default()
            .with_image("cam.png", png_bytes())
            .with_ticket(ticket)
    }

    #[tokio::test]
    async fn test_escalation_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let classifier = Arc::new(MockClassifier::with_label("violence"));
        let outcome = workflow(classifier.clone(), dir.path())
            .run(submission("PNR123"))
            .await;

        assert_eq!(
            outcome.states(),
            vec![
                WorkflowState::Received,
                WorkflowState::Validated,
                WorkflowState::Classified,
                WorkflowState::Resolved,
                WorkflowState::Completed,
            ]
        );
        let directive = outcome.directive().unwrap();
        assert_eq!(directive.view, View::Escalation);
        assert_eq!(directive.responsible_person, "CRPF-07");
        assert_eq!(directive.route_incharge, "RI-02");
        assert_eq!(classifier.call_count(), 1);
    }

    #[tokio::test]
    async fn test_default_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let classifier = Arc::new(MockClassifier::with_label("normal"));
        let outcome = workflow(classifier, dir.path()).run(submission("PNR123")).await;

        let directive = outcome.directive().unwrap();
        assert_eq!(directive.view, View::Default);
        assert_eq!(directive.responsible_person, "TT-11");
        assert_eq!(directive.route_incharge, "RI-02");
    }

    #[tokio::test]
    async fn test_missing_ticket_skips_classifier() {
        let dir = tempfile::tempdir().unwrap();
        let classifier = Arc::new(MockClassifier::with_label("normal"));
        let outcome = workflow(classifier.clone(), dir.path())
            .run(Submission::default().with_image("cam.png", png_bytes()))
            .await;

        assert_eq!(
            outcome.final_state(),
            WorkflowState::Failed(FailureKind::MissingInput)
        );
        assert_eq!(classifier.call_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_image_counts_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        let classifier = Arc::new(MockClassifier::with_label("normal"));
        let outcome = workflow(classifier.clone(), dir.path())
            .run(Submission::default().with_image("", vec![]).with_ticket("PNR123"))
            .await;

        assert_eq!(
            outcome.final_state(),
            WorkflowState::Failed(FailureKind::MissingInput)
        );
        assert_eq!(classifier.call_count(), 0);
    }

    #[tokio::test]
    async fn test_classifier_failure_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let classifier = Arc::new(MockClassifier::with_failure(
            ClassificationError::CorruptImage("bad".to_string()),
        ));
        let wf = workflow(classifier.clone(), dir.path());
        let outcome = wf.run(submission("PNR123")).await;

        assert_eq!(
            outcome.states(),
            vec![
                WorkflowState::Received,
                WorkflowState::Validated,
                WorkflowState::Failed(FailureKind::ClassificationFailed),
            ]
        );
        assert_eq!(wf.uploads().staged_count().unwrap(), 0);
        assert!(classifier.saw_staged_file());
    }

    #[tokio::test]
    async fn test_unknown_ticket_fails_resolution_after_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let classifier = Arc::new(MockClassifier::with_label("violence"));
        let wf = workflow(classifier, dir.path());
        let outcome = wf.run(submission("UNKNOWN")).await;

        assert_eq!(
            outcome.final_state(),
            WorkflowState::Failed(FailureKind::ResolutionFailed)
        );
        assert!(outcome.directive().is_none());
        assert_eq!(wf.uploads().staged_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_slow_classifier_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let classifier =
            Arc::new(MockClassifier::with_label("normal").with_delay(Duration::from_millis(200)));
        let wf = workflow(classifier, dir.path()).with_classify_timeout(Duration::from_millis(20));
        let outcome = wf.run(submission("PNR123")).await;

        assert!(matches!(
            outcome.result,
            Err(WorkflowError::Classification(ClassificationError::Timeout(20)))
        ));
        assert_eq!(wf.uploads().staged_count().unwrap(), 0);
    }

    #[test]
    fn test_validate_trims_ticket() {
        let (_, ticket) = validate(
            Submission::default()
                .with_image("a.png", vec![1])
                .with_ticket("  PNR123  "),
        )
        .unwrap();
        assert_eq!(ticket.as_str(), "PNR123");
    }

    #[test]
    fn test_validate_rejects_blank_ticket() {
        let err = validate(
            Submission::default()
                .with_image("a.png", vec![1])
                .with_ticket("   "),
        )
        .unwrap_err();
        assert_eq!(err.kind(), FailureKind::MissingInput);
        assert_eq!(err.to_failure_response().message, MISSING_INPUT_MESSAGE);
    }
}
