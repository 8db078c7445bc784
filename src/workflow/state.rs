//! Workflow states, inputs and outcomes

use crate::error::{FailureKind, WorkflowError};
use crate::routing::RoutingDirective;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// Position of a submission in the classify-then-route flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum WorkflowState {
    Received,
    Validated,
    Classified,
    Resolved,
    Completed,
    Failed(FailureKind),
}

impl WorkflowState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowState::Completed | WorkflowState::Failed(_))
    }

    /// Whether `next` is a legal successor of `self`
    pub fn can_transition_to(&self, next: WorkflowState) -> bool {
        use WorkflowState::*;
        match (self, next) {
            (Received, Validated)
            | (Validated, Classified)
            | (Classified, Resolved)
            | (Resolved, Completed) => true,
            (from, Failed(_)) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowState::Received => f.write_str("received"),
            WorkflowState::Validated => f.write_str("validated"),
            WorkflowState::Classified => f.write_str("classified"),
            WorkflowState::Resolved => f.write_str("resolved"),
            WorkflowState::Completed => f.write_str("completed"),
            WorkflowState::Failed(kind) => write!(f, "failed({})", kind.as_str()),
        }
    }
}

/// One visited state with the time it was entered
#[derive(Debug, Clone, Serialize)]
pub struct StateTransition {
    pub state: WorkflowState,
    pub at: DateTime<Utc>,
}

/// Image payload as received from the requester
#[derive(Debug, Clone, Default)]
pub struct ImagePart {
    pub filename: Option<String>,
    pub bytes: Vec<u8>,
}

/// Raw inbound submission; either field may be missing
#[derive(Debug, Clone, Default)]
pub struct Submission {
    pub image: Option<ImagePart>,
    pub ticket: Option<String>,
}

impl Submission {
    pub fn with_image(mut self, filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.image = Some(ImagePart {
            filename: Some(filename.into()),
            bytes,
        });
        self
    }

    pub fn with_ticket(mut self, ticket: impl Into<String>) -> Self {
        self.ticket = Some(ticket.into());
        self
    }
}

/// Result of a single workflow run
#[derive(Debug)]
pub struct WorkflowOutcome {
    pub request_id: Uuid,
    pub trace: Vec<StateTransition>,
    pub result: Result<RoutingDirective, WorkflowError>,
}

impl WorkflowOutcome {
    /// Terminal state reached by the run
    pub fn final_state(&self) -> WorkflowState {
        self.trace
            .last()
            .map(|t| t.state)
            .unwrap_or(WorkflowState::Received)
    }

    pub fn states(&self) -> Vec<WorkflowState> {
        self.trace.iter().map(|t| t.state).collect()
    }

    pub fn is_completed(&self) -> bool {
        self.final_state() == WorkflowState::Completed
    }

    pub fn directive(&self) -> Option<&RoutingDirective> {
        self.result.as_ref().ok()
    }

    pub fn into_result(self) -> Result<RoutingDirective, WorkflowError> {
        self.result
    }
}
