//! Railwatch - incident image routing
//!
//! Accepts a passenger-submitted image together with a ticket reference (PNR),
//! classifies the image, resolves the on-train personnel responsible for that
//! ticket, and directs the requester to one of two views.
//!
//! # Overview
//!
//! - Classifier adapter over an HTTP model server, with format sniffing
//! - Roster-backed responsibility resolution
//! - A per-request workflow state machine with guaranteed upload cleanup
//! - A `warp` HTTP surface with health, readiness and metrics endpoints
//!
//! # Quick Start
//!
//! ```rust
//! use railwatch::classifier::ClassificationTag;
//! use railwatch::resolver::{ResponsibilityResolver, Roster, TicketReference};
//! use railwatch::routing::{RoutingPolicy, View};
//!
//! let roster = Roster::from_toml(r#"
//!     [tickets.PNR123]
//!     route_incharge = "RI-02"
//!     [tickets.PNR123.responsible]
//!     violence = "CRPF-07"
//!     default = "TT-11"
//! "#).unwrap();
//!
//! let tag = ClassificationTag::parse("violence").unwrap();
//! let ticket = TicketReference::parse("PNR123").unwrap();
//! let record = roster.resolve(&tag, &ticket).unwrap();
//!
//! let policy = RoutingPolicy::new(ClassificationTag::parse("violence").unwrap());
//! let directive = policy.direct(tag, record);
//!
//! assert_eq!(directive.view, View::Escalation);
//! assert_eq!(directive.location(), "/crpf-info?crpf_id=CRPF-07&incharge_id=RI-02");
//! ```

pub mod classifier;
pub mod config;
pub mod error;
pub mod observability;
pub mod resolver;
pub mod routing;
pub mod server;
pub mod testing;
pub mod upload;
pub mod workflow;

pub use classifier::{ClassificationError, ClassificationTag, Classifier};
pub use config::{ConfigError, ServiceConfig};
pub use error::{FailureKind, FailureResponse, WorkflowError, WorkflowResult};
pub use resolver::{ResponsibilityRecord, ResponsibilityResolver, Roster, TicketReference};
pub use routing::{RoutingDirective, RoutingPolicy, View};
pub use workflow::{RequestWorkflow, Submission, WorkflowOutcome, WorkflowState};
