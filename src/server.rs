//! HTTP surface
//!
//! ```text
//! POST /submit      multipart: file=<image>, pnr=<ticket>
//! GET  /tt-info     default view page (echoes tt_id, incharge_id)
//! GET  /crpf-info   escalation view page (echoes crpf_id, incharge_id)
//! GET  /            endpoint index
//! GET  /health /ready /live /metrics
//! ```
//!
//! A completed submission answers `303 See Other` pointing at the chosen view.
//! Every failure answers with a [`FailureResponse`] whose `retry` leads back to
//! the input form.

use crate::error::{FailureKind, FailureResponse, WorkflowError};
use crate::observability::health::HealthMonitor;
use crate::observability::metrics::metrics;
use crate::routing::{RoutingDirective, View, INCHARGE_PARAM};
use crate::workflow::{
    ImagePart, RequestWorkflow, Submission, WorkflowOutcome, MISSING_INPUT_MESSAGE,
};
use bytes::BufMut;
use futures::TryStreamExt;
use serde::Serialize;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;
use warp::http::{header, StatusCode};
use warp::multipart::FormData;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

/// Room for the `pnr` part, boundaries and part headers on top of the image
const FORM_OVERHEAD_BYTES: u64 = 64 * 1024;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Shared state behind the routes
pub struct AppState {
    pub workflow: RequestWorkflow,
    pub health: Arc<HealthMonitor>,
    pub max_upload_bytes: u64,
}

impl AppState {
    pub fn new(workflow: RequestWorkflow, health: Arc<HealthMonitor>, max_upload_bytes: u64) -> Self {
        Self {
            workflow,
            health,
            max_upload_bytes,
        }
    }
}

/// Body of a `303` answer
#[derive(Debug, Serialize)]
struct SubmitAccepted<'a> {
    request_id: Uuid,
    #[serde(flatten)]
    directive: &'a RoutingDirective,
    location: String,
}

/// Body of routing-level errors that never reached the workflow
#[derive(Debug, Serialize)]
struct RouteError {
    error: &'static str,
    message: String,
}

/// Every route the service serves
pub fn routes(
    state: Arc<AppState>,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let max_form = state.max_upload_bytes.saturating_add(FORM_OVERHEAD_BYTES);

    let submit = warp::path("submit")
        .and(warp::path::end())
        .and(warp::post())
        .and(with_state(state.clone()))
        .and(warp::multipart::form().max_length(max_form))
        .and_then(handle_submit);

    let escalation_view = warp::path("crpf-info")
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<HashMap<String, String>>())
        .map(|query| view_page(View::Escalation, query));

    let default_view = warp::path("tt-info")
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<HashMap<String, String>>())
        .map(|query| view_page(View::Default, query));

    let index = warp::path::end().and(warp::get()).map(|| {
        warp::reply::json(&serde_json::json!({
            "service": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "endpoints": {
                "submit": "POST /submit (multipart: file, pnr)",
                "default_view": View::Default.path(),
                "escalation_view": View::Escalation.path(),
                "health": "/health",
                "ready": "/ready",
                "live": "/live",
                "metrics": "/metrics",
            }
        }))
    });

    submit
        .or(escalation_view)
        .or(default_view)
        .or(index)
        .or(state.health.clone().routes())
        .recover(handle_rejection)
        .with(warp::trace::request())
}

fn with_state(
    state: Arc<AppState>,
) -> impl Filter<Extract = (Arc<AppState>,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

async fn handle_submit(state: Arc<AppState>, form: FormData) -> Result<Response, Rejection> {
    state.health.touch_submission();

    let submission = match read_submission(form, state.max_upload_bytes).await {
        Ok(submission) => submission,
        Err(rejected) => return Ok(reject_at_boundary(rejected)),
    };

    let outcome = state.workflow.run(submission).await;
    Ok(outcome_response(&outcome))
}

/// Failure detected while reading the form, before the workflow started
struct BoundaryRejection {
    status: StatusCode,
    error: WorkflowError,
}

/// Pull the `file` and `pnr` parts out of the form, enforcing the size cap
async fn read_submission(form: FormData, max_bytes: u64) -> Result<Submission, BoundaryRejection> {
    let mut submission = Submission::default();
    tokio::pin!(form);

    while let Some(part) = form.try_next().await.map_err(malformed_form)? {
        let name = part.name().to_string();
        match name.as_str() {
            "file" => {
                let filename = part.filename().map(str::to_string);
                let bytes = read_part(part, "Image", max_bytes).await?;
                submission.image = Some(ImagePart { filename, bytes });
            }
            "pnr" => {
                let bytes = read_part(part, "PNR number", FORM_OVERHEAD_BYTES).await?;
                submission.ticket = Some(String::from_utf8_lossy(&bytes).into_owned());
            }
            other => debug!(part = other, "Ignoring unexpected form part"),
        }
    }

    Ok(submission)
}

/// Buffer one part, naming it as `label` if it outgrows `limit`
async fn read_part(
    part: warp::multipart::Part,
    label: &str,
    limit: u64,
) -> Result<Vec<u8>, BoundaryRejection> {
    let mut data = Vec::new();
    let stream = part.stream();
    tokio::pin!(stream);

    while let Some(chunk) = stream.try_next().await.map_err(malformed_form)? {
        if (data.len() + bytes::Buf::remaining(&chunk)) as u64 > limit {
            return Err(BoundaryRejection {
                status: StatusCode::PAYLOAD_TOO_LARGE,
                error: WorkflowError::missing_input(format!(
                    "{label} exceeds the maximum size of {limit} bytes."
                )),
            });
        }
        data.put(chunk);
    }

    Ok(data)
}

fn malformed_form(e: warp::Error) -> BoundaryRejection {
    warn!(error = %e, "Malformed multipart submission");
    BoundaryRejection {
        status: StatusCode::BAD_REQUEST,
        error: WorkflowError::missing_input(MISSING_INPUT_MESSAGE),
    }
}

/// Answer a submission that failed before the workflow could run. It is still
/// counted and still gets a request id.
fn reject_at_boundary(rejected: BoundaryRejection) -> Response {
    let collector = metrics();
    collector.submission_received();
    collector.submission_failed(rejected.error.kind(), std::time::Duration::ZERO);

    let request_id = Uuid::new_v4();
    warn!(
        request_id = %request_id,
        status = rejected.status.as_u16(),
        error = %rejected.error,
        "Submission rejected before processing"
    );

    let response = warp::reply::with_status(
        warp::reply::json(&rejected.error.to_failure_response()),
        rejected.status,
    );
    warp::reply::with_header(response, REQUEST_ID_HEADER, request_id.to_string()).into_response()
}

/// HTTP status for a user-visible failure kind
pub fn status_for(kind: FailureKind) -> StatusCode {
    match kind {
        FailureKind::MissingInput => StatusCode::BAD_REQUEST,
        FailureKind::ClassificationFailed => StatusCode::UNPROCESSABLE_ENTITY,
        FailureKind::ResolutionFailed => StatusCode::NOT_FOUND,
    }
}

fn outcome_response(outcome: &WorkflowOutcome) -> Response {
    let request_id = outcome.request_id.to_string();

    let response = match &outcome.result {
        Ok(directive) => {
            let location = directive.location();
            let body = SubmitAccepted {
                request_id: outcome.request_id,
                directive,
                location: location.clone(),
            };
            warp::reply::with_header(
                warp::reply::with_status(warp::reply::json(&body), StatusCode::SEE_OTHER),
                header::LOCATION,
                location,
            )
            .into_response()
        }
        Err(e) => warp::reply::with_status(
            warp::reply::json(&e.to_failure_response()),
            status_for(e.kind()),
        )
        .into_response(),
    };

    warp::reply::with_header(response, REQUEST_ID_HEADER, request_id).into_response()
}

fn view_page(view: View, query: HashMap<String, String>) -> warp::reply::Json {
    let person = query.get(view.person_param()).cloned().unwrap_or_default();
    let incharge = query.get(INCHARGE_PARAM).cloned().unwrap_or_default();

    let mut body = serde_json::Map::new();
    body.insert("view".to_string(), serde_json::json!(view));
    body.insert(view.person_param().to_string(), person.into());
    body.insert(INCHARGE_PARAM.to_string(), incharge.into());
    warp::reply::json(&body)
}

async fn handle_rejection(err: Rejection) -> Result<Response, Infallible> {
    // Only /submit reads a body, so these are submissions too
    if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        return Ok(reject_at_boundary(BoundaryRejection {
            status: StatusCode::PAYLOAD_TOO_LARGE,
            error: WorkflowError::missing_input("Upload exceeds the maximum allowed size."),
        }));
    }

    let (status, error, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "not_found", "No such endpoint".to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            "method_not_allowed",
            "Method not allowed".to_string(),
        )
    } else if err.find::<warp::reject::UnsupportedMediaType>().is_some()
        || err.find::<warp::reject::InvalidHeader>().is_some()
        || err.find::<warp::reject::MissingHeader>().is_some()
    {
        return Ok(reject_at_boundary(BoundaryRejection {
            status: StatusCode::BAD_REQUEST,
            error: WorkflowError::missing_input(MISSING_INPUT_MESSAGE),
        }));
    } else if err.find::<warp::reject::LengthRequired>().is_some() {
        (
            StatusCode::LENGTH_REQUIRED,
            "length_required",
            "Content-Length header is required".to_string(),
        )
    } else if err.find::<warp::reject::InvalidQuery>().is_some() {
        (
            StatusCode::BAD_REQUEST,
            "invalid_query",
            "Invalid query string".to_string(),
        )
    } else {
        warn!(rejection = ?err, "Unhandled rejection");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal",
            "Internal server error".to_string(),
        )
    };

    Ok(warp::reply::with_status(warp::reply::json(&RouteError { error, message }), status).into_response())
}

/// Serve until `shutdown` resolves
pub async fn serve<F>(
    state: Arc<AppState>,
    addr: std::net::SocketAddr,
    shutdown: F,
) -> Result<(), warp::Error>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let started = Instant::now();
    let (bound, server) = warp::serve(routes(state)).try_bind_with_graceful_shutdown(addr, shutdown)?;
    tracing::info!(address = %bound, "HTTP server listening");
    server.await;
    debug!(uptime_s = started.elapsed().as_secs(), "HTTP server stopped");
    Ok(())
}
