//! Health check endpoints for container orchestration
//!
//! Mounted on the main HTTP server alongside the submission routes:
//! `/health`, `/ready`, `/live` and `/metrics`.

use crate::classifier::Classifier;
use crate::observability::metrics::metrics;
use serde::Serialize;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use warp::Filter;

/// Submissions older than this mark the service as idle, not unhealthy
const SUBMISSION_STALENESS_THRESHOLD_SECONDS: u64 = 3600;

/// Tracks health inputs and serves the probe endpoints
pub struct HealthMonitor {
    service_id: String,
    classifier: Arc<dyn Classifier>,
    last_submission: AtomicU64,
}

impl HealthMonitor {
    pub fn new(service_id: impl Into<String>, classifier: Arc<dyn Classifier>) -> Self {
        Self {
            service_id: service_id.into(),
            classifier,
            last_submission: AtomicU64::new(0),
        }
    }

    /// Record that a submission has just been handled
    pub fn touch_submission(&self) {
        self.last_submission
            .store(current_timestamp(), Ordering::Relaxed);
    }

    /// Probe and metrics routes
    pub fn routes(
        self: Arc<Self>,
    ) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
        let health_monitor = self.clone();
        let ready_monitor = self;

        // GET /health - detailed status
        let health_route = warp::path("health")
            .and(warp::path::end())
            .and(warp::get())
            .and_then(move || {
                let monitor = health_monitor.clone();
                async move {
                    let status = monitor.get_health_status().await;
                    let code = if status.status == "healthy" {
                        warp::http::StatusCode::OK
                    } else {
                        warp::http::StatusCode::SERVICE_UNAVAILABLE
                    };
                    Ok::<_, Infallible>(warp::reply::with_status(warp::reply::json(&status), code))
                }
            });

        // GET /ready - readiness probe, requires a reachable model
        let ready_route = warp::path("ready")
            .and(warp::path::end())
            .and(warp::get())
            .and_then(move || {
                let monitor = ready_monitor.clone();
                async move {
                    let ready = monitor.check_classifier_health().await.status == "healthy";
                    let response = ReadinessResponse {
                        ready,
                        timestamp: current_timestamp(),
                    };
                    let code = if ready {
                        warp::http::StatusCode::OK
                    } else {
                        warp::http::StatusCode::SERVICE_UNAVAILABLE
                    };
                    Ok::<_, Infallible>(warp::reply::with_status(
                        warp::reply::json(&response),
                        code,
                    ))
                }
            });

        // GET /live - liveness probe
        let live_route = warp::path("live")
            .and(warp::path::end())
            .and(warp::get())
            .map(|| {
                warp::reply::json(&LivenessResponse {
                    alive: true,
                    timestamp: current_timestamp(),
                })
            });

        // GET /metrics - metrics snapshot
        let metrics_route = warp::path("metrics")
            .and(warp::path::end())
            .and(warp::get())
            .map(|| warp::reply::json(&metrics().get_metrics()));

        health_route
            .or(ready_route)
            .unify()
            .or(live_route)
            .or(metrics_route)
    }

    async fn get_health_status(&self) -> HealthStatus {
        let now = current_timestamp();
        let mut checks = HashMap::new();

        checks.insert("classifier".to_string(), self.check_classifier_health().await);
        checks.insert(
            "submissions".to_string(),
            self.check_submission_activity(),
        );

        // Idle is informational and does not degrade the service
        let overall_healthy = checks
            .values()
            .all(|check| check.status == "healthy" || check.status == "idle");

        HealthStatus {
            status: if overall_healthy { "healthy" } else { "degraded" }.to_string(),
            timestamp: now,
            service_id: self.service_id.clone(),
            uptime_seconds: now.saturating_sub(metrics().uptime_start()),
            checks,
        }
    }

    async fn check_classifier_health(&self) -> HealthCheck {
        let now = current_timestamp();
        let result = self.classifier.health_check().await;
        metrics().update_classifier_health(result.is_ok());

        match result {
            Ok(()) => HealthCheck {
                status: "healthy".to_string(),
                message: Some(format!("{} classifier reachable", self.classifier.name())),
                last_check: now,
            },
            Err(e) => HealthCheck {
                status: "unhealthy".to_string(),
                message: Some(format!("{} classifier error: {e}", self.classifier.name())),
                last_check: now,
            },
        }
    }

    fn check_submission_activity(&self) -> HealthCheck {
        let now = current_timestamp();
        let last = self.last_submission.load(Ordering::Relaxed);

        if last == 0 {
            HealthCheck {
                status: "healthy".to_string(),
                message: Some("No submissions yet - service ready".to_string()),
                last_check: now,
            }
        } else if now.saturating_sub(last) > SUBMISSION_STALENESS_THRESHOLD_SECONDS {
            HealthCheck {
                status: "idle".to_string(),
                message: Some(format!(
                    "No submissions for {} seconds",
                    now.saturating_sub(last)
                )),
                last_check: now,
            }
        } else {
            HealthCheck {
                status: "healthy".to_string(),
                message: Some("Recent submission activity".to_string()),
                last_check: now,
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    pub status: String,
    pub message: Option<String>,
    pub last_check: u64,
}

#[derive(Debug, Serialize)]
struct HealthStatus {
    status: String,
    timestamp: u64,
    service_id: String,
    uptime_seconds: u64,
    checks: HashMap<String, HealthCheck>,
}

#[derive(Debug, Serialize)]
struct ReadinessResponse {
    ready: bool,
    timestamp: u64,
}

#[derive(Debug, Serialize)]
struct LivenessResponse {
    alive: bool,
    timestamp: u64,
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mocks::MockClassifier;

    fn monitor(classifier: MockClassifier) -> Arc<HealthMonitor> {
        Arc::new(HealthMonitor::new("railwatch-test", Arc::new(classifier)))
    }

    #[tokio::test]
    async fn test_healthy_status() {
        let monitor = monitor(MockClassifier::with_label("normal"));
        monitor.touch_submission();

        let status = monitor.get_health_status().await;
        assert_eq!(status.status, "healthy");
        assert_eq!(status.service_id, "railwatch-test");
        assert!(status.checks.contains_key("classifier"));
        assert!(status.checks.contains_key("submissions"));
    }

    #[tokio::test]
    async fn test_unreachable_classifier_degrades() {
        let monitor = monitor(MockClassifier::unhealthy());

        let status = monitor.get_health_status().await;
        assert_eq!(status.status, "degraded");
        assert_eq!(status.checks["classifier"].status, "unhealthy");
    }

    #[tokio::test]
    async fn test_idle_does_not_degrade() {
        let monitor = monitor(MockClassifier::with_label("normal"));
        monitor
            .last_submission
            .store(current_timestamp() - 2 * SUBMISSION_STALENESS_THRESHOLD_SECONDS, Ordering::Relaxed);

        let status = monitor.get_health_status().await;
        assert_eq!(status.checks["submissions"].status, "idle");
        assert_eq!(status.status, "healthy");
    }

    #[tokio::test]
    async fn test_health_reports_classifier_and_activity_only() {
        let monitor = monitor(MockClassifier::with_label("normal"));

        let status = monitor.get_health_status().await;
        let mut names: Vec<_> = status.checks.keys().cloned().collect();
        names.sort();
        assert_eq!(names, vec!["classifier", "submissions"]);
    }

    #[tokio::test]
    async fn test_ready_route_reflects_classifier() {
        let healthy = monitor(MockClassifier::with_label("normal")).routes();
        let response = warp::test::request()
            .method("GET")
            .path("/ready")
            .reply(&healthy)
            .await;
        assert_eq!(response.status(), 200);

        let unhealthy = monitor(MockClassifier::unhealthy()).routes();
        let response = warp::test::request()
            .method("GET")
            .path("/ready")
            .reply(&unhealthy)
            .await;
        assert_eq!(response.status(), 503);
    }

    #[tokio::test]
    async fn test_live_and_metrics_routes() {
        let routes = monitor(MockClassifier::unhealthy()).routes();

        let live = warp::test::request().path("/live").reply(&routes).await;
        assert_eq!(live.status(), 200);

        let metrics = warp::test::request().path("/metrics").reply(&routes).await;
        assert_eq!(metrics.status(), 200);
        let body: serde_json::Value = serde_json::from_slice(metrics.body()).unwrap();
        assert!(body.get("submissions").is_some());
    }
}
