//! # Command web server
//!
//! Thin HTTP front end for the browser client.
//!
//! | Path | Description |
//! |------|-------------|
//! | `POST /robot` | One control sample as query fields |
//! | `OPTIONS /robot` | CORS preflight |
//! | everything else | Static files of the browser client |
//!
//! `POST /robot` always answers 200 so the polling client never stalls on a
//! bad sample; the JSON body says whether the sample was applied.

use crate::config::WebConfig;
use crate::session::{RobotSessionController, SampleOutcome};
use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use robot_shared::ControlSample;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::services::ServeDir;
use tracing::{info, warn};

fn command_headers() -> [(HeaderName, &'static str); 4] {
    [
        (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
        (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
        (header::PRAGMA, "no-cache"),
        (header::EXPIRES, "0"),
    ]
}

/// Shared state passed to all request handlers
#[derive(Clone)]
struct WebState {
    session: Arc<RobotSessionController>,
    /// Set when the client asks the robot to shut down
    shutdown_request: Arc<watch::Sender<bool>>,
}

/// Body of every `POST /robot` response
#[derive(Debug, Serialize)]
struct CommandReply {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

impl CommandReply {
    fn ok() -> Self {
        Self {
            status: "ok",
            reason: None,
        }
    }

    fn rejected(reason: impl ToString) -> Self {
        Self {
            status: "rejected",
            reason: Some(reason.to_string()),
        }
    }
}

fn router(
    session: Arc<RobotSessionController>,
    shutdown_request: Arc<watch::Sender<bool>>,
    config: &WebConfig,
) -> Router {
    let state = WebState {
        session,
        shutdown_request,
    };

    Router::new()
        .route("/robot", post(handle_command).options(handle_preflight))
        .fallback_service(ServeDir::new(&config.static_dir))
        .with_state(state)
}

/// Serve the command endpoint until `shutdown` turns true
pub async fn serve(
    listener: TcpListener,
    session: Arc<RobotSessionController>,
    shutdown_request: Arc<watch::Sender<bool>>,
    config: &WebConfig,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    info!("Command server listening on http://{}", listener.local_addr()?);
    let app = router(session, shutdown_request, config);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await?;

    info!("Command server stopped");
    Ok(())
}

/// Handles `POST /robot`
async fn handle_command(
    State(state): State<WebState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let sample = match ControlSample::from_params(&params) {
        Ok(sample) => sample,
        Err(e) => {
            warn!("Rejected control request: {}", e);
            return (command_headers(), Json(CommandReply::rejected(e))).into_response();
        }
    };

    let reply = match state.session.handle_sample(&sample).await {
        SampleOutcome::Applied { .. } => CommandReply::ok(),
        SampleOutcome::Rejected(e) => CommandReply::rejected(e),
        SampleOutcome::ShutdownRequested => {
            state.shutdown_request.send_replace(true);
            CommandReply::ok()
        }
    };

    (command_headers(), Json(reply)).into_response()
}

/// Handles `OPTIONS /robot`
async fn handle_preflight() -> Response {
    (
        StatusCode::NO_CONTENT,
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::ACCESS_CONTROL_ALLOW_METHODS, "POST, OPTIONS"),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, "*"),
        ],
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::SimulatedActuator;
    use crate::config::ActuatorConfig;
    use robot_shared::{DriveConfig, HeadConfig};

    fn web_state() -> (WebState, watch::Receiver<bool>) {
        let actuator = Arc::new(SimulatedActuator::connect(&ActuatorConfig::default()).unwrap());
        let head = HeadConfig {
            settle_ms: 0,
            ..Default::default()
        };
        let session = Arc::new(RobotSessionController::new(
            actuator,
            DriveConfig::default(),
            head,
        ));
        let (tx, rx) = watch::channel(false);
        let state = WebState {
            session,
            shutdown_request: Arc::new(tx),
        };
        (state, rx)
    }

    fn params(motion_state: &str) -> HashMap<String, String> {
        [
            ("controller_status", "Connected"),
            ("motion_state", motion_state),
            ("x_axis", "0"),
            ("y_axis", "0"),
            ("head_x_axis", "0"),
            ("head_y_axis", "0"),
            ("force", "0"),
            ("trigger_1", "0"),
            ("trigger_2", "0"),
            ("head_enable", "0"),
            ("time_stamp", "1"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_valid_sample_is_ok() {
        let (state, _rx) = web_state();
        let session = state.session.clone();

        let response = handle_command(State(state), Query(params("ArrowUp"))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "*"
        );
        assert_eq!(body_json(response).await["status"], "ok");
        assert_eq!(session.head_position().await.tilt, 100);
    }

    #[tokio::test]
    async fn test_malformed_sample_answers_200_rejected() {
        let (state, _rx) = web_state();
        let mut fields = params("None");
        fields.remove("force");

        let response = handle_command(State(state), Query(fields)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::PRAGMA], "no-cache");

        let body = body_json(response).await;
        assert_eq!(body["status"], "rejected");
        assert!(body["reason"].as_str().unwrap().contains("force"));
    }

    #[tokio::test]
    async fn test_escape_requests_shutdown() {
        let (state, rx) = web_state();

        let response = handle_command(State(state), Query(params("Escape"))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(*rx.borrow());
    }

    #[tokio::test]
    async fn test_preflight() {
        let response = handle_preflight().await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_METHODS],
            "POST, OPTIONS"
        );
    }
}
