//! RalphWorks webhook listener.
//!
//! The HTTP edge of the service: receives GitHub webhook deliveries, hands
//! the raw bytes plus headers to the [`dispatch::Dispatcher`], and maps the
//! dispatch outcome onto HTTP statuses. The exact body bytes travel to the
//! dispatcher untouched; signature verification happens over them, never over
//! a re-serialisation.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Transport details only: routing, header extraction,
//! status mapping, and the health endpoint. No domain rules.
//!
//! ## Status mapping
//!
//! | Outcome | Status |
//! |---------|--------|
//! | Ignored (wrong event, wrong action, no command) | 200 with an `ignored` body |
//! | Unauthorized (signature mismatch) | 401 |
//! | Malformed (missing required ids, unparseable JSON) | 400 |
//! | Failed (credential exchange, reply delivery) | 500 |
//! | Replied | 200 with the executed command |
//!
//! Non-POST requests on the webhook route get 405 from method routing.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use dispatch::dispatcher::{DispatchOutcome, Dispatcher, IgnoreReason};
use dispatch::event::WebhookEvent;
use dispatch::identifiers::DispatchId;
use serde_json::json;
use uuid::Uuid;

/// Webhook event types this service routes; everything else is acknowledged
/// and ignored. Both carry a comment plus enough context to resolve a branch.
const ROUTED_EVENTS: [&str; 2] = ["issue_comment", "pull_request_review_comment"];

/// Builds the application router.
pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .route("/webhook", post(handle_webhook))
        .route("/healthz", get(healthz))
        .with_state(dispatcher)
}

/// Binds `addr` and serves until `shutdown` resolves.
pub async fn serve<F>(
    addr: SocketAddr,
    dispatcher: Arc<Dispatcher>,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(dispatcher);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening for webhook deliveries");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

async fn healthz() -> &'static str {
    "ok"
}

async fn handle_webhook(
    State(dispatcher): State<Arc<Dispatcher>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let event_kind = headers
        .get("x-github-event")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");
    if !ROUTED_EVENTS.contains(&event_kind) {
        // Legitimate-but-irrelevant traffic never gets an error status.
        return (
            StatusCode::OK,
            Json(json!({"status": "ignored", "reason": "unsupported event type"})),
        );
    }

    let event: WebhookEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(error) => {
            tracing::debug!(%error, "unparseable webhook payload");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": format!("malformed webhook payload: {error}")})),
            );
        }
    };

    // Correlate with the delivery guid when it parses; otherwise mint one.
    let dispatch_id = headers
        .get("x-github-delivery")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value).ok())
        .map(DispatchId::from_uuid)
        .unwrap_or_else(DispatchId::new_random);
    let signature = headers
        .get("x-hub-signature-256")
        .and_then(|value| value.to_str().ok());

    let outcome = dispatcher
        .dispatch(dispatch_id, &event, &body, signature)
        .await;
    respond(outcome)
}

fn respond(outcome: DispatchOutcome) -> (StatusCode, Json<serde_json::Value>) {
    match outcome {
        DispatchOutcome::Ignored(reason) => {
            let reason = match reason {
                IgnoreReason::NotCommentCreated => "not a comment creation",
                IgnoreReason::NoCommand => "no command in comment",
            };
            (
                StatusCode::OK,
                Json(json!({"status": "ignored", "reason": reason})),
            )
        }
        DispatchOutcome::Unauthorized => (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "webhook signature verification failed"})),
        ),
        DispatchOutcome::Malformed(reason) => {
            (StatusCode::BAD_REQUEST, Json(json!({"error": reason})))
        }
        DispatchOutcome::Failed(reason) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": reason})),
        ),
        DispatchOutcome::Replied { command, comment } => (
            StatusCode::OK,
            Json(json!({
                "status": "handled",
                "command": command,
                "comment_id": comment.as_u64(),
            })),
        ),
    }
}
