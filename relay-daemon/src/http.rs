//! HTTP trigger listener.
//!
//! `GET /` or `POST /` with `?password=...&project=...` starts an update and
//! streams its status lines back as plain text. `game` is accepted as an
//! alias for `project`.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;

use crate::orchestrator::{Orchestrator, StatusSink};

#[derive(Clone)]
pub struct AppState {
    orchestrator: Arc<Orchestrator>,
    password: Arc<str>,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>, password: &str) -> Self {
        Self {
            orchestrator,
            password: Arc::from(password),
        }
    }

    /// An empty configured password rejects every request.
    fn authorized(&self, supplied: Option<&str>) -> bool {
        !self.password.is_empty() && supplied == Some(&*self.password)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TriggerQuery {
    password: Option<String>,
    #[serde(alias = "game")]
    project: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(trigger).post(trigger))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn trigger(State(state): State<AppState>, Query(query): Query<TriggerQuery>) -> Response {
    if !state.authorized(query.password.as_deref()) {
        return plain(StatusCode::UNAUTHORIZED, "Access denied\n".to_string());
    }

    let name = query.project.unwrap_or_default();
    let Some(slot) = state.orchestrator.slot(&name) else {
        return plain(
            StatusCode::BAD_REQUEST,
            format!("Could not find project \"{name}\"\n"),
        );
    };
    let guard = match slot.try_begin() {
        Ok(guard) => guard,
        Err(err) if err.is_busy() => {
            tracing::info!(project = %name, error = %err, "trigger rejected");
            return plain(
                StatusCode::SERVICE_UNAVAILABLE,
                "Update already in progress\n".to_string(),
            );
        }
        Err(err) => {
            tracing::error!(project = %name, error = %err, "unable to start update");
            return plain(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Update failed: {err}\n"),
            );
        }
    };

    let (tx, rx) = mpsc::unbounded_channel::<String>();
    let orchestrator = state.orchestrator.clone();
    let project = slot.project().name.clone();
    tokio::spawn(async move {
        let status = StatusSink::new(project, Some(tx));
        if let Err(err) = orchestrator.run_locked(guard, &status).await {
            status.send(&format!("Update failed: {err}"));
        }
    });

    // The body ends once the run task drops its sender.
    let lines = futures::stream::unfold(rx, |mut rx| async move {
        let message = rx.recv().await?;
        Some((Ok::<_, Infallible>(Bytes::from(format!("{message}\r\n\r\n"))), rx))
    });

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain")],
        Body::from_stream(lines),
    )
        .into_response()
}

fn plain(status: StatusCode, body: String) -> Response {
    (status, [(header::CONTENT_TYPE, "text/plain")], body).into_response()
}
