//! REST endpoints for the admin UI and the onboarding hand-off.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post, put},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{error, info};
use uuid::Uuid;

use super::engine::MatchingEngine;
use super::model::{Child, GroupStatus, Location, UserRecord};
use super::sweep::run_sweep;
use crate::error::{DatabaseError, MatchingError};
use crate::store::Database;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<MatchingEngine>,
    /// Sweeps triggered over HTTP use this test-mode flag.
    pub sweep_test_mode: bool,
}

impl AppState {
    fn store(&self) -> &Arc<dyn Database> {
        self.engine.store()
    }
}

/// Build the Axum router with matching, group, and user routes.
pub fn matching_routes(engine: Arc<MatchingEngine>, sweep_test_mode: bool) -> Router {
    let state = AppState {
        engine,
        sweep_test_mode,
    };

    Router::new()
        .route("/health", get(health))
        .route("/api/matching/run", post(run_matching))
        .route("/api/matching/sweep", post(run_sweep_now))
        .route("/api/matching/stats", get(matching_stats))
        .route("/api/groups", get(list_groups))
        .route("/api/groups/{id}", get(get_group))
        .route("/api/groups/{id}/deactivate", post(deactivate_group))
        .route("/api/users/{id}", put(upsert_user))
        .route("/api/users/{id}/group", delete(unassign_user))
        .with_state(state)
}

type Reply = (StatusCode, Json<Value>);

fn reply_error(status: StatusCode, message: impl Into<String>) -> Reply {
    (status, Json(json!({"error": message.into()})))
}

fn database_failure(e: DatabaseError) -> Reply {
    error!(error = %e, "Repository call failed");
    reply_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

fn matching_failure(e: MatchingError) -> Reply {
    match e {
        MatchingError::Database(e) => database_failure(e),
        invalid => reply_error(StatusCode::BAD_REQUEST, invalid.to_string()),
    }
}

fn parse_group_id(id: &str) -> Result<Uuid, Reply> {
    Uuid::parse_str(id).map_err(|_| reply_error(StatusCode::BAD_REQUEST, "Invalid group ID"))
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "circles"
    }))
}

// ── Matching ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RunRequest {
    city: Option<String>,
    state_code: Option<String>,
    #[serde(default)]
    test_mode: bool,
}

async fn run_matching(State(state): State<AppState>, Json(body): Json<RunRequest>) -> Reply {
    let result = state
        .engine
        .run_matching(
            body.city.as_deref(),
            body.state_code.as_deref(),
            body.test_mode,
            Utc::now(),
        )
        .await;

    match result {
        Ok(summary) => (StatusCode::OK, Json(json!(summary))),
        Err(e) => matching_failure(e),
    }
}

async fn run_sweep_now(State(state): State<AppState>) -> Reply {
    match run_sweep(&state.engine, state.sweep_test_mode, Utc::now()).await {
        Ok(results) => {
            let runs: Vec<Value> = results
                .into_iter()
                .map(|(location, summary)| json!({"location": location, "result": summary}))
                .collect();
            (StatusCode::OK, Json(json!({"runs": runs})))
        }
        Err(e) => matching_failure(e),
    }
}

async fn matching_stats(State(state): State<AppState>) -> Reply {
    match state.engine.get_matching_stats(Utc::now()).await {
        Ok(stats) => (StatusCode::OK, Json(json!(stats))),
        Err(e) => matching_failure(e),
    }
}

// ── Groups ──────────────────────────────────────────────────────────────

async fn list_groups(State(state): State<AppState>) -> Reply {
    match state.store().list_groups().await {
        Ok(groups) => (StatusCode::OK, Json(json!(groups))),
        Err(e) => database_failure(e),
    }
}

async fn get_group(State(state): State<AppState>, Path(id): Path<String>) -> Reply {
    let group_id = match parse_group_id(&id) {
        Ok(id) => id,
        Err(reply) => return reply,
    };

    match state.store().get_group(group_id).await {
        Ok(Some(group)) => (StatusCode::OK, Json(json!(group))),
        Ok(None) => reply_error(StatusCode::NOT_FOUND, "Group not found"),
        Err(e) => database_failure(e),
    }
}

async fn deactivate_group(State(state): State<AppState>, Path(id): Path<String>) -> Reply {
    let group_id = match parse_group_id(&id) {
        Ok(id) => id,
        Err(reply) => return reply,
    };

    match state.store().set_group_status(group_id, GroupStatus::Inactive).await {
        Ok(true) => {
            info!(group_id = %group_id, "Group deactivated");
            (
                StatusCode::OK,
                Json(json!({"id": group_id, "status": GroupStatus::Inactive})),
            )
        }
        Ok(false) => reply_error(StatusCode::NOT_FOUND, "Group not found"),
        Err(e) => database_failure(e),
    }
}

// ── Users ───────────────────────────────────────────────────────────────

/// Profile fields the onboarding flow hands off. Group assignment is not
/// writable here.
#[derive(Debug, Deserialize)]
struct UserUpdate {
    name: Option<String>,
    email: Option<String>,
    location: Option<Location>,
    #[serde(default)]
    children: Vec<Child>,
    #[serde(rename = "matching_eligible", alias = "eligible", default)]
    eligible: bool,
}

async fn upsert_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UserUpdate>,
) -> Reply {
    if body.eligible && (body.location.is_none() || body.children.is_empty()) {
        return reply_error(
            StatusCode::BAD_REQUEST,
            "An eligible user needs a location and at least one child",
        );
    }
    if let Some(reason) = body.children.iter().find_map(|c| c.validate().err()) {
        return reply_error(StatusCode::BAD_REQUEST, format!("Invalid child record: {reason}"));
    }

    let user = UserRecord {
        id: id.clone(),
        name: body.name,
        email: body.email,
        location: body.location,
        children: body.children,
        eligible: body.eligible,
        group_id: None,
        matched_at: None,
    };

    if let Err(e) = state.store().upsert_user(&user).await {
        return database_failure(e);
    }
    match state.store().get_user(&id).await {
        Ok(Some(stored)) => (StatusCode::OK, Json(json!(stored))),
        Ok(None) => reply_error(StatusCode::INTERNAL_SERVER_ERROR, "User vanished after write"),
        Err(e) => database_failure(e),
    }
}

async fn unassign_user(State(state): State<AppState>, Path(id): Path<String>) -> Reply {
    match state.store().get_user(&id).await {
        Ok(Some(_)) => {}
        Ok(None) => return reply_error(StatusCode::NOT_FOUND, "User not found"),
        Err(e) => return database_failure(e),
    }

    match state.store().clear_user_group(&id).await {
        Ok(cleared) => {
            if cleared {
                info!(user_id = %id, "User unassigned from group");
            }
            (StatusCode::OK, Json(json!({"id": id, "cleared": cleared})))
        }
        Err(e) => database_failure(e),
    }
}

