// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP front-end: a thin translator between JSON bodies and the engine's
//! operation set.
//!
//! All error responses use the envelope
//! `{"error": {"code": <status>, "message": <string>}}`.

use crate::engine::{AddScheduleRequest, ApiError, Engine};
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use cw_core::{parse_instant, Clock, Coalesce, ExecutionStatus, Trigger};
use cw_store::ListFilter;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const MAX_EXECUTIONS_LIMIT: usize = 1000;
const MAX_ERRORS_LIMIT: usize = 500;
const DEFAULT_PAGE_LIMIT: usize = 100;

/// Build the API router over a shared engine.
pub fn router<C: Clock>(engine: Arc<Engine<C>>) -> Router {
    Router::new()
        .route("/api/health", get(health::<C>))
        .route("/api/handlers", get(handlers::<C>))
        .route("/api/schedule", post(add_schedule::<C>))
        .route("/api/run_now", post(run_now::<C>))
        .route("/api/schedules", get(list_schedules::<C>))
        .route("/api/schedules/:id", delete(remove_schedule::<C>))
        .route("/api/executions", get(executions::<C>))
        .route("/api/executions/stats", get(execution_stats::<C>))
        .route("/api/executions/errors", get(execution_errors::<C>))
        .route("/api/executions/clear", post(clear_executions::<C>))
        .with_state(engine)
}

struct AppError(ApiError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.0.status_code();
        let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = json!({"error": {"code": code, "message": self.0.to_string()}});
        (status, Json(body)).into_response()
    }
}

impl From<ApiError> for AppError {
    fn from(e: ApiError) -> Self {
        Self(e)
    }
}

fn parse_body<T: serde::de::DeserializeOwned>(body: &Bytes) -> Result<T, AppError> {
    serde_json::from_slice(body)
        .map_err(|e| AppError(ApiError::Validation(format!("invalid request body: {e}"))))
}

async fn health<C: Clock>(State(engine): State<Arc<Engine<C>>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "uptime_secs": engine.uptime().as_secs(),
        "phase": engine.phase().to_string(),
    }))
}

async fn handlers<C: Clock>(State(engine): State<Arc<Engine<C>>>) -> Json<Value> {
    let handlers = engine.list_handlers().await;
    Json(json!({ "handlers": handlers }))
}

/// POST /api/schedule body. Field names mirror the external API
/// (`job_method`/`job_params`); durations arrive as seconds.
#[derive(Debug, Deserialize)]
struct ScheduleBody {
    handler_id: String,
    job_method: String,
    #[serde(default)]
    job_params: Option<Value>,
    trigger: Trigger,
    #[serde(default)]
    job_id: Option<String>,
    #[serde(default)]
    misfire_grace_time: Option<f64>,
    #[serde(default)]
    coalesce: Option<Coalesce>,
    #[serde(default)]
    max_jitter: Option<f64>,
    #[serde(default)]
    max_attempts: Option<u32>,
    #[serde(default)]
    call_timeout: Option<f64>,
    #[serde(default)]
    paused_until: Option<String>,
    #[serde(default)]
    replace_existing: Option<bool>,
}

fn secs(value: Option<f64>, field: &str) -> Result<Option<Duration>, AppError> {
    match value {
        None => Ok(None),
        Some(s) if s < 0.0 || !s.is_finite() => Err(AppError(ApiError::Validation(format!(
            "{field} must be a non-negative number of seconds"
        )))),
        Some(s) => Ok(Some(Duration::from_secs_f64(s))),
    }
}

async fn add_schedule<C: Clock>(
    State(engine): State<Arc<Engine<C>>>,
    body: Bytes,
) -> Result<Response, AppError> {
    let body: ScheduleBody = parse_body(&body)?;
    let request = AddScheduleRequest {
        handler_id: body.handler_id,
        method_name: body.job_method,
        params: body.job_params.unwrap_or_else(|| json!({})),
        trigger: body.trigger,
        schedule_id: body.job_id,
        misfire_grace_time: secs(body.misfire_grace_time, "misfire_grace_time")?,
        coalesce: body.coalesce,
        max_jitter: secs(body.max_jitter, "max_jitter")?,
        max_attempts: body.max_attempts,
        call_timeout: secs(body.call_timeout, "call_timeout")?,
        paused_until: body
            .paused_until
            .as_deref()
            .map(|raw| {
                parse_instant(raw).map_err(|e| {
                    AppError(ApiError::Validation(format!("invalid paused_until: {e}")))
                })
            })
            .transpose()?,
        replace_existing: body.replace_existing.unwrap_or(false),
    };
    let schedule_id = engine.add_schedule(request)?;
    let body = json!({"status": "success", "job_id": schedule_id});
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

#[derive(Debug, Deserialize)]
struct RunNowBody {
    handler_id: String,
    job_method: String,
    #[serde(default)]
    job_params: Option<Value>,
}

async fn run_now<C: Clock>(
    State(engine): State<Arc<Engine<C>>>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let body: RunNowBody = parse_body(&body)?;
    let params = body.job_params.unwrap_or_else(|| json!({}));
    let (job_id, result) = engine.run_now(&body.handler_id, &body.job_method, params).await?;
    Ok(Json(json!({
        "status": "success",
        "job_id": job_id,
        "result": result,
    })))
}

async fn list_schedules<C: Clock>(
    State(engine): State<Arc<Engine<C>>>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, AppError> {
    let filter = ListFilter {
        start_time: parse_time_param(&query, "start_time")?,
        end_time: parse_time_param(&query, "end_time")?,
        limit: parse_limit(&query, "limit", DEFAULT_PAGE_LIMIT, usize::MAX)?,
        offset: parse_limit(&query, "offset", 0, usize::MAX)?,
    };
    let page = engine.list_schedules(&filter);
    Ok(Json(json!({
        "schedules": page.schedules,
        "pagination": {
            "total": page.total,
            "limit": page.limit,
            "offset": page.offset,
        },
    })))
}

async fn remove_schedule<C: Clock>(
    State(engine): State<Arc<Engine<C>>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    engine.remove_schedule(&id)?;
    Ok(Json(json!({"status": "success"})))
}

async fn executions<C: Clock>(
    State(engine): State<Arc<Engine<C>>>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, AppError> {
    let limit = parse_limit(&query, "limit", 100, MAX_EXECUTIONS_LIMIT)?;
    let log = engine.exec_log();
    let records = if let Some(job_id) = query.get("job_id") {
        log.get_by_job(job_id, limit)
    } else if let Some(handler_id) = query.get("handler_id") {
        log.get_by_handler(handler_id, limit)
    } else if let Some(status) = query.get("status") {
        let status = parse_status(status)?;
        log.get_by_status(status, limit)
    } else {
        log.get_recent(limit)
    };
    Ok(Json(json!({
        "count": records.len(),
        "limit": limit,
        "records": records,
    })))
}

async fn execution_stats<C: Clock>(State(engine): State<Arc<Engine<C>>>) -> Json<Value> {
    Json(json!(engine.exec_log().get_stats()))
}

async fn execution_errors<C: Clock>(
    State(engine): State<Arc<Engine<C>>>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, AppError> {
    let limit = parse_limit(&query, "limit", 100, MAX_ERRORS_LIMIT)?;
    let errors = engine.exec_log().get_errors(limit);
    Ok(Json(json!({
        "count": errors.len(),
        "errors": errors,
    })))
}

async fn clear_executions<C: Clock>(State(engine): State<Arc<Engine<C>>>) -> Json<Value> {
    engine.exec_log().clear();
    Json(json!({"status": "success"}))
}

fn parse_time_param(
    query: &HashMap<String, String>,
    name: &str,
) -> Result<Option<chrono::DateTime<chrono::Utc>>, AppError> {
    match query.get(name) {
        None => Ok(None),
        Some(raw) => parse_instant(raw)
            .map(Some)
            .map_err(|e| AppError(ApiError::Validation(format!("invalid {name}: {e}")))),
    }
}

fn parse_limit(
    query: &HashMap<String, String>,
    name: &str,
    default: usize,
    max: usize,
) -> Result<usize, AppError> {
    match query.get(name) {
        None => Ok(default),
        Some(raw) => raw
            .parse::<usize>()
            .map(|n| n.min(max))
            .map_err(|_| AppError(ApiError::Validation(format!("invalid {name}: {raw}")))),
    }
}

fn parse_status(raw: &str) -> Result<ExecutionStatus, AppError> {
    match raw {
        "running" => Ok(ExecutionStatus::Running),
        "success" => Ok(ExecutionStatus::Success),
        "error" => Ok(ExecutionStatus::Error),
        "retry" => Ok(ExecutionStatus::Retry),
        other => Err(AppError(ApiError::Validation(format!("invalid status: {other}")))),
    }
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
