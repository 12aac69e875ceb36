use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use super::domain::{ApplicationId, ApplicationRequest, ApplicationStatus, Identity, WarehouseId};
use super::repository::ListQuery;
use super::service::{ApplicationWorkflow, ErrorKind, WorkflowError};
use crate::directory::Directory;

/// Header carrying the client-chosen application id on create.
pub const IDEMPOTENCY_HEADER: &str = "x-request-idempotency-token";

const DEFAULT_PAGE_SIZE: usize = 20;

type SharedWorkflow<D> = Arc<ApplicationWorkflow<D>>;

/// Router exposing the application workflow and warehouse stock over HTTP.
pub fn application_router<D>(workflow: SharedWorkflow<D>) -> Router
where
    D: Directory + 'static,
{
    Router::new()
        .route(
            "/api/v1/applications",
            post(create_handler::<D>).get(list_handler::<D>),
        )
        .route(
            "/api/v1/applications/:application_id",
            get(get_handler::<D>)
                .patch(update_handler::<D>)
                .delete(delete_handler::<D>),
        )
        .route(
            "/api/v1/applications/:application_id/approve",
            put(approve_handler::<D>),
        )
        .route(
            "/api/v1/applications/:application_id/reject",
            put(reject_handler::<D>),
        )
        .route(
            "/api/v1/warehouses/:warehouse_id/stock",
            get(stock_handler::<D>),
        )
        .with_state(workflow)
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListParams {
    limit: Option<usize>,
    cursor: Option<DateTime<Utc>>,
    status: Option<String>,
    #[serde(default)]
    mine: bool,
}

fn error_body(status: StatusCode, message: impl Into<String>) -> Response {
    let payload = json!({
        "error": message.into(),
    });
    (status, Json(payload)).into_response()
}

pub(crate) fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn workflow_error(error: WorkflowError) -> Response {
    error_body(status_for(error.kind()), error.to_string())
}

/// Resolves the bearer token, or produces the 401 response.
fn authenticate<D>(
    workflow: &ApplicationWorkflow<D>,
    headers: &HeaderMap,
) -> Result<Identity, Response>
where
    D: Directory + 'static,
{
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());

    let Some(token) = token else {
        return Err(error_body(StatusCode::UNAUTHORIZED, "missing bearer token"));
    };
    workflow
        .directory()
        .resolve_token(token)
        .ok_or_else(|| error_body(StatusCode::UNAUTHORIZED, "unknown bearer token"))
}

pub(crate) async fn create_handler<D>(
    State(workflow): State<SharedWorkflow<D>>,
    headers: HeaderMap,
    Json(request): Json<ApplicationRequest>,
) -> Response
where
    D: Directory + 'static,
{
    let identity = match authenticate(&workflow, &headers) {
        Ok(identity) => identity,
        Err(response) => return response,
    };
    let token = headers
        .get(IDEMPOTENCY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|token| !token.is_empty());
    let Some(token) = token else {
        return error_body(
            StatusCode::BAD_REQUEST,
            format!("missing {IDEMPOTENCY_HEADER} header"),
        );
    };

    match workflow.create(ApplicationId::new(token), request, &identity.id) {
        Ok(submission) => {
            let status = if submission.replayed {
                StatusCode::OK
            } else {
                StatusCode::CREATED
            };
            (status, Json(submission.application)).into_response()
        }
        Err(error) => workflow_error(error),
    }
}

pub(crate) async fn list_handler<D>(
    State(workflow): State<SharedWorkflow<D>>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Response
where
    D: Directory + 'static,
{
    let identity = match authenticate(&workflow, &headers) {
        Ok(identity) => identity,
        Err(response) => return response,
    };

    let status = match params.status.as_deref() {
        None => None,
        Some(raw) => match ApplicationStatus::parse(raw) {
            Some(status) => Some(status),
            None => {
                return error_body(StatusCode::BAD_REQUEST, format!("unknown status '{raw}'"))
            }
        },
    };

    let query = ListQuery {
        chained_to_user: params.mine.then(|| identity.id.clone()),
        status,
        cursor: params.cursor,
        limit: params.limit.unwrap_or(DEFAULT_PAGE_SIZE),
    };
    match workflow.list(&query) {
        Ok(list) => (StatusCode::OK, Json(list)).into_response(),
        Err(error) => workflow_error(error),
    }
}

pub(crate) async fn get_handler<D>(
    State(workflow): State<SharedWorkflow<D>>,
    headers: HeaderMap,
    Path(application_id): Path<String>,
) -> Response
where
    D: Directory + 'static,
{
    let identity = match authenticate(&workflow, &headers) {
        Ok(identity) => identity,
        Err(response) => return response,
    };
    match workflow.get(&ApplicationId::new(application_id), &identity) {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(error) => workflow_error(error),
    }
}

pub(crate) async fn update_handler<D>(
    State(workflow): State<SharedWorkflow<D>>,
    headers: HeaderMap,
    Path(application_id): Path<String>,
    Json(request): Json<ApplicationRequest>,
) -> Response
where
    D: Directory + 'static,
{
    let identity = match authenticate(&workflow, &headers) {
        Ok(identity) => identity,
        Err(response) => return response,
    };
    match workflow.update(&ApplicationId::new(application_id), request, &identity) {
        Ok(application) => (StatusCode::OK, Json(application)).into_response(),
        Err(error) => workflow_error(error),
    }
}

pub(crate) async fn delete_handler<D>(
    State(workflow): State<SharedWorkflow<D>>,
    headers: HeaderMap,
    Path(application_id): Path<String>,
) -> Response
where
    D: Directory + 'static,
{
    let identity = match authenticate(&workflow, &headers) {
        Ok(identity) => identity,
        Err(response) => return response,
    };
    match workflow.delete(&ApplicationId::new(application_id), &identity) {
        Ok(application) => (StatusCode::OK, Json(application)).into_response(),
        Err(error) => workflow_error(error),
    }
}

pub(crate) async fn approve_handler<D>(
    State(workflow): State<SharedWorkflow<D>>,
    headers: HeaderMap,
    Path(application_id): Path<String>,
) -> Response
where
    D: Directory + 'static,
{
    let identity = match authenticate(&workflow, &headers) {
        Ok(identity) => identity,
        Err(response) => return response,
    };
    match workflow.approve(&ApplicationId::new(application_id), &identity) {
        Ok(application) => (StatusCode::OK, Json(application)).into_response(),
        Err(error) => workflow_error(error),
    }
}

pub(crate) async fn reject_handler<D>(
    State(workflow): State<SharedWorkflow<D>>,
    headers: HeaderMap,
    Path(application_id): Path<String>,
) -> Response
where
    D: Directory + 'static,
{
    let identity = match authenticate(&workflow, &headers) {
        Ok(identity) => identity,
        Err(response) => return response,
    };
    match workflow.reject(&ApplicationId::new(application_id), &identity) {
        Ok(application) => (StatusCode::OK, Json(application)).into_response(),
        Err(error) => workflow_error(error),
    }
}

pub(crate) async fn stock_handler<D>(
    State(workflow): State<SharedWorkflow<D>>,
    headers: HeaderMap,
    Path(warehouse_id): Path<String>,
) -> Response
where
    D: Directory + 'static,
{
    if let Err(response) = authenticate(&workflow, &headers) {
        return response;
    }
    match workflow.stock(&WarehouseId::new(warehouse_id)) {
        Ok(stock) => (StatusCode::OK, Json(stock)).into_response(),
        Err(error) => workflow_error(error),
    }
}
