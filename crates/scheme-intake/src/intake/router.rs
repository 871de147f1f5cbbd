use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use super::draft::AssemblyError;
use super::render::RenderError;
use super::repository::RepositoryError;
use super::service::{
    Consent, DiscoveryRequest, DraftId, IntakeError, IntakeService, StartRequest,
    NO_SCHEMES_MESSAGE,
};

/// HTTP adapter the conversation layer calls as tools.
pub fn intake_router(service: Arc<IntakeService>) -> Router {
    Router::new()
        .route("/api/v1/schemes", get(list_schemes_handler))
        .route("/api/v1/schemes/discover", post(discover_handler))
        .route("/api/v1/schemes/eligibility", post(eligibility_handler))
        .route("/api/v1/drafts", post(start_draft_handler))
        .route(
            "/api/v1/drafts/:draft_id",
            get(draft_handler).delete(cancel_handler),
        )
        .route("/api/v1/drafts/:draft_id/items", post(submit_item_handler))
        .route(
            "/api/v1/drafts/:draft_id/documents",
            post(mark_document_handler),
        )
        .route("/api/v1/drafts/:draft_id/confirm", post(confirm_handler))
        .route(
            "/api/v1/applications/:application_id",
            get(status_handler),
        )
        .route("/download/application/:filename", get(download_handler))
        .with_state(service)
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SchemeQuery {
    #[serde(default)]
    pub(crate) name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EligibilityRequest {
    pub(crate) national_id: String,
    pub(crate) scheme_name: String,
    #[serde(default)]
    pub(crate) consent: Consent,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ItemSubmission {
    pub(crate) item: String,
    pub(crate) value: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DocumentReceipt {
    pub(crate) document: String,
}

/// Store lookups, SQLite writes and PDF rendering all block, so the service runs on
/// tokio's blocking pool and never on an async worker.
pub(crate) async fn run_blocking<T, F>(
    service: Arc<IntakeService>,
    work: F,
) -> Result<T, Response>
where
    T: Send + 'static,
    F: FnOnce(&IntakeService) -> Result<T, IntakeError> + Send + 'static,
{
    match tokio::task::spawn_blocking(move || work(&service)).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(error_response(err)),
        Err(join_error) => {
            error!(error = %join_error, "intake task did not complete");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "internal error", "kind": "internal" })),
            )
                .into_response())
        }
    }
}

fn respond<T: Serialize>(status: StatusCode, result: Result<T, Response>) -> Response {
    match result {
        Ok(body) => (status, Json(body)).into_response(),
        Err(response) => response,
    }
}

pub(crate) async fn list_schemes_handler(
    State(service): State<Arc<IntakeService>>,
    Query(query): Query<SchemeQuery>,
) -> Response {
    let result = run_blocking(service, move |service| {
        let found = match query.name.as_deref().filter(|name| !name.trim().is_empty()) {
            Some(name) => service.find_schemes(name),
            None => service.list_schemes(),
        };
        match found {
            Ok(schemes) => Ok(json!({ "schemes": schemes })),
            Err(IntakeError::SchemeNotFound(_)) => {
                Ok(json!({ "message": NO_SCHEMES_MESSAGE, "schemes": [] }))
            }
            Err(other) => Err(other),
        }
    })
    .await;
    respond(StatusCode::OK, result)
}

pub(crate) async fn discover_handler(
    State(service): State<Arc<IntakeService>>,
    Json(request): Json<DiscoveryRequest>,
) -> Response {
    let result = run_blocking(service, move |service| service.discover(&request)).await;
    respond(StatusCode::OK, result)
}

pub(crate) async fn eligibility_handler(
    State(service): State<Arc<IntakeService>>,
    Json(request): Json<EligibilityRequest>,
) -> Response {
    let result = run_blocking(service, move |service| {
        let checks = service.explain_eligibility(
            &request.national_id,
            &request.consent,
            &request.scheme_name,
        )?;
        Ok(json!({ "checks": checks }))
    })
    .await;
    respond(StatusCode::OK, result)
}

pub(crate) async fn start_draft_handler(
    State(service): State<Arc<IntakeService>>,
    Json(request): Json<StartRequest>,
) -> Response {
    let result = run_blocking(service, move |service| service.start_application(&request)).await;
    respond(StatusCode::CREATED, result)
}

pub(crate) async fn draft_handler(
    State(service): State<Arc<IntakeService>>,
    Path(draft_id): Path<String>,
) -> Response {
    let result = run_blocking(service, move |service| service.draft(&DraftId(draft_id))).await;
    respond(StatusCode::OK, result)
}

pub(crate) async fn submit_item_handler(
    State(service): State<Arc<IntakeService>>,
    Path(draft_id): Path<String>,
    Json(submission): Json<ItemSubmission>,
) -> Response {
    let result = run_blocking(service, move |service| {
        service.submit_item(&DraftId(draft_id), &submission.item, &submission.value)
    })
    .await;
    respond(StatusCode::OK, result)
}

pub(crate) async fn mark_document_handler(
    State(service): State<Arc<IntakeService>>,
    Path(draft_id): Path<String>,
    Json(receipt): Json<DocumentReceipt>,
) -> Response {
    let result = run_blocking(service, move |service| {
        service.mark_document(&DraftId(draft_id), &receipt.document)
    })
    .await;
    respond(StatusCode::OK, result)
}

pub(crate) async fn confirm_handler(
    State(service): State<Arc<IntakeService>>,
    Path(draft_id): Path<String>,
) -> Response {
    let result = run_blocking(service, move |service| {
        let receipt = service.confirm(&DraftId(draft_id))?;
        Ok(json!({
            "application_id": receipt.application_id,
            "scheme_name": receipt.scheme_name,
            "status": receipt.status,
            "download_url": receipt.download_path(),
        }))
    })
    .await;
    respond(StatusCode::CREATED, result)
}

pub(crate) async fn cancel_handler(
    State(service): State<Arc<IntakeService>>,
    Path(draft_id): Path<String>,
) -> Response {
    let result = run_blocking(service, move |service| service.cancel(&DraftId(draft_id))).await;
    respond(StatusCode::OK, result)
}

pub(crate) async fn status_handler(
    State(service): State<Arc<IntakeService>>,
    Path(application_id): Path<String>,
) -> Response {
    let result = run_blocking(service, move |service| {
        service.application_status(&application_id)
    })
    .await;
    respond(StatusCode::OK, result)
}

pub(crate) async fn download_handler(
    State(service): State<Arc<IntakeService>>,
    Path(filename): Path<String>,
) -> Response {
    let requested = filename.clone();
    let bytes = match run_blocking(service, move |service| service.download(&requested)).await {
        Ok(bytes) => bytes,
        Err(response) => return response,
    };
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, mime::APPLICATION_PDF.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        bytes,
    )
        .into_response()
}

fn status_for(error: &IntakeError) -> StatusCode {
    match error {
        IntakeError::ProfileNotFound
        | IntakeError::SchemeNotFound(_)
        | IntakeError::DraftNotFound(_)
        | IntakeError::ApplicationNotFound(_) => StatusCode::NOT_FOUND,
        IntakeError::AmbiguousScheme { .. } => StatusCode::CONFLICT,
        IntakeError::Verification(_) => StatusCode::UNPROCESSABLE_ENTITY,
        IntakeError::Assembly(assembly) => match assembly {
            AssemblyError::UnknownItem(_)
            | AssemblyError::UnknownDocument(_)
            | AssemblyError::RdNumberMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AssemblyError::VerificationLocked(_) => StatusCode::LOCKED,
            AssemblyError::Incomplete { .. } => StatusCode::PRECONDITION_FAILED,
            AssemblyError::DraftClosed => StatusCode::CONFLICT,
            AssemblyError::Persistence(RepositoryError::Conflict) => StatusCode::CONFLICT,
            AssemblyError::Persistence(_) => StatusCode::SERVICE_UNAVAILABLE,
        },
        IntakeError::Catalog(_) | IntakeError::Repository(_) => StatusCode::SERVICE_UNAVAILABLE,
        IntakeError::Render(RenderError::InvalidFilename(_)) => StatusCode::BAD_REQUEST,
        IntakeError::Render(RenderError::Missing(_)) => StatusCode::NOT_FOUND,
        IntakeError::Render(RenderError::Io(_)) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn error_response(error: IntakeError) -> Response {
    let status = status_for(&error);
    let mut payload = json!({
        "error": error.to_string(),
        "kind": error.kind(),
    });

    match &error {
        IntakeError::AmbiguousScheme { candidates, .. } => {
            payload["candidates"] = json!(candidates);
        }
        IntakeError::Assembly(AssemblyError::RdNumberMismatch {
            item,
            remaining_attempts,
        }) => {
            payload["item"] = json!(item);
            payload["remaining_attempts"] = json!(remaining_attempts);
        }
        IntakeError::Assembly(AssemblyError::Incomplete {
            missing_items,
            missing_documents,
        }) => {
            payload["missing_items"] = json!(missing_items);
            payload["missing_documents"] = json!(missing_documents);
        }
        _ => {}
    }

    (status, Json(payload)).into_response()
}
