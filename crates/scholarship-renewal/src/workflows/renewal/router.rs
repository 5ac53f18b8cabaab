use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;

use super::chain::RenewalForm;
use super::domain::{ApplicationId, NewScholarship, ScholarshipId, UserId};
use super::repository::{NotificationSink, RenewalStore, RepositoryError};
use super::service::{RenewalService, RenewalServiceError};

/// Router builder exposing the engine's entry points over HTTP.
pub fn renewal_router<R, N>(service: Arc<RenewalService<R, N>>) -> Router
where
    R: RenewalStore + 'static,
    N: NotificationSink + 'static,
{
    Router::new()
        .route("/api/v1/users/:user_id/scan", post(scan_handler::<R, N>))
        .route(
            "/api/v1/users/:user_id/applications",
            get(user_applications_handler::<R, N>),
        )
        .route(
            "/api/v1/users/:user_id/scholarships/:scholarship_id/renewal-failed",
            post(renewal_failed_handler::<R, N>),
        )
        .route("/api/v1/scholarships", post(register_scholarship_handler::<R, N>))
        .route(
            "/api/v1/scholarships/:scholarship_id/next-semester",
            put(next_semester_handler::<R, N>),
        )
        .route(
            "/api/v1/scholarships/:scholarship_id/approval-check",
            get(approval_check_handler::<R, N>),
        )
        .route("/api/v1/applications", post(submit_handler::<R, N>))
        .route(
            "/api/v1/applications/:application_id",
            get(application_handler::<R, N>),
        )
        .route(
            "/api/v1/applications/:application_id/renewal-eligibility",
            get(eligibility_handler::<R, N>),
        )
        .route(
            "/api/v1/applications/:application_id/renewals",
            post(create_renewal_handler::<R, N>),
        )
        .route(
            "/api/v1/applications/:application_id/approve",
            post(approve_handler::<R, N>),
        )
        .route(
            "/api/v1/applications/:application_id/reject",
            post(reject_handler::<R, N>),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubmitApplicationRequest {
    pub(crate) user_id: UserId,
    pub(crate) scholarship_id: ScholarshipId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NextSemesterRequest {
    pub(crate) next_last_semester_date: NaiveDate,
}

pub(crate) async fn scan_handler<R, N>(
    State(service): State<Arc<RenewalService<R, N>>>,
    Path(user_id): Path<u64>,
) -> Response
where
    R: RenewalStore + 'static,
    N: NotificationSink + 'static,
{
    let report = service.trigger_scan(UserId(user_id));
    (StatusCode::OK, Json(report)).into_response()
}

/// Applications page: scan first so the listing reflects any rollover that just came due.
pub(crate) async fn user_applications_handler<R, N>(
    State(service): State<Arc<RenewalService<R, N>>>,
    Path(user_id): Path<u64>,
) -> Response
where
    R: RenewalStore + 'static,
    N: NotificationSink + 'static,
{
    let user_id = UserId(user_id);
    service.trigger_scan(user_id);
    match service.applications_for(user_id) {
        Ok(views) => (StatusCode::OK, Json(views)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn renewal_failed_handler<R, N>(
    State(service): State<Arc<RenewalService<R, N>>>,
    Path((user_id, scholarship_id)): Path<(u64, u64)>,
) -> Response
where
    R: RenewalStore + 'static,
    N: NotificationSink + 'static,
{
    match service.record_renewal_failure(UserId(user_id), ScholarshipId(scholarship_id)) {
        Ok(application) => (StatusCode::OK, Json(application.view())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn register_scholarship_handler<R, N>(
    State(service): State<Arc<RenewalService<R, N>>>,
    Json(draft): Json<NewScholarship>,
) -> Response
where
    R: RenewalStore + 'static,
    N: NotificationSink + 'static,
{
    match service.register_scholarship(draft) {
        Ok(scholarship) => (StatusCode::CREATED, Json(scholarship)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn next_semester_handler<R, N>(
    State(service): State<Arc<RenewalService<R, N>>>,
    Path(scholarship_id): Path<u64>,
    Json(request): Json<NextSemesterRequest>,
) -> Response
where
    R: RenewalStore + 'static,
    N: NotificationSink + 'static,
{
    match service.schedule_next_semester(
        ScholarshipId(scholarship_id),
        request.next_last_semester_date,
    ) {
        Ok(scholarship) => (StatusCode::OK, Json(scholarship)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn approval_check_handler<R, N>(
    State(service): State<Arc<RenewalService<R, N>>>,
    Path(scholarship_id): Path<u64>,
) -> Response
where
    R: RenewalStore + 'static,
    N: NotificationSink + 'static,
{
    match service.validate_approval(ScholarshipId(scholarship_id)) {
        Ok(()) => (StatusCode::OK, Json(json!({ "approvable": true }))).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn submit_handler<R, N>(
    State(service): State<Arc<RenewalService<R, N>>>,
    Json(request): Json<SubmitApplicationRequest>,
) -> Response
where
    R: RenewalStore + 'static,
    N: NotificationSink + 'static,
{
    match service.submit_application(request.user_id, request.scholarship_id) {
        Ok(application) => (StatusCode::CREATED, Json(application.view())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn application_handler<R, N>(
    State(service): State<Arc<RenewalService<R, N>>>,
    Path(application_id): Path<u64>,
) -> Response
where
    R: RenewalStore + 'static,
    N: NotificationSink + 'static,
{
    match service.application(ApplicationId(application_id)) {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn eligibility_handler<R, N>(
    State(service): State<Arc<RenewalService<R, N>>>,
    Path(application_id): Path<u64>,
) -> Response
where
    R: RenewalStore + 'static,
    N: NotificationSink + 'static,
{
    match service.is_eligible_for_renewal(ApplicationId(application_id)) {
        Ok(eligibility) => {
            let payload = json!({
                "application_id": ApplicationId(application_id),
                "eligible": eligibility.eligible,
                "reason": eligibility.summary(),
                "detail": eligibility.reason,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn create_renewal_handler<R, N>(
    State(service): State<Arc<RenewalService<R, N>>>,
    Path(application_id): Path<u64>,
    Json(form): Json<RenewalForm>,
) -> Response
where
    R: RenewalStore + 'static,
    N: NotificationSink + 'static,
{
    match service.create_renewal(ApplicationId(application_id), form) {
        Ok(renewal) => (StatusCode::CREATED, Json(renewal.view())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn approve_handler<R, N>(
    State(service): State<Arc<RenewalService<R, N>>>,
    Path(application_id): Path<u64>,
) -> Response
where
    R: RenewalStore + 'static,
    N: NotificationSink + 'static,
{
    match service.approve_application(ApplicationId(application_id)) {
        Ok(application) => (StatusCode::OK, Json(application.view())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn reject_handler<R, N>(
    State(service): State<Arc<RenewalService<R, N>>>,
    Path(application_id): Path<u64>,
) -> Response
where
    R: RenewalStore + 'static,
    N: NotificationSink + 'static,
{
    match service.reject_application(ApplicationId(application_id)) {
        Ok(application) => (StatusCode::OK, Json(application.view())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) fn error_response(error: RenewalServiceError) -> Response {
    let status = match &error {
        RenewalServiceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        RenewalServiceError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        RenewalServiceError::Repository(RepositoryError::Conflict)
        | RenewalServiceError::Repository(RepositoryError::Constraint(_)) => StatusCode::CONFLICT,
        RenewalServiceError::Repository(RepositoryError::Unavailable(_))
        | RenewalServiceError::Integrity(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let payload = json!({ "error": error.to_string() });
    (status, Json(payload)).into_response()
}
