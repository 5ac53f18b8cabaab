use super::common::*;
use axum::extract::{Path, State};
use axum::http::{header, Request, StatusCode};
use axum::body::Body;
use serde_json::json;
use std::sync::Arc;
use tower::ServiceExt;

use crate::workflows::renewal::chain::RenewalForm;
use crate::workflows::renewal::domain::{ApplicationStatus, NotificationKind};
use crate::workflows::renewal::repository::RepositoryError;
use crate::workflows::renewal::router::{self, error_response, renewal_router};
use crate::workflows::renewal::service::RenewalServiceError;

#[tokio::test]
async fn create_renewal_handler_returns_unprocessable_outside_window() {
    let harness = build_service();
    let scholarship = scholarship(&harness.store, 60, None);
    let tip = award(&harness.store, STUDENT, &scholarship);

    let response = router::create_renewal_handler(
        State(Arc::new(harness.service)),
        Path(tip.id.0),
        axum::Json(RenewalForm::default()),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = read_json_body(response).await;
    assert!(body["error"]
        .as_str()
        .expect("error message")
        .contains("not eligible for renewal"));
}

#[tokio::test]
async fn application_handler_returns_not_found() {
    let harness = build_service();

    let response =
        router::application_handler(State(Arc::new(harness.service)), Path(404)).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn application_handler_returns_internal_error_when_store_is_down() {
    let response =
        router::application_handler(State(Arc::new(unavailable_service())), Path(1)).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn scan_handler_succeeds_even_when_store_is_down() {
    let response = router::scan_handler(State(Arc::new(unavailable_service())), Path(7)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["aborted"], json!(true));
}

#[test]
fn conflicts_map_to_409() {
    let conflict = error_response(RenewalServiceError::Repository(RepositoryError::Conflict));
    let constraint = error_response(RenewalServiceError::Repository(
        RepositoryError::Constraint("duplicate renewal".to_string()),
    ));

    assert_eq!(conflict.status(), StatusCode::CONFLICT);
    assert_eq!(constraint.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn register_route_accepts_payloads() {
    let harness = build_service();
    let router = renewal_router(Arc::new(harness.service));

    let response = router
        .oneshot(
            Request::post("/api/v1/scholarships")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({
                        "title": "Community Leaders Award",
                        "semester_date": "2026-05-15",
                    })
                    .to_string(),
                ))
                .expect("request builds"),
        )
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_json_body(response).await;
    assert_eq!(body["title"], json!("Community Leaders Award"));
    assert_eq!(body["next_last_semester_date"], json!(null));
    assert_eq!(body["is_active"], json!(true));
}

#[tokio::test]
async fn eligibility_route_reports_reason() {
    let harness = build_service();
    let scholarship = scholarship(&harness.store, 12, None);
    let tip = award(&harness.store, STUDENT, &scholarship);
    let router = renewal_router(Arc::new(harness.service));

    let response = router
        .oneshot(
            Request::get(format!(
                "/api/v1/applications/{}/renewal-eligibility",
                tip.id.0
            ))
            .body(Body::empty())
            .expect("request builds"),
        )
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["eligible"], json!(true));
    assert_eq!(body["detail"]["code"], json!("eligible"));
    assert_eq!(body["detail"]["days_remaining"], json!(12));
}

#[tokio::test]
async fn approval_check_route_flags_missing_next_semester() {
    let harness = build_service();
    let scholarship = scholarship(&harness.store, 12, None);
    let router = renewal_router(Arc::new(harness.service));

    let response = router
        .oneshot(
            Request::get(format!(
                "/api/v1/scholarships/{}/approval-check",
                scholarship.id.0
            ))
            .body(Body::empty())
            .expect("request builds"),
        )
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn applications_route_scans_before_listing() {
    let harness = build_service();
    let scholarship = scholarship(&harness.store, -1, Some(190));
    let tip = award(&harness.store, STUDENT, &scholarship);
    let renewal = renewal_of(&harness.store, &tip, ApplicationStatus::Approved);
    let store = harness.store.clone();
    let sink = harness.sink.clone();
    let router = renewal_router(Arc::new(harness.service));

    let response = router
        .oneshot(
            Request::get(format!("/api/v1/users/{}/applications", STUDENT.0))
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    let listed = body.as_array().expect("array of applications");
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0]["status"], json!("completed"));
    assert_eq!(listed[1]["is_active"], json!(true));
    assert!(reload(&store, renewal.id).is_current());
    assert_eq!(sink.count(tip.id, NotificationKind::Expired), 1);
}

#[tokio::test]
async fn renewal_and_review_routes_round_trip() {
    let harness = build_service();
    let scholarship = scholarship(&harness.store, 10, Some(190));
    let tip = award(&harness.store, STUDENT, &scholarship);
    let router = renewal_router(Arc::new(harness.service));

    let created = router
        .clone()
        .oneshot(
            Request::post(format!("/api/v1/applications/{}/renewals", tip.id.0))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "statement": "GPA 3.8" }).to_string()))
                .expect("request builds"),
        )
        .await
        .expect("router responds");
    assert_eq!(created.status(), StatusCode::CREATED);
    let renewal = read_json_body(created).await;
    assert_eq!(renewal["is_renewal"], json!(true));
    let renewal_id = renewal["application_id"].as_u64().expect("numeric id");

    let approved = router
        .oneshot(
            Request::post(format!("/api/v1/applications/{renewal_id}/approve"))
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("router responds");
    assert_eq!(approved.status(), StatusCode::OK);
    let body = read_json_body(approved).await;
    assert_eq!(body["status"], json!("approved"));
    assert_eq!(body["is_active"], json!(false));
}
