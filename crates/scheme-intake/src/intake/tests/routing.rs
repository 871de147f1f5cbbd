use super::common::*;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::intake::router::{intake_router, run_blocking, status_handler};
use crate::intake::service::IntakeError;

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request builds")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request builds")
}

#[tokio::test]
async fn scheme_search_without_match_is_not_an_error() {
    let fixture = build_service();
    let response = intake_router(fixture.service)
        .oneshot(get("/api/v1/schemes?name=pension"))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["message"], "No schemes found matching your criteria.");
    assert_eq!(body["schemes"], json!([]));
}

#[tokio::test]
async fn discover_route_applies_consented_profile() {
    let fixture = build_service();
    let response = intake_router(fixture.service)
        .oneshot(post_json(
            "/api/v1/schemes/discover",
            json!({
                "national_id": NATIONAL_ID,
                "consent": { "granted": true, "otp": OTP }
            }),
        ))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["mode"], "personalized");
    assert_eq!(body["schemes"][0]["name"], "Gruha Lakshmi");
}

#[tokio::test]
async fn malformed_otp_maps_to_unprocessable() {
    let fixture = build_service();
    let response = intake_router(fixture.service)
        .oneshot(post_json(
            "/api/v1/schemes/discover",
            json!({
                "national_id": NATIONAL_ID,
                "consent": { "granted": true, "otp": "12ab56" }
            }),
        ))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = read_json_body(response).await;
    assert_eq!(body["kind"], "invalid_otp");
}

#[tokio::test]
async fn draft_lifecycle_over_http() {
    let fixture = build_service();
    let router = intake_router(fixture.service.clone());

    let response = router
        .clone()
        .oneshot(post_json(
            "/api/v1/drafts",
            json!({
                "national_id": NATIONAL_ID,
                "scheme_name": "Gruha Lakshmi",
                "consent": { "granted": true, "otp": OTP }
            }),
        ))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_json_body(response).await;
    assert_eq!(body["state"], "collecting_info");
    assert_eq!(body["next_prompt"]["kind"], "information");
    assert_eq!(body["next_prompt"]["item"], "Phone");
    let draft_id = body["draft_id"].as_str().expect("draft id").to_string();

    let response = router
        .clone()
        .oneshot(post_json(
            &format!("/api/v1/drafts/{draft_id}/items"),
            json!({ "item": "Caste Certificate RD Number", "value": "CC999" }),
        ))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = read_json_body(response).await;
    assert_eq!(body["kind"], "rd_number_mismatch");
    assert_eq!(body["remaining_attempts"], 4);

    let response = router
        .clone()
        .oneshot(post_json(&format!("/api/v1/drafts/{draft_id}/confirm"), json!({})))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::PRECONDITION_FAILED);
    let body = read_json_body(response).await;
    assert_eq!(body["missing_items"], json!(["Phone", "Caste Certificate RD Number"]));

    for (item, value) in [("Phone", "9876543210"), ("Caste Certificate RD Number", "CC123")] {
        let response = router
            .clone()
            .oneshot(post_json(
                &format!("/api/v1/drafts/{draft_id}/items"),
                json!({ "item": item, "value": value }),
            ))
            .await
            .expect("router responds");
        assert_eq!(response.status(), StatusCode::OK);
    }
    for document in ["Income Certificate", "Ration Card"] {
        let response = router
            .clone()
            .oneshot(post_json(
                &format!("/api/v1/drafts/{draft_id}/documents"),
                json!({ "document": document }),
            ))
            .await
            .expect("router responds");
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = router
        .clone()
        .oneshot(post_json(&format!("/api/v1/drafts/{draft_id}/confirm"), json!({})))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_json_body(response).await;
    assert_eq!(body["status"], "Submitted");
    let application_id = body["application_id"].as_str().expect("id").to_string();
    assert_eq!(
        body["download_url"],
        format!("/download/application/{application_id}.pdf")
    );

    let response = router
        .clone()
        .oneshot(get(&format!("/api/v1/applications/{application_id}")))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["scheme_name"], "Gruha Lakshmi");
    assert_eq!(body["status"], "Submitted");

    let response = router
        .oneshot(get(&format!("/download/application/{application_id}.pdf")))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/pdf"
    );
}

#[tokio::test]
async fn cancel_route_closes_draft() {
    let fixture = build_service();
    let router = intake_router(fixture.service.clone());

    let response = router
        .clone()
        .oneshot(post_json(
            "/api/v1/drafts",
            json!({ "national_id": NATIONAL_ID, "scheme_name": "Gruha Lakshmi" }),
        ))
        .await
        .expect("router responds");
    let body = read_json_body(response).await;
    let draft_id = body["draft_id"].as_str().expect("draft id").to_string();

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/v1/drafts/{draft_id}"))
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json_body(response).await["state"], "cancelled");

    let response = router
        .oneshot(get(&format!("/api/v1/drafts/{draft_id}")))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn traversal_filenames_are_bad_requests() {
    let fixture = build_service();
    let response = intake_router(fixture.service)
        .oneshot(get("/download/application/..%5Cusers.db"))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn status_handler_returns_not_found_for_unknown_id() {
    let fixture = build_service();
    let response = status_handler(State(fixture.service), Path("missing".to_string())).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = read_json_body(response).await;
    assert_eq!(body["kind"], "application_not_found");
}

#[tokio::test]
async fn blocking_work_runs_off_the_async_worker() {
    let fixture = build_service();
    let (release, released) = std::sync::mpsc::channel::<()>();
    let pending = tokio::spawn(run_blocking(fixture.service, move |service| {
        let unblocked = released
            .recv_timeout(std::time::Duration::from_secs(5))
            .is_ok();
        Ok((unblocked, service.list_schemes()?.len()))
    }));

    tokio::task::yield_now().await;
    release.send(()).expect("worker still waiting");

    let outcome = pending.await.expect("task joins");
    assert_eq!(outcome.ok(), Some((true, 3)));
}

#[tokio::test]
async fn panicking_service_call_becomes_internal_error() {
    let fixture = build_service();
    let outcome = run_blocking(fixture.service, |_| -> Result<(), IntakeError> {
        panic!("renderer crashed")
    })
    .await;

    let response = outcome.expect_err("panic surfaces as a response");
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = read_json_body(response).await;
    assert_eq!(body["kind"], "internal");
}
