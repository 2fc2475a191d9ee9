use std::sync::Arc;

use assessment_engine::{
    routes, services::scheduler_service::SchedulerConfig, utils::time::ManualClock,
    utils::token::issue_token, AppState,
};
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use serde_json::{json, Value as JsonValue};
use tower::ServiceExt;

const SECRET: &str = "test_secret_key";

fn token(sub: &str, role: Option<&str>) -> String {
    issue_token(SECRET, sub, role, Duration::hours(1)).expect("token")
}

async fn call(
    app: &Router,
    method: &str,
    uri: &str,
    bearer: Option<&str>,
    body: Option<JsonValue>,
) -> (StatusCode, JsonValue) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(t) = bearer {
        builder = builder.header("authorization", format!("Bearer {}", t));
    }
    let req = match body {
        Some(b) => builder
            .header("content-type", "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        JsonValue::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(JsonValue::Null)
    };
    (status, value)
}

fn test_body() -> JsonValue {
    let now = Utc::now();
    json!({
        "class_id": "11C",
        "subject": "Chemistry",
        "title": "Acids and bases",
        "kind": "TEST",
        "duration_minutes": 15,
        "window_start": now - Duration::hours(1),
        "window_end": now + Duration::hours(3),
        "max_tab_switches": 2,
        "questions": [
            {
                "prompt": "pH of pure water?",
                "points": 2,
                "type": "MULTIPLE_CHOICE",
                "options": ["5", "7", "9"],
                "correct_option_index": 1
            },
            {
                "prompt": "Explain buffers",
                "points": 4,
                "type": "ESSAY",
                "min_words": 40
            }
        ]
    })
}

#[tokio::test]
async fn attempt_flow_over_http() {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let state = AppState::in_memory(clock.clone(), SchedulerConfig::default(), SECRET);
    let app = routes::router(state);

    let teacher = token("teacher-9", Some("teacher"));
    let student = token("student-1", Some("student"));
    let intruder = token("student-2", Some("student"));

    let (status, _) = call(&app, "POST", "/api/tests", None, Some(test_body())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = call(&app, "POST", "/api/tests", Some(&student), Some(test_body())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, created) =
        call(&app, "POST", "/api/tests", Some(&teacher), Some(test_body())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["total_points"], 6);
    assert_eq!(created["created_by"], "teacher-9");
    let test_id = created["id"].as_str().unwrap().to_string();

    let (status, listed) = call(
        &app,
        "GET",
        "/api/public/tests?class_id=11C",
        Some(&student),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert!(!listed.to_string().contains("correct_option_index"));

    let (status, attempt) = call(
        &app,
        "POST",
        &format!("/api/public/tests/{}/start", test_id),
        Some(&student),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(attempt["status"], "IN_PROGRESS");
    assert!(!attempt.to_string().contains("correct_option_index"));
    let attempt_id = attempt["id"].as_str().unwrap().to_string();

    let (status, _) = call(
        &app,
        "GET",
        &format!("/api/public/attempts/{}", attempt_id),
        Some(&intruder),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, saved) = call(
        &app,
        "PATCH",
        &format!("/api/public/attempts/{}/answer", attempt_id),
        Some(&student),
        Some(json!({ "question_id": 1, "value": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(saved["saved"], true);

    let (status, _) = call(
        &app,
        "PATCH",
        &format!("/api/public/attempts/{}/answer", attempt_id),
        Some(&student),
        Some(json!({ "question_id": 1, "value": "seven" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    for _ in 0..3 {
        call(
            &app,
            "POST",
            &format!("/api/public/attempts/{}/integrity-events", attempt_id),
            Some(&student),
            Some(json!({ "type": "TAB_SWITCH" })),
        )
        .await;
    }
    let (status, counts) = call(
        &app,
        "GET",
        &format!("/api/public/attempts/{}/status", attempt_id),
        Some(&student),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(counts["answered_count"], 1);
    assert_eq!(counts["total_questions"], 2);
    assert_eq!(counts["telemetry"]["tab_switch_count"], 3);
    assert_eq!(counts["telemetry"]["tab_switch_warning"], true);

    clock.advance(Duration::minutes(10));
    let (status, result) = call(
        &app,
        "POST",
        &format!("/api/public/attempts/{}/submit", attempt_id),
        Some(&student),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["earned_points"], 2);
    assert_eq!(result["needs_manual_grading"], true);

    let (status, body) = call(
        &app,
        "PATCH",
        &format!("/api/public/attempts/{}/answer", attempt_id),
        Some(&student),
        Some(json!({ "question_id": 2, "value": "late" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    let (status, graded) = call(
        &app,
        "POST",
        &format!("/api/attempts/{}/grade-essay", attempt_id),
        Some(&teacher),
        Some(json!({ "question_id": 2, "points": 9 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(graded["error"], "validation_error");

    let (status, graded) = call(
        &app,
        "POST",
        &format!("/api/attempts/{}/grade-essay", attempt_id),
        Some(&teacher),
        Some(json!({ "question_id": 2, "points": 4, "feedback": "Thorough" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(graded["earned_points"], 6);
    assert_eq!(graded["needs_manual_grading"], false);

    let (status, snapshot) = call(
        &app,
        "GET",
        &format!("/api/tests/{}/analytics", test_id),
        Some(&teacher),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(snapshot["submitted_count"], 1);
    assert_eq!(snapshot["highest_score"], 6);
    assert_eq!(snapshot["cheating_flag_count"], 1);
    assert_eq!(snapshot["questions"][0]["correct_rate"], 100.0);
    assert!(snapshot["questions"][1]["correct_rate"].is_null());

    let (status, health) = call(&app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["hosted_sessions"], 0);
}

#[tokio::test]
async fn starting_before_the_window_is_forbidden() {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let state = AppState::in_memory(clock.clone(), SchedulerConfig::default(), SECRET);
    let app = routes::router(state);
    let teacher = token("teacher-1", Some("admin"));
    let student = token("student-1", None);

    let mut body = test_body();
    let now = Utc::now();
    body["window_start"] = json!(now + Duration::hours(2));
    body["window_end"] = json!(now + Duration::hours(4));
    let (status, created) = call(&app, "POST", "/api/tests", Some(&teacher), Some(body)).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, err) = call(
        &app,
        "POST",
        &format!("/api/public/tests/{}/start", created["id"].as_str().unwrap()),
        Some(&student),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(err["error"], "window_not_open");

    let (status, _) = call(
        &app,
        "DELETE",
        &format!("/api/tests/{}", created["id"].as_str().unwrap()),
        Some(&teacher),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}
