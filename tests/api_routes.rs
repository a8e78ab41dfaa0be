use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::util::ServiceExt;

use cladari_lineage::config::LineageConfig;
use cladari_lineage::routes::create_router;
use cladari_lineage::{FixedClock, LineageService, MemoryStore};

fn app() -> Router {
    let clock = FixedClock(Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap());
    let service = LineageService::new(Arc::new(MemoryStore::new()), &LineageConfig::default())
        .with_clock(Arc::new(clock));
    create_router::<MemoryStore>().with_state(Arc::new(service))
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn create_cross(app: &Router) -> Value {
    let (_, mother) = send(app, "POST", "/plants", Some(json!({"hybrid_name": "Crystallinum"}))).await;
    let (_, father) = send(app, "POST", "/plants", Some(json!({"species": "A. magnificum"}))).await;
    let (status, cross) = send(
        app,
        "POST",
        "/breeding",
        Some(json!({
            "female_plant_id": mother["id"],
            "male_plant_id": father["id"],
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    cross
}

#[tokio::test]
async fn test_health() {
    let app = app();
    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_register_and_fetch_plant() {
    let app = app();
    let (status, plant) = send(&app, "POST", "/plants", Some(json!({"hybrid_name": "Dark Mama"}))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(plant["plant_id"], "ANT-2025-0001");

    let uri = format!("/plants/{}", plant["id"].as_str().unwrap());
    let (status, fetched) = send(&app, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, plant);
}

#[tokio::test]
async fn test_unknown_plant_is_not_found() {
    let app = app();
    let (status, body) = send(&app, "GET", "/plants/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not_found");
}

#[tokio::test]
async fn test_cross_with_missing_parent_is_not_found() {
    let app = app();
    let (status, body) = send(
        &app,
        "POST",
        "/breeding",
        Some(json!({"female_plant_id": "ghost", "male_plant_id": "ghost"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not_found");
}

#[tokio::test]
async fn test_harvest_routes() {
    let app = app();
    let cross = create_cross(&app).await;
    assert_eq!(cross["cross_id"], "CLX-2025-001");
    let base = format!("/breeding/{}/harvests", cross["id"].as_str().unwrap());

    let (status, next) = send(&app, "GET", &format!("{}/next-number", base), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(next["next_harvest_number"], 1);

    let (status, first) = send(&app, "POST", &base, Some(json!({"seed_count": 40}))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["harvest_number"], 1);

    let (status, body) = send(&app, "POST", &base, Some(json!({"harvest_number": 1}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "conflict");

    let (status, body) = send(&app, "POST", &base, Some(json!({"harvest_number": 0}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation");

    let first_uri = format!("{}/{}", base, first["id"].as_str().unwrap());
    let (status, _) = send(&app, "DELETE", &first_uri, None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, "GET", &first_uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, next) = send(&app, "GET", &format!("{}/next-number", base), None).await;
    assert_eq!(next["next_harvest_number"], 2);

    let (status, list) = send(&app, "GET", &base, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["total"], 0);
}

#[tokio::test]
async fn test_cross_detail_and_yield() {
    let app = app();
    let cross = create_cross(&app).await;
    let cross_uri = format!("/breeding/{}", cross["id"].as_str().unwrap());
    send(&app, "POST", &format!("{}/harvests", cross_uri), Some(json!({"seed_count": 12}))).await;
    send(&app, "POST", &format!("{}/harvests", cross_uri), Some(json!({"seed_count": 30}))).await;

    let (status, detail) = send(&app, "GET", &cross_uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["cross_id"], "CLX-2025-001");
    assert_eq!(detail["summary"]["total_harvests"], 2);
    assert_eq!(detail["summary"]["total_seeds"], 42);

    let (status, report) = send(&app, "GET", &format!("{}/yield", cross_uri), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["year"], 2025);
    assert_eq!(report["seeds"], 42);

    let (status, list) = send(&app, "GET", "/breeding", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["total"], 1);
    assert_eq!(list["items"][0]["summary"]["total_harvests"], 2);
}

#[tokio::test]
async fn test_flowering_upsert() {
    let app = app();
    let (_, plant) = send(&app, "POST", "/plants", Some(json!({}))).await;
    let uri = format!("/plants/{}/flowering", plant["id"].as_str().unwrap());

    let (status, cycle) = send(
        &app,
        "POST",
        &uri,
        Some(json!({"spathe_emergence": "2025-05-01T00:00:00Z"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(cycle["stage"], "emerged");

    let (status, cycle) = send(
        &app,
        "POST",
        &uri,
        Some(json!({"id": cycle["id"], "female_start": "2025-05-03T00:00:00Z"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cycle["stage"], "female_receptive");

    let (status, body) = send(
        &app,
        "PATCH",
        &format!("{}/{}", uri, cycle["id"].as_str().unwrap()),
        Some(json!({"male_start": "2025-04-28T00:00:00Z"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation");

    let (status, list) = send(&app, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["total"], 1);
    assert_eq!(list["items"][0]["male_start"], Value::Null);
}

#[tokio::test]
async fn test_seed_batch_and_seedling_routes() {
    let app = app();
    let cross = create_cross(&app).await;
    let (_, harvest) = send(
        &app,
        "POST",
        &format!("/breeding/{}/harvests", cross["id"].as_str().unwrap()),
        Some(json!({"seed_count": 20})),
    )
    .await;

    let (status, batch) = send(
        &app,
        "POST",
        "/seed-batches",
        Some(json!({"harvest_id": harvest["id"], "seed_count": 20})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(batch["batch_id"], "SDB-2025-001");
    assert_eq!(batch["status"], "SOWN");

    let (status, seedling) = send(
        &app,
        "POST",
        "/seedlings",
        Some(json!({"seed_batch_id": batch["id"], "position_label": "A1"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(seedling["seedling_id"], "SDL-2025-0001");

    let batch_uri = format!("/seed-batches/{}", batch["id"].as_str().unwrap());
    let (status, summary) = send(&app, "GET", &batch_uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["status"], "GERMINATING");
    assert_eq!(summary["seedling_count"], 1);

    let (status, body) = send(&app, "DELETE", &batch_uri, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "conflict");

    let (status, list) = send(
        &app,
        "GET",
        &format!("/seed-batches?harvest_id={}", harvest["id"].as_str().unwrap()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["total"], 1);
}

#[tokio::test]
async fn test_seed_batch_for_missing_harvest() {
    let app = app();
    let (status, body) = send(
        &app,
        "POST",
        "/seed-batches",
        Some(json!({"harvest_id": "missing"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not_found");
}

#[tokio::test]
async fn test_seedling_collection_routes() {
    let app = app();
    let cross = create_cross(&app).await;
    let (_, harvest) = send(
        &app,
        "POST",
        &format!("/breeding/{}/harvests", cross["id"].as_str().unwrap()),
        Some(json!({"seed_count": 30})),
    )
    .await;
    let (_, batch) = send(&app, "POST", "/seed-batches", Some(json!({"harvest_id": harvest["id"]}))).await;

    // Later entries fall back to the first entry's batch
    let (status, created) = send(
        &app,
        "POST",
        "/seedlings",
        Some(json!([
            {"seed_batch_id": batch["id"], "position_label": "A1"},
            {"position_label": "A2", "selection_status": "KEEPER"},
            {"position_label": "A3", "health_status": "STRESSED"},
        ])),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let created = created.as_array().unwrap().clone();
    let ids: Vec<&str> = created.iter().map(|s| s["seedling_id"].as_str().unwrap()).collect();
    assert_eq!(ids, ["SDL-2025-0001", "SDL-2025-0002", "SDL-2025-0003"]);
    assert!(created.iter().all(|s| s["seed_batch_id"] == batch["id"]));

    let (status, body) = send(&app, "POST", "/seedlings", Some(json!([]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation");
    let (status, _) = send(&app, "POST", "/seedlings", Some(json!([{"position_label": "B1"}]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let batch_key = batch["id"].as_str().unwrap();
    let (status, list) = send(&app, "GET", &format!("/seedlings?seed_batch_id={}", batch_key), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["total"], 3);
    let (_, keepers) = send(
        &app,
        "GET",
        &format!("/seedlings?seed_batch_id={}&selection_status=KEEPER", batch_key),
        None,
    )
    .await;
    assert_eq!(keepers["total"], 1);
    assert_eq!(keepers["items"][0]["position_label"], "A2");
    let (_, stressed) = send(&app, "GET", "/seedlings?health_status=STRESSED", None).await;
    assert_eq!(stressed["items"][0]["seedling_id"], "SDL-2025-0003");

    let cull_uri = format!("/seedlings/{}", created[2]["id"].as_str().unwrap());
    let (status, body) = send(&app, "DELETE", &cull_uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], created[2]["id"]);
    let (status, _) = send(&app, "DELETE", &cull_uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // A single object in, a single object out, and the deleted number stays retired
    let (status, single) = send(
        &app,
        "POST",
        "/seedlings",
        Some(json!({"seed_batch_id": batch["id"], "position_label": "A4"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(single["seedling_id"], "SDL-2025-0004");

    let keeper_uri = format!("/seedlings/{}", created[1]["id"].as_str().unwrap());
    let (status, _) = send(&app, "POST", &format!("{}/graduate", keeper_uri), Some(json!({}))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(&app, "PATCH", &keeper_uri, Some(json!({"position_label": "shelf 2"}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "conflict");
    let (status, noted) = send(&app, "PATCH", &keeper_uri, Some(json!({"notes": "first bloom due"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(noted["notes"], "first bloom due");
    assert_eq!(noted["position_label"], "A2");

    let (status, body) = send(&app, "DELETE", &keeper_uri, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "conflict");
}
