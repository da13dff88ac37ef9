//! Recipe endpoint tests.
//!
//! Tests marked `#[ignore]` need MongoDB at `MONGODB_URI` (default
//! `mongodb://localhost:27017`). Run with:
//! cargo test -p recipe-service --test recipes_test -- --ignored

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use recipe_core::config::ServerConfig;
use recipe_service::config::RecipeConfig;
use recipe_service::services::providers::mock::{text_response, MockModel};
use recipe_service::services::{GenerationService, RecipeDb};
use recipe_service::{build_router, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

async fn test_app(database: &str) -> (Router, RecipeDb) {
    let uri =
        std::env::var("MONGODB_URI").unwrap_or_else(|_| "mongodb://localhost:27017".to_string());
    let database = database.to_string();
    let config = RecipeConfig::from_lookup(ServerConfig::default(), |key| match key {
        "GEMINI_API_KEY" => Some("test-api-key".to_string()),
        "MONGODB_URI" => Some(uri.clone()),
        "MONGODB_DATABASE" => Some(database.clone()),
        _ => None,
    })
    .expect("Failed to build test config");

    let db = RecipeDb::connect(&config.mongodb.uri, &config.mongodb.database)
        .await
        .expect("Failed to create MongoDB client");
    let model = MockModel::replying(text_response(&["unused"]));

    let app = build_router(AppState {
        config,
        db: db.clone(),
        generation: GenerationService::new(Arc::new(model)),
    });
    (app, db)
}

/// A fresh database per test so runs do not see each other's data.
async fn seeded_app(count: i64) -> (Router, RecipeDb) {
    let (app, db) = test_app(&format!("recipes_test_{}", Uuid::new_v4().simple())).await;
    db.initialize_indexes().await.expect("Failed to create indexes");
    for id in (1..=count).rev() {
        let recipe = serde_json::from_value(recipe_json(id)).unwrap();
        db.insert(&recipe).await.expect("Failed to seed recipe");
    }
    (app, db)
}

fn recipe_json(id: i64) -> Value {
    json!({
        "id": id,
        "title": format!("Recipe {}", id),
        "description": "A test recipe",
        "image_url": format!("https://example.com/{}.jpg", id),
        "ingredients": ["salt", "water"],
        "preparation_steps": "Mix and serve.",
        "preparation_time": "5 minutes",
        "country_of_origin": "Nowhere",
        "author": "Test Kitchen",
        "tags": ["test"],
        "category": "Testing"
    })
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn post_recipe(app: Router, body: Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/recipes/addNew")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn ids_of(body: &Value) -> Vec<i64> {
    body.as_array()
        .unwrap()
        .iter()
        .map(|recipe| recipe["id"].as_i64().unwrap())
        .collect()
}

// These run without MongoDB: input is rejected before any query.

#[tokio::test]
async fn paginate_rejects_invalid_page_or_limit() {
    for uri in [
        "/recipes/paginate?page=0",
        "/recipes/paginate?limit=-1",
        "/recipes/paginate?page=abc",
    ] {
        let (app, _) = test_app("recipes_unused").await;
        let (status, body) = get_json(app, uri).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "Invalid page or limit" }));
    }
}

#[tokio::test]
async fn ids_requires_query_param() {
    for uri in ["/recipes/ids", "/recipes/ids?ids="] {
        let (app, _) = test_app("recipes_unused").await;
        let (status, body) = get_json(app, uri).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "ids query param required");
    }
}

#[tokio::test]
async fn add_new_validates_before_insert() {
    let (app, _) = test_app("recipes_unused").await;
    let mut body = recipe_json(1);
    body["title"] = json!("");

    let (status, body) = post_recipe(app, body).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "Validation error");
}

#[tokio::test]
async fn add_new_rejects_incomplete_body() {
    let (app, _) = test_app("recipes_unused").await;

    let (status, _) = post_recipe(app, json!({ "id": 5, "title": "Half a recipe" })).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn recipes_landing_page() {
    let (app, _) = test_app("recipes_unused").await;

    let response = app
        .oneshot(Request::builder().uri("/recipes").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let html = String::from_utf8(bytes.to_vec()).unwrap();

    assert!(html.contains("Connected to the server/recipes"));
    assert!(html.contains("Development Mode"));
}

// MongoDB-backed

#[tokio::test]
#[ignore]
async fn all_returns_recipes_sorted_by_id() {
    let (app, _) = seeded_app(4).await;

    let (status, body) = get_json(app, "/recipes/all").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids_of(&body), vec![1, 2, 3, 4]);
    assert!(body[0].get("_id").is_none());
}

#[tokio::test]
#[ignore]
async fn paginate_reports_page_metadata() {
    let (app, _) = seeded_app(25).await;

    let (status, body) = get_json(app, "/recipes/paginate?page=2&limit=10").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids_of(&body["data"]), (11..=20).collect::<Vec<_>>());
    assert_eq!(body["currentPage"], 2);
    assert_eq!(body["totalPages"], 3);
    assert_eq!(body["hasNextPage"], true);
    assert_eq!(body["hasPrevPage"], true);
}

#[tokio::test]
#[ignore]
async fn random_returns_six_distinct_recipes() {
    let (app, _) = seeded_app(10).await;

    let (status, body) = get_json(app, "/recipes/random").await;

    assert_eq!(status, StatusCode::OK);
    let mut ids = ids_of(&body);
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 6);
}

#[tokio::test]
#[ignore]
async fn ids_accepts_lists_and_repeated_keys() {
    let (app, _) = seeded_app(5).await;

    let (_, body) = get_json(app.clone(), "/recipes/ids?ids=4,2,0,abc").await;
    assert_eq!(ids_of(&body), vec![2, 4]);

    let (_, body) = get_json(app, "/recipes/ids?ids[]=1&ids[]=5").await;
    assert_eq!(ids_of(&body), vec![1, 5]);
}

#[tokio::test]
#[ignore]
async fn add_new_inserts_and_rejects_duplicates() {
    let (app, _) = seeded_app(0).await;

    let (status, body) = post_recipe(app.clone(), recipe_json(42)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], 42);

    let (status, body) = post_recipe(app.clone(), recipe_json(42)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].is_string());

    let (_, body) = get_json(app, "/recipes/ids?ids=42").await;
    assert_eq!(ids_of(&body), vec![42]);
}

#[tokio::test]
#[ignore]
async fn health_pings_mongodb() {
    let (app, _) = test_app("recipes_health").await;

    let (status, body) = get_json(app, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "recipe-service");
}
