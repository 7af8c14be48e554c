//! In-process mock of the AnimaForge REST API.
//!
//! Every request is logged (method, path, query, Authorization header) so
//! tests can count network fetches per key.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use animaforge_client::{AppContext, ClientConfig, MemoryStorage};
use axum::extract::{Multipart, Path, Request, State};
use axum::http::{HeaderMap, StatusCode, header::AUTHORIZATION};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::{Value, json};

pub const VALID_TOKEN: &str = "t1";

#[derive(Debug, Clone)]
pub struct Hit {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
}

#[derive(Default)]
pub struct Recorded {
    pub hits: Mutex<Vec<Hit>>,
    /// Multipart parts of the last `POST /animations`: (name, text or file name).
    pub upload: Mutex<Vec<(String, String)>>,
}

pub struct MockApi {
    pub base_url: String,
    pub recorded: Arc<Recorded>,
}

impl MockApi {
    pub async fn start() -> Self {
        let recorded = Arc::new(Recorded::default());
        let api = Router::new()
            .route("/auth/login", post(login))
            .route("/auth/register", post(register))
            .route("/auth/me", get(me))
            .route("/auth/logout", post(|| async { StatusCode::NO_CONTENT }))
            .route("/animations", get(list_animations).post(create_animation))
            .route("/animations/{id}", get(get_animation).put(update_animation).delete(|| async { StatusCode::NO_CONTENT }))
            .route("/animations/{id}/like", post(|| async { Json(json!({ "message": "liked" })) }))
            .route("/animations/{id}/download", get(download))
            .route("/users/me", put(update_me))
            .route("/users/{username}", get(user_profile))
            .route("/users/{username}/animations", get(user_animations))
            .route("/marketplace/{feed}", get(marketplace))
            .with_state(recorded.clone());
        let app = Router::new()
            .nest("/api", api)
            .layer(middleware::from_fn_with_state(recorded.clone(), record));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url: format!("http://{addr}/api"), recorded }
    }

    pub fn config(&self) -> ClientConfig {
        ClientConfig::with_api_url(&self.base_url).unwrap()
    }

    /// Context over fresh in-memory storage, without reconciling.
    pub fn context(&self, config: ClientConfig) -> (AppContext, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        (AppContext::new(config, storage.clone()).unwrap(), storage)
    }

    pub fn hits(&self) -> Vec<Hit> {
        self.recorded.hits.lock().unwrap().clone()
    }

    /// Requests matching `method` and exact `path` (relative to `/api`).
    pub fn count(&self, method: &str, path: &str) -> usize {
        let full = format!("/api{path}");
        self.hits().iter().filter(|hit| hit.method == method && hit.path == full).count()
    }

    pub fn last_authorization(&self) -> Option<String> {
        self.hits().last().and_then(|hit| hit.authorization.clone())
    }

    pub fn upload(&self) -> Vec<(String, String)> {
        self.recorded.upload.lock().unwrap().clone()
    }
}

async fn record(State(recorded): State<Arc<Recorded>>, request: Request, next: Next) -> Response {
    let hit = Hit {
        method: request.method().to_string(),
        path: request.uri().path().to_owned(),
        query: request.uri().query().map(str::to_owned),
        authorization: request.headers().get(AUTHORIZATION).and_then(|v| v.to_str().ok()).map(str::to_owned),
    };
    recorded.hits.lock().unwrap().push(hit);
    next.run(request).await
}

// =============================================================================
// FIXTURES
// =============================================================================

pub fn user_json(username: &str) -> Value {
    json!({
        "id": format!("u-{username}"),
        "username": username,
        "email": format!("{username}@b.com"),
        "createdAt": "2024-01-01T00:00:00Z"
    })
}

pub fn animation_json(id: &str) -> Value {
    json!({
        "id": id,
        "title": format!("Animation {id}"),
        "description": "",
        "videoUrl": format!("https://cdn.test/v/{id}.mp4"),
        "thumbnail": format!("https://cdn.test/t/{id}.jpg"),
        "creator": { "username": "a" },
        "views": 10,
        "likes": 1,
        "tags": ["anime"],
        "category": "Anime",
        "duration": "5s",
        "resolution": "1080p",
        "fps": 24,
        "createdAt": "2024-01-01T00:00:00Z",
        "updatedAt": "2024-01-02T00:00:00Z"
    })
}

fn page_json(ids: &[&str]) -> Value {
    let data: Vec<Value> = ids.iter().map(|id| animation_json(id)).collect();
    json!({
        "data": data,
        "pagination": { "page": 1, "limit": 12, "total": ids.len(), "totalPages": 1 }
    })
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers.get(AUTHORIZATION)?.to_str().ok()?.strip_prefix("Bearer ")
}

fn unauthorized(message: &str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "message": message }))).into_response()
}

// =============================================================================
// HANDLERS
// =============================================================================

async fn login(Json(body): Json<Value>) -> Response {
    if body["email"] == "a@b.com" && body["password"] == "secret123" {
        return Json(json!({ "user": { "username": "a" }, "token": VALID_TOKEN })).into_response();
    }
    unauthorized("Invalid credentials")
}

async fn register(Json(body): Json<Value>) -> Response {
    let username = body["username"].as_str().unwrap_or_default();
    if username == "taken" {
        return (StatusCode::CONFLICT, Json(json!({ "message": "Username already exists" }))).into_response();
    }
    Json(json!({ "user": user_json(username), "token": VALID_TOKEN })).into_response()
}

async fn me(headers: HeaderMap) -> Response {
    match bearer(&headers) {
        Some(VALID_TOKEN) => Json(json!({ "user": user_json("a") })).into_response(),
        Some(_) => unauthorized("Token expired"),
        None => unauthorized("Not authenticated"),
    }
}

async fn list_animations() -> Json<Value> {
    Json(page_json(&["1", "2", "3"]))
}

async fn get_animation(Path(id): Path<String>) -> Response {
    if id == "missing" {
        return (StatusCode::NOT_FOUND, Json(json!({ "message": "Animation not found" }))).into_response();
    }
    Json(animation_json(&id)).into_response()
}

async fn create_animation(State(recorded): State<Arc<Recorded>>, headers: HeaderMap, mut multipart: Multipart) -> Response {
    if bearer(&headers).is_none() {
        return unauthorized("Not authenticated");
    }
    let mut parts = Vec::new();
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_owned();
        let value = match field.file_name().map(str::to_owned) {
            Some(file_name) => file_name,
            None => field.text().await.unwrap(),
        };
        parts.push((name, value));
    }
    *recorded.upload.lock().unwrap() = parts;
    Json(animation_json("4")).into_response()
}

async fn update_animation(Path(id): Path<String>, Json(body): Json<Value>) -> Json<Value> {
    let mut animation = animation_json(&id);
    if let Some(title) = body.get("title") {
        animation["title"] = title.clone();
    }
    Json(animation)
}

async fn download(Path(id): Path<String>) -> Json<Value> {
    Json(json!({ "file_url": format!("https://cdn.test/v/{id}.mp4"), "title": format!("Animation {id}"), "downloads": 3 }))
}

async fn user_profile(Path(username): Path<String>) -> Json<Value> {
    Json(user_json(&username))
}

async fn user_animations(Path(_username): Path<String>) -> Json<Value> {
    Json(page_json(&["1", "3"]))
}

async fn update_me(headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if bearer(&headers) != Some(VALID_TOKEN) {
        return unauthorized("Token expired");
    }
    let mut user = user_json("a");
    if let Some(bio) = body.get("bio") {
        user["bio"] = bio.clone();
    }
    Json(user).into_response()
}

async fn marketplace(Path(feed): Path<String>) -> Response {
    if feed != "featured" && feed != "trending" {
        return (StatusCode::NOT_FOUND, Json(json!({ "message": "Not found" }))).into_response();
    }
    let listing = json!({
        "id": "1",
        "user_id": "u-a",
        "title": "Animation 1",
        "description": null,
        "file_url": "https://cdn.test/v/1.mp4",
        "thumbnail_url": null,
        "source_code": "scene()",
        "duration": 5.0,
        "views": 40,
        "downloads": 2,
        "likes": 12,
        "is_public": true,
        "created_at": "2024-01-01T00:00:00Z",
        "updated_at": "2024-01-02T00:00:00Z"
    });
    Json(json!({ "data": [listing], "page": 1, "limit": 20, "total": 1 })).into_response()
}
