//! HTTP request handlers.

use super::AppState;
use crate::db::{format_time_ago, DbError, TargetRecord};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telegram: Option<String>,
}

pub async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    match state.monitor.notifier().check_connectivity().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok".to_string(),
                telegram: None,
            }),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "error".to_string(),
                telegram: Some(e.to_string()),
            }),
        ),
    }
}

// ============================================================================
// API: Targets
// ============================================================================

/// A record plus its derived availability.
#[derive(Debug, Serialize, Deserialize)]
pub struct TargetView {
    #[serde(flatten)]
    pub record: TargetRecord,
    pub availability_pct: f64,
}

impl From<TargetRecord> for TargetView {
    fn from(record: TargetRecord) -> Self {
        Self {
            availability_pct: record.availability_pct(),
            record,
        }
    }
}

/// Everything known about one target, with human-readable ages.
#[derive(Debug, Serialize, Deserialize)]
pub struct TargetDetails {
    #[serde(flatten)]
    pub target: TargetView,
    pub last_success_ago: String,
    pub last_failure_ago: String,
    pub ssl_days_to_expiry: Option<i64>,
    pub effective_ssl_threshold_days: u32,
    pub ssl_threshold_is_global: bool,
    pub last_ssl_notification_ago: String,
}

fn db_error_response(e: DbError) -> Response {
    let status = match e {
        DbError::NotFound(_) => StatusCode::NOT_FOUND,
        DbError::AlreadyExists(_) => StatusCode::CONFLICT,
        DbError::InvalidUrl(_) => StatusCode::BAD_REQUEST,
        _ => {
            tracing::error!("Store error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, e.to_string()).into_response()
}

pub async fn handle_get_targets(State(state): State<AppState>) -> Response {
    match state.store.get_targets() {
        Ok(targets) => {
            let views: Vec<TargetView> = targets.into_iter().map(TargetView::from).collect();
            Json(views).into_response()
        }
        Err(e) => db_error_response(e),
    }
}

pub async fn handle_get_target(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Response {
    let record = match state.store.get_target(&name) {
        Ok(r) => r,
        Err(e) => return db_error_response(e),
    };

    let now = Utc::now();
    let global = state.monitor.global_ssl_threshold();
    let details = TargetDetails {
        last_success_ago: format_time_ago(record.last_success_at, now),
        last_failure_ago: format_time_ago(record.last_failure_at, now),
        ssl_days_to_expiry: record.days_to_ssl_expiry(now),
        effective_ssl_threshold_days: record.effective_ssl_threshold(global),
        ssl_threshold_is_global: record.ssl_expiry_threshold_days == 0,
        last_ssl_notification_ago: format_time_ago(record.last_ssl_notification_at, now),
        target: record.into(),
    };
    Json(details).into_response()
}

#[derive(Debug, Deserialize)]
pub struct CreateTargetRequest {
    pub url: String,
    #[serde(default)]
    pub name: Option<String>,
}

pub async fn handle_create_target(
    State(state): State<AppState>,
    Json(req): Json<CreateTargetRequest>,
) -> Response {
    match state.store.add_target(&req.url, req.name.as_deref()) {
        Ok(record) => (StatusCode::CREATED, Json(TargetView::from(record))).into_response(),
        Err(e) => db_error_response(e),
    }
}

pub async fn handle_delete_target(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Response {
    match state.store.remove_target(&name) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => db_error_response(e),
    }
}

pub async fn handle_delete_all_targets(State(state): State<AppState>) -> Response {
    match state.store.remove_all() {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => db_error_response(e),
    }
}

// ============================================================================
// API: Thresholds
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ResponseTimeRequest {
    pub threshold_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct ContentRequest {
    pub expected_content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SslThresholdRequest {
    pub days: u32,
}

fn update_response(
    state: &AppState,
    name: &str,
    update: impl FnOnce(&mut TargetRecord),
) -> Response {
    match state.store.update_target(name, update) {
        Ok(record) => Json(TargetView::from(record)).into_response(),
        Err(e) => db_error_response(e),
    }
}

pub async fn handle_set_response_time(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<ResponseTimeRequest>,
) -> Response {
    if i64::try_from(req.threshold_ms).is_err() {
        return (StatusCode::BAD_REQUEST, "threshold_ms is out of range").into_response();
    }
    update_response(&state, &name, |r| {
        r.response_time_threshold_ms = req.threshold_ms
    })
}

pub async fn handle_set_content(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<ContentRequest>,
) -> Response {
    update_response(&state, &name, |r| r.expected_content = req.expected_content)
}

pub async fn handle_set_ssl_threshold(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<SslThresholdRequest>,
) -> Response {
    update_response(&state, &name, |r| r.ssl_expiry_threshold_days = req.days)
}

pub async fn handle_set_global_ssl_threshold(
    State(state): State<AppState>,
    Json(req): Json<SslThresholdRequest>,
) -> Response {
    state.monitor.set_global_ssl_threshold(req.days);
    Json(SslThresholdRequest { days: req.days }).into_response()
}

#[cfg(test)]
mod tests {
    use super::super::Server;
    use super::*;
    use crate::db::Store;
    use crate::monitor::Monitor;
    use crate::probe::HttpProber;
    use crate::testutil::{spawn_server, RecordingNotifier};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    const API_KEY: &str = "test-api-key";

    struct TestApp {
        base: String,
        client: reqwest::Client,
        store: Arc<Store>,
        monitor: Arc<Monitor>,
        notifier: Arc<RecordingNotifier>,
        _db: NamedTempFile,
    }

    async fn test_app() -> TestApp {
        test_app_with_key(Some(API_KEY)).await
    }

    async fn test_app_with_key(api_key: Option<&str>) -> TestApp {
        let db = NamedTempFile::new().unwrap();
        let store = Arc::new(Store::new(db.path()).unwrap());
        let notifier = Arc::new(RecordingNotifier::default());
        let prober = Arc::new(HttpProber::new(Duration::from_secs(1)).unwrap());
        let monitor = Arc::new(Monitor::new(store.clone(), prober, notifier.clone(), 30));

        let server = Server::new(0, api_key.map(str::to_string), store.clone(), monitor.clone());
        let addr = spawn_server(server.routes()).await;

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("X-API-Key", reqwest::header::HeaderValue::from_static(API_KEY));

        TestApp {
            base: format!("http://{}", addr),
            client: reqwest::Client::builder().default_headers(headers).build().unwrap(),
            store,
            monitor,
            notifier,
            _db: db,
        }
    }

    #[tokio::test]
    async fn test_health_reports_notifier_state() {
        let app = test_app().await;

        let resp = app.client.get(format!("{}/health", app.base)).send().await.unwrap();
        assert_eq!(resp.status(), 200);
        let body: HealthResponse = resp.json().await.unwrap();
        assert_eq!(body.status, "ok");
        assert_eq!(body.telegram, None);

        app.notifier.set_failing(true);
        let resp = app.client.get(format!("{}/health", app.base)).send().await.unwrap();
        assert_eq!(resp.status(), 503);
        let body: HealthResponse = resp.json().await.unwrap();
        assert_eq!(body.status, "error");
        assert!(body.telegram.unwrap().contains("Unauthorized"));
    }

    #[tokio::test]
    async fn test_create_list_and_delete_targets() {
        let app = test_app().await;

        let resp = app
            .client
            .post(format!("{}/api/targets", app.base))
            .json(&serde_json::json!({ "url": "example.com", "name": "example" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 201);
        let created: TargetView = resp.json().await.unwrap();
        assert_eq!(created.record.url, "https://example.com");
        assert_eq!(created.availability_pct, 0.0);

        let dup = app
            .client
            .post(format!("{}/api/targets", app.base))
            .json(&serde_json::json!({ "url": "other.com", "name": "example" }))
            .send()
            .await
            .unwrap();
        assert_eq!(dup.status(), 409);

        let bad = app
            .client
            .post(format!("{}/api/targets", app.base))
            .json(&serde_json::json!({ "url": "https://" }))
            .send()
            .await
            .unwrap();
        assert_eq!(bad.status(), 400);

        let list: Vec<TargetView> = app
            .client
            .get(format!("{}/api/targets", app.base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(list.len(), 1);

        let resp = app
            .client
            .delete(format!("{}/api/targets/example", app.base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 204);

        let resp = app
            .client
            .delete(format!("{}/api/targets/example", app.base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);
    }

    #[tokio::test]
    async fn test_delete_all_targets() {
        let app = test_app().await;
        app.store.add_target("a.example.com", Some("a")).unwrap();
        app.store.add_target("b.example.com", Some("b")).unwrap();

        let resp = app
            .client
            .delete(format!("{}/api/targets", app.base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 204);
        assert!(app.store.get_targets().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_thresholds_and_details() {
        let app = test_app().await;
        app.store.add_target("api.example.com", Some("api")).unwrap();

        let resp = app
            .client
            .put(format!("{}/api/targets/api/response-time", app.base))
            .json(&serde_json::json!({ "threshold_ms": 750 }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        app.client
            .put(format!("{}/api/targets/api/content", app.base))
            .json(&serde_json::json!({ "expected_content": "healthy" }))
            .send()
            .await
            .unwrap();

        app.client
            .put(format!("{}/api/targets/api/ssl-threshold", app.base))
            .json(&serde_json::json!({ "days": 14 }))
            .send()
            .await
            .unwrap();

        let details: TargetDetails = app
            .client
            .get(format!("{}/api/targets/api", app.base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(details.target.record.response_time_threshold_ms, 750);
        assert_eq!(details.target.record.expected_content, "healthy");
        assert_eq!(details.effective_ssl_threshold_days, 14);
        assert!(!details.ssl_threshold_is_global);
        assert_eq!(details.last_success_ago, "never");

        let missing = app
            .client
            .put(format!("{}/api/targets/nope/content", app.base))
            .json(&serde_json::json!({ "expected_content": "x" }))
            .send()
            .await
            .unwrap();
        assert_eq!(missing.status(), 404);
    }

    #[tokio::test]
    async fn test_set_global_ssl_threshold() {
        let app = test_app().await;

        let resp = app
            .client
            .put(format!("{}/api/settings/ssl-threshold", app.base))
            .json(&serde_json::json!({ "days": 45 }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(app.monitor.global_ssl_threshold(), 45);
    }

    #[tokio::test]
    async fn test_api_requires_key() {
        let app = test_app().await;
        let anonymous = reqwest::Client::new();

        let resp = anonymous.get(format!("{}/api/targets", app.base)).send().await.unwrap();
        assert_eq!(resp.status(), 401);

        let resp = anonymous
            .post(format!("{}/api/targets", app.base))
            .header("X-API-Key", "wrong")
            .json(&serde_json::json!({ "url": "example.com" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 401);
        assert!(app.store.get_targets().unwrap().is_empty());

        let resp = anonymous
            .put(format!("{}/api/settings/ssl-threshold", app.base))
            .json(&serde_json::json!({ "days": 1 }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 401);
        assert_eq!(app.monitor.global_ssl_threshold(), 30);

        // Liveness stays open.
        let resp = anonymous.get(format!("{}/health", app.base)).send().await.unwrap();
        assert_eq!(resp.status(), 200);

        let resp = app.client.get(format!("{}/api/targets", app.base)).send().await.unwrap();
        assert_eq!(resp.status(), 200);
    }

    #[tokio::test]
    async fn test_api_closed_without_configured_key() {
        let app = test_app_with_key(None).await;

        let resp = app.client.get(format!("{}/api/targets", app.base)).send().await.unwrap();
        assert_eq!(resp.status(), 401);

        let resp = app.client.get(format!("{}/health", app.base)).send().await.unwrap();
        assert_eq!(resp.status(), 200);
    }

    #[tokio::test]
    async fn test_out_of_range_response_time_is_rejected() {
        let app = test_app().await;
        let added = app.store.add_target("api.example.com", Some("api")).unwrap();

        let resp = app
            .client
            .put(format!("{}/api/targets/api/response-time", app.base))
            .json(&serde_json::json!({ "threshold_ms": u64::MAX }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        assert_eq!(app.store.get_target("api").unwrap(), added);
    }
}
