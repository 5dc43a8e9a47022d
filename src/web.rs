//! HTTP 接口（axum）
//!
//! 路由：
//! - `GET /health`、`GET /`
//! - `POST /api/v1/ask`
//! - `GET|POST /api/v1/kb/entries`、`PUT|DELETE /api/v1/kb/entries/:id`
//! - `GET /api/v1/kb/services`
//!
//! 模型与护栏的结果一律 200 返回；只有请求校验和目录操作会映射为 4xx。

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::assistant::{AskRequest, AskResponse, DocAssistant};
use crate::core::AssistantError;
use crate::knowledge::{DocEntry, DocEntryPatch, NewDocEntry, ServiceSummary};

const SERVICE_NAME: &str = "docent";

type ApiError = (StatusCode, Json<Value>);

fn api_error(e: AssistantError) -> ApiError {
    let status = match &e {
        AssistantError::InvalidRequest(_) => StatusCode::UNPROCESSABLE_ENTITY,
        AssistantError::CatalogNotFound(_) | AssistantError::UnknownService(_) => StatusCode::NOT_FOUND,
        AssistantError::CatalogDuplicateId(_) => StatusCode::CONFLICT,
        e if e.is_client_error() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!(error = %e, "request failed");
    }
    (status, Json(json!({ "detail": e.to_string() })))
}

#[derive(Debug, Default, Deserialize)]
struct EntriesQuery {
    service: Option<String>,
}

pub fn router(assistant: Arc<DocAssistant>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/v1/ask", post(api_ask))
        .route("/api/v1/kb/entries", get(api_entries_list).post(api_entries_create))
        .route("/api/v1/kb/entries/:id", put(api_entries_update).delete(api_entries_delete))
        .route("/api/v1/kb/services", get(api_services))
        .with_state(assistant)
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "health": "/health",
        "ask": "/api/v1/ask",
        "kb_entries": "/api/v1/kb/entries",
        "kb_services": "/api/v1/kb/services",
    }))
}

async fn health(State(assistant): State<Arc<DocAssistant>>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "backend": assistant.backend_name(),
    }))
}

/// POST /api/v1/ask
async fn api_ask(
    State(assistant): State<Arc<DocAssistant>>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskResponse>, ApiError> {
    assistant.ask(req).await.map(Json).map_err(api_error)
}

/// GET /api/v1/kb/entries?service=
async fn api_entries_list(
    State(assistant): State<Arc<DocAssistant>>,
    Query(q): Query<EntriesQuery>,
) -> Result<Json<Vec<DocEntry>>, ApiError> {
    assistant
        .list_entries(q.service.as_deref())
        .await
        .map(Json)
        .map_err(api_error)
}

/// POST /api/v1/kb/entries：成功返回 201
async fn api_entries_create(
    State(assistant): State<Arc<DocAssistant>>,
    Json(entry): Json<NewDocEntry>,
) -> Result<(StatusCode, Json<DocEntry>), ApiError> {
    let created = assistant.add_entry(entry).await.map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// PUT /api/v1/kb/entries/:id：部分更新，无字段时 400
async fn api_entries_update(
    State(assistant): State<Arc<DocAssistant>>,
    Path(id): Path<String>,
    Json(patch): Json<DocEntryPatch>,
) -> Result<Json<Value>, ApiError> {
    assistant.update_entry(&id, patch).await.map_err(api_error)?;
    Ok(Json(json!({ "status": "updated", "id": id })))
}

/// DELETE /api/v1/kb/entries/:id
async fn api_entries_delete(
    State(assistant): State<Arc<DocAssistant>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    assistant.delete_entry(&id).await.map_err(api_error)?;
    Ok(Json(json!({ "status": "deleted", "id": id })))
}

/// GET /api/v1/kb/services
async fn api_services(State(assistant): State<Arc<DocAssistant>>) -> Result<Json<Vec<ServiceSummary>>, ApiError> {
    assistant.services().await.map(Json).map_err(api_error)
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::config::AppConfig;
    use crate::core::{AssistantBuilder, Backend};
    use crate::knowledge::{Catalog, KnowledgeIndex};

    const CATALOG: &str = r#"{
        "services": {
            "ai_core": {
                "display_name": "SAP AI Core",
                "description": "Run AI workloads",
                "docs": [
                    {"id": "ai_core_01", "title": "Deploy a model", "url": "https://d/1", "description": "Serving", "tags": ["deploy"]}
                ]
            }
        }
    }"#;

    async fn app() -> Router {
        let index = Arc::new(KnowledgeIndex::in_memory(Catalog::from_json(CATALOG).unwrap()));
        let assistant = AssistantBuilder::new(AppConfig::default())
            .with_index(index)
            .with_backend(Backend::Mock)
            .build()
            .await
            .unwrap();
        router(Arc::new(assistant))
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(resp: axum::response::Response) -> Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_backend() {
        let resp = app()
            .await
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["backend"], "mock");
    }

    #[tokio::test]
    async fn test_ask_validation_is_422() {
        let resp = app()
            .await
            .oneshot(json_request("POST", "/api/v1/ask", json!({"question": ""})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_ask_mock_backend_is_synthetic() {
        let resp = app()
            .await
            .oneshot(json_request(
                "POST",
                "/api/v1/ask",
                json!({"question": "How do I deploy a model?", "show_pipeline": true}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["synthetic"], true);
        assert_eq!(body["links"][0]["url"], "https://d/1");
        assert_eq!(body["pipeline"]["llm"]["model"], "fallback");
    }

    #[tokio::test]
    async fn test_create_entry_statuses() {
        let app = app().await;
        let created = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/kb/entries",
                json!({"service_key": "ai_core", "title": "T", "url": "https://d/2", "description": "D"}),
            ))
            .await
            .unwrap();
        assert_eq!(created.status(), StatusCode::CREATED);
        assert_eq!(body_json(created).await["id"], "ai_core_02");

        let unknown = app
            .oneshot(json_request(
                "POST",
                "/api/v1/kb/entries",
                json!({"service_key": "nope", "title": "T", "url": "u", "description": "D"}),
            ))
            .await
            .unwrap();
        assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_update_and_delete_statuses() {
        let app = app().await;
        let empty = app
            .clone()
            .oneshot(json_request("PUT", "/api/v1/kb/entries/ai_core_01", json!({})))
            .await
            .unwrap();
        assert_eq!(empty.status(), StatusCode::BAD_REQUEST);

        let missing = app
            .clone()
            .oneshot(json_request("PUT", "/api/v1/kb/entries/fake_99", json!({"title": "x"})))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let deleted = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/v1/kb/entries/ai_core_01")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(deleted.status(), StatusCode::OK);

        let again = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/v1/kb/entries/ai_core_01")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(again.status(), StatusCode::NOT_FOUND);
    }
}
