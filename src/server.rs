//! Axum router construction and route mapping.
//!
//! The [`app`] function wires every endpoint to its handler and returns a
//! ready-to-serve [`axum::Router`].  Path extraction happens in the small
//! `handle_*` dispatch functions here; the handlers themselves take plain
//! `&str` arguments.

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, DefaultBodyLimit, Path, State},
    http::{HeaderMap, HeaderValue, Method, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::errors::{generate_request_id, ApiError};
use crate::metrics::{metrics_handler, metrics_middleware};
use crate::AppState;

/// Response header carrying the per-request identifier.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

// -- OpenAPI specification ----------------------------------------------------

/// OpenAPI documentation for the homestore HTTP API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "homestore",
        version = "0.1.0",
        description = "Bucket/object storage on top of a key-value server"
    ),
    paths(
        health_check,
        crate::handlers::bucket::list_buckets,
        crate::handlers::bucket::create_bucket,
        crate::handlers::bucket::delete_bucket,
        crate::handlers::bucket::head_bucket,
        crate::handlers::object::list_objects,
        crate::handlers::object::put_object,
        crate::handlers::object::get_object,
        crate::handlers::object::head_object,
        crate::handlers::object::delete_object,
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Bucket", description = "Bucket operations"),
        (name = "Object", description = "Object operations"),
    )
)]
struct ApiDoc;

/// Build the axum [`Router`] with all routes.
///
/// The returned router is ready to be passed to `axum::serve`.
pub fn app(state: Arc<AppState>) -> Router {
    let metrics_enabled = state.config.observability.metrics;
    let body_limit = usize::try_from(state.config.server.max_object_size).unwrap_or(usize::MAX);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::PUT,
            Method::DELETE,
            Method::HEAD,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    let mut router = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .route("/openapi.json", get(openapi_json))
        .route("/", get(handle_get_service))
        // Bucket-level routes
        .route(
            "/:bucket",
            get(handle_get_bucket)
                .put(handle_put_bucket)
                .delete(handle_delete_bucket)
                .head(handle_head_bucket),
        )
        // Object-level routes (wildcard key captures slashes)
        .route(
            "/:bucket/*key",
            get(handle_get_object)
                .put(handle_put_object)
                .delete(handle_delete_object)
                .head(handle_head_object),
        )
        .with_state(state)
        // Layer ordering: later layers wrap earlier ones.
        .layer(middleware::from_fn(common_headers_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    if metrics_enabled {
        // Outermost, so the recorded duration covers the whole stack.
        router = router.layer(middleware::from_fn(metrics_middleware));
    }

    // Bodies over server.max_object_size are refused while still streaming.
    router.layer(DefaultBodyLimit::max(body_limit))
}

// -- Common headers middleware -----------------------------------------------

/// Middleware that adds common response headers to every response:
/// - `x-request-id`: echoed from the request, or a fresh 16-character hex id
/// - `Date`: RFC 7231 formatted timestamp
/// - `Server`: `homestore`
async fn common_headers_middleware(req: Request<axum::body::Body>, next: Next) -> Response {
    let incoming_id = req.headers().get(REQUEST_ID_HEADER).cloned();
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    if !headers.contains_key(REQUEST_ID_HEADER) {
        let request_id = incoming_id
            .or_else(|| HeaderValue::from_str(&generate_request_id()).ok());
        if let Some(value) = request_id {
            headers.insert(REQUEST_ID_HEADER, value);
        }
    }

    let date = httpdate::fmt_http_date(std::time::SystemTime::now());
    if let Ok(value) = HeaderValue::from_str(&date) {
        headers.insert("date", value);
    }
    headers.insert("server", HeaderValue::from_static("homestore"));

    response
}

// -- Health check ------------------------------------------------------------

/// `GET /health` -- Returns `{"status": "ok"}` with 200 OK when the backend
/// answers a ping.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    operation_id = "HealthCheck",
    responses(
        (status = 200, description = "Backend reachable"),
        (status = 503, description = "Backend unavailable")
    )
)]
async fn health_check(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    state.store.ping().await?;
    Ok((
        StatusCode::OK,
        [("content-type", "application/json")],
        r#"{"status":"ok"}"#,
    )
        .into_response())
}

/// `GET /openapi.json` -- Serve the generated OpenAPI document.
async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

// -- Service-level dispatch --------------------------------------------------

/// `GET /` -- ListBuckets
async fn handle_get_service(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    crate::handlers::bucket::list_buckets(state).await
}

// -- Bucket-level dispatch ---------------------------------------------------

/// `GET /{bucket}` -- ListObjects
async fn handle_get_bucket(
    State(state): State<Arc<AppState>>,
    Path(bucket): Path<String>,
) -> Result<Response, ApiError> {
    crate::handlers::object::list_objects(state, &bucket).await
}

/// `PUT /{bucket}` -- CreateBucket
async fn handle_put_bucket(
    State(state): State<Arc<AppState>>,
    Path(bucket): Path<String>,
) -> Result<Response, ApiError> {
    crate::handlers::bucket::create_bucket(state, &bucket).await
}

async fn handle_delete_bucket(
    State(state): State<Arc<AppState>>,
    Path(bucket): Path<String>,
) -> Result<Response, ApiError> {
    crate::handlers::bucket::delete_bucket(state, &bucket).await
}

async fn handle_head_bucket(
    State(state): State<Arc<AppState>>,
    Path(bucket): Path<String>,
) -> Result<Response, ApiError> {
    crate::handlers::bucket::head_bucket(state, &bucket).await
}

// -- Object-level dispatch ---------------------------------------------------

async fn handle_get_object(
    State(state): State<Arc<AppState>>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    crate::handlers::object::get_object(state, &bucket, &key).await
}

async fn handle_put_object(
    State(state): State<Arc<AppState>>,
    Path((bucket, key)): Path<(String, String)>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ApiError> {
    let body = match body {
        Ok(body) => body,
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            return Err(ApiError::BadRequest {
                message: format!(
                    "object exceeds the maximum of {} bytes",
                    state.config.server.max_object_size
                ),
            });
        }
        Err(rejection) => return Ok(rejection.into_response()),
    };
    crate::handlers::object::put_object(state, &bucket, &key, &headers, body).await
}

async fn handle_delete_object(
    State(state): State<Arc<AppState>>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    crate::handlers::object::delete_object(state, &bucket, &key).await
}

async fn handle_head_object(
    State(state): State<Arc<AppState>>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    crate::handlers::object::head_object(state, &bucket, &key).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::kv::{KvBackend, KvFuture};
    use crate::backend::MemoryBackend;
    use crate::config::Config;
    use crate::engine::ObjectStore;
    use axum::body::Body;
    use std::collections::HashMap;
    use tower::ServiceExt;

    fn test_app_with(config: Config, backend: Arc<dyn KvBackend>) -> Router {
        let state = Arc::new(AppState {
            config,
            store: ObjectStore::new(backend),
        });
        app(state)
    }

    fn test_app() -> Router {
        test_app_with(Config::default(), Arc::new(MemoryBackend::new()))
    }

    fn request(method: Method, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn send(app: &Router, req: Request<Body>) -> Response {
        app.clone().oneshot(req).await.unwrap()
    }

    async fn body_bytes(resp: Response) -> Bytes {
        axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap()
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        serde_json::from_slice(&body_bytes(resp).await).unwrap()
    }

    /// Backend whose every call fails, as if the server were unreachable.
    struct DownBackend;

    fn down<'a, T: Send + 'a>() -> KvFuture<'a, T> {
        Box::pin(async { Err(anyhow::anyhow!("connection refused")) })
    }

    impl KvBackend for DownBackend {
        fn ping(&self) -> KvFuture<'_, ()> {
            down()
        }
        fn exists(&self, _key: &str) -> KvFuture<'_, bool> {
            down()
        }
        fn get(&self, _key: &str) -> KvFuture<'_, Option<Bytes>> {
            down()
        }
        fn set(&self, _key: &str, _value: Bytes) -> KvFuture<'_, ()> {
            down()
        }
        fn del(&self, _keys: &[String]) -> KvFuture<'_, u64> {
            down()
        }
        fn hgetall(&self, _key: &str) -> KvFuture<'_, HashMap<String, String>> {
            down()
        }
        fn hset(&self, _key: &str, _fields: &[(String, String)]) -> KvFuture<'_, ()> {
            down()
        }
        fn hsetnx(&self, _key: &str, _field: &str, _value: &str) -> KvFuture<'_, bool> {
            down()
        }
        fn sadd(&self, _key: &str, _member: &str) -> KvFuture<'_, ()> {
            down()
        }
        fn srem(&self, _key: &str, _member: &str) -> KvFuture<'_, ()> {
            down()
        }
        fn smembers(&self, _key: &str) -> KvFuture<'_, Vec<String>> {
            down()
        }
        fn scan_match(&self, _pattern: &str) -> KvFuture<'_, Vec<String>> {
            down()
        }
    }

    #[tokio::test]
    async fn test_photo_scenario() {
        let app = test_app();

        let resp = send(&app, request(Method::PUT, "/photos")).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let put = Request::builder()
            .method(Method::PUT)
            .uri("/photos/cat.png")
            .header("content-type", "image/png")
            .body(Body::from(vec![0x89u8, 0x50, 0x4E, 0x47]))
            .unwrap();
        let resp = send(&app, put).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let resp = send(&app, request(Method::GET, "/photos/cat.png")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["content-type"], "image/png");
        assert!(resp.headers().contains_key("last-modified"));
        assert_eq!(&body_bytes(resp).await[..], &[0x89, 0x50, 0x4E, 0x47]);

        let resp = send(&app, request(Method::GET, "/photos")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await, serde_json::json!(["cat.png"]));

        let resp = send(&app, request(Method::DELETE, "/photos")).await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let resp = send(&app, request(Method::GET, "/")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await, serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_list_buckets_sorted() {
        let app = test_app();
        for name in ["zeta", "alpha", "mid"] {
            let resp = send(&app, request(Method::PUT, &format!("/{name}"))).await;
            assert_eq!(resp.status(), StatusCode::CREATED);
        }
        let resp = send(&app, request(Method::GET, "/")).await;
        assert_eq!(
            body_json(resp).await,
            serde_json::json!(["alpha", "mid", "zeta"])
        );
    }

    #[tokio::test]
    async fn test_error_status_mapping() {
        let app = test_app();

        let resp = send(&app, request(Method::GET, "/nobucket")).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body = body_json(resp).await;
        assert!(body["error"].as_str().unwrap().contains("nobucket"));

        let resp = send(&app, request(Method::PUT, "/Bad_Name")).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        send(&app, request(Method::PUT, "/docs")).await;
        let resp = send(&app, request(Method::PUT, "/docs")).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let resp = send(&app, request(Method::GET, "/docs/missing.txt")).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        // Deleting an absent object in an existing bucket is not an error.
        let resp = send(&app, request(Method::DELETE, "/docs/missing.txt")).await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let resp = send(&app, request(Method::DELETE, "/nobucket/a.txt")).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = send(&app, request(Method::PUT, "/nobucket/a.txt")).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_service_route_names_are_not_buckets() {
        let app = test_app();
        for name in crate::schema::RESERVED_BUCKET_NAMES {
            // Every reserved name is served by a fixed route, never by
            // the bucket handlers.
            let resp = send(&app, request(Method::GET, &format!("/{name}"))).await;
            let body = body_bytes(resp).await;
            let error = serde_json::from_slice::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v.get("error").cloned());
            assert!(error.is_none(), "/{name} fell through to the bucket routes");
        }

        // And none of them can be created through the engine.
        let state = Arc::new(AppState {
            config: Config::default(),
            store: ObjectStore::new(Arc::new(MemoryBackend::new())),
        });
        for name in crate::schema::RESERVED_BUCKET_NAMES {
            let err = state.store.create_bucket(name).await.unwrap_err();
            assert_eq!(ApiError::from(err).status_code(), StatusCode::BAD_REQUEST);
        }
    }

    #[tokio::test]
    async fn test_head_requests() {
        let app = test_app();

        let resp = send(&app, request(Method::HEAD, "/docs")).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        send(&app, request(Method::PUT, "/docs")).await;
        let resp = send(&app, request(Method::HEAD, "/docs")).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = send(&app, request(Method::HEAD, "/docs/readme.md")).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        send(&app, request(Method::PUT, "/docs/readme.md")).await;
        let resp = send(&app, request(Method::HEAD, "/docs/readme.md")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(body_bytes(resp).await.is_empty());
    }

    #[tokio::test]
    async fn test_nested_key_and_default_content_type() {
        let app = test_app();
        send(&app, request(Method::PUT, "/docs")).await;

        let put = Request::builder()
            .method(Method::PUT)
            .uri("/docs/2024/summer/notes.bin")
            .body(Body::from("hello"))
            .unwrap();
        assert_eq!(send(&app, put).await.status(), StatusCode::CREATED);

        let resp = send(&app, request(Method::GET, "/docs/2024/summer/notes.bin")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()["content-type"],
            crate::engine::DEFAULT_CONTENT_TYPE
        );
        assert_eq!(&body_bytes(resp).await[..], b"hello");

        let resp = send(&app, request(Method::GET, "/docs")).await;
        assert_eq!(
            body_json(resp).await,
            serde_json::json!(["2024/summer/notes.bin"])
        );

        let resp = send(
            &app,
            request(Method::DELETE, "/docs/2024/summer/notes.bin"),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        let resp = send(&app, request(Method::GET, "/docs")).await;
        assert_eq!(body_json(resp).await, serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_oversized_object_rejected() {
        let mut config = Config::default();
        config.server.max_object_size = 4;
        let backend = Arc::new(MemoryBackend::new());
        let app = test_app_with(config, backend.clone());
        send(&app, request(Method::PUT, "/docs")).await;
        let keys_before = backend.len().await;

        let put = Request::builder()
            .method(Method::PUT)
            .uri("/docs/big")
            .body(Body::from("12345"))
            .unwrap();
        let resp = send(&app, put).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = body_json(resp).await;
        assert!(body["error"].as_str().unwrap().contains("maximum of 4 bytes"));
        assert_eq!(backend.len().await, keys_before);

        // A declared length over the limit is refused the same way.
        let put = Request::builder()
            .method(Method::PUT)
            .uri("/docs/big")
            .header("content-length", "1000")
            .body(Body::from(vec![0u8; 1000]))
            .unwrap();
        assert_eq!(send(&app, put).await.status(), StatusCode::BAD_REQUEST);
        assert_eq!(backend.len().await, keys_before);

        let put = Request::builder()
            .method(Method::PUT)
            .uri("/docs/small")
            .body(Body::from("1234"))
            .unwrap();
        assert_eq!(send(&app, put).await.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_common_headers() {
        let app = test_app();
        let resp = send(&app, request(Method::GET, "/")).await;
        assert_eq!(resp.headers()["server"], "homestore");
        assert!(resp.headers().contains_key("date"));
        let id = resp.headers()[REQUEST_ID_HEADER].to_str().unwrap();
        assert_eq!(id.len(), 16);

        // Error responses carry them too.
        let resp = send(&app, request(Method::GET, "/nobucket")).await;
        assert!(resp.headers().contains_key(REQUEST_ID_HEADER));
        assert_eq!(resp.headers()["server"], "homestore");
    }

    #[tokio::test]
    async fn test_request_id_is_echoed() {
        let app = test_app();
        let req = Request::builder()
            .uri("/")
            .header(REQUEST_ID_HEADER, "trace-me-123")
            .body(Body::empty())
            .unwrap();
        let resp = send(&app, req).await;
        assert_eq!(resp.headers()[REQUEST_ID_HEADER], "trace-me-123");
    }

    #[tokio::test]
    async fn test_cors_preflight() {
        let app = test_app();
        let req = Request::builder()
            .method(Method::OPTIONS)
            .uri("/photos/cat.png")
            .header("origin", "https://example.com")
            .header("access-control-request-method", "PUT")
            .body(Body::empty())
            .unwrap();
        let resp = send(&app, req).await;
        assert_eq!(resp.headers()["access-control-allow-origin"], "*");
        let methods = resp.headers()["access-control-allow-methods"]
            .to_str()
            .unwrap();
        assert!(methods.contains("PUT"));
        assert!(methods.contains("DELETE"));
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app();
        let resp = send(&app, request(Method::GET, "/health")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await, serde_json::json!({"status": "ok"}));

        let app = test_app_with(Config::default(), Arc::new(DownBackend));
        let resp = send(&app, request(Method::GET, "/health")).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_backend_down_maps_to_503() {
        let app = test_app_with(Config::default(), Arc::new(DownBackend));
        let resp = send(&app, request(Method::GET, "/")).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(resp).await;
        assert!(body["error"]
            .as_str()
            .unwrap()
            .contains("connection refused"));
    }

    #[tokio::test]
    async fn test_openapi_document() {
        let app = test_app();
        let resp = send(&app, request(Method::GET, "/openapi.json")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let doc = body_json(resp).await;
        assert_eq!(doc["info"]["title"], "homestore");
        assert!(doc["paths"]["/{bucket}/{key}"].is_object());
        assert!(doc["paths"]["/health"].is_object());
    }

    #[tokio::test]
    async fn test_metrics_disabled_still_serves() {
        let mut config = Config::default();
        config.observability.metrics = false;
        let app = test_app_with(config, Arc::new(MemoryBackend::new()));
        let resp = send(&app, request(Method::GET, "/")).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
