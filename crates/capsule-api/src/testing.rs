use std::sync::Arc;

use axum::{
    Router,
    body::{Body, Bytes},
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use capsule_db::Database;
use capsule_storage::MemoryObjectStore;

use crate::config::Config;
use crate::routes::router;
use crate::state::{AppState, AppStateInner};

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub objects: Arc<MemoryObjectStore>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_dev_mode() -> Self {
        Self::with_config(Config {
            dev_mode: true,
            ..Config::default()
        })
    }

    fn with_config(config: Config) -> Self {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let objects = Arc::new(MemoryObjectStore::new());
        let state = AppStateInner::new(db, objects.clone(), config);
        Self {
            router: router(state.clone()),
            state,
            objects,
        }
    }

    pub async fn send(&self, req: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
        let response = self.router.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, headers, body)
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let (status, _, bytes) = self.send(req).await;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    /// Registers `email` with password `password1` and logs in.
    pub async fn register(&self, email: &str) -> (i64, String) {
        let (status, body) = self
            .request(
                Method::POST,
                "/auth/register",
                None,
                Some(json!({
                    "firstName": "Test",
                    "lastName": "User",
                    "email": email,
                    "password": "password1"
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
        let user_id = body["userId"].as_i64().unwrap();

        let (status, body) = self
            .request(
                Method::POST,
                "/auth/login",
                None,
                Some(json!({ "email": email, "password": "password1" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {body}");
        (user_id, body["token"].as_str().unwrap().to_string())
    }

    /// Creates a private capsule and returns `(id, join code)`.
    pub async fn create_capsule(&self, token: &str) -> (i64, String) {
        let (status, body) = self
            .request(
                Method::POST,
                "/capsules",
                Some(token),
                Some(json!({ "vessel": "jar", "public": false })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create capsule failed: {body}");
        let id = body["capsuleId"].as_i64().unwrap();

        let (_, body) = self
            .request(Method::GET, &format!("/capsules/{id}"), Some(token), None)
            .await;
        (id, body["capsule"]["code"].as_str().unwrap().to_string())
    }

    /// Uploads `data` as a multipart `file` field; returns the response body.
    pub async fn upload(&self, token: &str, file_name: &str, data: &[u8]) -> (StatusCode, Value) {
        let boundary = "capsule-test-boundary";
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        let req = Request::builder()
            .method(Method::POST)
            .uri("/files/upload")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap();

        let (status, _, bytes) = self.send(req).await;
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }
}
