//! HTTP client for the webhook service's `/api/v1` surface.

mod log;

pub use log::RequestLog;

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use reqwest::{
    Method, RequestBuilder, Response, StatusCode,
    header::{self, HeaderMap, HeaderValue},
};
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::{
    protocol::{
        Application, ApplicationPayload, Attempt, BackgroundTask, Endpoint, EndpointPayload,
        EndpointStats, EndpointStatusPatch, ErrorBody, EventType, EventTypePayload, ListResponse,
        Message, MessagePayload, ReplayWindow,
    },
    replay::ReplayApi,
};

const API_PREFIX: &str = "/api/v1";

/// Failures at the API boundary, already classified so callers can match
/// instead of inspecting response bodies.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{detail}")]
    Rejected {
        status: u16,
        code: String,
        detail: String,
    },
    #[error("server responded with {0}")]
    Status(StatusCode),
    #[error("unexpected response status {0}")]
    UnexpectedStatus(StatusCode),
    #[error("task did not start (status `{0}`)")]
    TaskNotRunning(String),
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("API token is not a valid header value")]
    InvalidToken(#[from] header::InvalidHeaderValue),
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub timeout: Duration,
    pub request_log: Option<Arc<RequestLog>>,
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    request_log: Option<Arc<RequestLog>>,
}

impl ApiClient {
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = config.token.as_deref() {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token))?;
            value.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            request_log: config.request_log,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn list_applications(&self) -> Result<Vec<Application>, ApiError> {
        self.list("/app").await
    }

    pub async fn get_application(&self, app_id: &str) -> Result<Application, ApiError> {
        self.get_json(&format!("/app/{}", app_id)).await
    }

    pub async fn create_application(
        &self,
        payload: &ApplicationPayload,
    ) -> Result<Application, ApiError> {
        self.write_json(Method::POST, "/app", payload).await
    }

    pub async fn list_endpoints(&self, app_id: &str) -> Result<Vec<Endpoint>, ApiError> {
        self.list(&format!("/app/{}/endpoint", app_id)).await
    }

    pub async fn get_endpoint(&self, app_id: &str, endpoint_id: &str) -> Result<Endpoint, ApiError> {
        self.get_json(&format!("/app/{}/endpoint/{}", app_id, endpoint_id))
            .await
    }

    /// Only a `201 Created` counts as success.
    pub async fn create_endpoint(
        &self,
        app_id: &str,
        payload: &EndpointPayload,
    ) -> Result<Endpoint, ApiError> {
        let path = format!("/app/{}/endpoint", app_id);
        let request = self.request(Method::POST, &path).json(payload);
        let response = self.send(Method::POST, &path, request).await?;
        let response = Self::expect_status(response, StatusCode::CREATED).await?;
        Ok(response.json::<Endpoint>().await?)
    }

    pub async fn update_endpoint(
        &self,
        app_id: &str,
        endpoint_id: &str,
        payload: &EndpointPayload,
    ) -> Result<Endpoint, ApiError> {
        self.write_json(
            Method::PATCH,
            &format!("/app/{}/endpoint/{}", app_id, endpoint_id),
            payload,
        )
        .await
    }

    pub async fn set_endpoint_disabled(
        &self,
        app_id: &str,
        endpoint_id: &str,
        disabled: bool,
    ) -> Result<Endpoint, ApiError> {
        self.write_json(
            Method::PATCH,
            &format!("/app/{}/endpoint/{}", app_id, endpoint_id),
            &EndpointStatusPatch { disabled },
        )
        .await
    }

    pub async fn delete_endpoint(&self, app_id: &str, endpoint_id: &str) -> Result<(), ApiError> {
        self.delete(&format!("/app/{}/endpoint/{}", app_id, endpoint_id))
            .await
    }

    pub async fn endpoint_stats(
        &self,
        app_id: &str,
        endpoint_id: &str,
    ) -> Result<EndpointStats, ApiError> {
        self.get_json(&format!("/app/{}/endpoint/{}/stats", app_id, endpoint_id))
            .await
    }

    pub async fn list_messages(&self, app_id: &str) -> Result<Vec<Message>, ApiError> {
        self.list(&format!("/app/{}/msg", app_id)).await
    }

    pub async fn messages_by_endpoint(
        &self,
        app_id: &str,
        endpoint_id: &str,
    ) -> Result<Vec<Message>, ApiError> {
        self.list(&format!("/app/{}/endpoint/{}/msg", app_id, endpoint_id))
            .await
    }

    pub async fn get_message(&self, app_id: &str, msg_id: &str) -> Result<Message, ApiError> {
        self.get_json(&format!("/app/{}/msg/{}", app_id, msg_id))
            .await
    }

    pub async fn create_message(
        &self,
        app_id: &str,
        payload: &MessagePayload,
    ) -> Result<Message, ApiError> {
        self.write_json(Method::POST, &format!("/app/{}/msg", app_id), payload)
            .await
    }

    pub async fn attempts_by_endpoint(
        &self,
        app_id: &str,
        endpoint_id: &str,
    ) -> Result<Vec<Attempt>, ApiError> {
        self.list(&format!(
            "/app/{}/attempt/endpoint/{}?with_msg=true",
            app_id, endpoint_id
        ))
        .await
    }

    pub async fn attempts_by_message(
        &self,
        app_id: &str,
        msg_id: &str,
    ) -> Result<Vec<Attempt>, ApiError> {
        self.list(&format!("/app/{}/attempt/msg/{}", app_id, msg_id))
            .await
    }

    pub async fn list_event_types(&self) -> Result<Vec<EventType>, ApiError> {
        self.list("/event-type").await
    }

    pub async fn get_event_type(&self, name: &str) -> Result<EventType, ApiError> {
        self.get_json(&format!("/event-type/{}", name)).await
    }

    pub async fn create_event_type(
        &self,
        payload: &EventTypePayload,
    ) -> Result<EventType, ApiError> {
        self.write_json(Method::POST, "/event-type", payload).await
    }

    pub async fn update_event_type(
        &self,
        name: &str,
        payload: &EventTypePayload,
    ) -> Result<EventType, ApiError> {
        self.write_json(Method::PATCH, &format!("/event-type/{}", name), payload)
            .await
    }

    pub async fn delete_event_type(&self, name: &str) -> Result<(), ApiError> {
        self.delete(&format!("/event-type/{}", name)).await
    }

    pub async fn recover(
        &self,
        app_id: &str,
        endpoint_id: &str,
        window: &ReplayWindow,
    ) -> Result<BackgroundTask, ApiError> {
        self.start_task(&format!("/app/{}/endpoint/{}/recover", app_id, endpoint_id), window)
            .await
    }

    pub async fn replay_missing_messages(
        &self,
        app_id: &str,
        endpoint_id: &str,
        window: &ReplayWindow,
    ) -> Result<BackgroundTask, ApiError> {
        self.start_task(
            &format!("/app/{}/endpoint/{}/replay-missing", app_id, endpoint_id),
            window,
        )
        .await
    }

    async fn start_task(&self, path: &str, window: &ReplayWindow) -> Result<BackgroundTask, ApiError> {
        let request = self.idempotent(Method::POST, path).json(window);
        let response = self.send(Method::POST, path, request).await?;
        let response = Self::expect_status(response, StatusCode::ACCEPTED).await?;
        Ok(response.json::<BackgroundTask>().await?)
    }

    async fn list<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, ApiError> {
        let page: ListResponse<T> = self.get_json(path).await?;
        if !page.done {
            debug!(%path, count = page.data.len(), "showing first page only");
        }
        Ok(page.data)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let request = self.request(Method::GET, path);
        let response = self.send(Method::GET, path, request).await?;
        Self::parse_response(response).await
    }

    async fn write_json<B, T>(&self, method: Method, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.request(method.clone(), path).json(body);
        let response = self.send(method, path, request).await?;
        Self::parse_response(response).await
    }

    async fn delete(&self, path: &str) -> Result<(), ApiError> {
        let request = self.request(Method::DELETE, path);
        let response = self.send(Method::DELETE, path, request).await?;
        Self::ensure_success(response).await?;
        Ok(())
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}{}", self.base_url, API_PREFIX, path))
    }

    /// Each submission carries a fresh idempotency key.
    fn idempotent(&self, method: Method, path: &str) -> RequestBuilder {
        self.request(method, path)
            .header("idempotency-key", Uuid::new_v4().to_string())
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        request: RequestBuilder,
    ) -> Result<Response, ApiError> {
        let result = request.send().await;
        if let Some(log) = &self.request_log {
            match &result {
                Ok(response) => log.record(&method, path, Ok(response.status())),
                Err(err) => log.record(&method, path, Err(&err.to_string())),
            }
        }
        Ok(result?)
    }

    /// Turns non-2xx responses into [`ApiError::Rejected`] when the body is
    /// a structured `{code, detail}` error, [`ApiError::Status`] otherwise.
    async fn ensure_success(response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        debug!(status = status.as_u16(), %body, "API request rejected");

        match serde_json::from_str::<ErrorBody>(&body) {
            Ok(error) => Err(ApiError::Rejected {
                status: status.as_u16(),
                code: error.code,
                detail: error.detail,
            }),
            Err(_) => Err(ApiError::Status(status)),
        }
    }

    async fn expect_status(response: Response, expected: StatusCode) -> Result<Response, ApiError> {
        let response = Self::ensure_success(response).await?;
        if response.status() != expected {
            return Err(ApiError::UnexpectedStatus(response.status()));
        }
        Ok(response)
    }

    async fn parse_response<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

impl ReplayApi for ApiClient {
    async fn resend_message(
        &self,
        app_id: &str,
        endpoint_id: &str,
        msg_id: &str,
    ) -> Result<(), ApiError> {
        let path = format!("/app/{}/msg/{}/endpoint/{}/resend", app_id, msg_id, endpoint_id);
        let request = self.idempotent(Method::POST, &path);
        let response = self.send(Method::POST, &path, request).await?;
        Self::expect_status(response, StatusCode::ACCEPTED).await?;
        Ok(())
    }

    async fn recover_endpoint(
        &self,
        app_id: &str,
        endpoint_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<(), ApiError> {
        let task = self
            .recover(app_id, endpoint_id, &ReplayWindow { since, until })
            .await?;
        ensure_running(task)
    }

    async fn replay_missing(
        &self,
        app_id: &str,
        endpoint_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<(), ApiError> {
        let task = self
            .replay_missing_messages(app_id, endpoint_id, &ReplayWindow { since, until })
            .await?;
        ensure_running(task)
    }
}

fn ensure_running(task: BackgroundTask) -> Result<(), ApiError> {
    if task.is_running() {
        debug!(task_id = %task.id, kind = %task.task, "background task started");
        Ok(())
    } else {
        Err(ApiError::TaskNotRunning(task.status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::{
        Json, Router,
        extract::Path,
        http::{HeaderMap as AxumHeaders, StatusCode as AxumStatus},
        routing::{delete, get, patch, post},
    };
    use serde_json::{Value, json};
    use tokio::net::TcpListener;

    async fn serve(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, router.into_make_service()).await;
        });
        format!("http://{}", addr)
    }

    fn client(base_url: String) -> ApiClient {
        ApiClient::new(ClientConfig {
            base_url,
            token: Some("testsk_secret".to_string()),
            timeout: Duration::from_secs(5),
            request_log: None,
        })
        .expect("client")
    }

    fn window() -> (DateTime<Utc>, DateTime<Utc>) {
        let since = "2024-03-05T10:15:00Z".parse().expect("since");
        let until = "2024-03-05T11:15:00Z".parse().expect("until");
        (since, until)
    }

    #[tokio::test]
    async fn lists_event_types_with_bearer_token() {
        let router = Router::new().route(
            "/api/v1/event-type",
            get(|headers: AxumHeaders| async move {
                let authorized = headers
                    .get("authorization")
                    .and_then(|value| value.to_str().ok())
                    == Some("Bearer testsk_secret");
                if !authorized {
                    return (
                        AxumStatus::UNAUTHORIZED,
                        Json(json!({ "code": "authentication_failed", "detail": "bad token" })),
                    );
                }
                (
                    AxumStatus::OK,
                    Json(json!({
                        "data": [
                            { "name": "invoice.paid", "description": "Paid" },
                            { "name": "invoice.refund.full" }
                        ],
                        "iterator": null,
                        "prevIterator": null,
                        "done": true
                    })),
                )
            }),
        );
        let api = client(serve(router).await);

        let names: Vec<String> = api
            .list_event_types()
            .await
            .expect("event types")
            .into_iter()
            .map(|event_type| event_type.name)
            .collect();

        assert_eq!(names, vec!["invoice.paid", "invoice.refund.full"]);
    }

    #[tokio::test]
    async fn resend_accepts_202() {
        let router = Router::new().route(
            "/api/v1/app/app_1/msg/msg_1/endpoint/ep_1/resend",
            post(|headers: AxumHeaders| async move {
                assert!(headers.contains_key("idempotency-key"));
                AxumStatus::ACCEPTED
            }),
        );
        let api = client(serve(router).await);

        api.resend_message("app_1", "ep_1", "msg_1")
            .await
            .expect("resend accepted");
    }

    #[tokio::test]
    async fn structured_rejection_surfaces_detail() {
        let router = Router::new().route(
            "/api/v1/app/app_1/msg/msg_1/endpoint/ep_404/resend",
            post(|| async {
                (
                    AxumStatus::NOT_FOUND,
                    Json(json!({ "code": "endpoint_not_found", "detail": "no such endpoint" })),
                )
            }),
        );
        let api = client(serve(router).await);

        match api.resend_message("app_1", "ep_404", "msg_1").await {
            Err(ApiError::Rejected {
                status,
                code,
                detail,
            }) => {
                assert_eq!(status, 404);
                assert_eq!(code, "endpoint_not_found");
                assert_eq!(detail, "no such endpoint");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn unstructured_failure_reports_status() {
        let router = Router::new().route(
            "/api/v1/app/app_1/msg/msg_1/endpoint/ep_1/resend",
            post(|| async { (AxumStatus::BAD_GATEWAY, "upstream down") }),
        );
        let api = client(serve(router).await);

        let err = api
            .resend_message("app_1", "ep_1", "msg_1")
            .await
            .expect_err("should fail");
        assert!(matches!(err, ApiError::Status(status) if status == StatusCode::BAD_GATEWAY));
        assert_eq!(err.to_string(), "server responded with 502 Bad Gateway");
    }

    #[tokio::test]
    async fn resend_rejects_non_accepted_success() {
        let router = Router::new().route(
            "/api/v1/app/app_1/msg/msg_1/endpoint/ep_1/resend",
            post(|| async { AxumStatus::OK }),
        );
        let api = client(serve(router).await);

        let err = api
            .resend_message("app_1", "ep_1", "msg_1")
            .await
            .expect_err("200 is not an accepted replay");
        assert!(matches!(err, ApiError::UnexpectedStatus(status) if status == StatusCode::OK));
    }

    #[tokio::test]
    async fn recover_posts_window_and_requires_running_task() {
        let router = Router::new()
            .route(
                "/api/v1/app/app_1/endpoint/ep_1/recover",
                post(|Json(body): Json<Value>| async move {
                    assert_eq!(body["since"], json!("2024-03-05T10:15:00Z"));
                    assert_eq!(body["until"], json!("2024-03-05T11:15:00Z"));
                    (
                        AxumStatus::ACCEPTED,
                        Json(json!({ "id": "qtask_1", "status": "running", "task": "endpoint.recover" })),
                    )
                }),
            )
            .route(
                "/api/v1/app/app_1/endpoint/ep_1/replay-missing",
                post(|| async {
                    (
                        AxumStatus::ACCEPTED,
                        Json(json!({ "id": "qtask_2", "status": "finished", "task": "endpoint.replay" })),
                    )
                }),
            );
        let api = client(serve(router).await);
        let (since, until) = window();

        api.recover_endpoint("app_1", "ep_1", since, until)
            .await
            .expect("recover running");

        let err = api
            .replay_missing("app_1", "ep_1", since, until)
            .await
            .expect_err("finished task is not a started replay");
        assert!(matches!(err, ApiError::TaskNotRunning(ref status) if status == "finished"));
    }

    #[tokio::test]
    async fn transport_failures_are_classified() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);
        let api = client(format!("http://{}", addr));

        let err = api
            .recover_endpoint("app_1", "ep_1", window().0, window().1)
            .await
            .expect_err("nothing is listening");
        assert!(matches!(err, ApiError::Transport(_)));
    }

    #[tokio::test]
    async fn patches_endpoint_filter_types() {
        let router = Router::new().route(
            "/api/v1/app/app_1/endpoint/ep_1",
            patch(|Json(body): Json<Value>| async move {
                let url = body["url"].clone();
                let description = body["description"].clone();
                let filter_types = body["filterTypes"].clone();
                Json(json!({
                    "id": "ep_1",
                    "url": url,
                    "description": description,
                    "filterTypes": filter_types,
                    "createdAt": "2024-01-01T00:00:00Z",
                    "updatedAt": "2024-01-02T00:00:00Z"
                }))
            }),
        );
        let api = client(serve(router).await);
        let payload = EndpointPayload {
            url: "https://example.test/hooks".to_string(),
            description: "primary".to_string(),
            filter_types: Some(vec!["invoice.paid".to_string()]),
            ..EndpointPayload::default()
        };

        let endpoint = api
            .update_endpoint("app_1", "ep_1", &payload)
            .await
            .expect("patched");

        assert_eq!(endpoint.filter_types, Some(vec!["invoice.paid".to_string()]));
        assert_eq!(endpoint.url, "https://example.test/hooks");
    }

    fn endpoint_body(id: &str, body: &Value) -> Value {
        json!({
            "id": id,
            "url": body["url"],
            "description": body["description"],
            "disabled": body["disabled"].as_bool().unwrap_or(false),
            "filterTypes": body["filterTypes"],
            "channels": body["channels"],
            "createdAt": "2024-01-01T00:00:00Z",
            "updatedAt": "2024-01-02T00:00:00Z"
        })
    }

    #[tokio::test]
    async fn creates_application() {
        let router = Router::new().route(
            "/api/v1/app",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body, json!({ "name": "Billing" }));
                (
                    AxumStatus::CREATED,
                    Json(json!({
                        "id": "app_1",
                        "name": "Billing",
                        "createdAt": "2024-01-01T00:00:00Z",
                        "updatedAt": "2024-01-01T00:00:00Z"
                    })),
                )
            }),
        );
        let api = client(serve(router).await);

        let app = api
            .create_application(&ApplicationPayload {
                name: "Billing".to_string(),
            })
            .await
            .expect("created");
        assert_eq!(app.id, "app_1");
    }

    #[tokio::test]
    async fn creates_endpoint_only_on_201() {
        let router = Router::new()
            .route(
                "/api/v1/app/app_1/endpoint",
                post(|Json(body): Json<Value>| async move {
                    assert_eq!(body["filterTypes"], json!(["invoice.paid"]));
                    assert_eq!(body["channels"], Value::Null);
                    (AxumStatus::CREATED, Json(endpoint_body("ep_new", &body)))
                }),
            )
            .route(
                "/api/v1/app/app_2/endpoint",
                post(|Json(body): Json<Value>| async move {
                    (AxumStatus::OK, Json(endpoint_body("ep_other", &body)))
                }),
            );
        let api = client(serve(router).await);
        let payload = EndpointPayload {
            url: "https://example.test/new".to_string(),
            filter_types: Some(vec!["invoice.paid".to_string()]),
            ..EndpointPayload::default()
        };

        let endpoint = api.create_endpoint("app_1", &payload).await.expect("created");
        assert_eq!(endpoint.id, "ep_new");
        assert_eq!(endpoint.url, "https://example.test/new");

        let err = api
            .create_endpoint("app_2", &payload)
            .await
            .expect_err("200 is not a created endpoint");
        assert!(matches!(err, ApiError::UnexpectedStatus(status) if status == StatusCode::OK));
    }

    #[tokio::test]
    async fn disables_and_deletes_endpoint() {
        let router = Router::new().route(
            "/api/v1/app/app_1/endpoint/ep_1",
            patch(|Json(body): Json<Value>| async move {
                assert_eq!(body, json!({ "disabled": true }));
                Json(json!({
                    "id": "ep_1",
                    "url": "https://example.test/hooks",
                    "disabled": true,
                    "createdAt": "2024-01-01T00:00:00Z",
                    "updatedAt": "2024-01-02T00:00:00Z"
                }))
            })
            .delete(|| async { AxumStatus::NO_CONTENT }),
        );
        let api = client(serve(router).await);

        let endpoint = api
            .set_endpoint_disabled("app_1", "ep_1", true)
            .await
            .expect("disabled");
        assert!(endpoint.disabled);

        api.delete_endpoint("app_1", "ep_1").await.expect("deleted");
    }

    #[tokio::test]
    async fn delete_of_missing_endpoint_is_rejected() {
        let router = Router::new().route(
            "/api/v1/app/app_1/endpoint/ep_gone",
            delete(|| async {
                (
                    AxumStatus::NOT_FOUND,
                    Json(json!({ "code": "not_found", "detail": "Entity not found" })),
                )
            }),
        );
        let api = client(serve(router).await);

        let err = api
            .delete_endpoint("app_1", "ep_gone")
            .await
            .expect_err("missing endpoint");
        assert_eq!(err.to_string(), "Entity not found");
    }

    #[tokio::test]
    async fn reads_messages_for_endpoint_and_by_id() {
        let message = json!({
            "id": "msg_1",
            "eventType": "invoice.paid",
            "payload": { "amount": 10 },
            "timestamp": "2024-03-05T10:15:00Z"
        });
        let listed = message.clone();
        let router = Router::new()
            .route(
                "/api/v1/app/app_1/endpoint/ep_1/msg",
                get(move || {
                    let listed = listed.clone();
                    async move { Json(json!({ "data": [listed], "done": true })) }
                }),
            )
            .route(
                "/api/v1/app/app_1/msg/:msg_id",
                get(move |Path(msg_id): Path<String>| {
                    let message = message.clone();
                    async move {
                        if msg_id == "msg_1" {
                            (AxumStatus::OK, Json(message))
                        } else {
                            (
                                AxumStatus::NOT_FOUND,
                                Json(json!({ "code": "not_found", "detail": "Entity not found" })),
                            )
                        }
                    }
                }),
            );
        let api = client(serve(router).await);

        let messages = api
            .messages_by_endpoint("app_1", "ep_1")
            .await
            .expect("messages");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].event_type, "invoice.paid");

        let message = api.get_message("app_1", "msg_1").await.expect("message");
        assert_eq!(message.payload["amount"], json!(10));
        assert!(matches!(
            api.get_message("app_1", "msg_2").await,
            Err(ApiError::Rejected { status: 404, .. })
        ));
    }

    #[tokio::test]
    async fn manages_event_types() {
        let router = Router::new()
            .route(
                "/api/v1/event-type",
                post(|Json(body): Json<Value>| async move {
                    assert_eq!(body, json!({ "name": "invoice.paid" }));
                    (AxumStatus::CREATED, Json(json!({ "name": "invoice.paid" })))
                }),
            )
            .route(
                "/api/v1/event-type/:name",
                get(|Path(name): Path<String>| async move {
                    Json(json!({ "name": name, "description": "Paid" }))
                })
                .patch(|Path(name): Path<String>, Json(body): Json<Value>| async move {
                    assert_eq!(name, "invoice.paid");
                    Json(json!({ "name": name, "description": body["description"] }))
                })
                .delete(|| async { AxumStatus::NO_CONTENT }),
            );
        let api = client(serve(router).await);

        let created = api
            .create_event_type(&EventTypePayload {
                name: "invoice.paid".to_string(),
                description: None,
            })
            .await
            .expect("created");
        assert_eq!(created.name, "invoice.paid");

        let fetched = api.get_event_type("invoice.paid").await.expect("fetched");
        assert_eq!(fetched.description, "Paid");

        let updated = api
            .update_event_type(
                "invoice.paid",
                &EventTypePayload {
                    name: "invoice.paid".to_string(),
                    description: Some("Invoice settled".to_string()),
                },
            )
            .await
            .expect("updated");
        assert_eq!(updated.description, "Invoice settled");

        api.delete_event_type("invoice.paid").await.expect("deleted");
    }

    #[test]
    fn rejects_tokens_that_are_not_header_safe() {
        let result = ApiClient::new(ClientConfig {
            base_url: "http://localhost:8071/".to_string(),
            token: Some("bad\ntoken".to_string()),
            timeout: Duration::from_secs(1),
            request_log: None,
        });
        assert!(matches!(result, Err(ApiError::InvalidToken(_))));
    }
}
