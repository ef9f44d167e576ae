use crate::protocol::{
    ChatRequest, ChatResponse, ConfigResponse, EventRequest, InitRequest, InitResponse,
};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("invalid api base {base:?}: {reason}")]
    InvalidApiBase { base: String, reason: String },
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{endpoint} returned status {status}")]
    Status { endpoint: String, status: StatusCode },
    #[error("malformed response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Pluggable transport for the public widget endpoints.
#[async_trait]
pub trait WidgetBackend: Send + Sync {
    async fn init(&self, req: &InitRequest) -> Result<InitResponse, BackendError>;
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse, BackendError>;
    async fn track_event(&self, req: &EventRequest) -> Result<(), BackendError>;
    async fn fetch_config(&self, agent_id: &str) -> Result<ConfigResponse, BackendError>;
}

/// HTTP backend talking to `{api_base}/widget/*`. No retries: every call is
/// issued exactly once.
#[derive(Clone)]
pub struct HttpWidgetBackend {
    api_base: Url,
    client: reqwest::Client,
}

impl HttpWidgetBackend {
    /// Client shared by every backend of one runtime. `None` keeps the
    /// platform default timeout.
    pub fn build_client(timeout: Option<Duration>) -> Result<reqwest::Client, BackendError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        builder.build().map_err(BackendError::Client)
    }

    /// Reuses an existing client so several widgets share one connection pool.
    pub fn with_client(api_base: &str, client: reqwest::Client) -> Result<Self, BackendError> {
        let api_base = parse_api_base(api_base)?;
        Ok(Self { api_base, client })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.api_base.clone();
        // parse_api_base rejected cannot-be-a-base urls, so this always succeeds.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push("widget").extend(segments);
        }
        url
    }

    async fn post_json<B, R>(&self, segments: &[&str], body: &B) -> Result<R, BackendError>
    where
        B: serde::Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = self.endpoint(segments);
        let resp = self.send(self.client.post(url.clone()).json(body), &url).await?;
        decode(resp, &url).await
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        url: &Url,
    ) -> Result<reqwest::Response, BackendError> {
        let resp = request.send().await.map_err(|source| BackendError::Transport {
            endpoint: url.to_string(),
            source,
        })?;
        let status = resp.status();
        debug!(endpoint = %url, %status, "widget backend responded");
        if !status.is_success() {
            return Err(BackendError::Status {
                endpoint: url.to_string(),
                status,
            });
        }
        Ok(resp)
    }
}

#[async_trait]
impl WidgetBackend for HttpWidgetBackend {
    async fn init(&self, req: &InitRequest) -> Result<InitResponse, BackendError> {
        self.post_json(&["init"], req).await
    }

    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse, BackendError> {
        self.post_json(&["chat"], req).await
    }

    async fn track_event(&self, req: &EventRequest) -> Result<(), BackendError> {
        let url = self.endpoint(&["event"]);
        self.send(self.client.post(url.clone()).json(req), &url)
            .await
            .map(|_| ())
    }

    async fn fetch_config(&self, agent_id: &str) -> Result<ConfigResponse, BackendError> {
        let url = self.endpoint(&["config", agent_id]);
        let resp = self.send(self.client.get(url.clone()), &url).await?;
        decode(resp, &url).await
    }
}

async fn decode<R: DeserializeOwned>(
    resp: reqwest::Response,
    url: &Url,
) -> Result<R, BackendError> {
    resp.json::<R>().await.map_err(|source| BackendError::Decode {
        endpoint: url.to_string(),
        source,
    })
}

fn parse_api_base(raw: &str) -> Result<Url, BackendError> {
    let invalid = |reason: String| BackendError::InvalidApiBase {
        base: raw.to_string(),
        reason,
    };
    let url = Url::parse(raw.trim()).map_err(|err| invalid(err.to_string()))?;
    if url.cannot_be_a_base() {
        return Err(invalid("url cannot carry a path".to_string()));
    }
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme {}", url.scheme())));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, State};
    use axum::http::StatusCode as AxumStatus;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{Value, json};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Recorded {
        bodies: Arc<Mutex<Vec<(String, Value)>>>,
    }

    impl Recorded {
        fn push(&self, endpoint: &str, body: Value) {
            self.bodies
                .lock()
                .unwrap()
                .push((endpoint.to_string(), body));
        }

        fn all(&self) -> Vec<(String, Value)> {
            self.bodies.lock().unwrap().clone()
        }
    }

    async fn init_handler(State(rec): State<Recorded>, Json(body): Json<Value>) -> Json<Value> {
        rec.push("init", body);
        Json(json!({
            "agent_id": "a1",
            "agent_name": "Support",
            "allowed": true,
            "session_id": "s1",
            "widget_settings": {"welcomeMessage": "Hi!"}
        }))
    }

    async fn chat_handler(State(rec): State<Recorded>, Json(body): Json<Value>) -> Json<Value> {
        rec.push("chat", body);
        Json(json!({"response": "See /pricing", "message_id": "m1"}))
    }

    async fn event_handler(State(rec): State<Recorded>, Json(body): Json<Value>) -> AxumStatus {
        rec.push("event", body);
        AxumStatus::INTERNAL_SERVER_ERROR
    }

    async fn config_handler(Path(agent_id): Path<String>) -> Json<Value> {
        Json(json!({
            "agent_id": agent_id,
            "name": "Support",
            "configuration": {"widget_settings": {"position": "top-left", "theme": "light"}}
        }))
    }

    async fn spawn_mock() -> (String, Recorded) {
        let recorded = Recorded::default();
        let app = Router::new()
            .route("/api/v1/widget/init", post(init_handler))
            .route("/api/v1/widget/chat", post(chat_handler))
            .route("/api/v1/widget/event", post(event_handler))
            .route("/api/v1/widget/config/{agent_id}", get(config_handler))
            .with_state(recorded.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        (format!("http://{addr}/api/v1"), recorded)
    }

    fn http_backend(base: &str) -> Result<HttpWidgetBackend, BackendError> {
        let client = HttpWidgetBackend::build_client(Some(Duration::from_secs(5)))?;
        HttpWidgetBackend::with_client(base, client)
    }

    #[test]
    fn builds_endpoints_from_base_with_or_without_slash() {
        for base in ["http://127.0.0.1:8000/api/v1", "http://127.0.0.1:8000/api/v1/"] {
            let backend = http_backend(base).unwrap();
            assert_eq!(
                backend.endpoint(&["init"]).as_str(),
                "http://127.0.0.1:8000/api/v1/widget/init"
            );
            assert_eq!(
                backend.endpoint(&["config", "a1"]).as_str(),
                "http://127.0.0.1:8000/api/v1/widget/config/a1"
            );
        }
    }

    #[test]
    fn rejects_unusable_api_base() {
        assert!(matches!(
            http_backend("mailto:ops@insydr.ai"),
            Err(BackendError::InvalidApiBase { .. })
        ));
        assert!(matches!(
            http_backend("not a url"),
            Err(BackendError::InvalidApiBase { .. })
        ));
        assert!(matches!(
            http_backend("ftp://files.insydr.ai/api"),
            Err(BackendError::InvalidApiBase { .. })
        ));
    }

    #[tokio::test]
    async fn posts_init_and_chat_bodies() {
        let (base, recorded) = spawn_mock().await;
        let backend = http_backend(&base).unwrap();

        let init = backend
            .init(&InitRequest {
                agent_id: "a1".into(),
                api_key: Some("pk_live".into()),
                page_url: "https://shop.example/pricing".into(),
                page_title: Some("Pricing".into()),
                referrer: None,
                language: Some("en-US".into()),
            })
            .await
            .unwrap();
        assert!(init.allowed);
        assert_eq!(init.session_id.as_deref(), Some("s1"));
        assert_eq!(
            init.widget_settings.unwrap().welcome_message.as_deref(),
            Some("Hi!")
        );

        let chat = backend
            .chat(&ChatRequest {
                agent_id: "a1".into(),
                session_id: "s1".into(),
                message: "pricing?".into(),
                page_url: "https://shop.example/pricing".into(),
            })
            .await
            .unwrap();
        assert_eq!(chat.response, "See /pricing");
        assert_eq!(chat.message_id.as_deref(), Some("m1"));

        let bodies = recorded.all();
        assert_eq!(bodies.len(), 2);
        assert_eq!(bodies[0].0, "init");
        assert_eq!(bodies[0].1["api_key"], json!("pk_live"));
        assert_eq!(bodies[0].1["referrer"], Value::Null);
        assert_eq!(
            bodies[1],
            (
                "chat".to_string(),
                json!({
                    "agent_id": "a1",
                    "session_id": "s1",
                    "message": "pricing?",
                    "page_url": "https://shop.example/pricing"
                })
            )
        );
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let (base, recorded) = spawn_mock().await;
        let backend = http_backend(&base).unwrap();
        let err = backend
            .track_event(&EventRequest {
                agent_id: "a1".into(),
                session_id: "s1".into(),
                event_type: "widget_open".into(),
                event_data: json!({}),
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BackendError::Status { status, .. } if status == StatusCode::INTERNAL_SERVER_ERROR
        ));
        assert_eq!(recorded.all().len(), 1);
    }

    #[tokio::test]
    async fn fetches_prefetch_config() {
        let (base, _recorded) = spawn_mock().await;
        let backend = http_backend(&base).unwrap();
        let cfg = backend.fetch_config("a1").await.unwrap();
        assert_eq!(cfg.agent_id, "a1");
        assert_eq!(cfg.name.as_deref(), Some("Support"));
        assert_eq!(
            cfg.configuration.widget_settings.position,
            crate::protocol::WidgetPosition::TopLeft
        );
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let backend = http_backend(&format!("http://{addr}/api/v1")).unwrap();
        let err = backend.fetch_config("a1").await.unwrap_err();
        assert!(matches!(err, BackendError::Transport { .. }));
    }
}
