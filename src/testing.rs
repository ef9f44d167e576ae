//! Scripted in-memory backend shared by the unit tests.

use crate::backend::{BackendError, WidgetBackend};
use crate::protocol::{
    ChatRequest, ChatResponse, ConfigEnvelope, ConfigResponse, EventRequest, InitRequest,
    InitResponse, WidgetSettings,
};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

#[derive(Debug, Clone)]
pub enum Call {
    Init(InitRequest),
    Chat(ChatRequest),
    Event(EventRequest),
    Config(String),
}

/// Lets a test hold a chat request open until it calls `release`.
#[derive(Clone, Default)]
pub struct ChatGate {
    pub started: Arc<Notify>,
    pub release: Arc<Notify>,
}

pub struct ScriptedBackend {
    init: Result<InitResponse, StatusCode>,
    chat: Result<ChatResponse, StatusCode>,
    event_failure: Option<StatusCode>,
    gate: Option<ChatGate>,
    calls: Mutex<Vec<Call>>,
}

fn status_error(endpoint: &str, status: StatusCode) -> BackendError {
    BackendError::Status {
        endpoint: format!("mock://widget/{endpoint}"),
        status,
    }
}

impl ScriptedBackend {
    fn with_init(init: Result<InitResponse, StatusCode>) -> Self {
        Self {
            init,
            chat: Ok(ChatResponse {
                response: "ok".into(),
                message_id: None,
            }),
            event_failure: None,
            gate: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn allowing(session_id: &str) -> Self {
        Self::allowing_with(session_id, WidgetSettings::default())
    }

    pub fn allowing_with(session_id: &str, settings: WidgetSettings) -> Self {
        Self::with_init(Ok(InitResponse {
            allowed: true,
            error: None,
            session_id: Some(session_id.into()),
            widget_settings: Some(settings),
            agent_id: Some("a1".into()),
            agent_name: Some("Support".into()),
        }))
    }

    pub fn denying(reason: &str) -> Self {
        Self::with_init(Ok(InitResponse {
            allowed: false,
            error: Some(reason.into()),
            session_id: Some(String::new()),
            widget_settings: Some(WidgetSettings::default()),
            agent_id: Some("a1".into()),
            agent_name: Some("Support".into()),
        }))
    }

    pub fn init_fails(status: StatusCode) -> Self {
        Self::with_init(Err(status))
    }

    pub fn reply(mut self, response: &str, message_id: Option<&str>) -> Self {
        self.chat = Ok(ChatResponse {
            response: response.into(),
            message_id: message_id.map(str::to_string),
        });
        self
    }

    pub fn chat_fails(mut self, status: StatusCode) -> Self {
        self.chat = Err(status);
        self
    }

    pub fn events_fail(mut self, status: StatusCode) -> Self {
        self.event_failure = Some(status);
        self
    }

    pub fn gated(mut self, gate: ChatGate) -> Self {
        self.gate = Some(gate);
        self
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn inits(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Init(_)))
            .count()
    }

    pub fn chats(&self) -> Vec<ChatRequest> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Chat(req) => Some(req),
                _ => None,
            })
            .collect()
    }

    pub fn events(&self) -> Vec<EventRequest> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Event(req) => Some(req),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl WidgetBackend for ScriptedBackend {
    async fn init(&self, req: &InitRequest) -> Result<InitResponse, BackendError> {
        self.record(Call::Init(req.clone()));
        self.init.clone().map_err(|s| status_error("init", s))
    }

    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse, BackendError> {
        self.record(Call::Chat(req.clone()));
        if let Some(gate) = &self.gate {
            gate.started.notify_one();
            gate.release.notified().await;
        }
        self.chat.clone().map_err(|s| status_error("chat", s))
    }

    async fn track_event(&self, req: &EventRequest) -> Result<(), BackendError> {
        self.record(Call::Event(req.clone()));
        match self.event_failure {
            Some(status) => Err(status_error("event", status)),
            None => Ok(()),
        }
    }

    async fn fetch_config(&self, agent_id: &str) -> Result<ConfigResponse, BackendError> {
        self.record(Call::Config(agent_id.to_string()));
        Ok(ConfigResponse {
            agent_id: agent_id.to_string(),
            name: Some("Support".into()),
            configuration: ConfigEnvelope::default(),
        })
    }
}
