use crate::backend::WidgetBackend;
use crate::page::PageContext;
use crate::protocol::ChatRequest;
use crate::session::Session;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Shown in place of an answer whenever a chat request fails.
pub const ERROR_REPLY: &str = "Sorry, something went wrong.";
pub const WELCOME_MESSAGE_ID: &str = "welcome";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: client_message_id(),
            role: Role::User,
            content: content.into(),
            is_error: false,
        }
    }

    pub fn assistant(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::Assistant,
            content: content.into(),
            is_error: false,
        }
    }

    pub fn welcome(content: impl Into<String>) -> Self {
        Self::assistant(WELCOME_MESSAGE_ID, content)
    }

    pub fn failure() -> Self {
        Self {
            is_error: true,
            ..Self::assistant(client_message_id(), ERROR_REPLY)
        }
    }
}

fn client_message_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Clears the in-flight flag however the send ends.
struct SendingGuard<'a>(&'a AtomicBool);

impl<'a> SendingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for SendingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Transcript plus the single-flight send path.
pub struct ChatClient {
    backend: Arc<dyn WidgetBackend>,
    transcript: Mutex<Vec<Message>>,
    sending: AtomicBool,
}

impl ChatClient {
    pub fn new(backend: Arc<dyn WidgetBackend>) -> Self {
        Self {
            backend,
            transcript: Mutex::new(Vec::new()),
            sending: AtomicBool::new(false),
        }
    }

    pub fn is_sending(&self) -> bool {
        self.sending.load(Ordering::Acquire)
    }

    pub async fn transcript(&self) -> Vec<Message> {
        self.transcript.lock().await.clone()
    }

    pub async fn seed(&self, message: Message) {
        self.transcript.lock().await.push(message);
    }

    /// Sends one user message and returns the assistant reply appended to
    /// the transcript. Blank input or a send already in flight is a no-op.
    pub async fn send(
        &self,
        page: &PageContext,
        session: &Session,
        content: &str,
    ) -> Option<Message> {
        if content.trim().is_empty() {
            return None;
        }
        let Some(_guard) = SendingGuard::acquire(&self.sending) else {
            debug!(session_id = %session.session_id, "send dropped; another message is in flight");
            return None;
        };

        let user = Message::user(content);
        self.transcript.lock().await.push(user.clone());

        let req = ChatRequest {
            agent_id: page.agent_id.clone(),
            session_id: session.session_id.clone(),
            message: user.content,
            page_url: page.page_url.clone(),
        };
        let reply = match self.backend.chat(&req).await {
            Ok(resp) => Message::assistant(
                resp.message_id
                    .filter(|id| !id.is_empty())
                    .unwrap_or_else(client_message_id),
                resp.response,
            ),
            Err(err) => {
                warn!(
                    agent_id = %page.agent_id,
                    session_id = %session.session_id,
                    %err,
                    "chat request failed"
                );
                Message::failure()
            }
        };
        self.transcript.lock().await.push(reply.clone());
        Some(reply)
    }
}
