use crate::backend::WidgetBackend;
use crate::chat::{ChatClient, Message, Role};
use crate::page::PageContext;
use crate::protocol::WidgetSettings;
use crate::session::{InitEvent, Session, SessionState};
use crate::tracker::{EventKind, EventTracker};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{OnceCell, RwLock};
use tokio::task::JoinHandle;
use tracing::{Instrument, error, info, info_span, warn};

pub const UNAVAILABLE_MESSAGE: &str = "Failed to load chat widget.";

/// What the host surface may show for the current state.
#[derive(Debug, Clone, PartialEq)]
pub enum WidgetView {
    /// Still initializing: nothing is rendered.
    Hidden,
    Denied { message: String },
    Unavailable { message: String },
    Chat(ChatView),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatView {
    pub agent_name: String,
    pub settings: WidgetSettings,
    pub open: bool,
    pub input_enabled: bool,
    /// An answer is pending.
    pub typing: bool,
    pub transcript: Vec<Message>,
}

impl WidgetView {
    /// Whether a message input / send affordance is on screen.
    pub fn exposes_input(&self) -> bool {
        matches!(self, WidgetView::Chat(chat) if chat.input_enabled)
    }
}

/// One embedded widget instance: handshake, transcript and lifecycle events.
pub struct Widget {
    page: PageContext,
    backend: Arc<dyn WidgetBackend>,
    state: RwLock<SessionState>,
    handshake: OnceCell<()>,
    chat: ChatClient,
    tracker: EventTracker,
    open: AtomicBool,
}

impl Widget {
    pub fn new(page: PageContext, backend: Arc<dyn WidgetBackend>) -> Self {
        Self {
            chat: ChatClient::new(backend.clone()),
            tracker: EventTracker::new(backend.clone()),
            page,
            backend,
            state: RwLock::new(SessionState::Initializing),
            handshake: OnceCell::new(),
            open: AtomicBool::new(false),
        }
    }

    pub async fn state(&self) -> SessionState {
        self.state.read().await.clone()
    }

    pub async fn session(&self) -> Option<Session> {
        self.state.read().await.session().cloned()
    }

    pub async fn transcript(&self) -> Vec<Message> {
        self.chat.transcript().await
    }

    pub fn is_sending(&self) -> bool {
        self.chat.is_sending()
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Runs the init handshake. The request goes out at most once per widget;
    /// later or concurrent callers wait for it and get the resulting state.
    pub async fn initialize(&self) -> SessionState {
        self.handshake
            .get_or_init(|| {
                let span = info_span!("widget_init", agent_id = %self.page.agent_id);
                self.handshake_once().instrument(span)
            })
            .await;
        self.state().await
    }

    async fn handshake_once(&self) {
        let result = self.backend.init(&self.page.init_request()).await;
        let event = InitEvent::from_response(result);
        let welcome = match &event {
            InitEvent::Allowed(session) => {
                info!(session_id = %session.session_id, "widget session initialized");
                session.widget_settings.welcome().map(str::to_string)
            }
            InitEvent::Denied(reason) => {
                warn!(%reason, "widget denied by backend");
                None
            }
            InitEvent::Failed(reason) => {
                error!(%reason, "widget failed to initialize");
                None
            }
        };

        let mut state = self.state.write().await;
        if let Err(err) = state.apply(event) {
            warn!(%err, "ignoring init outcome");
            return;
        }
        // Seeded before the write lock drops so the welcome stays first.
        if let Some(welcome) = welcome {
            self.chat.seed(Message::welcome(welcome)).await;
        }
    }

    /// Sends a user message. `None` when the send was a no-op: blank input,
    /// no session, or another send still in flight.
    pub async fn send(&self, content: &str) -> Option<Message> {
        let session = self.session().await?;
        self.chat.send(&self.page, &session, content).await
    }

    pub async fn open(&self) -> Option<JoinHandle<()>> {
        self.set_open(true).await
    }

    pub async fn close(&self) -> Option<JoinHandle<()>> {
        self.set_open(false).await
    }

    pub async fn toggle(&self) -> Option<JoinHandle<()>> {
        let was_open = self.open.fetch_xor(true, Ordering::AcqRel);
        self.track_visibility(!was_open).await
    }

    /// Only actual transitions are tracked, and only once a session exists.
    pub async fn set_open(&self, open: bool) -> Option<JoinHandle<()>> {
        if self.open.swap(open, Ordering::AcqRel) == open {
            return None;
        }
        self.track_visibility(open).await
    }

    async fn track_visibility(&self, open: bool) -> Option<JoinHandle<()>> {
        let kind = if open {
            EventKind::WidgetOpen
        } else {
            EventKind::WidgetClose
        };
        self.track(kind, None).await
    }

    /// Fire-and-forget analytics event. `None` until a session exists.
    pub async fn track(
        &self,
        kind: impl Into<EventKind>,
        data: Option<Value>,
    ) -> Option<JoinHandle<()>> {
        let state = self.state.read().await;
        self.tracker
            .track(&self.page.agent_id, state.session(), kind.into(), data)
    }

    /// Thumbs up/down on an assistant message that is in the transcript.
    pub async fn feedback(&self, message_id: &str, positive: bool) -> Option<JoinHandle<()>> {
        let known = self
            .chat
            .transcript()
            .await
            .iter()
            .any(|m| m.id == message_id && m.role == Role::Assistant);
        if !known {
            return None;
        }
        let kind = if positive {
            EventKind::FeedbackPositive
        } else {
            EventKind::FeedbackNegative
        };
        self.track(kind, Some(json!({ "message_id": message_id })))
            .await
    }

    pub async fn view(&self) -> WidgetView {
        let state = self.state.read().await;
        match &*state {
            SessionState::Initializing => WidgetView::Hidden,
            SessionState::Denied { reason } => WidgetView::Denied {
                message: reason.clone(),
            },
            SessionState::Error { .. } => WidgetView::Unavailable {
                message: UNAVAILABLE_MESSAGE.to_string(),
            },
            SessionState::Initialized(session) => {
                let sending = self.chat.is_sending();
                WidgetView::Chat(ChatView {
                    agent_name: session.display_name().to_string(),
                    settings: session.widget_settings.clone(),
                    open: self.is_open(),
                    input_enabled: !sending,
                    typing: sending,
                    transcript: self.chat.transcript().await,
                })
            }
        }
    }
}
