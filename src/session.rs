//! Session handshake state machine.
//!
//! ```text
//!                 Allowed      Denied    Failed
//! Initializing -> Initialized  Denied    Error
//! Initialized  -> (invalid)    (invalid) (invalid)
//! Denied       -> (invalid)    (invalid) (invalid)
//! Error        -> (invalid)    (invalid) (invalid)
//! ```
//!
//! A [`Session`] only exists inside [`SessionState::Initialized`], so chat and
//! tracking code cannot obtain a session id before the backend allowed it.

use crate::backend::BackendError;
use crate::protocol::{InitResponse, WidgetSettings};
use thiserror::Error;

pub const DENIED_FALLBACK: &str = "This assistant is not available on this site.";

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid session transition from {from} on {event}")]
pub struct TransitionError {
    pub from: &'static str,
    pub event: &'static str,
}

/// Handle returned by a successful handshake.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub session_id: String,
    pub widget_settings: WidgetSettings,
    /// Agent name reported by the backend, used when the settings carry none.
    pub agent_name: Option<String>,
}

impl Session {
    pub fn display_name(&self) -> &str {
        self.widget_settings.display_name(self.agent_name.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum SessionState {
    #[default]
    Initializing,
    Initialized(Session),
    Denied {
        reason: String,
    },
    Error {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum InitEvent {
    Allowed(Session),
    Denied(String),
    Failed(String),
}

impl InitEvent {
    pub fn name(&self) -> &'static str {
        match self {
            InitEvent::Allowed(_) => "allowed",
            InitEvent::Denied(_) => "denied",
            InitEvent::Failed(_) => "failed",
        }
    }

    /// Classifies the outcome of the init call.
    pub fn from_response(result: Result<InitResponse, BackendError>) -> Self {
        let resp = match result {
            Ok(resp) => resp,
            Err(err) => return InitEvent::Failed(err.to_string()),
        };
        if !resp.allowed {
            let reason = resp
                .error
                .filter(|e| !e.trim().is_empty())
                .unwrap_or_else(|| DENIED_FALLBACK.to_string());
            return InitEvent::Denied(reason);
        }
        match resp.session_id.filter(|id| !id.trim().is_empty()) {
            Some(session_id) => InitEvent::Allowed(Session {
                session_id,
                widget_settings: resp.widget_settings.unwrap_or_default(),
                agent_name: resp.agent_name,
            }),
            None => InitEvent::Failed("init allowed the widget without a session id".into()),
        }
    }
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Initializing => "initializing",
            SessionState::Initialized(_) => "initialized",
            SessionState::Denied { .. } => "denied",
            SessionState::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionState::Initializing)
    }

    pub fn session(&self) -> Option<&Session> {
        match self {
            SessionState::Initialized(session) => Some(session),
            _ => None,
        }
    }

    /// Applies one handshake outcome. Terminal states reject every event and
    /// stay as they are.
    pub fn apply(&mut self, event: InitEvent) -> Result<(), TransitionError> {
        if self.is_terminal() {
            return Err(TransitionError {
                from: self.name(),
                event: event.name(),
            });
        }
        *self = match event {
            InitEvent::Allowed(session) => SessionState::Initialized(session),
            InitEvent::Denied(reason) => SessionState::Denied { reason },
            InitEvent::Failed(reason) => SessionState::Error { reason },
        };
        Ok(())
    }
}
