use crate::backend::WidgetBackend;
use crate::protocol::EventRequest;
use crate::session::Session;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    WidgetOpen,
    WidgetClose,
    FeedbackPositive,
    FeedbackNegative,
    Custom(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::WidgetOpen => "widget_open",
            EventKind::WidgetClose => "widget_close",
            EventKind::FeedbackPositive => "feedback_positive",
            EventKind::FeedbackNegative => "feedback_negative",
            EventKind::Custom(name) => name,
        }
    }
}

impl From<&str> for EventKind {
    fn from(value: &str) -> Self {
        match value {
            "widget_open" => EventKind::WidgetOpen,
            "widget_close" => EventKind::WidgetClose,
            "feedback_positive" => EventKind::FeedbackPositive,
            "feedback_negative" => EventKind::FeedbackNegative,
            other => EventKind::Custom(other.to_string()),
        }
    }
}

/// Best-effort analytics beacon. Nothing it does can fail the caller.
#[derive(Clone)]
pub struct EventTracker {
    backend: Arc<dyn WidgetBackend>,
}

impl EventTracker {
    pub fn new(backend: Arc<dyn WidgetBackend>) -> Self {
        Self { backend }
    }

    /// Posts the event on a background task. Returns `None` without a
    /// session; the handle is only useful to callers that want to wait.
    pub fn track(
        &self,
        agent_id: &str,
        session: Option<&Session>,
        kind: EventKind,
        data: Option<Value>,
    ) -> Option<JoinHandle<()>> {
        let Some(session) = session else {
            debug!(event_type = %kind.as_str(), "no session; event not tracked");
            return None;
        };
        let req = EventRequest {
            agent_id: agent_id.to_string(),
            session_id: session.session_id.clone(),
            event_type: kind.as_str().to_string(),
            event_data: data.unwrap_or_else(|| Value::Object(Map::new())),
        };
        let backend = self.backend.clone();
        Some(tokio::spawn(async move {
            match backend.track_event(&req).await {
                Ok(()) => debug!(
                    session_id = %req.session_id,
                    event_type = %req.event_type,
                    "widget event tracked"
                ),
                Err(err) => warn!(
                    session_id = %req.session_id,
                    event_type = %req.event_type,
                    %err,
                    "widget event tracking failed"
                ),
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::WidgetSettings;
    use crate::testing::ScriptedBackend;
    use reqwest::StatusCode;
    use serde_json::json;

    fn session() -> Session {
        Session {
            session_id: "s1".into(),
            widget_settings: WidgetSettings::default(),
            agent_name: None,
        }
    }

    #[tokio::test]
    async fn posts_event_with_empty_data_by_default() {
        let backend = Arc::new(ScriptedBackend::allowing("s1"));
        let tracker = EventTracker::new(backend.clone());
        tracker
            .track("a1", Some(&session()), EventKind::WidgetOpen, None)
            .expect("spawned")
            .await
            .unwrap();
        let events = backend.events();
        assert_eq!(events.len(), 1);
        assert_eq!(
            serde_json::to_value(&events[0]).unwrap(),
            json!({
                "agent_id": "a1",
                "session_id": "s1",
                "event_type": "widget_open",
                "event_data": {}
            })
        );
    }

    #[tokio::test]
    async fn no_session_means_no_request() {
        let backend = Arc::new(ScriptedBackend::allowing("s1"));
        let tracker = EventTracker::new(backend.clone());
        assert!(
            tracker
                .track("a1", None, EventKind::WidgetClose, None)
                .is_none()
        );
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn failures_are_swallowed() {
        let backend =
            Arc::new(ScriptedBackend::allowing("s1").events_fail(StatusCode::BAD_GATEWAY));
        let tracker = EventTracker::new(backend.clone());
        let handle = tracker
            .track(
                "a1",
                Some(&session()),
                EventKind::from("cta_click"),
                Some(json!({"cta": "pricing"})),
            )
            .unwrap();
        assert!(handle.await.is_ok());
        assert_eq!(backend.events()[0].event_type, "cta_click");
    }

    #[test]
    fn known_kinds_round_trip_names() {
        for name in [
            "widget_open",
            "widget_close",
            "feedback_positive",
            "feedback_negative",
        ] {
            assert_eq!(EventKind::from(name).as_str(), name);
        }
        assert_eq!(
            EventKind::from("custom"),
            EventKind::Custom("custom".into())
        );
    }
}
