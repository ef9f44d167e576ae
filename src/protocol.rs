//! Wire types for the public `/widget/*` endpoints.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::{DefaultOnNull, serde_as};

pub const DEFAULT_PRIMARY_COLOR: &str = "#EF4444";
pub const DEFAULT_AGENT_NAME: &str = "Agent";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InitRequest {
    pub agent_id: String,
    pub api_key: Option<String>,
    pub page_url: String,
    pub page_title: Option<String>,
    pub referrer: Option<String>,
    pub language: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InitResponse {
    pub allowed: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub widget_settings: Option<WidgetSettings>,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub agent_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatRequest {
    pub agent_id: String,
    pub session_id: String,
    pub message: String,
    pub page_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatResponse {
    pub response: String,
    #[serde(default)]
    pub message_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventRequest {
    pub agent_id: String,
    pub session_id: String,
    pub event_type: String,
    pub event_data: Value,
}

/// Response of the lightweight `GET /widget/config/{agent_id}` prefetch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfigResponse {
    pub agent_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub configuration: ConfigEnvelope,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConfigEnvelope {
    #[serde(default)]
    pub widget_settings: WidgetSettings,
}

/// Display configuration handed out by the backend at init time.
///
/// Every field is optional on the wire; `null` and unknown enum values fall
/// back to the same defaults the widget uses when the field is missing.
#[serde_as]
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct WidgetSettings {
    #[serde_as(as = "DefaultOnNull")]
    pub theme: Theme,
    pub primary_color: Option<String>,
    #[serde_as(as = "DefaultOnNull")]
    pub position: WidgetPosition,
    pub welcome_message: Option<String>,
    pub agent_name: Option<String>,
    pub show_powered_by: Option<bool>,
}

impl WidgetSettings {
    pub fn primary_color(&self) -> &str {
        self.primary_color
            .as_deref()
            .filter(|color| !color.trim().is_empty())
            .unwrap_or(DEFAULT_PRIMARY_COLOR)
    }

    pub fn shows_powered_by(&self) -> bool {
        self.show_powered_by.unwrap_or(true)
    }

    /// Welcome text worth seeding into the transcript, if any.
    pub fn welcome(&self) -> Option<&str> {
        self.welcome_message
            .as_deref()
            .filter(|msg| !msg.trim().is_empty())
    }

    pub fn display_name<'a>(&'a self, fallback: Option<&'a str>) -> &'a str {
        self.agent_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .or(fallback.filter(|name| !name.trim().is_empty()))
            .unwrap_or(DEFAULT_AGENT_NAME)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "String", into = "String")]
pub enum WidgetPosition {
    #[default]
    BottomRight,
    BottomLeft,
    TopRight,
    TopLeft,
}

impl WidgetPosition {
    pub fn as_str(&self) -> &'static str {
        match self {
            WidgetPosition::BottomRight => "bottom-right",
            WidgetPosition::BottomLeft => "bottom-left",
            WidgetPosition::TopRight => "top-right",
            WidgetPosition::TopLeft => "top-left",
        }
    }
}

impl From<String> for WidgetPosition {
    fn from(value: String) -> Self {
        match value.as_str() {
            "bottom-left" => WidgetPosition::BottomLeft,
            "top-right" => WidgetPosition::TopRight,
            "top-left" => WidgetPosition::TopLeft,
            _ => WidgetPosition::BottomRight,
        }
    }
}

impl From<WidgetPosition> for String {
    fn from(value: WidgetPosition) -> Self {
        value.as_str().to_string()
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "String", into = "String")]
pub enum Theme {
    #[default]
    Auto,
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Auto => "auto",
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }
}

impl From<String> for Theme {
    fn from(value: String) -> Self {
        match value.as_str() {
            "light" => Theme::Light,
            "dark" => Theme::Dark,
            _ => Theme::Auto,
        }
    }
}

impl From<Theme> for String {
    fn from(value: Theme) -> Self {
        value.as_str().to_string()
    }
}
