use crate::embed::EmbedConfig;
use crate::protocol::InitRequest;
use kuchiki::NodeRef;
use serde::{Deserialize, Serialize};

/// What the widget knows about the page it was embedded in. Captured once at
/// load time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageContext {
    pub agent_id: String,
    pub api_key: Option<String>,
    pub page_url: String,
    pub page_title: Option<String>,
    pub referrer: Option<String>,
    pub language: Option<String>,
}

impl PageContext {
    pub fn capture(
        document: &NodeRef,
        embed: &EmbedConfig,
        page_url: impl Into<String>,
        referrer: Option<String>,
        language: Option<String>,
    ) -> Self {
        Self {
            agent_id: embed.agent_id.clone(),
            api_key: embed.api_key.clone(),
            page_url: page_url.into(),
            page_title: document_title(document),
            referrer: referrer.filter(|r| !r.trim().is_empty()),
            language,
        }
    }

    pub fn init_request(&self) -> InitRequest {
        InitRequest {
            agent_id: self.agent_id.clone(),
            api_key: self.api_key.clone(),
            page_url: self.page_url.clone(),
            page_title: self.page_title.clone(),
            referrer: self.referrer.clone(),
            language: self.language.clone(),
        }
    }
}

fn document_title(document: &NodeRef) -> Option<String> {
    let title = document.select_first("title").ok()?;
    let text = title.text_contents();
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!text.is_empty()).then_some(text)
}
