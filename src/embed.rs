//! Host-page loader: finds the embedding `<script>` tag, reads its `data-*`
//! attributes and mounts one isolated host element per agent.

use kuchiki::NodeRef;
use kuchiki::traits::*;
use thiserror::Error;
use tracing::{error, info};

pub const HOST_ID_PREFIX: &str = "insydr-widget-";
pub const STYLESHEET_NAME: &str = "widget.css";
pub const DEFAULT_SCRIPT_SRC: &str = "http://127.0.0.1:5173/widget.js";

const ATTR_AGENT_ID: &str = "data-agent-id";
const ATTR_API_KEY: &str = "data-api-key";
const ATTR_API_BASE: &str = "data-api-base";
const MOUNT_WRAPPER_ID: &str = "__insydr_mount_wrapper";

#[derive(Debug, Error)]
pub enum MountError {
    #[error("html manipulation failed: {0}")]
    Html(String),
}

/// Configuration carried by the embedding script tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedConfig {
    pub agent_id: String,
    pub api_key: Option<String>,
    pub api_base: Option<String>,
    pub script_src: Option<String>,
}

impl EmbedConfig {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            api_key: None,
            api_base: None,
            script_src: None,
        }
    }

    pub fn host_id(&self) -> String {
        format!("{HOST_ID_PREFIX}{}", self.agent_id)
    }

    /// `data-api-base` wins over whatever the runtime was configured with.
    pub fn api_base_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.api_base.as_deref().unwrap_or(fallback)
    }

    /// Stylesheet shipped next to the script bundle.
    pub fn stylesheet_href(&self) -> String {
        let src = self.script_src.as_deref().unwrap_or_default();
        let base = src.rfind('/').map(|idx| &src[..idx]).unwrap_or_default();
        format!("{base}/{STYLESHEET_NAME}")
    }

    /// Recommended embed tag for this configuration.
    pub fn snippet(&self) -> String {
        let src = self.script_src.as_deref().unwrap_or(DEFAULT_SCRIPT_SRC);
        let mut tag = format!(
            "<script defer src=\"{}\" {ATTR_AGENT_ID}=\"{}\"",
            escape_attr(src),
            escape_attr(&self.agent_id)
        );
        if let Some(key) = &self.api_key {
            tag.push_str(&format!(" {ATTR_API_KEY}=\"{}\"", escape_attr(key)));
        }
        if let Some(base) = &self.api_base {
            tag.push_str(&format!(" {ATTR_API_BASE}=\"{}\"", escape_attr(base)));
        }
        tag.push_str("></script>");
        tag
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountedHost {
    pub host_id: String,
    pub stylesheet_href: String,
    pub embed: EmbedConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountOutcome {
    Mounted(MountedHost),
    /// A host for this agent was already on the page; nothing was added.
    AlreadyMounted(MountedHost),
    /// No usable `data-agent-id`; the page was left untouched.
    Skipped,
}

impl MountOutcome {
    pub fn host(&self) -> Option<&MountedHost> {
        match self {
            MountOutcome::Mounted(host) | MountOutcome::AlreadyMounted(host) => Some(host),
            MountOutcome::Skipped => None,
        }
    }
}

pub fn parse_document(html: &str) -> NodeRef {
    kuchiki::parse_html().one(html)
}

/// Reads the embed configuration from the script tag that loaded the widget.
///
/// `current_script` is the `src` of the executing script when known. When no
/// tag matches it, the first `script[data-agent-id]` is used instead.
pub fn locate_embed(
    document: &NodeRef,
    current_script: Option<&str>,
) -> Result<Option<EmbedConfig>, MountError> {
    let scripts = document
        .select("script")
        .map_err(|e| MountError::Html(format!("query selector script failed: {e:?}")))?
        .collect::<Vec<_>>();

    let current = current_script.map(str::trim).and_then(|wanted| {
        scripts.iter().find(|script| {
            script
                .attributes
                .borrow()
                .get("src")
                .is_some_and(|src| src.trim() == wanted)
        })
    });
    let tag = current.or_else(|| {
        scripts
            .iter()
            .find(|script| script.attributes.borrow().contains(ATTR_AGENT_ID))
    });
    let Some(tag) = tag else {
        return Ok(None);
    };

    let attrs = tag.attributes.borrow();
    let read = |name: &str| {
        attrs
            .get(name)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    let Some(agent_id) = read(ATTR_AGENT_ID) else {
        return Ok(None);
    };
    Ok(Some(EmbedConfig {
        agent_id,
        api_key: read(ATTR_API_KEY),
        api_base: read(ATTR_API_BASE),
        script_src: read("src"),
    }))
}

/// Runs the loader against a host page.
pub fn mount(document: &NodeRef, current_script: Option<&str>) -> Result<MountOutcome, MountError> {
    let Some(embed) = locate_embed(document, current_script)? else {
        error!("insydr widget: missing {ATTR_AGENT_ID} attribute; not mounting");
        return Ok(MountOutcome::Skipped);
    };

    let host = MountedHost {
        host_id: embed.host_id(),
        stylesheet_href: embed.stylesheet_href(),
        embed,
    };

    if find_by_id(document, &host.host_id)?.is_some() {
        info!(
            agent_id = %host.embed.agent_id,
            host_id = %host.host_id,
            "widget host already mounted"
        );
        return Ok(MountOutcome::AlreadyMounted(host));
    }

    let body = document
        .select_first("body")
        .map_err(|_| MountError::Html("document has no body".to_string()))?;
    let host_html = format!(
        "<div id=\"{MOUNT_WRAPPER_ID}\"><div id=\"{id}\" data-insydr-isolation=\"shadow-root\">\
         <link rel=\"stylesheet\" href=\"{href}\"><div data-insydr-mount=\"\"></div></div></div>",
        id = escape_attr(&host.host_id),
        href = escape_attr(&host.stylesheet_href),
    );
    let fragment_doc = kuchiki::parse_html().one(host_html);
    let wrapper = fragment_doc
        .select_first(&format!("#{MOUNT_WRAPPER_ID}"))
        .map_err(|_| MountError::Html("select mount wrapper failed".to_string()))?;
    let children: Vec<_> = wrapper.as_node().children().collect();
    for child in children {
        body.as_node().append(child);
    }

    info!(agent_id = %host.embed.agent_id, host_id = %host.host_id, "mounted widget host");
    Ok(MountOutcome::Mounted(host))
}

/// Number of host elements for `agent_id` currently on the page.
pub fn host_count(document: &NodeRef, agent_id: &str) -> Result<usize, MountError> {
    let wanted = format!("{HOST_ID_PREFIX}{agent_id}");
    Ok(elements_with_id(document)?
        .into_iter()
        .filter(|node| node_id(node).as_deref() == Some(wanted.as_str()))
        .count())
}

fn find_by_id(document: &NodeRef, id: &str) -> Result<Option<NodeRef>, MountError> {
    Ok(elements_with_id(document)?
        .into_iter()
        .find(|node| node_id(node).as_deref() == Some(id)))
}

// Ids are compared as strings so agent ids never have to be valid CSS.
fn elements_with_id(document: &NodeRef) -> Result<Vec<NodeRef>, MountError> {
    Ok(document
        .select("[id]")
        .map_err(|e| MountError::Html(format!("query selector [id] failed: {e:?}")))?
        .map(|el| el.as_node().clone())
        .collect())
}

fn node_id(node: &NodeRef) -> Option<String> {
    node.as_element()
        .and_then(|el| el.attributes.borrow().get("id").map(str::to_string))
}

fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}
