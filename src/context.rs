use crate::backend::{BackendError, HttpWidgetBackend, WidgetBackend};
use crate::config::AppConfig;
use crate::embed::{self, EmbedConfig, MountOutcome, MountedHost};
use crate::page::PageContext;
use crate::widget::Widget;
use anyhow::Context;
use kuchiki::NodeRef;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Per-page inputs the loader cannot read from the document itself.
#[derive(Debug, Clone, Default)]
pub struct PageLoad {
    pub page_url: String,
    pub referrer: Option<String>,
    /// `src` of the executing script, when known.
    pub current_script: Option<String>,
}

pub struct LoadedWidget {
    pub host: MountedHost,
    pub widget: Arc<Widget>,
}

/// Application-wide state, created once at start-up and torn down with
/// [`AppContext::shutdown`].
pub struct AppContext {
    config: AppConfig,
    client: reqwest::Client,
    /// Launched widgets by host element id.
    widgets: Mutex<HashMap<String, Arc<Widget>>>,
}

impl AppContext {
    pub fn init(config: AppConfig) -> anyhow::Result<Self> {
        let client = HttpWidgetBackend::build_client(config.request_timeout)
            .context("failed to build http client")?;
        info!(api_base = %config.api_base, "widget context initialized");
        Ok(Self {
            config,
            client,
            widgets: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// HTTP backend for an embed, honouring its `data-api-base`.
    pub fn backend_for(&self, embed: &EmbedConfig) -> Result<Arc<dyn WidgetBackend>, BackendError> {
        let api_base = embed.api_base_or(&self.config.api_base);
        Ok(Arc::new(HttpWidgetBackend::with_client(
            api_base,
            self.client.clone(),
        )?))
    }

    pub async fn launch(
        &self,
        document: &NodeRef,
        load: PageLoad,
    ) -> anyhow::Result<Option<LoadedWidget>> {
        self.launch_with(document, load, |embed| self.backend_for(embed))
            .await
    }

    /// Loader, then handshake. Returns `None` when the loader skipped the
    /// page, in which case no backend was built and nothing was sent.
    /// Launching a host that this context already runs returns the same
    /// widget without a second handshake.
    pub async fn launch_with<F>(
        &self,
        document: &NodeRef,
        load: PageLoad,
        make_backend: F,
    ) -> anyhow::Result<Option<LoadedWidget>>
    where
        F: FnOnce(&EmbedConfig) -> Result<Arc<dyn WidgetBackend>, BackendError>,
    {
        let outcome = embed::mount(document, load.current_script.as_deref())
            .context("mounting widget host")?;
        let host = match outcome {
            MountOutcome::Skipped => return Ok(None),
            MountOutcome::Mounted(host) | MountOutcome::AlreadyMounted(host) => host,
        };

        let widget = {
            let mut widgets = self.widgets.lock().await;
            if let Some(widget) = widgets.get(&host.host_id).cloned() {
                debug!(host_id = %host.host_id, "widget already running for host");
                drop(widgets);
                // Waits for the first launch's handshake if it is still running.
                widget.initialize().await;
                return Ok(Some(LoadedWidget { host, widget }));
            }
            let backend = make_backend(&host.embed)
                .with_context(|| format!("building backend for agent {}", host.embed.agent_id))?;
            let page = PageContext::capture(
                document,
                &host.embed,
                load.page_url,
                load.referrer,
                self.config.language.clone(),
            );
            let widget = Arc::new(Widget::new(page, backend));
            widgets.insert(host.host_id.clone(), widget.clone());
            widget
        };

        let state = widget.initialize().await;
        debug!(agent_id = %host.embed.agent_id, state = state.name(), "widget launched");
        Ok(Some(LoadedWidget { host, widget }))
    }

    /// Closes every launched widget and waits for the close beacons.
    pub async fn shutdown(self) {
        let widgets = std::mem::take(&mut *self.widgets.lock().await);
        for widget in widgets.into_values() {
            if let Some(handle) = widget.close().await {
                let _ = handle.await;
            }
        }
        info!("widget context shut down");
    }
}
