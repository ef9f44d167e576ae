use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use insydr_widget::backend::WidgetBackend;
use insydr_widget::config::AppConfig;
use insydr_widget::context::{AppContext, PageLoad};
use insydr_widget::embed::{self, DEFAULT_SCRIPT_SRC, EmbedConfig};
use insydr_widget::terminal;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "insydr-widget", version, about = "Insydr chat widget runtime")]
struct Cli {
    /// Optional TOML config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Overrides the configured API base.
    #[arg(long, global = true)]
    api_base: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the script tag that embeds a widget.
    Snippet {
        #[arg(long)]
        agent_id: String,
        #[arg(long)]
        api_key: Option<String>,
        /// Written as `data-api-base` on the tag.
        #[arg(long)]
        data_api_base: Option<String>,
        #[arg(long)]
        script_src: Option<String>,
    },
    /// Run the loader against a host page and print the resulting HTML.
    Mount {
        #[arg(long)]
        page: PathBuf,
        #[arg(long)]
        script_src: Option<String>,
    },
    /// Fetch the public widget configuration for an agent.
    Config {
        #[arg(long)]
        agent_id: String,
    },
    /// Load, initialize and chat with a widget from the terminal.
    Chat(ChatArgs),
}

#[derive(Args, Debug)]
struct ChatArgs {
    /// Host page carrying the embed tag.
    #[arg(long, conflicts_with_all = ["agent_id", "api_key"], required_unless_present = "agent_id")]
    page: Option<PathBuf>,
    #[arg(long)]
    agent_id: Option<String>,
    #[arg(long)]
    api_key: Option<String>,
    #[arg(long)]
    page_url: String,
    #[arg(long)]
    referrer: Option<String>,
    #[arg(long)]
    script_src: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Snippet {
            agent_id,
            api_key,
            data_api_base,
            script_src,
        } => {
            let embed = EmbedConfig {
                api_key,
                api_base: data_api_base,
                script_src,
                ..EmbedConfig::new(agent_id)
            };
            println!("{}", embed.snippet());
        }
        Command::Mount { page, script_src } => {
            let html = read_page(&page).await?;
            let document = embed::parse_document(&html);
            let outcome = embed::mount(&document, script_src.as_deref())?;
            match outcome.host() {
                Some(host) => tracing::info!(host_id = %host.host_id, "widget host ready"),
                None => tracing::warn!(page = %page.display(), "loader skipped page"),
            }
            let html = document.to_string();
            println!("{html}");
        }
        Command::Config { agent_id } => {
            let ctx = AppContext::init(load_config(cli.config.as_deref(), cli.api_base)?)?;
            let backend = ctx.backend_for(&EmbedConfig::new(agent_id.clone()))?;
            let config = backend
                .fetch_config(&agent_id)
                .await
                .with_context(|| format!("fetching widget config for {agent_id}"))?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Command::Chat(args) => {
            let ctx = AppContext::init(load_config(cli.config.as_deref(), cli.api_base)?)?;
            run_chat(&ctx, args).await?;
            ctx.shutdown().await;
        }
    }
    Ok(())
}

async fn run_chat(ctx: &AppContext, args: ChatArgs) -> anyhow::Result<()> {
    let (html, current_script) = match (&args.page, &args.agent_id) {
        (Some(page), _) => (read_page(page).await?, args.script_src.clone()),
        (None, Some(agent_id)) => {
            let script_src = args
                .script_src
                .clone()
                .unwrap_or_else(|| DEFAULT_SCRIPT_SRC.to_string());
            let embed = EmbedConfig {
                api_key: args.api_key.clone(),
                script_src: Some(script_src.clone()),
                ..EmbedConfig::new(agent_id.clone())
            };
            let html = format!("<html><head></head><body>{}</body></html>", embed.snippet());
            (html, Some(script_src))
        }
        (None, None) => anyhow::bail!("either --page or --agent-id is required"),
    };

    let document = embed::parse_document(&html);
    let load = PageLoad {
        page_url: args.page_url,
        referrer: args.referrer,
        current_script,
    };
    let Some(loaded) = ctx.launch(&document, load).await? else {
        anyhow::bail!("no widget could be loaded from the page");
    };

    let mut stdout = tokio::io::stdout();
    terminal::run_session(loaded.widget, BufReader::new(tokio::io::stdin()), &mut stdout).await?;
    stdout.flush().await?;
    Ok(())
}

async fn read_page(path: &Path) -> anyhow::Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading host page {}", path.display()))
}

fn load_config(path: Option<&Path>, api_base: Option<String>) -> anyhow::Result<AppConfig> {
    let mut config = AppConfig::load(path)?;
    if let Some(api_base) = api_base.filter(|v| !v.trim().is_empty()) {
        config.api_base = api_base.trim().to_string();
    }
    Ok(config)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}
