//! Line-oriented host surface for a launched widget.
//!
//! Plain lines are sent as chat messages. A few slash commands drive the
//! rest of the widget: `/open`, `/close`, `/good`, `/bad`, `/event NAME`
//! and `/quit`.

use crate::chat::{Message, Role};
use crate::widget::{Widget, WidgetView};
use anyhow::Context;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;
use tracing::debug;

async fn say<W: AsyncWrite + Unpin>(out: &mut W, line: &str) -> anyhow::Result<()> {
    out.write_all(line.as_bytes()).await?;
    out.write_all(b"\n").await?;
    out.flush().await.context("flushing terminal output")
}

fn render(agent: &str, message: &Message) -> String {
    match (message.role, message.is_error) {
        (Role::User, _) => format!("you: {}", message.content),
        (Role::Assistant, true) => format!("{agent} [error]: {}", message.content),
        (Role::Assistant, false) => format!("{agent}: {}", message.content),
    }
}

/// Drives `widget` from `input` until EOF or `/quit`. Denied and failed
/// widgets print their notice and return without reading any input.
pub async fn run_session<R, W>(widget: Arc<Widget>, input: R, mut out: W) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let agent = match widget.view().await {
        WidgetView::Hidden => {
            say(&mut out, "widget is not initialized").await?;
            return Ok(());
        }
        WidgetView::Denied { message } => {
            say(&mut out, &format!("widget denied: {message}")).await?;
            return Ok(());
        }
        WidgetView::Unavailable { message } => {
            say(&mut out, &message).await?;
            return Ok(());
        }
        WidgetView::Chat(view) => {
            say(
                &mut out,
                &format!(
                    "== {} ({}, {}, {}) ==",
                    view.agent_name,
                    view.settings.theme.as_str(),
                    view.settings.position.as_str(),
                    view.settings.primary_color()
                ),
            )
            .await?;
            for message in &view.transcript {
                say(&mut out, &render(&view.agent_name, message)).await?;
            }
            view.agent_name
        }
    };

    let mut pending: Vec<JoinHandle<()>> = Vec::new();
    pending.extend(widget.open().await);

    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await.context("reading terminal input")? {
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/open" => pending.extend(widget.open().await),
            "/close" => pending.extend(widget.close().await),
            "/good" | "/bad" => {
                let rated = widget
                    .transcript()
                    .await
                    .into_iter()
                    .rev()
                    .find(|m| m.role == Role::Assistant && !m.is_error);
                match rated {
                    Some(message) => {
                        pending.extend(widget.feedback(&message.id, line == "/good").await);
                        say(&mut out, "(feedback recorded)").await?;
                    }
                    None => say(&mut out, "(nothing to rate yet)").await?,
                }
            }
            command if command.split_whitespace().next() == Some("/event") => {
                let name = command["/event".len()..].trim();
                if !name.is_empty() {
                    pending.extend(widget.track(name, None).await);
                }
            }
            text => match widget.send(text).await {
                Some(reply) => say(&mut out, &render(&agent, &reply)).await?,
                None => debug!("message not sent"),
            },
        }
    }

    pending.extend(widget.close().await);
    for handle in pending {
        let _ = handle.await;
    }
    Ok(())
}
