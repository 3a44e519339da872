use std::{
    fmt::Write,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex,
    },
};

use anyhow::Result;
use async_trait::async_trait;

use crate::{
    driver::Event,
    surface::{
        ChannelId, Control, Destination, Embed, IncomingMessage, Interaction, InteractionKind,
        MessageId, OutgoingMessage, Surface, UserId,
    },
};

pub const CONSOLE_USER: &str = "console";
const CONSOLE_CHANNEL: &str = "console";

/// Terminal transport: outbound messages go to stdout, and the most recent
/// menu is the target of slash commands.
#[derive(Default)]
pub struct ConsoleSurface {
    next_id: AtomicU64,
    last_menu: Mutex<Option<MessageId>>,
}

impl ConsoleSurface {
    fn next_id(&self) -> MessageId {
        MessageId(format!("m{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1))
    }

    fn last_menu(&self) -> Option<MessageId> {
        self.last_menu.lock().ok().and_then(|x| x.clone())
    }

    fn remember_menu(&self, id: &MessageId, msg: &OutgoingMessage) {
        if msg.controls.is_empty() {
            return;
        }
        if let Ok(mut last) = self.last_menu.lock() {
            *last = Some(id.clone());
        }
    }

    /// Turns one input line into an event. Blank lines and commands with no
    /// menu to act on yield `None`.
    pub fn parse_line(&self, line: &str) -> Option<Event> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let kind = match line.split_once(' ').unwrap_or((line, "")) {
            ("/card", rest) => InteractionKind::CardSelect(
                rest.split_whitespace()
                    .filter_map(|x| x.parse::<usize>().ok())
                    .filter(|x| *x > 0)
                    .map(|x| (x - 1).to_string())
                    .collect(),
            ),
            ("/page", rest) => match rest.trim().parse::<usize>() {
                Ok(n) if n > 0 => InteractionKind::PageSelect((n - 1).to_string()),
                _ => return None,
            },
            ("/delete", _) => InteractionKind::Delete,
            _ => {
                let id = self.next_id();
                return Some(Event::Message(IncomingMessage {
                    id,
                    channel: ChannelId(CONSOLE_CHANNEL.into()),
                    author: UserId(CONSOLE_USER.into()),
                    author_is_bot: false,
                    content: line.to_string(),
                }));
            }
        };

        let message = match self.last_menu() {
            Some(x) => x,
            None => {
                tracing::warn!("no menu to act on");
                return None;
            }
        };
        Some(Event::Interaction(Interaction {
            message,
            user: UserId(CONSOLE_USER.into()),
            kind,
        }))
    }
}

fn render_embed(out: &mut String, embed: &Embed) {
    if let Some(title) = &embed.title {
        let _ = writeln!(out, "== {} ==", title);
    }
    if let Some(description) = &embed.description {
        let _ = writeln!(out, "{}", description);
    }
    for (i, field) in embed.fields.iter().enumerate() {
        let _ = writeln!(out, "[{}] {}", i + 1, field.value.replace('\n', "\n    "));
    }
    if let Some(image) = &embed.thumbnail {
        let _ = writeln!(out, "<{}>", image);
    }
    if let Some(footer) = &embed.footer {
        let _ = writeln!(out, "-- {} --", footer);
    }
}

pub fn render_text(id: &MessageId, msg: &OutgoingMessage) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "#{}", id);
    if let Some(content) = &msg.content {
        let _ = writeln!(out, "{}", content);
    }
    for embed in &msg.embeds {
        render_embed(&mut out, embed);
    }
    for file in &msg.files {
        let _ = writeln!(out, "<{}>", file);
    }
    for control in &msg.controls {
        let line = match control {
            Control::CardSelect { max_values, .. } => {
                format!("/card <n>... to pick up to {}", max_values)
            }
            Control::PageSelect { options } => format!(
                "/page <n> to browse, e.g. {}",
                options
                    .iter()
                    .map(|x| x.label.trim_start_matches("Page ").to_string())
                    .collect::<Vec<_>>()
                    .join(" ")
            ),
            Control::Delete => "/delete to dismiss".to_string(),
        };
        let _ = writeln!(out, "  {}", line);
    }
    out
}

#[async_trait]
impl Surface for ConsoleSurface {
    async fn send(
        &self,
        _to: &Destination,
        _reply_to: Option<&MessageId>,
        msg: OutgoingMessage,
    ) -> Result<MessageId> {
        let id = self.next_id();
        self.remember_menu(&id, &msg);
        println!("{}", render_text(&id, &msg));
        Ok(id)
    }

    async fn edit(&self, _at: &Destination, id: &MessageId, msg: OutgoingMessage) -> Result<()> {
        println!("(edited) {}", render_text(id, &msg));
        Ok(())
    }

    async fn delete(&self, _at: &Destination, id: &MessageId) -> Result<()> {
        if let Ok(mut last) = self.last_menu.lock() {
            if last.as_ref() == Some(id) {
                *last = None;
            }
        }
        tracing::debug!(id = %id, "message deleted");
        Ok(())
    }
}
