use std::fmt;

use anyhow::Result;
use async_trait::async_trait;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ChannelId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub String);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Destination {
    Channel(ChannelId),
    Direct(UserId),
}

#[derive(Clone, Debug)]
pub struct IncomingMessage {
    pub id: MessageId,
    pub channel: ChannelId,
    pub author: UserId,
    pub author_is_bot: bool,
    pub content: String,
}

#[derive(Clone, Debug)]
pub struct Interaction {
    /// The menu message the control belongs to.
    pub message: MessageId,
    pub user: UserId,
    pub kind: InteractionKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InteractionKind {
    CardSelect(Vec<String>),
    PageSelect(String),
    Delete,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Embed {
    pub color: Option<u32>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub fields: Vec<EmbedField>,
    pub thumbnail: Option<String>,
    pub footer: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectOption {
    pub label: String,
    pub description: Option<String>,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Control {
    CardSelect {
        options: Vec<SelectOption>,
        max_values: usize,
    },
    PageSelect {
        options: Vec<SelectOption>,
    },
    Delete,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub content: Option<String>,
    pub embeds: Vec<Embed>,
    /// Attachment URLs.
    pub files: Vec<String>,
    pub controls: Vec<Control>,
}

impl OutgoingMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }
}

/// Outbound side of the chat platform.
#[async_trait]
pub trait Surface: Send + Sync + 'static {
    async fn send(
        &self,
        to: &Destination,
        reply_to: Option<&MessageId>,
        msg: OutgoingMessage,
    ) -> Result<MessageId>;

    async fn edit(&self, at: &Destination, id: &MessageId, msg: OutgoingMessage) -> Result<()>;

    async fn delete(&self, at: &Destination, id: &MessageId) -> Result<()>;
}
