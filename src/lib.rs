//! Lyrebird is a Discord bot that replays one channel's history into
//! another, impersonating the original authors through a pool of webhooks.

pub mod config;
pub mod discord;
pub mod error;
pub mod host;
pub mod relay;

pub use error::{Error, Result};

use serde::{Deserialize, Serialize};

/// Discord channel id, kept as a raw snowflake so the relay core stays
/// independent of the platform crate.
pub type ChannelId = u64;

/// Discord message id snowflake.
pub type MessageId = u64;

/// Pointer to a message in some channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef {
    pub channel: ChannelId,
    pub message: MessageId,
}

/// The author of a source message, reduced to what impersonation needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorRef {
    /// Username shown on the replayed message.
    pub display_name: String,
    /// Resolved avatar URL, if the author has one.
    pub avatar_url: Option<String>,
}

/// Platform system events the relay renders as bold notice lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SystemEvent {
    AutoModAction,
    CallStart,
    ChannelFollowAdd,
    IconChange,
    NameChange,
    MessagePinned,
    ContextMenuCommand,
    ApplicationSubscription,
    Boost,
    BoostTier1,
    BoostTier2,
    BoostTier3,
    DiscoveryDisqualified,
    DiscoveryRequalified,
    DiscoveryInitialWarning,
    DiscoveryFinalWarning,
    InviteReminder,
    PremiumUpsell,
    RecipientAdd,
    RecipientRemove,
    RoleSubscription,
    StageEnd,
    StageSpeaker,
    StageStart,
    StageTopic,
    ThreadCreated,
    MemberJoin,
    /// A system event the platform names but the notice table does not.
    Other(u8),
}

/// How a source message should be treated during transcoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    /// Regular user content, including replies and slash-command output.
    Normal,
    /// The synthetic first message of a thread, standing in for a message
    /// that lives in the parent channel.
    ThreadStarter,
    /// A platform-generated event message.
    System(SystemEvent),
    /// A type id the platform model itself does not recognize.
    Unknown(u8),
}

/// One attachment on a source message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub filename: String,
    pub url: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedAuthorPayload {
    pub name: String,
    pub url: Option<String>,
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedFooterPayload {
    pub text: String,
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedFieldPayload {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// A message embed, flattened to the fields the relay can rebuild.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedPayload {
    /// Platform embed kind; only `"rich"` embeds survive transcoding.
    pub kind: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub color: Option<u32>,
    /// RFC 3339 timestamp string, passed through verbatim.
    pub timestamp: Option<String>,
    pub author: Option<EmbedAuthorPayload>,
    pub footer: Option<EmbedFooterPayload>,
    pub image_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub fields: Vec<EmbedFieldPayload>,
}

/// An emoji as it appears in a reaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmojiRef {
    Unicode(String),
    Custom {
        id: u64,
        name: Option<String>,
        animated: bool,
        /// Whether the bot can actually use this emoji. Reactions with
        /// unusable emojis are skipped rather than attempted and failed.
        known: bool,
    },
}

/// One reaction on a source message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionRef {
    pub emoji: EmojiRef,
    pub count: u64,
}

/// A fetched message, reduced to the platform-agnostic model the relay
/// core operates on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMessage {
    pub id: MessageId,
    pub channel: ChannelId,
    pub author: AuthorRef,
    pub kind: MessageKind,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub content: String,
    pub attachments: Vec<AttachmentRef>,
    pub embeds: Vec<EmbedPayload>,
    pub reactions: Vec<ReactionRef>,
    /// The message this one points at, when the platform supplied one.
    /// Thread starters use it to reach the real message in the parent
    /// channel.
    pub reference: Option<MessageRef>,
    /// Canonical link to the original message, used in diagnostics.
    pub permalink: String,
}

/// Where a copy job writes: the target channel plus, for threads, the
/// parent channel that owns the webhooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    pub channel: ChannelId,
    /// Parent channel when `channel` is a thread. Webhooks live on the
    /// parent and are executed with the thread as the target.
    pub parent: Option<ChannelId>,
}

impl Destination {
    /// Destination for a plain text channel.
    pub fn channel(channel: ChannelId) -> Self {
        Self { channel, parent: None }
    }

    /// Destination for a thread, bound to the parent that owns its webhooks.
    pub fn thread(channel: ChannelId, parent: ChannelId) -> Self {
        Self { channel, parent: Some(parent) }
    }

    /// The channel webhooks are created on.
    pub fn webhook_channel(&self) -> ChannelId {
        self.parent.unwrap_or(self.channel)
    }

    pub fn is_thread(&self) -> bool {
        self.parent.is_some()
    }
}

/// One webhook the pool can impersonate an author through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Webhook id.
    pub id: u64,
    /// Execution token. Adopted webhooks without one fall back to the
    /// bot's own management routes.
    pub token: Option<String>,
    /// Name last applied to the webhook.
    pub name: String,
    /// Avatar source URL last applied to the webhook. `None` until an
    /// author claims the handle.
    pub avatar: Option<String>,
}

impl Identity {
    /// Whether this handle already presents as `author`, making a send
    /// possible without any rename round-trip.
    pub fn matches(&self, author: &AuthorRef) -> bool {
        self.name == author.display_name && self.avatar == author.avatar_url
    }
}
