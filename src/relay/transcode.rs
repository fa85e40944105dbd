//! Per-message conversion into the payloads a destination can accept.

use crate::{MessageKind, MessageRef, SourceMessage, SystemEvent};

/// Largest attachment the platform accepts on a standard re-upload.
/// Anything bigger is relayed as a bare URL in its own message.
pub const MAX_INLINE_BYTES: u64 = 8_000_000;

/// Deliverable parts of one normal message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentPayload {
    pub text: Option<String>,
    /// Attachments small enough to re-upload with the primary send.
    pub inline_urls: Vec<String>,
    /// Attachments over the upload ceiling, each sent as a link of its own.
    pub oversized_urls: Vec<String>,
    pub embeds: Vec<crate::EmbedPayload>,
}

impl ContentPayload {
    /// True when the primary bundle would carry nothing. Oversized links
    /// are separate sends and do not count.
    pub fn primary_is_empty(&self) -> bool {
        self.text.is_none() && self.inline_urls.is_empty() && self.embeds.is_empty()
    }
}

/// The delivery plan for one source message.
#[derive(Debug, Clone, PartialEq)]
pub enum Transcoded {
    /// A system event rendered as a bold notice line, sent as the bot.
    Notice(String),
    /// A thread-starter pseudo-message; the referenced message should be
    /// fetched and transcoded in its place.
    StarterRedirect(MessageRef),
    /// A normal message's content.
    Content(ContentPayload),
    /// Nothing can be delivered for this message.
    Skip,
}

/// Convert one source message into its delivery plan.
pub fn transcode(message: &SourceMessage) -> Transcoded {
    match message.kind {
        MessageKind::System(event) => {
            if let SystemEvent::Other(type_id) = event {
                tracing::warn!(
                    type_id,
                    permalink = %message.permalink,
                    "system event with no dedicated notice wording"
                );
            }
            Transcoded::Notice(format!(
                "**{} {}**",
                message.author.display_name,
                system_fragment(event)
            ))
        }
        MessageKind::Unknown(type_id) => {
            tracing::warn!(type_id, permalink = %message.permalink, "unknown message type");
            Transcoded::Notice(format!(
                "**{} sent an unknown type of message ({type_id})**",
                message.author.display_name
            ))
        }
        MessageKind::ThreadStarter => match message.reference {
            Some(origin) => Transcoded::StarterRedirect(origin),
            None => {
                tracing::warn!(
                    permalink = %message.permalink,
                    "thread starter without a referenced message, skipping"
                );
                Transcoded::Skip
            }
        },
        MessageKind::Normal => Transcoded::Content(content_payload(message)),
    }
}

fn content_payload(message: &SourceMessage) -> ContentPayload {
    let mut payload = ContentPayload::default();

    if !message.content.is_empty() {
        payload.text = Some(message.content.clone());
    }

    for attachment in &message.attachments {
        if attachment.size_bytes > MAX_INLINE_BYTES {
            payload.oversized_urls.push(attachment.url.clone());
        } else {
            payload.inline_urls.push(attachment.url.clone());
        }
    }

    for embed in &message.embeds {
        if embed.kind.as_deref() == Some("rich") {
            payload.embeds.push(embed.clone());
        } else {
            // Link and media unfurls regenerate on their own at the
            // destination.
            tracing::warn!(
                kind = embed.kind.as_deref().unwrap_or("none"),
                permalink = %message.permalink,
                "dropping non-rich embed"
            );
        }
    }

    payload
}

/// The sentence a system event renders as, appended to the actor's name.
fn system_fragment(event: SystemEvent) -> &'static str {
    match event {
        SystemEvent::AutoModAction => "did an AutoModerationAction.",
        SystemEvent::CallStart => "started a call.",
        SystemEvent::ChannelFollowAdd => "did a ChannelFollowAdd.",
        SystemEvent::IconChange => "changed the icon of this channel.",
        SystemEvent::NameChange => "changed the name of this channel.",
        SystemEvent::MessagePinned => "pinned a message to this channel.",
        SystemEvent::ContextMenuCommand => "did a ContextMenuCommand.",
        SystemEvent::ApplicationSubscription => "did a GuildApplicationPremiumSubscription.",
        SystemEvent::Boost => "did a GuildBoost.",
        SystemEvent::BoostTier1 => "did a GuildBoostTier1.",
        SystemEvent::BoostTier2 => "did a GuildBoostTier2.",
        SystemEvent::BoostTier3 => "did a GuildBoostTier3.",
        SystemEvent::DiscoveryDisqualified => "did a GuildDiscoveryDisqualified.",
        SystemEvent::DiscoveryRequalified => "did a GuildDiscoveryRequalified.",
        SystemEvent::DiscoveryInitialWarning => "did a GuildDiscoveryGracePeriodInitialWarning.",
        SystemEvent::DiscoveryFinalWarning => "did a GuildDiscoveryGracePeriodFinalWarning.",
        SystemEvent::InviteReminder => "did a GuildInviteReminder.",
        SystemEvent::PremiumUpsell => "did a InteractionPremiumUpsell.",
        SystemEvent::RecipientAdd => "added someone to the group.",
        SystemEvent::RecipientRemove => "removed someone from the group.",
        SystemEvent::RoleSubscription => "did a RoleSubscriptionPurchase.",
        SystemEvent::StageEnd => "did a StageEnd.",
        SystemEvent::StageSpeaker => "did a StageSpeaker.",
        SystemEvent::StageStart => "did a StageStart.",
        SystemEvent::StageTopic => "did a StageTopic.",
        SystemEvent::ThreadCreated => "created a Thread.",
        SystemEvent::MemberJoin => "just joined.",
        SystemEvent::Other(_) => "did an unknown action.",
    }
}
