//! Conversions between serenity models and the relay's message model.

use crate::{
    AttachmentRef, AuthorRef, EmbedAuthorPayload, EmbedFieldPayload, EmbedFooterPayload,
    EmbedPayload, EmojiRef, MessageKind, MessageRef, ReactionRef, SourceMessage, SystemEvent,
};
use serenity::all::{
    Cache, CreateEmbed, CreateEmbedAuthor, CreateEmbedFooter, Embed, EmojiId, GuildId, Message,
    MessageType, ReactionType, Timestamp,
};

/// Reduce a fetched message to the relay model.
///
/// The cache is consulted to mark which custom reaction emojis the bot can
/// actually use; `guild` feeds the permalink used in diagnostics.
pub fn source_message(message: &Message, guild: Option<GuildId>, cache: &Cache) -> SourceMessage {
    SourceMessage {
        id: message.id.get(),
        channel: message.channel_id.get(),
        author: AuthorRef {
            display_name: message.author.name.clone(),
            avatar_url: Some(message.author.face()),
        },
        kind: message_kind(message.kind),
        timestamp: *message.timestamp,
        content: message.content.clone(),
        attachments: message
            .attachments
            .iter()
            .map(|attachment| AttachmentRef {
                filename: attachment.filename.clone(),
                url: attachment.url.clone(),
                size_bytes: u64::from(attachment.size),
            })
            .collect(),
        embeds: message.embeds.iter().map(embed_payload).collect(),
        reactions: message
            .reactions
            .iter()
            .filter_map(|reaction| {
                emoji_ref(&reaction.reaction_type, cache)
                    .map(|emoji| ReactionRef { emoji, count: reaction.count })
            })
            .collect(),
        reference: message.message_reference.as_ref().and_then(|reference| {
            reference.message_id.map(|id| MessageRef {
                channel: reference.channel_id.get(),
                message: id.get(),
            })
        }),
        permalink: message.id.link(message.channel_id, guild.or(message.guild_id)),
    }
}

/// Map the platform's message type onto the relay's kinds. Named types
/// missing from [`SystemEvent`]'s table become `Other`; raw ids the
/// platform model cannot name stay `Unknown`.
fn message_kind(kind: MessageType) -> MessageKind {
    match kind {
        MessageType::Regular | MessageType::InlineReply | MessageType::ChatInputCommand => {
            MessageKind::Normal
        }
        MessageType::ThreadStarterMessage => MessageKind::ThreadStarter,
        MessageType::GroupRecipientAddition => MessageKind::System(SystemEvent::RecipientAdd),
        MessageType::GroupRecipientRemoval => MessageKind::System(SystemEvent::RecipientRemove),
        MessageType::GroupCallCreation => MessageKind::System(SystemEvent::CallStart),
        MessageType::GroupNameUpdate => MessageKind::System(SystemEvent::NameChange),
        MessageType::GroupIconUpdate => MessageKind::System(SystemEvent::IconChange),
        MessageType::PinsAdd => MessageKind::System(SystemEvent::MessagePinned),
        MessageType::MemberJoin => MessageKind::System(SystemEvent::MemberJoin),
        MessageType::NitroBoost => MessageKind::System(SystemEvent::Boost),
        MessageType::NitroTier1 => MessageKind::System(SystemEvent::BoostTier1),
        MessageType::NitroTier2 => MessageKind::System(SystemEvent::BoostTier2),
        MessageType::NitroTier3 => MessageKind::System(SystemEvent::BoostTier3),
        MessageType::ChannelFollowAdd => MessageKind::System(SystemEvent::ChannelFollowAdd),
        MessageType::GuildDiscoveryDisqualified => {
            MessageKind::System(SystemEvent::DiscoveryDisqualified)
        }
        MessageType::GuildDiscoveryRequalified => {
            MessageKind::System(SystemEvent::DiscoveryRequalified)
        }
        MessageType::GuildDiscoveryGracePeriodInitialWarning => {
            MessageKind::System(SystemEvent::DiscoveryInitialWarning)
        }
        MessageType::GuildDiscoveryGracePeriodFinalWarning => {
            MessageKind::System(SystemEvent::DiscoveryFinalWarning)
        }
        MessageType::ThreadCreated => MessageKind::System(SystemEvent::ThreadCreated),
        MessageType::GuildInviteReminder => MessageKind::System(SystemEvent::InviteReminder),
        MessageType::ContextMenuCommand => MessageKind::System(SystemEvent::ContextMenuCommand),
        MessageType::AutoModAction => MessageKind::System(SystemEvent::AutoModAction),
        MessageType::RoleSubscriptionPurchase => {
            MessageKind::System(SystemEvent::RoleSubscription)
        }
        MessageType::InteractionPremiumUpsell => MessageKind::System(SystemEvent::PremiumUpsell),
        MessageType::StageStart => MessageKind::System(SystemEvent::StageStart),
        MessageType::StageEnd => MessageKind::System(SystemEvent::StageEnd),
        MessageType::StageSpeaker => MessageKind::System(SystemEvent::StageSpeaker),
        MessageType::StageTopic => MessageKind::System(SystemEvent::StageTopic),
        MessageType::GuildApplicationPremiumSubscription => {
            MessageKind::System(SystemEvent::ApplicationSubscription)
        }
        MessageType::Unknown(type_id) => MessageKind::Unknown(type_id),
        other => MessageKind::System(SystemEvent::Other(u8::from(other))),
    }
}

fn emoji_ref(reaction: &ReactionType, cache: &Cache) -> Option<EmojiRef> {
    match reaction {
        ReactionType::Unicode(text) => Some(EmojiRef::Unicode(text.clone())),
        ReactionType::Custom { animated, id, name } => Some(EmojiRef::Custom {
            id: id.get(),
            name: name.clone(),
            animated: *animated,
            known: emoji_usable(cache, *id),
        }),
        _ => None,
    }
}

/// Whether the emoji belongs to a guild the bot can see, and is therefore
/// usable in a reaction of its own.
fn emoji_usable(cache: &Cache, emoji: EmojiId) -> bool {
    cache
        .guilds()
        .into_iter()
        .any(|guild| cache.guild(guild).is_some_and(|guild| guild.emojis.contains_key(&emoji)))
}

pub fn embed_payload(embed: &Embed) -> EmbedPayload {
    EmbedPayload {
        kind: embed.kind.clone(),
        title: embed.title.clone(),
        description: embed.description.clone(),
        url: embed.url.clone(),
        color: embed.colour.map(|colour| colour.0),
        timestamp: embed.timestamp.map(|timestamp| timestamp.to_string()),
        author: embed.author.as_ref().map(|author| EmbedAuthorPayload {
            name: author.name.clone(),
            url: author.url.clone(),
            icon_url: author.icon_url.clone(),
        }),
        footer: embed.footer.as_ref().map(|footer| EmbedFooterPayload {
            text: footer.text.clone(),
            icon_url: footer.icon_url.clone(),
        }),
        image_url: embed.image.as_ref().map(|image| image.url.clone()),
        thumbnail_url: embed.thumbnail.as_ref().map(|thumbnail| thumbnail.url.clone()),
        fields: embed
            .fields
            .iter()
            .map(|field| EmbedFieldPayload {
                name: field.name.clone(),
                value: field.value.clone(),
                inline: field.inline,
            })
            .collect(),
    }
}

/// Rebuild a rich embed for delivery.
pub fn create_embed(payload: &EmbedPayload) -> CreateEmbed {
    let mut embed = CreateEmbed::new();
    if let Some(title) = &payload.title {
        embed = embed.title(title);
    }
    if let Some(description) = &payload.description {
        embed = embed.description(description);
    }
    if let Some(url) = &payload.url {
        embed = embed.url(url);
    }
    if let Some(color) = payload.color {
        embed = embed.color(color);
    }
    if let Some(timestamp) = &payload.timestamp {
        match Timestamp::parse(timestamp) {
            Ok(parsed) => embed = embed.timestamp(parsed),
            Err(error) => tracing::debug!(%error, timestamp, "unparseable embed timestamp"),
        }
    }
    if let Some(author) = &payload.author {
        let mut builder = CreateEmbedAuthor::new(&author.name);
        if let Some(url) = &author.url {
            builder = builder.url(url);
        }
        if let Some(icon_url) = &author.icon_url {
            builder = builder.icon_url(icon_url);
        }
        embed = embed.author(builder);
    }
    if let Some(footer) = &payload.footer {
        let mut builder = CreateEmbedFooter::new(&footer.text);
        if let Some(icon_url) = &footer.icon_url {
            builder = builder.icon_url(icon_url);
        }
        embed = embed.footer(builder);
    }
    if let Some(image_url) = &payload.image_url {
        embed = embed.image(image_url);
    }
    if let Some(thumbnail_url) = &payload.thumbnail_url {
        embed = embed.thumbnail(thumbnail_url);
    }
    for field in &payload.fields {
        embed = embed.field(&field.name, &field.value, field.inline);
    }
    embed
}

pub fn reaction_type(emoji: &EmojiRef) -> ReactionType {
    match emoji {
        EmojiRef::Unicode(text) => ReactionType::Unicode(text.clone()),
        EmojiRef::Custom { id, name, animated, .. } => ReactionType::Custom {
            animated: *animated,
            id: EmojiId::new(*id),
            name: name.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Normal traffic, replies, and slash-command output all replay as
    /// regular content.
    #[test]
    fn normal_types_map_to_normal() {
        assert_eq!(message_kind(MessageType::Regular), MessageKind::Normal);
        assert_eq!(message_kind(MessageType::InlineReply), MessageKind::Normal);
        assert_eq!(message_kind(MessageType::ChatInputCommand), MessageKind::Normal);
    }

    /// Named system types map onto the notice table; ids the platform
    /// model cannot name stay raw.
    #[test]
    fn system_and_unknown_types_are_distinguished() {
        assert_eq!(
            message_kind(MessageType::PinsAdd),
            MessageKind::System(SystemEvent::MessagePinned)
        );
        assert_eq!(
            message_kind(MessageType::ThreadStarterMessage),
            MessageKind::ThreadStarter
        );
        assert_eq!(message_kind(MessageType::Unknown(47)), MessageKind::Unknown(47));
        // 30 is assigned by the platform but absent from the model.
        assert_eq!(message_kind(MessageType::from(30u8)), MessageKind::Unknown(30));
    }

    /// Rebuilt embeds carry the payload fields through to the wire form.
    #[test]
    fn create_embed_round_trips_fields() {
        let payload = EmbedPayload {
            kind: Some("rich".into()),
            title: Some("title".into()),
            description: Some("description".into()),
            url: Some("https://example.com".into()),
            color: Some(0xB0_42_FF),
            timestamp: Some("2024-03-01T12:00:00Z".into()),
            author: Some(EmbedAuthorPayload {
                name: "author".into(),
                url: None,
                icon_url: Some("https://cdn.example/a.png".into()),
            }),
            footer: Some(EmbedFooterPayload { text: "footer".into(), icon_url: None }),
            image_url: Some("https://cdn.example/image.png".into()),
            thumbnail_url: None,
            fields: vec![EmbedFieldPayload {
                name: "field".into(),
                value: "value".into(),
                inline: true,
            }],
        };

        let wire = serde_json::to_value(create_embed(&payload)).expect("serializes");
        assert_eq!(wire["title"], "title");
        assert_eq!(wire["description"], "description");
        assert_eq!(wire["color"], 0xB0_42_FF);
        assert_eq!(wire["author"]["name"], "author");
        assert_eq!(wire["footer"]["text"], "footer");
        assert_eq!(wire["image"]["url"], "https://cdn.example/image.png");
        assert_eq!(wire["fields"][0]["inline"], true);
    }

    /// Emoji conversion preserves the distinction the reaction gate needs.
    #[test]
    fn reaction_types_round_trip() {
        let unicode = reaction_type(&EmojiRef::Unicode("👍".into()));
        assert!(matches!(unicode, ReactionType::Unicode(text) if text == "👍"));

        let custom = reaction_type(&EmojiRef::Custom {
            id: 9001,
            name: Some("pogchamp".into()),
            animated: true,
            known: true,
        });
        match custom {
            ReactionType::Custom { animated, id, name } => {
                assert!(animated);
                assert_eq!(id.get(), 9001);
                assert_eq!(name.as_deref(), Some("pogchamp"));
            }
            other => panic!("expected custom emoji, got {other:?}"),
        }
    }
}
