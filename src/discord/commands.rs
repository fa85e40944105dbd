//! Slash-command definitions and dispatch.

use crate::config::Config;
use crate::discord::DiscordHost;
use crate::error::RelayError;
use crate::host::{self, ChatHost};
use crate::relay::{CopyOptions, CopyOutcome, CopyRegistry, CopyTicket, IdentityPool, Replicator};
use crate::{ChannelId, Destination, MessageRef};
use regex::Regex;
use serenity::all::{
    ChannelId as DiscordChannelId, ChannelType, CommandInteraction, CommandOptionType, Context,
    CreateCommand, CreateCommandOption, CreateInteractionResponse,
    CreateInteractionResponseFollowup, CreateInteractionResponseMessage, CreateMessage, Http,
    PartialChannel, Permissions, ResolvedOption, ResolvedValue,
};
use std::sync::{Arc, LazyLock};

const HELP_TEXT: &str = "Use `/copy channel` to replay one channel's history into another, \
    `/copy message` to repost a single message by link, and `/stop` to cancel a copy that is \
    still running. I need **Manage Webhooks** on the target channel to speak with the original \
    authors' names.";

/// The global command set, registered once at startup.
pub fn definitions() -> Vec<CreateCommand> {
    let copyable = vec![ChannelType::Text, ChannelType::PublicThread, ChannelType::PrivateThread];
    vec![
        CreateCommand::new("help")
            .description("Shows help for using this bot.")
            .dm_permission(false),
        CreateCommand::new("copy")
            .description("Copies all messages from another channel.")
            .default_member_permissions(Permissions::MANAGE_GUILD)
            .dm_permission(false)
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::SubCommand,
                    "channel",
                    "Copies all messages from one channel to another.",
                )
                .add_sub_option(
                    CreateCommandOption::new(
                        CommandOptionType::Channel,
                        "from",
                        "The channel to copy messages from.",
                    )
                    .channel_types(copyable.clone()),
                )
                .add_sub_option(
                    CreateCommandOption::new(
                        CommandOptionType::Channel,
                        "to",
                        "The channel to paste messages to.",
                    )
                    .channel_types(copyable.clone()),
                ),
            )
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::SubCommand,
                    "message",
                    "Copies a single message.",
                )
                .add_sub_option(
                    CreateCommandOption::new(
                        CommandOptionType::String,
                        "link",
                        "The URL of the message to copy.",
                    )
                    .required(true),
                )
                .add_sub_option(
                    CreateCommandOption::new(
                        CommandOptionType::Channel,
                        "to",
                        "The channel to paste the message in.",
                    )
                    .channel_types(copyable.clone()),
                ),
            ),
        CreateCommand::new("stop")
            .description("Stops copying messages.")
            .default_member_permissions(Permissions::MANAGE_GUILD)
            .dm_permission(false)
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::Channel,
                    "channel",
                    "The channel to stop pasting messages into.",
                )
                .channel_types(copyable),
            ),
    ]
}

/// Route one command interaction to its handler.
pub async fn dispatch(
    ctx: &Context,
    interaction: &CommandInteraction,
    registry: &CopyRegistry,
    config: &Config,
) {
    match interaction.data.name.as_str() {
        "help" => ack(ctx, interaction, HELP_TEXT).await,
        "copy" => handle_copy(ctx, interaction, registry, config).await,
        "stop" => handle_stop(ctx, interaction, registry).await,
        other => tracing::warn!(command = other, "unregistered command received"),
    }
}

async fn handle_copy(
    ctx: &Context,
    interaction: &CommandInteraction,
    registry: &CopyRegistry,
    config: &Config,
) {
    let options = interaction.data.options();
    let Some((subcommand, inner)) = options.first().and_then(|option| match &option.value {
        ResolvedValue::SubCommand(inner) => Some((option.name, inner.as_slice())),
        _ => None,
    }) else {
        tracing::warn!("copy invoked without a subcommand");
        return;
    };

    match subcommand {
        "channel" => copy_channel(ctx, interaction, inner, registry, config).await,
        "message" => copy_message(ctx, interaction, inner, registry, config).await,
        other => tracing::warn!(subcommand = other, "unregistered copy subcommand"),
    }
}

async fn copy_channel(
    ctx: &Context,
    interaction: &CommandInteraction,
    options: &[ResolvedOption<'_>],
    registry: &CopyRegistry,
    config: &Config,
) {
    let from_picked = channel_option(options, "from");
    let to_picked = channel_option(options, "to");
    // Either side left unset means the channel the command was used in.
    let from_id = from_picked.map_or(interaction.channel_id, |channel| channel.id);
    let to_id = to_picked.map_or(interaction.channel_id, |channel| channel.id);

    if from_id == to_id {
        ack(ctx, interaction, "I can't paste in the same channel I'm copying from!").await;
        return;
    }

    let from = resolve_target(ctx, from_picked, interaction.channel_id);
    let Some(from) = from.filter(|target| is_copyable(target.kind)) else {
        ack(ctx, interaction, "I can only copy from text-based server channels!").await;
        return;
    };
    let to = resolve_target(ctx, to_picked, interaction.channel_id);
    let Some(to) = to.filter(|target| is_copyable(target.kind)) else {
        ack(ctx, interaction, "I can only paste in text-based server channels!").await;
        return;
    };
    if !bot_can_post(ctx, &to) {
        let text = format!("I haven't got permission to post in <#{}>!", to.id);
        ack(ctx, interaction, &text).await;
        return;
    }

    match registry.begin(to.id, from.id) {
        Ok(ticket) => {
            let text = format!("Okay, I'll copy messages from <#{}> to <#{}>...", from.id, to.id);
            ack(ctx, interaction, &text).await;
            spawn_channel_copy(ctx, interaction, ticket, from.id, to.destination(), config);
        }
        Err(error) => ack(ctx, interaction, &admission_refusal(&error)).await,
    }
}

async fn copy_message(
    ctx: &Context,
    interaction: &CommandInteraction,
    options: &[ResolvedOption<'_>],
    registry: &CopyRegistry,
    config: &Config,
) {
    let to = resolve_target(ctx, channel_option(options, "to"), interaction.channel_id);
    let Some(to) = to.filter(|target| is_copyable(target.kind)) else {
        ack(ctx, interaction, "I can only paste in text-based server channels!").await;
        return;
    };
    if !bot_can_post(ctx, &to) {
        let text = format!("I haven't got permission to post in <#{}>!", to.id);
        ack(ctx, interaction, &text).await;
        return;
    }

    let Some(link) = string_option(options, "link") else {
        tracing::warn!("copy message invoked without its required link option");
        return;
    };
    let Some(origin) = parse_message_link(link) else {
        let text = format!("{link} is not a valid message link.");
        ack(ctx, interaction, &text).await;
        return;
    };

    match registry.begin(to.id, origin.channel) {
        Ok(ticket) => {
            ack(ctx, interaction, "Okay, I'll copy that message!").await;
            spawn_message_copy(ctx, interaction, ticket, origin, to.destination(), config);
        }
        Err(error) => ack(ctx, interaction, &admission_refusal(&error)).await,
    }
}

async fn handle_stop(ctx: &Context, interaction: &CommandInteraction, registry: &CopyRegistry) {
    let options = interaction.data.options();
    let channel = channel_option(&options, "channel")
        .map_or(interaction.channel_id, |channel| channel.id);

    let stopped = registry.stop(channel.get());
    tracing::debug!(channel = channel.get(), stopped, "stop requested");
    let text = format!("Okay, I'll stop pasting into <#{channel}>!");
    ack(ctx, interaction, &text).await;
}

fn admission_refusal(error: &RelayError) -> String {
    match error {
        RelayError::AlreadyActive { dest, source } => {
            format!("I'm already pasting into <#{dest}> from <#{source}>!")
        }
        RelayError::SourceBusy(source) => {
            format!("I'm still pasting into <#{source}>, so I can't copy from it yet!")
        }
        other => {
            tracing::warn!(error = %other, "unexpected admission failure");
            "Something went wrong starting that copy.".to_string()
        }
    }
}

fn spawn_channel_copy(
    ctx: &Context,
    interaction: &CommandInteraction,
    ticket: CopyTicket,
    source: ChannelId,
    dest: Destination,
    config: &Config,
) {
    let http = ctx.http.clone();
    let cache = ctx.cache.clone();
    let bot_user = ctx.cache.current_user().id;
    let interaction = interaction.clone();
    let options = CopyOptions { group_authors: config.copy.group_authors };

    tokio::spawn(async move {
        let host = DiscordHost::new(http.clone(), cache, bot_user);
        let pool = adopt_pool(&host, &http, &interaction, dest).await;

        let mut replicator = Replicator::new(&host, dest, &ticket, pool, options);
        let outcome = replicator.copy_history(source).await;
        replicator.into_pool().destroy(&host).await;
        drop(ticket);

        let text = match outcome {
            CopyOutcome::Completed => "I've finished copying!",
            CopyOutcome::Cancelled => "I've aborted copying!",
            CopyOutcome::Failed(error) => {
                tracing::error!(%error, source, dest = dest.channel, "copy job failed");
                "Failed to fetch messages!"
            }
        };
        follow_up(&http, &interaction, text).await;
    });
}

fn spawn_message_copy(
    ctx: &Context,
    interaction: &CommandInteraction,
    ticket: CopyTicket,
    origin: MessageRef,
    dest: Destination,
    config: &Config,
) {
    let http = ctx.http.clone();
    let cache = ctx.cache.clone();
    let bot_user = ctx.cache.current_user().id;
    let interaction = interaction.clone();
    let options = CopyOptions { group_authors: config.copy.group_authors };

    tokio::spawn(async move {
        let host = DiscordHost::new(http.clone(), cache, bot_user);
        let message = match host::with_retries("fetch_message", || {
            host.fetch_message(origin.channel, origin.message)
        })
        .await
        {
            Ok(message) => message,
            Err(error) => {
                tracing::warn!(
                    %error,
                    channel = origin.channel,
                    message = origin.message,
                    "could not fetch the linked message"
                );
                follow_up(&http, &interaction, "I've failed to copy that message...").await;
                return;
            }
        };

        let pool = adopt_pool(&host, &http, &interaction, dest).await;
        let mut replicator = Replicator::new(&host, dest, &ticket, pool, options);
        let outcome = replicator.copy_single(&message).await;
        replicator.into_pool().destroy(&host).await;
        drop(ticket);

        let text = match outcome {
            CopyOutcome::Completed => "I've finished copying that message!",
            CopyOutcome::Cancelled => "I've aborted copying!",
            CopyOutcome::Failed(error) => {
                tracing::error!(%error, dest = dest.channel, "single message copy failed");
                "I've failed to copy that message..."
            }
        };
        follow_up(&http, &interaction, text).await;
    });
}

/// Bootstrap the identity pool from the destination's existing webhooks,
/// falling back to an empty pool when they cannot be listed.
async fn adopt_pool(
    host: &DiscordHost,
    http: &Arc<Http>,
    interaction: &CommandInteraction,
    dest: Destination,
) -> IdentityPool {
    match IdentityPool::bootstrap(host, dest).await {
        Ok(pool) => pool,
        Err(error) => {
            tracing::warn!(%error, channel = dest.webhook_channel(), "webhook adoption failed");
            follow_up(http, interaction, "Failed to read webhooks!").await;
            IdentityPool::new(dest)
        }
    }
}

/// A channel as named in a command option, reduced to what validation and
/// admission need.
#[derive(Debug, Clone, Copy)]
struct TargetChannel {
    id: ChannelId,
    kind: ChannelType,
    parent: Option<ChannelId>,
}

impl TargetChannel {
    fn destination(&self) -> Destination {
        match self.parent {
            Some(parent) => Destination::thread(self.id, parent),
            None => Destination::channel(self.id),
        }
    }
}

fn target_from_partial(channel: &PartialChannel) -> TargetChannel {
    TargetChannel {
        id: channel.id.get(),
        kind: channel.kind,
        parent: channel
            .parent_id
            .filter(|_| channel.thread_metadata.is_some())
            .map(|parent| parent.get()),
    }
}

fn target_from_cache(ctx: &Context, id: DiscordChannelId) -> Option<TargetChannel> {
    let channel = ctx.cache.channel(id)?;
    Some(TargetChannel {
        id: channel.id.get(),
        kind: channel.kind,
        parent: channel
            .parent_id
            .filter(|_| channel.thread_metadata.is_some())
            .map(|parent| parent.get()),
    })
}

fn resolve_target(
    ctx: &Context,
    picked: Option<&PartialChannel>,
    fallback: DiscordChannelId,
) -> Option<TargetChannel> {
    match picked {
        Some(channel) => Some(target_from_partial(channel)),
        None => target_from_cache(ctx, fallback),
    }
}

fn is_copyable(kind: ChannelType) -> bool {
    matches!(kind, ChannelType::Text | ChannelType::PublicThread | ChannelType::PrivateThread)
}

/// Whether the bot itself can post into the target. Threads gate on the
/// thread-specific permission bit.
fn bot_can_post(ctx: &Context, target: &TargetChannel) -> bool {
    let bot_user = ctx.cache.current_user().id;
    let Some(channel) = ctx
        .cache
        .channel(DiscordChannelId::new(target.id))
        .map(|channel| channel.clone())
    else {
        return false;
    };
    let Ok(permissions) = channel.permissions_for_user(&ctx.cache, bot_user) else {
        return false;
    };

    let needed = if target.parent.is_some() {
        Permissions::SEND_MESSAGES_IN_THREADS
    } else {
        Permissions::SEND_MESSAGES
    };
    permissions.contains(needed)
}

fn channel_option<'a>(options: &'a [ResolvedOption<'a>], name: &str) -> Option<&'a PartialChannel> {
    options.iter().find_map(|option| match option.value {
        ResolvedValue::Channel(channel) if option.name == name => Some(channel),
        _ => None,
    })
}

fn string_option<'a>(options: &'a [ResolvedOption<'a>], name: &str) -> Option<&'a str> {
    options.iter().find_map(|option| match option.value {
        ResolvedValue::String(value) if option.name == name => Some(value),
        _ => None,
    })
}

static MESSAGE_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)https?://(?:www\.)?discord\.com/channels/[0-9]+/([0-9]+)/([0-9]+)")
        .expect("message link pattern compiles")
});

/// Pull the channel and message ids out of a message link. The input must
/// contain exactly one link; two links are ambiguous and rejected.
fn parse_message_link(link: &str) -> Option<MessageRef> {
    let mut matches = MESSAGE_LINK.captures_iter(link);
    let captures = matches.next()?;
    if matches.next().is_some() {
        return None;
    }
    let channel = captures.get(1)?.as_str().parse().ok()?;
    let message = captures.get(2)?.as_str().parse().ok()?;
    Some(MessageRef { channel, message })
}

async fn ack(ctx: &Context, interaction: &CommandInteraction, content: &str) {
    let response = CreateInteractionResponse::Message(
        CreateInteractionResponseMessage::new().content(content).ephemeral(true),
    );
    if let Err(error) = interaction.create_response(&ctx.http, response).await {
        tracing::warn!(%error, "interaction response failed, falling back to the channel");
        let fallback = CreateMessage::new().content(content);
        if let Err(error) = interaction.channel_id.send_message(&ctx.http, fallback).await {
            tracing::warn!(%error, "fallback channel message failed");
        }
    }
}

async fn follow_up(http: &Arc<Http>, interaction: &CommandInteraction, content: &str) {
    let builder = CreateInteractionResponseFollowup::new().content(content).ephemeral(true);
    if let Err(error) = interaction.create_followup(http, builder).await {
        tracing::warn!(%error, "interaction follow-up failed, falling back to the channel");
        let fallback = CreateMessage::new().content(content);
        if let Err(error) = interaction.channel_id.send_message(http, fallback).await {
            tracing::warn!(%error, "fallback channel message failed");
        }
    }
}
