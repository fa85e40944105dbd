//! The serenity-backed [`ChatHost`] used against the live platform.

use crate::discord::convert;
use crate::error::HostError;
use crate::host::{ChatHost, OutboundPayload};
use crate::{ChannelId, Destination, Identity, MessageId, SourceMessage};
use secrecy::ExposeSecret;
use serenity::all::{
    Cache, ChannelId as DiscordChannelId, CreateAllowedMentions, CreateAttachment, CreateEmbed,
    CreateMessage, CreateWebhook, EditWebhook, ExecuteWebhook, GetMessages, GuildId, Http,
    HttpError, MessageId as DiscordMessageId, UserId, Webhook, WebhookId, WebhookType,
};
use std::sync::Arc;

/// Platform access for one copy job. Cheap to construct; the `Http` and
/// `Cache` handles are shared with the gateway client.
pub struct DiscordHost {
    http: Arc<Http>,
    cache: Arc<Cache>,
    /// Our own user id, used to pick out the webhooks we created earlier.
    bot_user: UserId,
}

impl DiscordHost {
    pub fn new(http: Arc<Http>, cache: Arc<Cache>, bot_user: UserId) -> Self {
        Self { http, cache, bot_user }
    }

    fn guild_of(&self, channel: DiscordChannelId) -> Option<GuildId> {
        self.cache.channel(channel).map(|channel| channel.guild_id)
    }

    /// Download attachment bytes for re-upload. Unreachable files are
    /// dropped from the delivery rather than failing it.
    async fn load_attachments(&self, urls: &[String]) -> Vec<CreateAttachment> {
        let mut attachments = Vec::with_capacity(urls.len());
        for url in urls {
            match CreateAttachment::url(&self.http, url).await {
                Ok(attachment) => attachments.push(attachment),
                Err(error) => tracing::warn!(%error, url, "skipping undownloadable attachment"),
            }
        }
        attachments
    }
}

impl ChatHost for DiscordHost {
    async fn fetch_page(
        &self,
        channel: ChannelId,
        limit: u8,
        before: Option<MessageId>,
    ) -> Result<Vec<SourceMessage>, HostError> {
        let channel = DiscordChannelId::new(channel);
        let mut request = GetMessages::new().limit(limit);
        if let Some(before) = before {
            request = request.before(DiscordMessageId::new(before));
        }

        let page = channel.messages(&self.http, request).await.map_err(host_error)?;
        // REST fetches do not carry a guild id; the cache supplies it for
        // permalinks.
        let guild = self.guild_of(channel);
        Ok(page
            .iter()
            .map(|message| convert::source_message(message, guild, &self.cache))
            .collect())
    }

    async fn fetch_message(
        &self,
        channel: ChannelId,
        message: MessageId,
    ) -> Result<SourceMessage, HostError> {
        let channel = DiscordChannelId::new(channel);
        let message = channel
            .message(&self.http, DiscordMessageId::new(message))
            .await
            .map_err(host_error)?;
        Ok(convert::source_message(&message, self.guild_of(channel), &self.cache))
    }

    async fn send(
        &self,
        dest: &Destination,
        identity: Option<&Identity>,
        payload: &OutboundPayload,
    ) -> Result<MessageId, HostError> {
        let attachments = self.load_attachments(&payload.attachment_urls).await;
        let embeds: Vec<CreateEmbed> = payload.embeds.iter().map(convert::create_embed).collect();
        // Replayed pings would notify people about year-old messages.
        let mentions = CreateAllowedMentions::new();

        let token = identity.and_then(|identity| {
            identity.token.as_deref().map(|token| (WebhookId::new(identity.id), token))
        });
        match token {
            Some((webhook, token)) => {
                let mut builder = ExecuteWebhook::new().allowed_mentions(mentions);
                if let Some(text) = &payload.text {
                    builder = builder.content(text);
                }
                if !embeds.is_empty() {
                    builder = builder.embeds(embeds);
                }
                // Webhooks live on the parent channel; threads are reached
                // through the thread id parameter.
                let thread = dest.parent.is_some().then(|| DiscordChannelId::new(dest.channel));
                let message = self
                    .http
                    .execute_webhook(webhook, thread, token, true, attachments, &builder)
                    .await
                    .map_err(host_error)?
                    .ok_or_else(|| HostError::Api("webhook returned no message".into()))?;
                Ok(message.id.get())
            }
            None => {
                let mut builder = CreateMessage::new().allowed_mentions(mentions);
                if let Some(text) = &payload.text {
                    builder = builder.content(text);
                }
                if !embeds.is_empty() {
                    builder = builder.embeds(embeds);
                }
                let message = DiscordChannelId::new(dest.channel)
                    .send_message(&self.http, builder.add_files(attachments))
                    .await
                    .map_err(host_error)?;
                Ok(message.id.get())
            }
        }
    }

    async fn create_identity(
        &self,
        dest: &Destination,
        name: &str,
        avatar: Option<&str>,
    ) -> Result<Identity, HostError> {
        let mut builder = CreateWebhook::new(name).audit_log_reason("Reposting");
        if let Some(url) = avatar {
            match CreateAttachment::url(&self.http, url).await {
                Ok(image) => builder = builder.avatar(&image),
                Err(error) => tracing::debug!(%error, url, "webhook avatar unavailable"),
            }
        }

        let webhook = DiscordChannelId::new(dest.webhook_channel())
            .create_webhook(&self.http, builder)
            .await
            .map_err(host_error)?;
        Ok(Identity {
            id: webhook.id.get(),
            token: webhook_token(&webhook),
            name: name.to_string(),
            avatar: avatar.map(str::to_string),
        })
    }

    async fn edit_identity(
        &self,
        identity: &Identity,
        name: &str,
        avatar: Option<&str>,
    ) -> Result<(), HostError> {
        let mut builder = EditWebhook::new().name(name);
        if let Some(url) = avatar {
            match CreateAttachment::url(&self.http, url).await {
                Ok(image) => builder = builder.avatar(&image),
                Err(error) => tracing::debug!(%error, url, "webhook avatar unavailable"),
            }
        }

        let webhook = WebhookId::new(identity.id);
        match identity.token.as_deref() {
            Some(token) => self
                .http
                .edit_webhook_with_token(webhook, token, &builder, None)
                .await
                .map(|_| ())
                .map_err(host_error),
            None => self
                .http
                .edit_webhook(webhook, &builder, None)
                .await
                .map(|_| ())
                .map_err(host_error),
        }
    }

    async fn delete_identity(&self, identity: &Identity) -> Result<(), HostError> {
        let webhook = WebhookId::new(identity.id);
        let reason = Some("Finished copying");
        match identity.token.as_deref() {
            Some(token) => self
                .http
                .delete_webhook_with_token(webhook, token, reason)
                .await
                .map_err(host_error),
            None => self.http.delete_webhook(webhook, reason).await.map_err(host_error),
        }
    }

    async fn fetch_identities(&self, dest: &Destination) -> Result<Vec<Identity>, HostError> {
        let webhooks = DiscordChannelId::new(dest.webhook_channel())
            .webhooks(&self.http)
            .await
            .map_err(host_error)?;
        Ok(webhooks
            .iter()
            .filter(|webhook| {
                matches!(webhook.kind, WebhookType::Incoming)
                    && webhook.user.as_ref().is_some_and(|user| user.id == self.bot_user)
            })
            .filter_map(|webhook| {
                // Only executable webhooks are worth adopting.
                let token = webhook_token(webhook)?;
                Some(Identity {
                    id: webhook.id.get(),
                    token: Some(token),
                    name: webhook.name.clone().unwrap_or_default(),
                    // Unknown avatar; the first claim re-applies one.
                    avatar: None,
                })
            })
            .collect())
    }

    async fn add_reaction(
        &self,
        channel: ChannelId,
        message: MessageId,
        emoji: &crate::EmojiRef,
    ) -> Result<(), HostError> {
        self.http
            .create_reaction(
                DiscordChannelId::new(channel),
                DiscordMessageId::new(message),
                &convert::reaction_type(emoji),
            )
            .await
            .map_err(host_error)
    }

    async fn typing(&self, channel: ChannelId) -> Result<(), HostError> {
        self.http
            .broadcast_typing(DiscordChannelId::new(channel))
            .await
            .map_err(host_error)
    }
}

fn webhook_token(webhook: &Webhook) -> Option<String> {
    webhook.token.as_ref().map(|token| token.expose_secret().to_string())
}

/// Collapse serenity's error tree into the classification the retry
/// policy understands.
fn host_error(error: serenity::Error) -> HostError {
    match error {
        serenity::Error::Http(HttpError::UnsuccessfulRequest(response)) => {
            let status = response.status_code.as_u16();
            if status == 404 {
                HostError::NotFound(response.error.message)
            } else {
                HostError::Status { status, message: response.error.message }
            }
        }
        serenity::Error::Http(error) => HostError::Transport(error.to_string()),
        other => HostError::Api(other.to_string()),
    }
}
