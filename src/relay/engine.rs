//! The replication engine: pager, transcoder, identity pool, and delivery
//! under one job ticket.

use crate::error::RelayError;
use crate::host::{self, ChatHost, OutboundPayload};
use crate::relay::identity::IdentityPool;
use crate::relay::pager::{self, PageError};
use crate::relay::registry::{Cancelled, CopyTicket};
use crate::relay::transcode::{self, Transcoded};
use crate::{AuthorRef, ChannelId, Destination, EmojiRef, Identity, MessageId, ReactionRef, SourceMessage};

/// Engine behavior switches.
#[derive(Debug, Clone, Copy)]
pub struct CopyOptions {
    /// Keep the current identity while consecutive messages share an
    /// author instead of resolving it again per message.
    pub group_authors: bool,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self { group_authors: true }
    }
}

/// Terminal outcome of one copy job.
#[derive(Debug)]
pub enum CopyOutcome {
    /// Every message was processed. Individual messages may still have
    /// been skipped or failed; those are logged, not fatal.
    Completed,
    /// The job's registry entry disappeared at a checkpoint.
    Cancelled,
    /// The job died before replaying anything.
    Failed(RelayError),
}

/// One job's replication state: where it writes, the ticket that keeps it
/// alive, its identity pool, and the author-continuity memory.
pub struct Replicator<'a, H: ChatHost> {
    host: &'a H,
    dest: Destination,
    ticket: &'a CopyTicket,
    options: CopyOptions,
    pool: IdentityPool,
    /// Author of the last impersonated delivery. Notices do not touch it.
    last_author: Option<AuthorRef>,
    /// Identity used for that delivery; `None` while degraded.
    last_identity: Option<Identity>,
}

impl<'a, H: ChatHost> Replicator<'a, H> {
    pub fn new(
        host: &'a H,
        dest: Destination,
        ticket: &'a CopyTicket,
        pool: IdentityPool,
        options: CopyOptions,
    ) -> Self {
        Self {
            host,
            dest,
            ticket,
            options,
            pool,
            last_author: None,
            last_identity: None,
        }
    }

    /// Surrender the identity pool for teardown.
    pub fn into_pool(self) -> IdentityPool {
        self.pool
    }

    /// Fetch the whole backlog of `source` and replay it into the
    /// destination, oldest first.
    pub async fn copy_history(&mut self, source: ChannelId) -> CopyOutcome {
        let messages = match pager::fetch_all(self.host, source, self.dest.channel, self.ticket).await
        {
            Ok(messages) => messages,
            Err(PageError::Cancelled) => return CopyOutcome::Cancelled,
            Err(PageError::Fetch(error)) => return CopyOutcome::Failed(RelayError::Fetch(error)),
        };

        if let (Some(first), Some(last)) = (messages.first(), messages.last()) {
            tracing::debug!(span_start = %first.timestamp, span_end = %last.timestamp, "history span");
        }
        tracing::info!(
            source,
            dest = self.dest.channel,
            count = messages.len(),
            "replaying history"
        );

        for message in &messages {
            if self.replay_one(message).await.is_err() {
                tracing::info!(source, dest = self.dest.channel, "copy cancelled");
                return CopyOutcome::Cancelled;
            }
        }

        tracing::info!(source, dest = self.dest.channel, "copy complete");
        CopyOutcome::Completed
    }

    /// Replay a single already-fetched message. Same pipeline as a full
    /// copy, with a one-element input.
    pub async fn copy_single(&mut self, message: &SourceMessage) -> CopyOutcome {
        match self.replay_one(message).await {
            Ok(()) => CopyOutcome::Completed,
            Err(Cancelled) => CopyOutcome::Cancelled,
        }
    }

    async fn replay_one(&mut self, message: &SourceMessage) -> Result<(), Cancelled> {
        self.ticket.checkpoint()?;

        if let Err(error) = self.host.typing(self.dest.channel).await {
            tracing::debug!(%error, channel = self.dest.channel, "typing indicator failed");
        }

        match transcode::transcode(message) {
            Transcoded::StarterRedirect(origin) => {
                // The starter pseudo-message stands in for a real message
                // in the parent channel; replay that one instead.
                let starter = match host::with_retries("fetch_message", || {
                    self.host.fetch_message(origin.channel, origin.message)
                })
                .await
                {
                    Ok(starter) => starter,
                    Err(error) => {
                        tracing::warn!(
                            %error,
                            channel = origin.channel,
                            message = origin.message,
                            "failed to fetch thread starter, skipping"
                        );
                        return Ok(());
                    }
                };
                match transcode::transcode(&starter) {
                    Transcoded::StarterRedirect(_) => {
                        tracing::warn!(
                            permalink = %starter.permalink,
                            "thread starter resolved to another starter, skipping"
                        );
                        Ok(())
                    }
                    inner => self.replay_parts(inner, &starter).await,
                }
            }
            other => self.replay_parts(other, message).await,
        }
    }

    async fn replay_parts(
        &mut self,
        transcoded: Transcoded,
        message: &SourceMessage,
    ) -> Result<(), Cancelled> {
        match transcoded {
            Transcoded::Skip | Transcoded::StarterRedirect(_) => {}
            Transcoded::Notice(text) => {
                // Notices speak as the bot and leave the identity state
                // alone.
                self.send_logged(None, &OutboundPayload::text(text)).await;
            }
            Transcoded::Content(payload) => {
                let needs_resolution = !self.options.group_authors
                    || self.last_author.as_ref() != Some(&message.author);

                if needs_resolution {
                    self.last_identity =
                        self.pool.resolve(self.host, &message.author).await.cloned();
                    self.last_author = Some(message.author.clone());

                    // Identity rewrites can crawl under rate limiting;
                    // look again before touching the destination.
                    self.ticket.checkpoint()?;

                    if self.last_identity.is_none() {
                        let line = format!("**{}**", message.author.display_name);
                        self.send_logged(None, &OutboundPayload::text(line)).await;
                    }
                }

                let identity = self.last_identity.clone();
                let mut delivered: Option<MessageId> = None;

                let primary = OutboundPayload {
                    text: payload.text,
                    attachment_urls: payload.inline_urls,
                    embeds: payload.embeds,
                };
                if !primary.is_empty() {
                    delivered = self.send_logged(identity.as_ref(), &primary).await.or(delivered);
                }
                for url in payload.oversized_urls {
                    delivered = self
                        .send_logged(identity.as_ref(), &OutboundPayload::text(url))
                        .await
                        .or(delivered);
                }

                if let Some(target) = delivered {
                    self.replay_reactions(target, &message.reactions).await;
                }
            }
        }
        Ok(())
    }

    /// Deliver one payload, absorbing the failure: a send that dies after
    /// retries costs one message, not the job.
    async fn send_logged(
        &self,
        identity: Option<&Identity>,
        payload: &OutboundPayload,
    ) -> Option<MessageId> {
        match host::with_retries("send", || self.host.send(&self.dest, identity, payload)).await {
            Ok(id) => Some(id),
            Err(error) => {
                tracing::warn!(%error, channel = self.dest.channel, "failed to deliver message");
                None
            }
        }
    }

    /// Re-apply the source message's reactions to the last delivered part.
    async fn replay_reactions(&self, target: MessageId, reactions: &[ReactionRef]) {
        for reaction in reactions {
            if let EmojiRef::Custom { id, known: false, .. } = &reaction.emoji {
                tracing::debug!(emoji = id, "skipping reaction with an unusable emoji");
                continue;
            }
            if let Err(error) = host::with_retries("add_reaction", || {
                self.host.add_reaction(self.dest.channel, target, &reaction.emoji)
            })
            .await
            {
                tracing::warn!(%error, message = target, "failed to replay reaction");
            }
        }
    }
}
