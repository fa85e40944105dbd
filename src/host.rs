//! The chat-platform boundary: the trait the relay core drives, and the
//! bounded retry policy for transport calls.

use crate::error::HostError;
use crate::{ChannelId, Destination, EmbedPayload, EmojiRef, Identity, MessageId, SourceMessage};
use std::time::Duration;

/// Extra attempts after a transient failure.
const RETRY_ATTEMPTS: u32 = 2;

/// Initial backoff, doubled after each failed attempt.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// One outbound delivery, as handed to [`ChatHost::send`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutboundPayload {
    pub text: Option<String>,
    /// Attachment source URLs; the host re-uploads the bytes.
    pub attachment_urls: Vec<String>,
    pub embeds: Vec<EmbedPayload>,
}

impl OutboundPayload {
    /// A text-only payload.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.attachment_urls.is_empty() && self.embeds.is_empty()
    }
}

/// Everything the relay needs from the chat platform.
///
/// The engine is generic over this so jobs can be driven end to end in
/// tests without a live gateway. All message fetches return the reduced
/// [`SourceMessage`] model; all sends suppress mention pings.
pub trait ChatHost: Send + Sync + 'static {
    /// Fetch up to `limit` messages strictly older than `before`, newest
    /// first. `None` starts from the present.
    fn fetch_page(
        &self,
        channel: ChannelId,
        limit: u8,
        before: Option<MessageId>,
    ) -> impl std::future::Future<Output = Result<Vec<SourceMessage>, HostError>> + Send;

    /// Fetch a single message by id.
    fn fetch_message(
        &self,
        channel: ChannelId,
        message: MessageId,
    ) -> impl std::future::Future<Output = Result<SourceMessage, HostError>> + Send;

    /// Deliver one payload, impersonating `identity` when given and
    /// speaking as the bot otherwise. Returns the id of the created
    /// message so reactions can target it.
    fn send(
        &self,
        dest: &Destination,
        identity: Option<&Identity>,
        payload: &OutboundPayload,
    ) -> impl std::future::Future<Output = Result<MessageId, HostError>> + Send;

    /// Create a fresh impersonation handle on the destination.
    fn create_identity(
        &self,
        dest: &Destination,
        name: &str,
        avatar: Option<&str>,
    ) -> impl std::future::Future<Output = Result<Identity, HostError>> + Send;

    /// Repoint an existing handle at a new name and avatar.
    fn edit_identity(
        &self,
        identity: &Identity,
        name: &str,
        avatar: Option<&str>,
    ) -> impl std::future::Future<Output = Result<(), HostError>> + Send;

    /// Remove a handle from the destination.
    fn delete_identity(
        &self,
        identity: &Identity,
    ) -> impl std::future::Future<Output = Result<(), HostError>> + Send;

    /// Handles already attached to the destination that belong to this bot
    /// and can be borrowed as spares.
    fn fetch_identities(
        &self,
        dest: &Destination,
    ) -> impl std::future::Future<Output = Result<Vec<Identity>, HostError>> + Send;

    /// React to a delivered message.
    fn add_reaction(
        &self,
        channel: ChannelId,
        message: MessageId,
        emoji: &EmojiRef,
    ) -> impl std::future::Future<Output = Result<(), HostError>> + Send;

    /// Nudge the typing indicator. Best-effort; failures are the caller's
    /// to ignore.
    fn typing(
        &self,
        channel: ChannelId,
    ) -> impl std::future::Future<Output = Result<(), HostError>> + Send;
}

/// Run a platform call, retrying transient failures with doubling backoff.
///
/// Non-transient errors and exhausted retries surface to the caller, which
/// decides whether they are fatal to the job or just to one message.
pub async fn with_retries<T, F, Fut>(op: &'static str, mut call: F) -> Result<T, HostError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, HostError>>,
{
    let mut delay = RETRY_BASE_DELAY;
    let mut attempt = 0;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_transient() && attempt < RETRY_ATTEMPTS => {
                attempt += 1;
                tracing::debug!(%error, op, attempt, "transient platform error, retrying");
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(error) => return Err(error),
        }
    }
}
