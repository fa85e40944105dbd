//! Scripted in-memory chat host for driving relay tests.

use crate::error::HostError;
use crate::host::{ChatHost, OutboundPayload};
use crate::relay::registry::CopyRegistry;
use crate::{
    AuthorRef, ChannelId, Destination, EmojiRef, Identity, MessageId, MessageKind, ReactionRef,
    SourceMessage, SystemEvent,
};
use parking_lot::Mutex;
use std::collections::HashSet;

/// One delivery the host accepted.
#[derive(Debug, Clone)]
pub struct SentRecord {
    pub id: MessageId,
    pub channel: ChannelId,
    /// Webhook id the send impersonated through, `None` for bot sends.
    pub identity: Option<u64>,
    pub identity_name: Option<String>,
    pub payload: OutboundPayload,
}

/// A stop scheduled to fire after the nth successful call of some kind.
struct StopHook {
    after: u32,
    registry: CopyRegistry,
    dest: ChannelId,
}

impl StopHook {
    fn fire_if_due(&self, calls: u32) {
        if calls == self.after {
            self.registry.stop(self.dest);
        }
    }
}

#[derive(Default)]
struct State {
    history: Vec<SourceMessage>,
    extra: Vec<SourceMessage>,
    adoptable: Vec<(ChannelId, Identity)>,

    sent: Vec<SentRecord>,
    reactions: Vec<(MessageId, EmojiRef)>,

    fetch_page_calls: u32,
    send_calls: u32,
    create_calls: u32,
    edit_calls: u32,
    delete_calls: u32,
    typing_calls: u32,

    next_identity_id: u64,
    next_message_id: MessageId,

    failed_fetches: HashSet<u32>,
    transient_fetches: HashSet<u32>,
    failed_sends: HashSet<u32>,
    refuse_creates: bool,
    refuse_edits: bool,
    fail_next_delete: bool,

    stop_after_sends: Option<StopHook>,
    stop_after_fetches: Option<StopHook>,
    stop_after_edits: Option<StopHook>,
}

/// In-memory [`ChatHost`] with a scripted history, call recording, and
/// failure injection.
pub struct ScriptedHost {
    state: Mutex<State>,
}

impl ScriptedHost {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_identity_id: 7000,
                next_message_id: 1_000_000,
                ..State::default()
            }),
        }
    }

    /// Append a message to the scripted history. Push oldest first with
    /// ascending ids; pages are served newest first from the tail.
    pub fn push_history(&self, message: SourceMessage) {
        self.state.lock().history.push(message);
    }

    /// Register a message reachable only through `fetch_message`, such as
    /// a thread-starter origin in another channel.
    pub fn insert_message(&self, message: SourceMessage) {
        self.state.lock().extra.push(message);
    }

    /// Register a pre-existing bot webhook that `fetch_identities` will
    /// offer for adoption.
    pub fn seed_identity(&self, dest: Destination, name: &str) -> Identity {
        let mut state = self.state.lock();
        state.next_identity_id += 1;
        let identity = Identity {
            id: state.next_identity_id,
            token: Some(format!("token-{}", state.next_identity_id)),
            name: name.into(),
            avatar: None,
        };
        state.adoptable.push((dest.webhook_channel(), identity.clone()));
        identity
    }

    /// Fail the nth `fetch_page` call with a permanent error.
    pub fn fail_fetch_call(&self, call: u32) {
        self.state.lock().failed_fetches.insert(call);
    }

    /// Fail the nth `fetch_page` call with a transient error.
    pub fn fail_fetch_call_transiently(&self, call: u32) {
        let mut state = self.state.lock();
        state.failed_fetches.insert(call);
        state.transient_fetches.insert(call);
    }

    /// Fail the nth `send` call with a permanent error.
    pub fn fail_send_call(&self, call: u32) {
        self.state.lock().failed_sends.insert(call);
    }

    /// Refuse webhook creation, as the platform does at its webhook cap.
    pub fn refuse_creates(&self) {
        self.state.lock().refuse_creates = true;
    }

    /// Refuse webhook edits.
    pub fn refuse_edits(&self) {
        self.state.lock().refuse_edits = true;
    }

    /// Fail the next `delete_identity` call.
    pub fn fail_next_delete(&self) {
        self.state.lock().fail_next_delete = true;
    }

    /// Stop `dest` in `registry` once `after` sends have succeeded.
    pub fn stop_after_sends(&self, after: u32, registry: CopyRegistry, dest: ChannelId) {
        self.state.lock().stop_after_sends = Some(StopHook { after, registry, dest });
    }

    /// Stop `dest` in `registry` once `after` pages have been served.
    pub fn stop_after_fetches(&self, after: u32, registry: CopyRegistry, dest: ChannelId) {
        self.state.lock().stop_after_fetches = Some(StopHook { after, registry, dest });
    }

    /// Stop `dest` in `registry` once `after` edits have succeeded.
    pub fn stop_after_edits(&self, after: u32, registry: CopyRegistry, dest: ChannelId) {
        self.state.lock().stop_after_edits = Some(StopHook { after, registry, dest });
    }

    pub fn sent(&self) -> Vec<SentRecord> {
        self.state.lock().sent.clone()
    }

    pub fn reactions(&self) -> Vec<(MessageId, EmojiRef)> {
        self.state.lock().reactions.clone()
    }

    pub fn fetch_page_calls(&self) -> u32 {
        self.state.lock().fetch_page_calls
    }

    pub fn create_calls(&self) -> u32 {
        self.state.lock().create_calls
    }

    pub fn edit_calls(&self) -> u32 {
        self.state.lock().edit_calls
    }

    pub fn delete_calls(&self) -> u32 {
        self.state.lock().delete_calls
    }

    pub fn typing_calls(&self) -> u32 {
        self.state.lock().typing_calls
    }
}

impl Default for ScriptedHost {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatHost for ScriptedHost {
    async fn fetch_page(
        &self,
        channel: ChannelId,
        limit: u8,
        before: Option<MessageId>,
    ) -> Result<Vec<SourceMessage>, HostError> {
        let mut state = self.state.lock();
        state.fetch_page_calls += 1;
        let call = state.fetch_page_calls;

        if state.failed_fetches.contains(&call) {
            return Err(if state.transient_fetches.contains(&call) {
                HostError::Status { status: 502, message: "bad gateway".into() }
            } else {
                HostError::Status { status: 403, message: "missing access".into() }
            });
        }

        let page: Vec<SourceMessage> = state
            .history
            .iter()
            .rev()
            .filter(|message| message.channel == channel)
            .skip_while(|message| before.is_some_and(|cutoff| message.id >= cutoff))
            .take(limit as usize)
            .cloned()
            .collect();

        if let Some(hook) = &state.stop_after_fetches {
            hook.fire_if_due(call);
        }
        Ok(page)
    }

    async fn fetch_message(
        &self,
        channel: ChannelId,
        message: MessageId,
    ) -> Result<SourceMessage, HostError> {
        let state = self.state.lock();
        state
            .history
            .iter()
            .chain(state.extra.iter())
            .find(|m| m.channel == channel && m.id == message)
            .cloned()
            .ok_or_else(|| HostError::NotFound(format!("message {message} in {channel}")))
    }

    async fn send(
        &self,
        dest: &Destination,
        identity: Option<&Identity>,
        payload: &OutboundPayload,
    ) -> Result<MessageId, HostError> {
        let mut state = self.state.lock();
        state.send_calls += 1;
        let call = state.send_calls;

        if state.failed_sends.contains(&call) {
            return Err(HostError::Status { status: 403, message: "missing permission".into() });
        }

        state.next_message_id += 1;
        let id = state.next_message_id;
        state.sent.push(SentRecord {
            id,
            channel: dest.channel,
            identity: identity.map(|i| i.id),
            identity_name: identity.map(|i| i.name.clone()),
            payload: payload.clone(),
        });

        let delivered = state.sent.len() as u32;
        if let Some(hook) = &state.stop_after_sends {
            hook.fire_if_due(delivered);
        }
        Ok(id)
    }

    async fn create_identity(
        &self,
        _dest: &Destination,
        name: &str,
        avatar: Option<&str>,
    ) -> Result<Identity, HostError> {
        let mut state = self.state.lock();
        state.create_calls += 1;
        if state.refuse_creates {
            return Err(HostError::Status {
                status: 400,
                message: "maximum number of webhooks reached".into(),
            });
        }
        state.next_identity_id += 1;
        Ok(Identity {
            id: state.next_identity_id,
            token: Some(format!("token-{}", state.next_identity_id)),
            name: name.into(),
            avatar: avatar.map(str::to_owned),
        })
    }

    async fn edit_identity(
        &self,
        _identity: &Identity,
        _name: &str,
        _avatar: Option<&str>,
    ) -> Result<(), HostError> {
        let mut state = self.state.lock();
        state.edit_calls += 1;
        let call = state.edit_calls;
        if state.refuse_edits {
            return Err(HostError::Status { status: 403, message: "cannot edit webhook".into() });
        }
        if let Some(hook) = &state.stop_after_edits {
            hook.fire_if_due(call);
        }
        Ok(())
    }

    async fn delete_identity(&self, _identity: &Identity) -> Result<(), HostError> {
        let mut state = self.state.lock();
        state.delete_calls += 1;
        if state.fail_next_delete {
            state.fail_next_delete = false;
            return Err(HostError::Status { status: 500, message: "server error".into() });
        }
        Ok(())
    }

    async fn fetch_identities(&self, dest: &Destination) -> Result<Vec<Identity>, HostError> {
        let state = self.state.lock();
        let channel = dest.webhook_channel();
        Ok(state
            .adoptable
            .iter()
            .filter(|(owner, _)| *owner == channel)
            .map(|(_, identity)| identity.clone())
            .collect())
    }

    async fn add_reaction(
        &self,
        _channel: ChannelId,
        message: MessageId,
        emoji: &EmojiRef,
    ) -> Result<(), HostError> {
        self.state.lock().reactions.push((message, emoji.clone()));
        Ok(())
    }

    async fn typing(&self, _channel: ChannelId) -> Result<(), HostError> {
        self.state.lock().typing_calls += 1;
        Ok(())
    }
}

/// A plain text message from `author`, with the avatar URL derived from
/// the name so equal authors compare equal.
pub fn text_message(channel: ChannelId, id: MessageId, author: &str, text: &str) -> SourceMessage {
    SourceMessage {
        id,
        channel,
        author: AuthorRef {
            display_name: author.into(),
            avatar_url: Some(format!("https://cdn.example/avatars/{author}.png")),
        },
        kind: MessageKind::Normal,
        timestamp: chrono::DateTime::from_timestamp(1_700_000_000 + id as i64, 0)
            .expect("timestamp in range"),
        content: text.into(),
        attachments: Vec::new(),
        embeds: Vec::new(),
        reactions: Vec::new(),
        reference: None,
        permalink: format!("https://discord.com/channels/1/{channel}/{id}"),
    }
}

/// A system event message attributed to `author`.
pub fn system_message(
    channel: ChannelId,
    id: MessageId,
    author: &str,
    event: SystemEvent,
) -> SourceMessage {
    let mut message = text_message(channel, id, author, "");
    message.kind = MessageKind::System(event);
    message
}

pub fn unicode_reaction(emoji: &str) -> ReactionRef {
    ReactionRef { emoji: EmojiRef::Unicode(emoji.into()), count: 1 }
}

pub fn custom_reaction(id: u64, known: bool) -> ReactionRef {
    ReactionRef {
        emoji: EmojiRef::Custom { id, name: Some("pogchamp".into()), animated: false, known },
        count: 1,
    }
}
