//! In-memory stand-ins for the chat platform and for a prompt type.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;
use poise::serenity_prelude::{ChannelId, GuildId, MessageId, RoleId, UserId};

use crate::{
    config::DeleteMode,
    models::{types::UtcDateTime, PartialId},
};

use super::{
    codec, content::operation, ButtonKind, ChatTransport, EmbedSnapshot, Handled,
    InteractionReply, MemberProfile, Outcome, PromptActor, PromptContent, PromptInteraction,
    PromptKind, PromptMessage, TransportError, UserProfile,
};

pub const GUILD: GuildId = GuildId::new(1);
pub const CHANNEL: ChannelId = ChannelId::new(2);
pub const AVATAR_URL: &str = "https://cdn.discordapp.com/embed/avatars/0.png";

pub fn partial_id(author: u64) -> PartialId {
    PartialId::new(
        GUILD,
        UserId::new(author),
        UtcDateTime::from_unix_millis(1_700_000_000_000 + author as i64)
            .expect("Test timestamps are in range"),
    )
}

pub fn profile(user: u64) -> UserProfile {
    UserProfile {
        id: UserId::new(user),
        name: format!("user{user}"),
        avatar_url: AVATAR_URL.to_string(),
    }
}

pub fn actor(user: u64, roles: &[u64]) -> PromptActor {
    PromptActor {
        user: UserId::new(user),
        roles: roles.iter().copied().map(RoleId::new).collect(),
    }
}

pub fn interaction(action: &str, partial_id: PartialId, actor: PromptActor) -> PromptInteraction {
    PromptInteraction {
        action: action.to_string(),
        partial_id,
        actor,
    }
}

/// The footer icon a prompt of `kind` for `partial_id` carries.
pub fn footer_for(kind: &str, partial_id: &PartialId) -> String {
    let token = codec::encode(kind, &[partial_id.to_string()]).expect("Test tokens are valid");
    codec::embed(&token, AVATAR_URL)
}

#[derive(Default)]
struct FakeState {
    next_id: u64,
    channels: HashMap<ChannelId, BTreeMap<MessageId, PromptMessage>>,
    contents: HashMap<MessageId, PromptContent>,
    users: HashMap<UserId, UserProfile>,
    members: Vec<MemberProfile>,
    sent: usize,
    deleted: usize,
    role_grants: Vec<(UserId, RoleId)>,
    bans: Vec<UserId>,
}

impl FakeState {
    fn next_message_id(&mut self) -> MessageId {
        self.next_id += 1;
        MessageId::new(1_000 + self.next_id)
    }
}

/// A chat platform that keeps its channels in memory.
#[derive(Default)]
pub struct FakeTransport {
    state: Mutex<FakeState>,
    fail_sends: AtomicBool,
    fail_deletes: AtomicBool,
    fail_lists: AtomicBool,
}

impl FakeTransport {
    pub fn new() -> FakeTransport {
        FakeTransport::default()
    }

    pub fn add_user(&self, user: u64) {
        let profile = profile(user);
        self.state.lock().unwrap().users.insert(profile.id, profile);
    }

    pub fn add_member(&self, user: u64, bot: bool, roles: &[u64]) {
        self.add_user(user);
        self.state.lock().unwrap().members.push(MemberProfile {
            id: UserId::new(user),
            bot,
            roles: roles.iter().copied().map(RoleId::new).collect(),
        });
    }

    pub fn remove_member(&self, user: u64) {
        self.state
            .lock()
            .unwrap()
            .members
            .retain(|member| member.id != UserId::new(user));
    }

    /// Puts a message in the channel as if it had been there before the bot started.
    pub fn seed_message(&self, channel: ChannelId, footer_icon_url: Option<String>) -> MessageId {
        let mut state = self.state.lock().unwrap();
        let id = state.next_message_id();

        let embeds = footer_icon_url
            .map(|url| {
                vec![EmbedSnapshot {
                    footer_icon_url: Some(url),
                }]
            })
            .unwrap_or_default();

        state.channels.entry(channel).or_default().insert(
            id,
            PromptMessage {
                id,
                channel_id: channel,
                embeds,
            },
        );
        id
    }

    /// Removes a message without going through the transport, like a moderator would.
    pub fn remove_message(&self, channel: ChannelId, message: MessageId) {
        let mut state = self.state.lock().unwrap();
        if let Some(messages) = state.channels.get_mut(&channel) {
            messages.remove(&message);
        }
    }

    pub fn messages(&self, channel: ChannelId) -> Vec<PromptMessage> {
        self.state
            .lock()
            .unwrap()
            .channels
            .get(&channel)
            .map(|messages| messages.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn content(&self, message: MessageId) -> Option<PromptContent> {
        self.state.lock().unwrap().contents.get(&message).cloned()
    }

    pub fn sent(&self) -> usize {
        self.state.lock().unwrap().sent
    }

    pub fn deleted(&self) -> usize {
        self.state.lock().unwrap().deleted
    }

    pub fn role_grants(&self) -> Vec<(UserId, RoleId)> {
        self.state.lock().unwrap().role_grants.clone()
    }

    pub fn bans(&self) -> Vec<UserId> {
        self.state.lock().unwrap().bans.clone()
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_lists(&self, fail: bool) {
        self.fail_lists.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChatTransport for FakeTransport {
    async fn send_message(
        &self,
        channel: ChannelId,
        content: &PromptContent,
    ) -> Result<PromptMessage, TransportError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Injected);
        }

        let mut state = self.state.lock().unwrap();
        let id = state.next_message_id();

        let message = PromptMessage {
            id,
            channel_id: channel,
            embeds: vec![EmbedSnapshot {
                footer_icon_url: Some(content.footer_icon_url.clone()),
            }],
        };

        state
            .channels
            .entry(channel)
            .or_default()
            .insert(id, message.clone());
        state.contents.insert(id, content.clone());
        state.sent += 1;

        Ok(message)
    }

    async fn delete_message(
        &self,
        channel: ChannelId,
        message: MessageId,
    ) -> Result<(), TransportError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(TransportError::Injected);
        }

        let mut state = self.state.lock().unwrap();

        let removed = state
            .channels
            .get_mut(&channel)
            .and_then(|messages| messages.remove(&message));

        if removed.is_some() {
            state.deleted += 1;
        }
        Ok(())
    }

    async fn list_messages(
        &self,
        channel: ChannelId,
        before: Option<MessageId>,
        limit: u8,
    ) -> Result<Vec<PromptMessage>, TransportError> {
        if self.fail_lists.load(Ordering::SeqCst) {
            return Err(TransportError::Injected);
        }

        let state = self.state.lock().unwrap();

        let Some(messages) = state.channels.get(&channel) else {
            return Ok(Vec::new());
        };

        Ok(messages
            .values()
            .rev()
            .filter(|message| before.map_or(true, |before| message.id < before))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn get_user(&self, user: UserId) -> Result<Option<UserProfile>, TransportError> {
        Ok(self.state.lock().unwrap().users.get(&user).cloned())
    }

    async fn list_members(&self, _guild: GuildId) -> Result<Vec<MemberProfile>, TransportError> {
        Ok(self.state.lock().unwrap().members.clone())
    }

    async fn add_member_role(
        &self,
        _guild: GuildId,
        user: UserId,
        role: RoleId,
        _reason: &str,
    ) -> Result<(), TransportError> {
        self.state.lock().unwrap().role_grants.push((user, role));
        Ok(())
    }

    async fn ban_member(
        &self,
        _guild: GuildId,
        user: UserId,
        _reason: &str,
    ) -> Result<(), TransportError> {
        self.state.lock().unwrap().bans.push(user);
        Ok(())
    }
}

pub const MEMO: &str = "memo";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Memo {
    pub partial_id: PartialId,
    pub revision: u32,
    pub open: bool,
}

impl Memo {
    pub fn new(author: u64) -> Memo {
        Memo {
            partial_id: partial_id(author),
            revision: 0,
            open: true,
        }
    }
}

/// A prompt type backed by a map.
///
/// Actions: `touch` bumps the revision, `resolve` closes the memo, `noop`
/// changes nothing, `fail` errors.
#[derive(Default)]
pub struct MemoKind {
    memos: Mutex<HashMap<PartialId, Memo>>,
}

impl MemoKind {
    pub fn with(memos: impl IntoIterator<Item = Memo>) -> MemoKind {
        MemoKind {
            memos: Mutex::new(
                memos
                    .into_iter()
                    .map(|memo| (memo.partial_id, memo))
                    .collect(),
            ),
        }
    }

    pub fn insert(&self, memo: Memo) {
        self.memos.lock().unwrap().insert(memo.partial_id, memo);
    }

    pub fn memo(&self, partial_id: &PartialId) -> Option<Memo> {
        self.memos.lock().unwrap().get(partial_id).cloned()
    }
}

#[async_trait]
impl PromptKind for MemoKind {
    type Record = Memo;

    fn name(&self) -> &'static str {
        MEMO
    }

    fn partial_id(&self, record: &Memo) -> PartialId {
        record.partial_id
    }

    fn settled_reply(&self, record: &Memo) -> Option<String> {
        (!record.open).then(|| "This memo is already resolved.".to_string())
    }

    async fn get_all_documents(&self, guild: GuildId) -> anyhow::Result<Vec<Memo>> {
        let mut memos: Vec<Memo> = self
            .memos
            .lock()
            .unwrap()
            .values()
            .filter(|memo| memo.open && memo.partial_id.guild == guild)
            .cloned()
            .collect();
        memos.sort_by_key(|memo| memo.partial_id.author);
        Ok(memos)
    }

    async fn get_user_document(&self, partial_id: &PartialId) -> anyhow::Result<Option<Memo>> {
        Ok(self.memo(partial_id))
    }

    fn get_prompt_content(
        &self,
        record: &Memo,
        author: &UserProfile,
    ) -> Result<PromptContent, codec::CodecError> {
        PromptContent::new(MEMO, &record.partial_id, author, "Memo")?
            .description(format!("Revision {}", record.revision))
            .button(MEMO, "touch", &record.partial_id, "Touch", ButtonKind::Primary)
    }

    async fn handle_prompt_interaction(
        &self,
        record: &Memo,
        interaction: &PromptInteraction,
    ) -> anyhow::Result<Handled<Memo>> {
        match interaction.action.as_str() {
            "touch" => {
                let touched = Memo {
                    revision: record.revision + 1,
                    ..record.clone()
                };
                self.insert(touched.clone());
                Ok(Handled {
                    outcome: Outcome::Updated(touched),
                    reply: InteractionReply::Acknowledge,
                })
            }
            "resolve" => {
                self.insert(Memo {
                    open: false,
                    ..record.clone()
                });
                Ok(Handled {
                    outcome: Outcome::Terminal,
                    reply: InteractionReply::ephemeral("Resolved."),
                })
            }
            "noop" => Ok(Handled::unchanged("Nothing to do.")),
            other => anyhow::bail!("Unsupported action {}", operation(MEMO, other)),
        }
    }

    async fn remove_document(&self, record: &Memo, mode: DeleteMode) -> anyhow::Result<()> {
        let mut memos = self.memos.lock().unwrap();
        match mode {
            DeleteMode::Delete => {
                memos.remove(&record.partial_id);
            }
            DeleteMode::Close => {
                if let Some(memo) = memos.get_mut(&record.partial_id) {
                    memo.open = false;
                }
            }
        }
        Ok(())
    }
}
