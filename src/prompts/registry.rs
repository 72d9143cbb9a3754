use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use poise::serenity_prelude::{ChannelId, GuildId, MessageId, UserId};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::{
    config::{AllowList, DeleteMode},
    models::PartialId,
};

use super::{
    codec, ChatTransport, InteractionReply, MessageUpdate, Outcome, PromptActor,
    PromptInteraction, PromptKind, PromptMessage, TransportError, UserProfile, REMOVE_ACTION,
};

/// Discord never returns more than this many messages per history request.
pub const HISTORY_PAGE_SIZE: u8 = 100;

const INACTIVE_REPLY: &str = "This prompt is no longer active.";
const FAILURE_REPLY: &str =
    "Sorry, something went wrong while handling this prompt. Please try again later.";

/// The live message standing for a record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedPrompt {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    pub partial_id: PartialId,
    /// Fingerprint of the rendered content, unknown for messages adopted at startup.
    pub fingerprint: Option<u64>,
    pub embed_count: usize,
}

impl RenderedPrompt {
    fn new(message: &PromptMessage, partial_id: PartialId, fingerprint: Option<u64>) -> Self {
        RenderedPrompt {
            channel_id: message.channel_id,
            message_id: message.id,
            partial_id,
            fingerprint,
            embed_count: message.embeds.len(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Existing messages matched to a record.
    pub adopted: usize,
    /// Records that got a new message.
    pub created: usize,
    /// Expired, duplicate and foreign messages removed from the channel.
    pub deleted: usize,
    /// Records left without a message, to be retried on the next start.
    pub skipped: usize,
}

/// Serialises every operation on one record.
#[derive(Clone, Default)]
struct PromptHandler {
    serial: Arc<Mutex<()>>,
}

struct Indices<R> {
    active: bool,
    records: HashMap<PartialId, R>,
    prompts: HashMap<PartialId, RenderedPrompt>,
    owners: HashMap<MessageId, PartialId>,
    handlers: HashMap<PartialId, PromptHandler>,
}

impl<R> Default for Indices<R> {
    fn default() -> Self {
        Indices {
            active: false,
            records: HashMap::new(),
            prompts: HashMap::new(),
            owners: HashMap::new(),
            handlers: HashMap::new(),
        }
    }
}

impl<R> Indices<R> {
    fn remove_prompt(&mut self, partial_id: &PartialId) -> Option<RenderedPrompt> {
        let prompt = self.prompts.remove(partial_id)?;
        self.owners.remove(&prompt.message_id);
        Some(prompt)
    }
}

/// Keeps the records of one prompt type in one guild and their messages consistent.
///
/// The registry is the only writer of its indices. Operations on the same
/// record are serialised by the record's handler; different records proceed
/// independently.
pub struct PromptRegistry<K: PromptKind> {
    guild: GuildId,
    channel: ChannelId,
    management: AllowList,
    delete_mode: DeleteMode,
    kind: K,
    transport: Arc<dyn ChatTransport>,
    indices: Mutex<Indices<K::Record>>,
}

impl<K: PromptKind> PromptRegistry<K> {
    pub fn new(
        guild: GuildId,
        channel: ChannelId,
        management: AllowList,
        delete_mode: DeleteMode,
        kind: K,
        transport: Arc<dyn ChatTransport>,
    ) -> PromptRegistry<K> {
        PromptRegistry {
            guild,
            channel,
            management,
            delete_mode,
            kind,
            transport,
            indices: Mutex::new(Indices::default()),
        }
    }

    pub fn kind(&self) -> &K {
        &self.kind
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    /// Matches stored records against the channel history, then starts
    /// accepting events.
    ///
    /// Every record ends up with exactly one message (unless its author cannot
    /// be resolved), and every message without a record is deleted.
    #[tracing::instrument(skip(self), fields(guild = %self.guild, prompt = self.kind.name()))]
    pub async fn start(&self) -> anyhow::Result<ReconcileReport> {
        let records = self.kind.get_all_documents(self.guild).await?;
        let history = self.fetch_history().await?;

        let mut pending: HashMap<PartialId, PromptMessage> = HashMap::new();
        let mut stray = Vec::new();

        for message in history {
            match self.owner_of(&message) {
                Some(partial_id) if !pending.contains_key(&partial_id) => {
                    pending.insert(partial_id, message);
                }
                _ => stray.push(message),
            }
        }

        let mut report = ReconcileReport::default();

        for record in records {
            let partial_id = self.kind.partial_id(&record);

            self.register_document(record.clone()).await;
            self.register_handler(&record).await;

            if let Some(message) = pending.remove(&partial_id) {
                self.register_prompt(RenderedPrompt::new(&message, partial_id, None))
                    .await;
                report.adopted += 1;
                continue;
            }

            match self.send_prompt(&record).await {
                Some(prompt) => {
                    self.register_prompt(prompt).await;
                    report.created += 1;
                }
                None => report.skipped += 1,
            }
        }

        for message in pending.into_values().chain(stray) {
            if self.delete_message(message.id).await {
                report.deleted += 1;
            }
        }

        self.indices.lock().await.active = true;

        info!(
            "Reconciled prompts: {} adopted, {} created, {} deleted, {} skipped",
            report.adopted, report.created, report.deleted, report.skipped
        );

        Ok(report)
    }

    /// Stops handling events and forgets the indices. Stored records are untouched.
    pub async fn stop(&self) {
        *self.indices.lock().await = Indices::default();
        info!(
            "Stopped {} prompts in guild {}",
            self.kind.name(),
            self.guild
        );
    }

    pub async fn register_document(&self, record: K::Record) {
        let partial_id = self.kind.partial_id(&record);
        self.indices.lock().await.records.insert(partial_id, record);
    }

    pub async fn unregister_document(&self, partial_id: &PartialId) -> Option<K::Record> {
        self.indices.lock().await.records.remove(partial_id)
    }

    /// Indexes `prompt` by record and by message, replacing the record's previous prompt.
    pub async fn register_prompt(&self, prompt: RenderedPrompt) {
        let mut indices = self.indices.lock().await;

        indices.remove_prompt(&prompt.partial_id);
        indices.owners.insert(prompt.message_id, prompt.partial_id);
        indices.prompts.insert(prompt.partial_id, prompt);
    }

    pub async fn unregister_prompt(&self, partial_id: &PartialId) -> Option<RenderedPrompt> {
        self.indices.lock().await.remove_prompt(partial_id)
    }

    pub async fn register_handler(&self, record: &K::Record) {
        let partial_id = self.kind.partial_id(record);
        self.indices
            .lock()
            .await
            .handlers
            .entry(partial_id)
            .or_default();
    }

    pub async fn unregister_handler(&self, partial_id: &PartialId) {
        self.indices.lock().await.handlers.remove(partial_id);
    }

    pub async fn prompt(&self, partial_id: &PartialId) -> Option<RenderedPrompt> {
        self.indices.lock().await.prompts.get(partial_id).cloned()
    }

    pub async fn record(&self, partial_id: &PartialId) -> Option<K::Record> {
        self.indices.lock().await.records.get(partial_id).cloned()
    }

    /// Renders `record` for `author` and sends it to the prompt channel.
    ///
    /// The message is not indexed, see [`PromptRegistry::register_prompt`].
    pub async fn save_prompt(
        &self,
        author: &UserProfile,
        record: &K::Record,
    ) -> anyhow::Result<RenderedPrompt> {
        let partial_id = self.kind.partial_id(record);
        let content = self.kind.get_prompt_content(record, author)?;
        let message = self.transport.send_message(self.channel, &content).await?;

        Ok(RenderedPrompt::new(
            &message,
            partial_id,
            Some(content.fingerprint()),
        ))
    }

    /// Brings a freshly stored record under management without waiting for the next start.
    pub async fn track(
        &self,
        author: &UserProfile,
        record: K::Record,
    ) -> anyhow::Result<RenderedPrompt> {
        self.register_document(record.clone()).await;
        self.register_handler(&record).await;

        let handler = self.handler(&self.kind.partial_id(&record)).await;
        let _serial = match &handler {
            Some(handler) => Some(handler.serial.lock().await),
            None => None,
        };

        let prompt = self.save_prompt(author, &record).await?;
        self.register_prompt(prompt.clone()).await;

        Ok(prompt)
    }

    #[tracing::instrument(
        skip(self, interaction),
        fields(prompt = self.kind.name(), action = %interaction.action, record = %interaction.partial_id)
    )]
    pub async fn handle_interaction(&self, interaction: PromptInteraction) -> InteractionReply {
        if interaction.action == REMOVE_ACTION {
            return self
                .handle_delete(&interaction.partial_id, &interaction.actor)
                .await;
        }

        let partial_id = interaction.partial_id;

        let Some(handler) = self.handler(&partial_id).await else {
            return self.reply_to_untracked(&partial_id).await;
        };
        let _serial = handler.serial.lock().await;

        // The record may have been retired while waiting for the previous operation.
        let Some(record) = self.record(&partial_id).await else {
            return self.reply_to_untracked(&partial_id).await;
        };

        let handled = match self
            .kind
            .handle_prompt_interaction(&record, &interaction)
            .await
        {
            Ok(handled) => handled,
            Err(err) => {
                error!("Could not handle the interaction: {err:#}");
                return InteractionReply::ephemeral(FAILURE_REPLY);
            }
        };

        match handled.outcome {
            Outcome::Updated(record) => {
                self.register_document(record.clone()).await;
                self.rerender(&record).await;
            }

            Outcome::Terminal => {
                if let Some(prompt) = self.retire(&partial_id).await {
                    self.delete_message(prompt.message_id).await;
                }
                info!("Prompt {partial_id} settled");
            }

            Outcome::Unchanged => {}
        }

        handled.reply
    }

    /// Removes the record through the prompt's remove button.
    pub async fn handle_delete(
        &self,
        partial_id: &PartialId,
        actor: &PromptActor,
    ) -> InteractionReply {
        let name = self.kind.name();

        if !self.management.allows(actor.user, &actor.roles) {
            return InteractionReply::ephemeral(match self.delete_mode {
                DeleteMode::Delete => format!("You are not allowed to delete this {name} prompt."),
                DeleteMode::Close => format!("You are not allowed to close this {name} prompt."),
            });
        }

        let Some(handler) = self.handler(partial_id).await else {
            return InteractionReply::ephemeral(INACTIVE_REPLY);
        };
        let _serial = handler.serial.lock().await;

        let Some(record) = self.record(partial_id).await else {
            return InteractionReply::ephemeral(INACTIVE_REPLY);
        };

        if let Err(err) = self.kind.remove_document(&record, self.delete_mode).await {
            error!("Could not remove {name} record {partial_id}: {err:#}");
            return InteractionReply::ephemeral(FAILURE_REPLY);
        }

        if let Some(prompt) = self.retire(partial_id).await {
            self.delete_message(prompt.message_id).await;
        }

        info!(
            "{} removed {name} record {partial_id} ({:?})",
            actor.user, self.delete_mode
        );

        InteractionReply::ephemeral(match self.delete_mode {
            DeleteMode::Delete => format!("Deleted the {name} prompt."),
            DeleteMode::Close => format!("Closed the {name} prompt."),
        })
    }

    /// A prompt that loses its embed is replaced.
    pub async fn on_message_update(&self, update: &MessageUpdate) {
        if update.channel_id != self.channel {
            return;
        }

        let Some(embed_count) = update.embed_count else {
            return;
        };

        let tracked = {
            let indices = self.indices.lock().await;
            if !indices.active {
                return;
            }
            indices
                .owners
                .get(&update.id)
                .and_then(|partial_id| indices.prompts.get(partial_id))
                .cloned()
        };

        let Some(prompt) = tracked else {
            return;
        };

        if embed_count >= prompt.embed_count {
            return;
        }

        info!(
            "Prompt message {} of {} lost its embed, replacing it",
            update.id, prompt.partial_id
        );

        self.delete_message(update.id).await;
        self.restore_prompt(update.id).await;
    }

    /// A deleted prompt is sent again for the same record.
    pub async fn on_message_delete(&self, channel_id: ChannelId, message_id: MessageId) {
        if channel_id != self.channel {
            return;
        }

        self.restore_prompt(message_id).await;
    }

    async fn restore_prompt(&self, message_id: MessageId) {
        let (partial_id, handler) = {
            let indices = self.indices.lock().await;
            if !indices.active {
                return;
            }
            let Some(partial_id) = indices.owners.get(&message_id).copied() else {
                return;
            };
            (partial_id, indices.handlers.get(&partial_id).cloned())
        };

        let Some(handler) = handler else {
            self.unregister_prompt(&partial_id).await;
            return;
        };
        let _serial = handler.serial.lock().await;

        let record = {
            let mut indices = self.indices.lock().await;

            // An interaction may have replaced or retired the prompt in the meantime.
            if indices.owners.get(&message_id) != Some(&partial_id) {
                return;
            }

            indices.remove_prompt(&partial_id);
            indices.records.get(&partial_id).cloned()
        };

        let Some(record) = record else {
            warn!("Prompt message {message_id} disappeared, but record {partial_id} is not indexed");
            return;
        };

        match self.send_prompt(&record).await {
            Some(prompt) => {
                info!(
                    "Restored prompt {partial_id}: message {message_id} replaced by {}",
                    prompt.message_id
                );
                self.register_prompt(prompt).await;
            }
            None => warn!("Could not restore prompt {partial_id} until the next start"),
        }
    }

    /// Sends the new rendering before deleting the old one, so the record
    /// always has a message.
    async fn rerender(&self, record: &K::Record) {
        let partial_id = self.kind.partial_id(record);
        let old = self.prompt(&partial_id).await;

        let Some(author) = self.resolve_author(partial_id.author).await else {
            return;
        };

        let content = match self.kind.get_prompt_content(record, &author) {
            Ok(content) => content,
            Err(err) => {
                warn!("Could not render prompt {partial_id}: {err}");
                return;
            }
        };

        let fingerprint = content.fingerprint();
        if old.as_ref().and_then(|prompt| prompt.fingerprint) == Some(fingerprint) {
            return;
        }

        let message = match self.transport.send_message(self.channel, &content).await {
            Ok(message) => message,
            Err(err) => {
                warn!("Could not send the updated prompt {partial_id}: {err}");
                return;
            }
        };

        self.register_prompt(RenderedPrompt::new(&message, partial_id, Some(fingerprint)))
            .await;

        if let Some(old) = old {
            self.delete_message(old.message_id).await;
        }
    }

    async fn send_prompt(&self, record: &K::Record) -> Option<RenderedPrompt> {
        let partial_id = self.kind.partial_id(record);
        let author = self.resolve_author(partial_id.author).await?;

        match self.save_prompt(&author, record).await {
            Ok(prompt) => Some(prompt),
            Err(err) => {
                warn!("Could not send prompt {partial_id}: {err:#}");
                None
            }
        }
    }

    async fn resolve_author(&self, author: UserId) -> Option<UserProfile> {
        match self.transport.get_user(author).await {
            Ok(Some(profile)) => Some(profile),
            Ok(None) => {
                warn!("Author {author} could not be resolved, skipping their prompt");
                None
            }
            Err(err) => {
                warn!("Could not fetch author {author}: {err}");
                None
            }
        }
    }

    async fn reply_to_untracked(&self, partial_id: &PartialId) -> InteractionReply {
        match self.kind.get_user_document(partial_id).await {
            Ok(Some(record)) => InteractionReply::ephemeral(
                self.kind
                    .settled_reply(&record)
                    .unwrap_or_else(|| INACTIVE_REPLY.to_string()),
            ),
            Ok(None) => InteractionReply::ephemeral(INACTIVE_REPLY),
            Err(err) => {
                warn!("Could not look up record {partial_id}: {err:#}");
                InteractionReply::ephemeral(INACTIVE_REPLY)
            }
        }
    }

    async fn handler(&self, partial_id: &PartialId) -> Option<PromptHandler> {
        let indices = self.indices.lock().await;
        if !indices.active {
            return None;
        }
        indices.handlers.get(partial_id).cloned()
    }

    async fn retire(&self, partial_id: &PartialId) -> Option<RenderedPrompt> {
        self.unregister_handler(partial_id).await;
        self.unregister_document(partial_id).await;
        self.unregister_prompt(partial_id).await
    }

    async fn delete_message(&self, message_id: MessageId) -> bool {
        match self.transport.delete_message(self.channel, message_id).await {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    "Could not delete message {message_id} in channel {}: {err}",
                    self.channel
                );
                false
            }
        }
    }

    async fn fetch_history(&self) -> Result<Vec<PromptMessage>, TransportError> {
        let mut messages = Vec::new();
        let mut before = None;

        loop {
            let page = self
                .transport
                .list_messages(self.channel, before, HISTORY_PAGE_SIZE)
                .await?;

            let page_len = page.len();
            before = page.iter().map(|message| message.id).min();
            messages.extend(page);

            if page_len < HISTORY_PAGE_SIZE as usize {
                break;
            }
        }

        Ok(messages)
    }

    fn owner_of(&self, message: &PromptMessage) -> Option<PartialId> {
        let token = codec::decode(&codec::extract(message)?).ok()?;

        if token.operation != self.kind.name() {
            return None;
        }

        let [part] = token.parts.as_slice() else {
            return None;
        };

        let partial_id = part.parse::<PartialId>().ok()?;
        (partial_id.guild == self.guild).then_some(partial_id)
    }
}

/// A registry with its record type erased, for routing events.
#[async_trait]
pub trait ManagedPrompts: Send + Sync {
    fn name(&self) -> &'static str;

    fn channel(&self) -> ChannelId;

    async fn start(&self) -> anyhow::Result<ReconcileReport>;

    async fn stop(&self);

    async fn handle_interaction(&self, interaction: PromptInteraction) -> InteractionReply;

    async fn on_message_update(&self, update: &MessageUpdate);

    async fn on_message_delete(&self, channel_id: ChannelId, message_id: MessageId);
}

#[async_trait]
impl<K: PromptKind> ManagedPrompts for PromptRegistry<K> {
    fn name(&self) -> &'static str {
        self.kind.name()
    }

    fn channel(&self) -> ChannelId {
        self.channel
    }

    async fn start(&self) -> anyhow::Result<ReconcileReport> {
        PromptRegistry::start(self).await
    }

    async fn stop(&self) {
        PromptRegistry::stop(self).await
    }

    async fn handle_interaction(&self, interaction: PromptInteraction) -> InteractionReply {
        PromptRegistry::handle_interaction(self, interaction).await
    }

    async fn on_message_update(&self, update: &MessageUpdate) {
        PromptRegistry::on_message_update(self, update).await
    }

    async fn on_message_delete(&self, channel_id: ChannelId, message_id: MessageId) {
        PromptRegistry::on_message_delete(self, channel_id, message_id).await
    }
}
