use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use poise::serenity_prelude::{ChannelId, GuildId, MessageId};
use strum::IntoEnumIterator;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::{
    config::{GuildPromptConfig, PromptSettings},
    models::{EntryType, PartialId},
    repository::{EntryRepository, VerificationRepository},
};

use super::{
    codec, ChatTransport, EntryPrompts, InteractionReply, ManagedPrompts, MessageUpdate,
    PromptActor, PromptInteraction, PromptRegistry, VerificationPrompts,
};

const LOADING_REPLY: &str = "Prompts are still loading in this server, please try again shortly.";
const INACTIVE_REPLY: &str = "This prompt is no longer active.";

/// The running registries of one guild.
pub struct GuildPrompts {
    verification: Option<Arc<PromptRegistry<VerificationPrompts>>>,
    entries: HashMap<EntryType, Arc<PromptRegistry<EntryPrompts>>>,
}

impl GuildPrompts {
    pub fn verification(&self) -> Option<&PromptRegistry<VerificationPrompts>> {
        self.verification.as_deref()
    }

    pub fn entries(&self, entry_type: EntryType) -> Option<&PromptRegistry<EntryPrompts>> {
        self.entries.get(&entry_type).map(Arc::as_ref)
    }

    fn managed(&self) -> impl Iterator<Item = &dyn ManagedPrompts> {
        self.verification
            .iter()
            .map(|registry| registry.as_ref() as &dyn ManagedPrompts)
            .chain(
                self.entries
                    .values()
                    .map(|registry| registry.as_ref() as &dyn ManagedPrompts),
            )
    }

    fn by_name(&self, name: &str) -> Option<&dyn ManagedPrompts> {
        self.managed().find(|registry| registry.name() == name)
    }

    fn by_channel(&self, channel: ChannelId) -> impl Iterator<Item = &dyn ManagedPrompts> {
        self.managed()
            .filter(move |registry| registry.channel() == channel)
    }
}

/// Constructs, starts and routes events to the registries of every guild.
pub struct PromptService {
    transport: Arc<dyn ChatTransport>,
    verification_repository: Arc<VerificationRepository>,
    entry_repository: Arc<EntryRepository>,
    settings: PromptSettings,
    guilds: RwLock<HashMap<GuildId, Arc<GuildPrompts>>>,
    activating: Mutex<HashSet<GuildId>>,
}

impl PromptService {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        verification_repository: Arc<VerificationRepository>,
        entry_repository: Arc<EntryRepository>,
        settings: PromptSettings,
    ) -> PromptService {
        PromptService {
            transport,
            verification_repository,
            entry_repository,
            settings,
            guilds: RwLock::new(HashMap::new()),
            activating: Mutex::new(HashSet::new()),
        }
    }

    pub fn settings(&self, guild: GuildId) -> Option<&GuildPromptConfig> {
        self.settings.guild(guild)
    }

    pub async fn guild(&self, guild: GuildId) -> Option<Arc<GuildPrompts>> {
        self.guilds.read().await.get(&guild).cloned()
    }

    /// Reconciles every enabled prompt type of the guild. Its registries
    /// receive events only once all of them have started.
    ///
    /// If any of them fails to start, nothing is published and the next
    /// activation of the guild starts over.
    #[tracing::instrument(skip(self))]
    pub async fn activate_guild(&self, guild: GuildId) {
        let Some(config) = self.settings.guild(guild) else {
            debug!("No prompts configured");
            return;
        };

        let active = self.guilds.read().await.contains_key(&guild);
        if active || !self.activating.lock().await.insert(guild) {
            debug!("Prompts are already active");
            return;
        }

        let prompts = self.build(guild, config);
        let started = self.start_all(&prompts).await;

        if started {
            self.guilds.write().await.insert(guild, Arc::new(prompts));
            info!("Prompts are active");
        } else {
            for registry in prompts.managed() {
                registry.stop().await;
            }
        }

        self.activating.lock().await.remove(&guild);
    }

    async fn start_all(&self, prompts: &GuildPrompts) -> bool {
        for registry in prompts.managed() {
            if let Err(err) = registry.start().await {
                warn!(
                    "Could not start {} prompts, they wait for the next activation: {err:#}",
                    registry.name()
                );
                return false;
            }
        }
        true
    }

    #[tracing::instrument(skip(self))]
    pub async fn deactivate_guild(&self, guild: GuildId) {
        let Some(prompts) = self.guilds.write().await.remove(&guild) else {
            return;
        };

        for registry in prompts.managed() {
            registry.stop().await;
        }
    }

    /// `None` if `custom_id` does not belong to a prompt.
    pub async fn handle_component(
        &self,
        guild: GuildId,
        custom_id: &str,
        actor: PromptActor,
    ) -> Option<InteractionReply> {
        let token = codec::decode(custom_id).ok()?;
        let (name, action) = token.operation.split_once(':')?;
        let partial_id = token.parts.first()?.parse::<PartialId>().ok()?;

        if partial_id.guild != guild {
            return Some(InteractionReply::ephemeral(INACTIVE_REPLY));
        }

        let Some(prompts) = self.guild(guild).await else {
            return Some(InteractionReply::ephemeral(
                if self.settings.guild(guild).is_some() {
                    LOADING_REPLY
                } else {
                    INACTIVE_REPLY
                },
            ));
        };

        let Some(registry) = prompts.by_name(name) else {
            return Some(InteractionReply::ephemeral(INACTIVE_REPLY));
        };

        Some(
            registry
                .handle_interaction(PromptInteraction {
                    action: action.to_string(),
                    partial_id,
                    actor,
                })
                .await,
        )
    }

    pub async fn on_message_update(&self, guild: GuildId, update: &MessageUpdate) {
        let Some(prompts) = self.guild(guild).await else {
            return;
        };

        for registry in prompts.by_channel(update.channel_id) {
            registry.on_message_update(update).await;
        }
    }

    pub async fn on_message_delete(&self, guild: GuildId, channel: ChannelId, message: MessageId) {
        let Some(prompts) = self.guild(guild).await else {
            return;
        };

        for registry in prompts.by_channel(channel) {
            registry.on_message_delete(channel, message).await;
        }
    }

    fn build(&self, guild: GuildId, config: &GuildPromptConfig) -> GuildPrompts {
        let verification = config.verification.as_ref().map(|config| {
            Arc::new(PromptRegistry::new(
                guild,
                config.channel,
                config.management.clone(),
                config.delete_mode,
                VerificationPrompts::new(
                    config.clone(),
                    self.verification_repository.clone(),
                    self.transport.clone(),
                ),
                self.transport.clone(),
            ))
        });

        let entries = EntryType::iter()
            .filter_map(|entry_type| {
                let config = config.entry(entry_type)?;

                let registry = PromptRegistry::new(
                    guild,
                    config.channel,
                    config.management.clone(),
                    config.delete_mode,
                    EntryPrompts::new(
                        entry_type,
                        config.management.clone(),
                        config.delete_mode,
                        self.entry_repository.clone(),
                    ),
                    self.transport.clone(),
                );

                Some((entry_type, Arc::new(registry)))
            })
            .collect();

        GuildPrompts {
            verification,
            entries,
        }
    }
}
