//! Prompts: chat messages that stand for a stored submission and that users
//! resolve through buttons.
//!
//! A [`PromptRegistry`] per guild and prompt type keeps the stored records and
//! their rendered messages consistent. The behaviour specific to one prompt
//! type lives behind [`PromptKind`].

pub mod codec;
mod content;
mod entry;
mod registry;
mod serenity_transport;
mod service;
mod transport;
mod verification;

#[cfg(test)]
mod testing;

use async_trait::async_trait;
use poise::serenity_prelude::{GuildId, RoleId, UserId};

use crate::{config::DeleteMode, models::PartialId};

pub use content::{ButtonKind, PromptContent};
pub use entry::EntryPrompts;
pub use registry::{ManagedPrompts, PromptRegistry};
pub use serenity_transport::SerenityTransport;
pub use service::PromptService;
pub use transport::{
    ChatTransport, EmbedSnapshot, MemberProfile, MessageUpdate, PromptMessage, TransportError,
    UserProfile,
};
pub use verification::VerificationPrompts;

/// The action every prompt type offers for removing its record.
pub const REMOVE_ACTION: &str = "remove";

/// The member who pressed a button.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptActor {
    pub user: UserId,
    pub roles: Vec<RoleId>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptInteraction {
    pub action: String,
    pub partial_id: PartialId,
    pub actor: PromptActor,
}

/// What the pressing member gets back.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InteractionReply {
    /// Acknowledge the press without a message.
    Acknowledge,
    /// A message only the pressing member sees.
    Ephemeral(String),
}

impl InteractionReply {
    pub fn ephemeral(message: impl Into<String>) -> InteractionReply {
        InteractionReply::Ephemeral(message.into())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Outcome<R> {
    /// The record changed and stays open: render it again.
    Updated(R),
    /// The record reached a state without a prompt: retire it.
    Terminal,
    /// Nothing changed.
    Unchanged,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Handled<R> {
    pub outcome: Outcome<R>,
    pub reply: InteractionReply,
}

impl<R> Handled<R> {
    pub fn unchanged(reply: impl Into<String>) -> Handled<R> {
        Handled {
            outcome: Outcome::Unchanged,
            reply: InteractionReply::ephemeral(reply),
        }
    }
}

/// Behaviour of one prompt type.
#[async_trait]
pub trait PromptKind: Send + Sync + 'static {
    type Record: Clone + Send + Sync + 'static;

    /// Operation namespace of the type, also embedded in its messages.
    fn name(&self) -> &'static str;

    fn partial_id(&self, record: &Self::Record) -> PartialId;

    /// The reply for a record that cannot change anymore, `None` while it is open.
    fn settled_reply(&self, record: &Self::Record) -> Option<String>;

    /// All records of the guild that need a prompt.
    async fn get_all_documents(&self, guild: GuildId) -> anyhow::Result<Vec<Self::Record>>;

    /// One record in any state.
    async fn get_user_document(&self, partial_id: &PartialId)
        -> anyhow::Result<Option<Self::Record>>;

    fn get_prompt_content(
        &self,
        record: &Self::Record,
        author: &UserProfile,
    ) -> Result<PromptContent, codec::CodecError>;

    /// Applies a button press. Store writes happen here, before the registry
    /// touches its indices.
    async fn handle_prompt_interaction(
        &self,
        record: &Self::Record,
        interaction: &PromptInteraction,
    ) -> anyhow::Result<Handled<Self::Record>>;

    async fn remove_document(&self, record: &Self::Record, mode: DeleteMode) -> anyhow::Result<()>;
}
