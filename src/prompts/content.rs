use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
};

use crate::models::PartialId;

use super::{codec, UserProfile};

const DEFAULT_COLOUR: u32 = 0x5865F2;

/// A rendered prompt, independent of the chat platform's builders.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PromptContent {
    pub title: String,
    pub description: String,
    pub colour: u32,
    pub fields: Vec<PromptField>,
    pub footer_text: String,
    pub footer_icon_url: String,
    pub buttons: Vec<PromptButton>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PromptField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PromptButton {
    pub custom_id: String,
    pub label: String,
    pub kind: ButtonKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ButtonKind {
    Primary,
    Secondary,
    Success,
    Danger,
}

pub fn operation(kind: &str, action: &str) -> String {
    format!("{kind}:{action}")
}

impl PromptContent {
    /// Starts a prompt whose footer shows the author and carries the record's token.
    pub fn new(
        kind: &str,
        partial_id: &PartialId,
        author: &UserProfile,
        title: impl Into<String>,
    ) -> Result<PromptContent, codec::CodecError> {
        let token = codec::encode(kind, &[partial_id.to_string()])?;

        Ok(PromptContent {
            title: title.into(),
            description: String::new(),
            colour: DEFAULT_COLOUR,
            fields: Vec::new(),
            footer_text: author.name.clone(),
            footer_icon_url: codec::embed(&token, &author.avatar_url),
            buttons: Vec::new(),
        })
    }

    pub fn description(mut self, description: impl Into<String>) -> PromptContent {
        self.description = description.into();
        self
    }

    pub fn colour(mut self, colour: u32) -> PromptContent {
        self.colour = colour;
        self
    }

    pub fn field(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
        inline: bool,
    ) -> PromptContent {
        self.fields.push(PromptField {
            name: name.into(),
            value: value.into(),
            inline,
        });
        self
    }

    pub fn button(
        mut self,
        kind: &str,
        action: &str,
        partial_id: &PartialId,
        label: impl Into<String>,
        button_kind: ButtonKind,
    ) -> Result<PromptContent, codec::CodecError> {
        let custom_id = codec::encode(&operation(kind, action), &[partial_id.to_string()])?;

        self.buttons.push(PromptButton {
            custom_id,
            label: label.into(),
            kind: button_kind,
        });
        Ok(self)
    }

    /// Changes whenever anything visible changes.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}
