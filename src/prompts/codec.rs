//! Compact tokens naming an operation and the record it applies to.
//!
//! A token is `<operation>~<part>~<part>...`. Buttons carry it as their custom
//! id, and every prompt carries one in the query of its footer icon URL. The
//! footer token is the only persisted link between a message and its record:
//! after a restart it is what lets reconciliation match messages to records.

use lazy_regex::regex_is_match;
use thiserror::Error;

use super::PromptMessage;

pub const SEPARATOR: char = '~';

/// Discord rejects longer custom ids.
pub const MAX_TOKEN_LEN: usize = 100;

/// Query parameter holding the token in a footer icon URL.
pub const QUERY_KEY: &str = "prompt";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("Operation name must not be empty")]
    EmptyOperation,
    #[error("`{0}` contains characters outside of the token alphabet")]
    InvalidCharacters(String),
    #[error("Token is {0} characters long, at most {MAX_TOKEN_LEN} are allowed")]
    TooLong(usize),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub operation: String,
    pub parts: Vec<String>,
}

// The separator is not in the alphabet, and the alphabet is URL-safe.
fn is_valid_component(component: &str) -> bool {
    regex_is_match!(r"^[A-Za-z0-9_.:-]*$", component)
}

fn check_component(component: &str) -> Result<(), CodecError> {
    if is_valid_component(component) {
        Ok(())
    } else {
        Err(CodecError::InvalidCharacters(component.escape_default().to_string()))
    }
}

pub fn encode<S: AsRef<str>>(operation: &str, parts: &[S]) -> Result<String, CodecError> {
    if operation.is_empty() {
        return Err(CodecError::EmptyOperation);
    }
    check_component(operation)?;

    let mut token = operation.to_string();
    for part in parts {
        let part = part.as_ref();
        check_component(part)?;
        token.push(SEPARATOR);
        token.push_str(part);
    }

    if token.len() > MAX_TOKEN_LEN {
        return Err(CodecError::TooLong(token.len()));
    }

    Ok(token)
}

pub fn decode(token: &str) -> Result<Token, CodecError> {
    if token.len() > MAX_TOKEN_LEN {
        return Err(CodecError::TooLong(token.len()));
    }

    let mut components = token.split(SEPARATOR);
    let operation = components.next().unwrap_or_default();
    if operation.is_empty() {
        return Err(CodecError::EmptyOperation);
    }
    check_component(operation)?;

    let parts = components
        .map(|part| check_component(part).map(|_| part.to_string()))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Token {
        operation: operation.to_string(),
        parts,
    })
}

/// Appends `token` to an otherwise decorative icon URL.
pub fn embed(token: &str, base_icon_url: &str) -> String {
    let delimiter = if base_icon_url.contains('?') { '&' } else { '?' };
    format!("{base_icon_url}{delimiter}{QUERY_KEY}={token}")
}

/// Reads the token from the footer icon of the last embed of `message`.
///
/// Messages without one are not prompts.
pub fn extract(message: &PromptMessage) -> Option<String> {
    let icon_url = message.embeds.last()?.footer_icon_url.as_deref()?;
    let (_, query) = icon_url.split_once('?')?;
    let query = query.split('#').next().unwrap_or_default();

    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .filter(|(key, _)| *key == QUERY_KEY)
        .map(|(_, value)| value)
        .last()
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
