use std::{fmt::Display, str::FromStr};

use lazy_regex::regex_is_match;

use crate::commands::{user_err, CommandError};

const MAX_LINK_LENGTH: usize = 512;

/// An absolute `http` or `https` link.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryLink(String);

impl FromStr for EntryLink {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        if s.len() > MAX_LINK_LENGTH {
            return Err(user_err(format!(
                "The link is too long, at most {MAX_LINK_LENGTH} characters are allowed."
            )));
        }

        if !regex_is_match!(r"^https?://[^\s/?#]+\.[^\s/?#]+([/?#]\S*)?$"i, s) {
            return Err(user_err(format!(
                "Invalid link: `{}`.\nIt should look like this: `https://example.com/page`.",
                s.escape_default()
            )));
        }

        Ok(EntryLink(s.to_string()))
    }
}

impl From<EntryLink> for String {
    fn from(value: EntryLink) -> Self {
        value.0
    }
}

impl Display for EntryLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
