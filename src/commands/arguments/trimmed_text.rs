use std::{fmt::Display, str::FromStr};

use crate::commands::{user_err, CommandError};

/// Non-empty text without leading or trailing whitespace, at most `MAX` characters long.
///
/// Embed titles, fields and descriptions all have length limits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrimmedText<const MAX: usize>(String);

impl<const MAX: usize> FromStr for TrimmedText<MAX> {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        if s.is_empty() {
            return Err(user_err("The text must not be empty."));
        }

        let length = s.chars().count();
        if length > MAX {
            return Err(user_err(format!(
                "The text is too long: {length} characters, at most {MAX} are allowed."
            )));
        }

        Ok(TrimmedText(s.to_owned()))
    }
}

impl<const MAX: usize> From<TrimmedText<MAX>> for String {
    fn from(value: TrimmedText<MAX>) -> Self {
        value.0
    }
}

impl<const MAX: usize> Display for TrimmedText<MAX> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<const MAX: usize> AsRef<str> for TrimmedText<MAX> {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::TrimmedText;

    #[test]
    fn trimmed() {
        assert_eq!(
            TrimmedText::<32>::from_str("  test foo  \t bar   ")
                .unwrap()
                .as_ref(),
            "test foo  \t bar"
        );
    }

    #[test]
    fn blank() {
        assert!(TrimmedText::<32>::from_str(" \t ").is_err());
    }

    #[test]
    fn length_counts_characters() {
        assert!(TrimmedText::<4>::from_str("ääää").is_ok());
        assert!(TrimmedText::<4>::from_str("äääää").is_err());
    }
}
