use poise::serenity_prelude::{GuildId, RoleId, UserId};
use thiserror::Error;

use crate::{
    models::{
        types::UtcDateTime, EntryId, EntryState, EntryType, MemberStatus, VerificationId,
        VerificationState,
    },
    tally::Stance,
};

pub trait DBConvertible: Sized {
    type DBType;

    fn to_db(&self) -> Self::DBType;

    fn from_db(value: &Self::DBType) -> Result<Self, DBFromConversionError>;
}

#[derive(Debug, Error)]
pub enum DBFromConversionError {
    #[error("Failed to parse enum variant: {0}")]
    NoSuchVariant(String),
    #[error("Invalid number: {0}")]
    InvalidNumber(i64),
}

impl DBConvertible for UtcDateTime {
    type DBType = i64;

    fn to_db(&self) -> Self::DBType {
        self.unix_millis()
    }

    fn from_db(value: &Self::DBType) -> Result<Self, DBFromConversionError> {
        UtcDateTime::from_unix_millis(*value).ok_or(DBFromConversionError::InvalidNumber(*value))
    }
}

impl DBConvertible for VerificationId {
    type DBType = i64;

    fn to_db(&self) -> Self::DBType {
        self.0
    }

    fn from_db(value: &Self::DBType) -> Result<Self, DBFromConversionError> {
        Ok(VerificationId(*value))
    }
}

impl DBConvertible for EntryId {
    type DBType = i64;

    fn to_db(&self) -> Self::DBType {
        self.0
    }

    fn from_db(value: &Self::DBType) -> Result<Self, DBFromConversionError> {
        Ok(EntryId(*value))
    }
}

// Snowflakes are bit-cast, so ids above i64::MAX come back intact.
fn snowflake(value: i64) -> Result<u64, DBFromConversionError> {
    match value as u64 {
        0 => Err(DBFromConversionError::InvalidNumber(value)),
        id => Ok(id),
    }
}

impl DBConvertible for UserId {
    type DBType = i64;

    fn to_db(&self) -> Self::DBType {
        self.get() as _
    }

    fn from_db(value: &Self::DBType) -> Result<Self, DBFromConversionError> {
        Ok(UserId::new(snowflake(*value)?))
    }
}

impl DBConvertible for GuildId {
    type DBType = i64;

    fn to_db(&self) -> Self::DBType {
        self.get() as _
    }

    fn from_db(value: &Self::DBType) -> Result<Self, DBFromConversionError> {
        Ok(GuildId::new(snowflake(*value)?))
    }
}

impl DBConvertible for RoleId {
    type DBType = i64;

    fn to_db(&self) -> Self::DBType {
        self.get() as _
    }

    fn from_db(value: &Self::DBType) -> Result<Self, DBFromConversionError> {
        Ok(RoleId::new(snowflake(*value)?))
    }
}

impl DBConvertible for VerificationState {
    type DBType = String;

    fn to_db(&self) -> Self::DBType {
        match self {
            VerificationState::Pending => "Pending",
            VerificationState::Accepted => "Accepted",
            VerificationState::Rejected => "Rejected",
        }
        .to_string()
    }

    fn from_db(value: &Self::DBType) -> Result<Self, DBFromConversionError> {
        match value.as_str() {
            "Pending" => Ok(VerificationState::Pending),
            "Accepted" => Ok(VerificationState::Accepted),
            "Rejected" => Ok(VerificationState::Rejected),

            unknown => Err(DBFromConversionError::NoSuchVariant(unknown.to_string())),
        }
    }
}

impl DBConvertible for EntryState {
    type DBType = String;

    fn to_db(&self) -> Self::DBType {
        match self {
            EntryState::Open => "Open",
            EntryState::Resolved => "Resolved",
            EntryState::Closed => "Closed",
        }
        .to_string()
    }

    fn from_db(value: &Self::DBType) -> Result<Self, DBFromConversionError> {
        match value.as_str() {
            "Open" => Ok(EntryState::Open),
            "Resolved" => Ok(EntryState::Resolved),
            "Closed" => Ok(EntryState::Closed),

            unknown => Err(DBFromConversionError::NoSuchVariant(unknown.to_string())),
        }
    }
}

impl DBConvertible for EntryType {
    type DBType = String;

    fn to_db(&self) -> Self::DBType {
        self.to_string()
    }

    fn from_db(value: &Self::DBType) -> Result<Self, DBFromConversionError> {
        value
            .parse()
            .map_err(|_| DBFromConversionError::NoSuchVariant(value.clone()))
    }
}

impl DBConvertible for Stance {
    type DBType = String;

    fn to_db(&self) -> Self::DBType {
        match self {
            Stance::For => "For",
            Stance::Against => "Against",
        }
        .to_string()
    }

    fn from_db(value: &Self::DBType) -> Result<Self, DBFromConversionError> {
        match value.as_str() {
            "For" => Ok(Stance::For),
            "Against" => Ok(Stance::Against),

            unknown => Err(DBFromConversionError::NoSuchVariant(unknown.to_string())),
        }
    }
}

impl DBConvertible for MemberStatus {
    type DBType = String;

    fn to_db(&self) -> Self::DBType {
        match self {
            MemberStatus::Authorized => "Authorized",
            MemberStatus::Rejected => "Rejected",
        }
        .to_string()
    }

    fn from_db(value: &Self::DBType) -> Result<Self, DBFromConversionError> {
        match value.as_str() {
            "Authorized" => Ok(MemberStatus::Authorized),
            "Rejected" => Ok(MemberStatus::Rejected),

            unknown => Err(DBFromConversionError::NoSuchVariant(unknown.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use poise::serenity_prelude::UserId;

    use super::DBConvertible;
    use crate::models::EntryType;

    #[test]
    fn large_snowflake_survives() {
        let user = UserId::new(u64::MAX - 7);
        assert_eq!(UserId::from_db(&user.to_db()).unwrap(), user);
    }

    #[test]
    fn zero_snowflake_is_rejected() {
        assert!(UserId::from_db(&0).is_err());
    }

    #[test]
    fn entry_type_names() {
        assert_eq!(EntryType::Suggestion.to_db(), "suggestion");
        assert_eq!(EntryType::from_db(&"ticket".to_string()).unwrap(), EntryType::Ticket);
        assert!(EntryType::from_db(&"poll".to_string()).is_err());
    }
}
