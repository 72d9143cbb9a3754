use poise::serenity_prelude::{GuildId, UserId};
use sqlx::{query, query_as, FromRow, Pool, Sqlite};
use tracing::warn;

use crate::models::{
    types::UtcDateTime, Entry, EntryId, EntryState, EntryType, NewEntry, PartialId,
};

use super::conversion::{DBConvertible, DBFromConversionError};

pub struct EntryRepository {
    pool: Pool<Sqlite>,
}

impl EntryRepository {
    pub fn new(pool: Pool<Sqlite>) -> EntryRepository {
        EntryRepository { pool }
    }

    pub async fn create(&self, entry: &NewEntry) -> Result<Entry, anyhow::Error> {
        let mut transaction = self.pool.begin().await?;

        let created = query_as::<_, SqlEntry>(
            r#"
                INSERT INTO entries (prompt_type, guild, author, created_at, subject, body, link, state)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                RETURNING id, prompt_type, guild, author, created_at, subject, body, link, state
            "#,
        )
        .bind(entry.entry_type.to_db())
        .bind(entry.guild.to_db())
        .bind(entry.author.to_db())
        .bind(entry.created_at.to_db())
        .bind(&entry.subject)
        .bind(&entry.body)
        .bind(entry.link.as_deref())
        .bind(EntryState::Open.to_db())
        .fetch_one(&mut *transaction)
        .await?;

        transaction.commit().await?;

        Ok(Entry::try_from(created)?)
    }

    pub async fn get_all_open(
        &self,
        guild: GuildId,
        entry_type: EntryType,
    ) -> Result<Vec<Entry>, anyhow::Error> {
        let entries = query_as::<_, SqlEntry>(
            r#"
                SELECT id, prompt_type, guild, author, created_at, subject, body, link, state
                FROM entries
                WHERE guild = $1 AND prompt_type = $2 AND state = $3
                ORDER BY created_at
            "#,
        )
        .bind(guild.to_db())
        .bind(entry_type.to_db())
        .bind(EntryState::Open.to_db())
        .fetch_all(&self.pool)
        .await?;

        Ok(entries
            .into_iter()
            .map(Entry::try_from)
            .collect::<Result<Vec<_>, _>>()?)
    }

    pub async fn get(
        &self,
        entry_type: EntryType,
        partial_id: &PartialId,
    ) -> Result<Option<Entry>, anyhow::Error> {
        let entry = query_as::<_, SqlEntry>(
            r#"
                SELECT id, prompt_type, guild, author, created_at, subject, body, link, state
                FROM entries
                WHERE prompt_type = $1 AND guild = $2 AND author = $3 AND created_at = $4
            "#,
        )
        .bind(entry_type.to_db())
        .bind(partial_id.guild.to_db())
        .bind(partial_id.author.to_db())
        .bind(partial_id.created_at.to_db())
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry.map(Entry::try_from).transpose()?)
    }

    /// Moves an open entry to `state`. Returns `false` if the entry was not open anymore.
    pub async fn settle(&self, id: EntryId, state: EntryState) -> Result<bool, anyhow::Error> {
        let mut transaction = self.pool.begin().await?;

        let query_result = query(r#"UPDATE entries SET state = $2 WHERE id = $1 AND state = $3"#)
            .bind(id.to_db())
            .bind(state.to_db())
            .bind(EntryState::Open.to_db())
            .execute(&mut *transaction)
            .await?;

        transaction.commit().await?;

        Ok(query_result.rows_affected() > 0)
    }

    pub async fn delete(&self, id: EntryId) -> Result<bool, anyhow::Error> {
        let mut transaction = self.pool.begin().await?;

        let query_result = query(r#"DELETE FROM entries WHERE id = $1"#)
            .bind(id.to_db())
            .execute(&mut *transaction)
            .await?;

        transaction.commit().await?;

        let entries_deleted = query_result.rows_affected();

        if entries_deleted > 1 {
            warn!("Deleted more than one entry with id {id:?}");
        }

        Ok(entries_deleted > 0)
    }
}

#[derive(Debug, FromRow)]
struct SqlEntry {
    id: i64,
    prompt_type: String,
    guild: i64,
    author: i64,
    created_at: i64,
    subject: String,
    body: String,
    link: Option<String>,
    state: String,
}

impl TryFrom<SqlEntry> for Entry {
    type Error = DBFromConversionError;

    fn try_from(value: SqlEntry) -> Result<Self, Self::Error> {
        Ok(Entry {
            id: EntryId::from_db(&value.id)?,
            entry_type: EntryType::from_db(&value.prompt_type)?,
            guild: GuildId::from_db(&value.guild)?,
            author: UserId::from_db(&value.author)?,
            created_at: UtcDateTime::from_db(&value.created_at)?,
            subject: value.subject,
            body: value.body,
            link: value.link,
            state: EntryState::from_db(&value.state)?,
        })
    }
}
