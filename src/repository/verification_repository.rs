use std::collections::HashMap;

use poise::serenity_prelude::{GuildId, RoleId, UserId};
use sqlx::{query, query_as, FromRow, Pool, Sqlite};

use crate::{
    models::{
        types::UtcDateTime, MemberStatus, NewVerificationRequest, PartialId, VerificationId,
        VerificationRequest, VerificationState,
    },
    tally::{Stance, VoterSets},
};

use super::conversion::{DBConvertible, DBFromConversionError};

pub struct VerificationRepository {
    pool: Pool<Sqlite>,
}

impl VerificationRepository {
    pub fn new(pool: Pool<Sqlite>) -> VerificationRepository {
        VerificationRepository { pool }
    }

    pub async fn create(
        &self,
        request: &NewVerificationRequest,
    ) -> Result<VerificationRequest, anyhow::Error> {
        let mut transaction = self.pool.begin().await?;

        let created = query_as::<_, SqlVerificationRequest>(
            r#"
                INSERT INTO verification_requests (guild, author, created_at, answers, requested_role, state)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING id, guild, author, created_at, answers, requested_role, state
            "#,
        )
        .bind(request.guild.to_db())
        .bind(request.author.to_db())
        .bind(request.created_at.to_db())
        .bind(&request.answers)
        .bind(request.requested_role.map(|role| role.to_db()))
        .bind(VerificationState::Pending.to_db())
        .fetch_one(&mut *transaction)
        .await?;

        transaction.commit().await?;

        Ok(created.into_model(Vec::new())?)
    }

    pub async fn get_all_pending(
        &self,
        guild: GuildId,
    ) -> Result<Vec<VerificationRequest>, anyhow::Error> {
        let mut transaction = self.pool.begin().await?;

        let guild = guild.to_db();
        let pending = VerificationState::Pending.to_db();

        let requests = query_as::<_, SqlVerificationRequest>(
            r#"
                SELECT id, guild, author, created_at, answers, requested_role, state
                FROM verification_requests
                WHERE guild = $1 AND state = $2
                ORDER BY created_at
            "#,
        )
        .bind(guild)
        .bind(&pending)
        .fetch_all(&mut *transaction)
        .await?;

        let votes = query_as::<_, SqlVote>(
            r#"
                SELECT v.request_id, v.voter, v.stance
                FROM verification_votes v
                JOIN verification_requests r ON r.id = v.request_id
                WHERE r.guild = $1 AND r.state = $2
            "#,
        )
        .bind(guild)
        .bind(&pending)
        .fetch_all(&mut *transaction)
        .await?;

        transaction.commit().await?;

        let mut votes_by_request: HashMap<i64, Vec<SqlVote>> = HashMap::new();
        for vote in votes {
            votes_by_request.entry(vote.request_id).or_default().push(vote);
        }

        let mut result = Vec::with_capacity(requests.len());
        for request in requests {
            let votes = votes_by_request.remove(&request.id).unwrap_or_default();
            result.push(request.into_model(votes)?);
        }

        Ok(result)
    }

    /// Looks the request up in any state, so settled requests can still be reported as such.
    pub async fn get(
        &self,
        partial_id: &PartialId,
    ) -> Result<Option<VerificationRequest>, anyhow::Error> {
        let mut transaction = self.pool.begin().await?;

        let request = query_as::<_, SqlVerificationRequest>(
            r#"
                SELECT id, guild, author, created_at, answers, requested_role, state
                FROM verification_requests
                WHERE guild = $1 AND author = $2 AND created_at = $3
            "#,
        )
        .bind(partial_id.guild.to_db())
        .bind(partial_id.author.to_db())
        .bind(partial_id.created_at.to_db())
        .fetch_optional(&mut *transaction)
        .await?;

        let Some(request) = request else {
            transaction.commit().await?;
            return Ok(None);
        };

        let votes = query_as::<_, SqlVote>(
            r#"SELECT request_id, voter, stance FROM verification_votes WHERE request_id = $1"#,
        )
        .bind(request.id)
        .fetch_all(&mut *transaction)
        .await?;

        transaction.commit().await?;

        Ok(Some(request.into_model(votes)?))
    }

    /// Replaces the stored tally and state of the request in one transaction.
    pub async fn save_votes(&self, request: &VerificationRequest) -> Result<(), anyhow::Error> {
        let mut transaction = self.pool.begin().await?;

        let id = request.id.to_db();

        query(r#"UPDATE verification_requests SET state = $2 WHERE id = $1"#)
            .bind(id)
            .bind(request.state.to_db())
            .execute(&mut *transaction)
            .await?;

        query(r#"DELETE FROM verification_votes WHERE request_id = $1"#)
            .bind(id)
            .execute(&mut *transaction)
            .await?;

        for (voter, stance) in request.votes.iter() {
            query(
                r#"INSERT INTO verification_votes (request_id, voter, stance) VALUES ($1, $2, $3)"#,
            )
            .bind(id)
            .bind(voter.to_db())
            .bind(stance.to_db())
            .execute(&mut *transaction)
            .await?;
        }

        transaction.commit().await?;

        Ok(())
    }

    pub async fn delete(&self, id: VerificationId) -> Result<bool, anyhow::Error> {
        let mut transaction = self.pool.begin().await?;

        query(r#"DELETE FROM verification_votes WHERE request_id = $1"#)
            .bind(id.to_db())
            .execute(&mut *transaction)
            .await?;

        let query_result = query(r#"DELETE FROM verification_requests WHERE id = $1"#)
            .bind(id.to_db())
            .execute(&mut *transaction)
            .await?;

        transaction.commit().await?;

        Ok(query_result.rows_affected() > 0)
    }

    pub async fn set_member_status(
        &self,
        guild: GuildId,
        member: UserId,
        status: MemberStatus,
    ) -> Result<(), anyhow::Error> {
        let mut transaction = self.pool.begin().await?;

        query(
            r#"
                INSERT INTO member_statuses (guild, member, status)
                VALUES ($1, $2, $3)
                ON CONFLICT (guild, member) DO UPDATE SET status = excluded.status
            "#,
        )
        .bind(guild.to_db())
        .bind(member.to_db())
        .bind(status.to_db())
        .execute(&mut *transaction)
        .await?;

        transaction.commit().await?;

        Ok(())
    }

    pub async fn get_member_status(
        &self,
        guild: GuildId,
        member: UserId,
    ) -> Result<Option<MemberStatus>, anyhow::Error> {
        let status: Option<(String,)> =
            query_as(r#"SELECT status FROM member_statuses WHERE guild = $1 AND member = $2"#)
                .bind(guild.to_db())
                .bind(member.to_db())
                .fetch_optional(&self.pool)
                .await?;

        match status {
            Some((status,)) => Ok(Some(MemberStatus::from_db(&status)?)),
            None => Ok(None),
        }
    }
}

#[derive(Debug, FromRow)]
struct SqlVerificationRequest {
    id: i64,
    guild: i64,
    author: i64,
    created_at: i64,
    answers: String,
    requested_role: Option<i64>,
    state: String,
}

#[derive(Debug, FromRow)]
struct SqlVote {
    request_id: i64,
    voter: i64,
    stance: String,
}

impl SqlVerificationRequest {
    fn into_model(self, votes: Vec<SqlVote>) -> Result<VerificationRequest, DBFromConversionError> {
        let votes = votes
            .iter()
            .map(|vote| Ok((UserId::from_db(&vote.voter)?, Stance::from_db(&vote.stance)?)))
            .collect::<Result<Vec<_>, DBFromConversionError>>()?;

        Ok(VerificationRequest {
            id: VerificationId::from_db(&self.id)?,
            guild: GuildId::from_db(&self.guild)?,
            author: UserId::from_db(&self.author)?,
            created_at: UtcDateTime::from_db(&self.created_at)?,
            answers: self.answers,
            requested_role: self.requested_role.as_ref().map(RoleId::from_db).transpose()?,
            state: VerificationState::from_db(&self.state)?,
            votes: VoterSets::from_votes(votes),
        })
    }
}

#[cfg(test)]
mod tests {
    use poise::serenity_prelude::{GuildId, RoleId, UserId};
    use test_log::test;

    use super::VerificationRepository;
    use crate::{
        models::{types::UtcDateTime, MemberStatus, NewVerificationRequest, VerificationState},
        repository::test_pool,
        tally::Stance,
    };

    fn new_request(guild: u64, author: u64, millis: i64) -> NewVerificationRequest {
        NewVerificationRequest {
            guild: GuildId::new(guild),
            author: UserId::new(author),
            created_at: UtcDateTime::from_unix_millis(millis).unwrap(),
            answers: "I found the server through a friend".to_string(),
            requested_role: Some(RoleId::new(77)),
        }
    }

    #[test(tokio::test)]
    async fn created_request_is_pending_and_found_by_partial_id() {
        let repository = VerificationRepository::new(test_pool().await);

        let created = repository.create(&new_request(1, 2, 1_000)).await.unwrap();
        assert_eq!(created.state, VerificationState::Pending);
        assert_eq!(created.requested_role, Some(RoleId::new(77)));

        let found = repository.get(&created.partial_id()).await.unwrap();
        assert_eq!(found, Some(created));
    }

    #[test(tokio::test)]
    async fn votes_and_state_are_saved_together() {
        let repository = VerificationRepository::new(test_pool().await);

        let mut request = repository.create(&new_request(1, 2, 1_000)).await.unwrap();
        request.votes.cast(UserId::new(10), Stance::For);
        request.votes.cast(UserId::new(11), Stance::Against);
        repository.save_votes(&request).await.unwrap();

        let pending = repository.get_all_pending(GuildId::new(1)).await.unwrap();
        assert_eq!(pending, vec![request.clone()]);

        request.votes.cast(UserId::new(11), Stance::For);
        request.state = VerificationState::Accepted;
        repository.save_votes(&request).await.unwrap();

        assert!(repository.get_all_pending(GuildId::new(1)).await.unwrap().is_empty());

        let stored = repository.get(&request.partial_id()).await.unwrap().unwrap();
        assert_eq!(stored.state, VerificationState::Accepted);
        assert_eq!(stored.votes.count(Stance::For), 2);
        assert_eq!(stored.votes.count(Stance::Against), 0);
    }

    #[test(tokio::test)]
    async fn pending_requests_are_scoped_to_guild() {
        let repository = VerificationRepository::new(test_pool().await);

        repository.create(&new_request(1, 2, 1_000)).await.unwrap();
        repository.create(&new_request(1, 3, 2_000)).await.unwrap();
        repository.create(&new_request(9, 2, 1_000)).await.unwrap();

        assert_eq!(repository.get_all_pending(GuildId::new(1)).await.unwrap().len(), 2);
        assert_eq!(repository.get_all_pending(GuildId::new(9)).await.unwrap().len(), 1);
    }

    #[test(tokio::test)]
    async fn delete_removes_request_and_votes() {
        let repository = VerificationRepository::new(test_pool().await);

        let mut request = repository.create(&new_request(1, 2, 1_000)).await.unwrap();
        request.votes.cast(UserId::new(10), Stance::For);
        repository.save_votes(&request).await.unwrap();

        assert!(repository.delete(request.id).await.unwrap());
        assert!(!repository.delete(request.id).await.unwrap());
        assert_eq!(repository.get(&request.partial_id()).await.unwrap(), None);
    }

    #[test(tokio::test)]
    async fn member_status_is_overwritten() {
        let repository = VerificationRepository::new(test_pool().await);
        let (guild, member) = (GuildId::new(1), UserId::new(2));

        assert_eq!(repository.get_member_status(guild, member).await.unwrap(), None);

        repository
            .set_member_status(guild, member, MemberStatus::Rejected)
            .await
            .unwrap();
        repository
            .set_member_status(guild, member, MemberStatus::Authorized)
            .await
            .unwrap();

        assert_eq!(
            repository.get_member_status(guild, member).await.unwrap(),
            Some(MemberStatus::Authorized)
        );
    }
}
