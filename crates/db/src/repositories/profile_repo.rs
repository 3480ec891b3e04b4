//! Repository for the `user_profiles` table.

use habitquest_core::models::UserProfile;
use habitquest_core::types::RecordId;
use sqlx::PgExecutor;

use crate::models::profile::ProfileRow;

/// Column list for `user_profiles` queries.
const COLUMNS: &str = "id, name, xp, level, coins, weekly_coins, xp_earned_today, \
                       last_xp_award_at, created_at, updated_at";

pub struct ProfileRepo;

impl ProfileRepo {
    /// Insert a profile unless its id already exists. Returns `true` if inserted.
    pub async fn insert_if_missing<'e, E: PgExecutor<'e>>(
        executor: E,
        profile: &UserProfile,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO user_profiles \
                (id, name, xp, level, coins, weekly_coins, xp_earned_today, \
                 last_xp_award_at, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(profile.id)
        .bind(&profile.name)
        .bind(profile.xp)
        .bind(profile.level)
        .bind(profile.coins)
        .bind(profile.weekly_coins)
        .bind(profile.xp_earned_today)
        .bind(profile.last_xp_award_at)
        .bind(profile.created_at)
        .bind(profile.updated_at)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn find_by_id<'e, E: PgExecutor<'e>>(
        executor: E,
        id: RecordId,
    ) -> Result<Option<ProfileRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM user_profiles WHERE id = $1");
        sqlx::query_as::<_, ProfileRow>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Like [`find_by_id`](Self::find_by_id) but row-locks the profile until
    /// the surrounding transaction ends.
    pub async fn find_by_id_for_update<'e, E: PgExecutor<'e>>(
        executor: E,
        id: RecordId,
    ) -> Result<Option<ProfileRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM user_profiles WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, ProfileRow>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Top profiles by weekly coins.
    pub async fn list_by_weekly_coins<'e, E: PgExecutor<'e>>(
        executor: E,
        limit: i64,
    ) -> Result<Vec<ProfileRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM user_profiles ORDER BY weekly_coins DESC, name ASC LIMIT $1"
        );
        sqlx::query_as::<_, ProfileRow>(&query)
            .bind(limit)
            .fetch_all(executor)
            .await
    }

    /// Overwrite the reward totals of a profile. Returns `true` if the row existed.
    pub async fn update_rewards<'e, E: PgExecutor<'e>>(
        executor: E,
        profile: &UserProfile,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE user_profiles SET \
                xp = $2, level = $3, coins = $4, weekly_coins = $5, \
                xp_earned_today = $6, last_xp_award_at = $7, updated_at = $8 \
             WHERE id = $1",
        )
        .bind(profile.id)
        .bind(profile.xp)
        .bind(profile.level)
        .bind(profile.coins)
        .bind(profile.weekly_coins)
        .bind(profile.xp_earned_today)
        .bind(profile.last_xp_award_at)
        .bind(profile.updated_at)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
