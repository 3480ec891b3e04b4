//! `user_profiles` rows.

use habitquest_core::models::UserProfile;
use habitquest_core::types::{RecordId, Timestamp};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct ProfileRow {
    pub id: RecordId,
    pub name: String,
    pub xp: i64,
    pub level: i32,
    pub coins: i64,
    pub weekly_coins: i64,
    pub xp_earned_today: i64,
    pub last_xp_award_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl From<ProfileRow> for UserProfile {
    fn from(row: ProfileRow) -> Self {
        UserProfile {
            id: row.id,
            name: row.name,
            xp: row.xp,
            level: row.level,
            coins: row.coins,
            weekly_coins: row.weekly_coins,
            xp_earned_today: row.xp_earned_today,
            last_xp_award_at: row.last_xp_award_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
