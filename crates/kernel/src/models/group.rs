//! Group membership rows.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

/// Membership operations on the `group_memberships` table.
pub struct GroupMembership;

impl GroupMembership {
    /// IDs of every member of a group.
    pub async fn members(pool: &PgPool, group_id: Uuid) -> Result<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT user_id FROM group_memberships WHERE group_id = $1",
        )
        .bind(group_id)
        .fetch_all(pool)
        .await
        .context("failed to list group members")?;

        Ok(ids)
    }

    /// Add a user to a group. Returns false if already a member.
    pub async fn add(pool: &PgPool, group_id: Uuid, user_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO group_memberships (group_id, user_id) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(group_id)
        .bind(user_id)
        .execute(pool)
        .await
        .context("failed to add group member")?;

        Ok(result.rows_affected() > 0)
    }

    /// Remove a user from every group.
    pub async fn delete_for_user(pool: &PgPool, user_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM group_memberships WHERE user_id = $1")
            .bind(user_id)
            .execute(pool)
            .await
            .context("failed to delete group memberships")?;

        Ok(result.rows_affected())
    }
}
