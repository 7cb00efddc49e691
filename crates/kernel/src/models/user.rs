//! User model and CRUD operations.

use anyhow::{Context, Result};
use argon2::password_hash::SaltString;
use argon2::password_hash::rand_core::OsRng;
use argon2::{Argon2, PasswordHasher};
use chrono::{DateTime, Utc};
use sea_query::{Alias, Expr, LikeExpr, Order, PostgresQueryBuilder, Query};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Anonymous user UUID (nil UUID).
pub const ANONYMOUS_USER_ID: Uuid = Uuid::nil();

/// Values of the `activated` column.
pub mod activation {
    pub const INACTIVE: i16 = 0;
    pub const ACTIVE: i16 = 1;
    /// Marked for deletion; the account can no longer log in.
    pub const PENDING_DELETE: i16 = 16384;
    /// Registration awaiting approval or verification.
    pub const PENDING_REG: i16 = i16::MIN;
}

/// User record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing)]
    pub pass: String,
    pub mail: String,
    pub is_admin: bool,
    pub activated: i16,
    pub registered: DateTime<Utc>,
    /// Per-user theme override; empty means the site default.
    pub theme: String,
}

/// Input for inserting a user. `pass` is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub mail: String,
    pub pass: String,
    pub activated: i16,
}

/// Which column a multi-value lookup matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserLookupKey {
    Name,
    Mail,
}

impl UserLookupKey {
    fn column(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Mail => "mail",
        }
    }
}

/// Filters for a user search. Every set filter must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserQuery {
    /// Substring of the user name.
    pub name_contains: Option<String>,
    /// Substring of the e-mail address.
    pub mail_contains: Option<String>,
    /// Restrict to these IDs.
    pub id_in: Option<Vec<Uuid>>,
    pub registered_after: Option<DateTime<Utc>>,
    pub registered_before: Option<DateTime<Utc>>,
    pub exclude_anonymous: bool,
    /// Skip accounts with this activation state.
    pub exclude_activated: Option<i16>,
}

impl UserQuery {
    /// Whether a user satisfies every filter (used by in-memory stores).
    pub fn matches(&self, user: &User) -> bool {
        if self.exclude_anonymous && user.id == ANONYMOUS_USER_ID {
            return false;
        }
        if self.exclude_activated == Some(user.activated) {
            return false;
        }
        if let Some(ref fragment) = self.name_contains
            && !user.name.contains(fragment.as_str())
        {
            return false;
        }
        if let Some(ref fragment) = self.mail_contains
            && !user.mail.contains(fragment.as_str())
        {
            return false;
        }
        if let Some(ref ids) = self.id_in
            && !ids.contains(&user.id)
        {
            return false;
        }
        if self.registered_after.is_some_and(|after| user.registered <= after) {
            return false;
        }
        if self
            .registered_before
            .is_some_and(|before| user.registered >= before)
        {
            return false;
        }
        true
    }

    /// Build the SELECT statement for this query.
    pub fn to_sql(&self) -> String {
        let mut query = Query::select();
        query
            .columns([
                Alias::new("id"),
                Alias::new("name"),
                Alias::new("pass"),
                Alias::new("mail"),
                Alias::new("is_admin"),
                Alias::new("activated"),
                Alias::new("registered"),
                Alias::new("theme"),
            ])
            .from(Alias::new("users"));

        if self.exclude_anonymous {
            query.and_where(Expr::col(Alias::new("id")).ne(ANONYMOUS_USER_ID));
        }
        if let Some(ref fragment) = self.name_contains {
            query.and_where(Expr::col(Alias::new("name")).like(contains_pattern(fragment)));
        }
        if let Some(ref fragment) = self.mail_contains {
            query.and_where(Expr::col(Alias::new("mail")).like(contains_pattern(fragment)));
        }
        if let Some(ref ids) = self.id_in {
            query.and_where(Expr::col(Alias::new("id")).is_in(ids.iter().copied()));
        }
        if let Some(after) = self.registered_after {
            query.and_where(Expr::col(Alias::new("registered")).gt(after));
        }
        if let Some(before) = self.registered_before {
            query.and_where(Expr::col(Alias::new("registered")).lt(before));
        }
        if let Some(activated) = self.exclude_activated {
            query.and_where(Expr::col(Alias::new("activated")).ne(activated));
        }

        query.order_by(Alias::new("name"), Order::Asc);
        query.to_string(PostgresQueryBuilder)
    }
}

impl User {
    /// Find a user by ID.
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .context("failed to fetch user by id")?;

        Ok(user)
    }

    /// Find a user by username.
    pub async fn find_by_name(pool: &PgPool, name: &str) -> Result<Option<Self>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE name = $1")
            .bind(name)
            .fetch_optional(pool)
            .await
            .context("failed to fetch user by name")?;

        Ok(user)
    }

    /// Find every user whose `key` column equals one of `values`.
    pub async fn find_any(pool: &PgPool, key: UserLookupKey, values: &[String]) -> Result<Vec<Self>> {
        let sql = format!(
            "SELECT * FROM users WHERE {} = ANY($1) ORDER BY name",
            key.column()
        );
        let users = sqlx::query_as::<_, User>(&sql)
            .bind(values)
            .fetch_all(pool)
            .await
            .context("failed to look up users")?;

        Ok(users)
    }

    /// Run a filtered search.
    pub async fn search(pool: &PgPool, query: &UserQuery) -> Result<Vec<Self>> {
        let users = sqlx::query_as::<_, User>(&query.to_sql())
            .fetch_all(pool)
            .await
            .context("failed to search users")?;

        Ok(users)
    }

    /// Insert several users in one transaction.
    pub async fn create_many(pool: &PgPool, users: &[NewUser]) -> Result<()> {
        let mut tx = pool.begin().await.context("failed to begin transaction")?;

        for user in users {
            sqlx::query(
                "INSERT INTO users (id, name, pass, mail, activated) VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(Uuid::now_v7())
            .bind(&user.name)
            .bind(&user.pass)
            .bind(&user.mail)
            .bind(user.activated)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("failed to create user '{}'", user.name))?;
        }

        tx.commit().await.context("failed to commit user import")?;
        Ok(())
    }

    /// Change the activation state.
    pub async fn set_activated(pool: &PgPool, id: Uuid, activated: i16) -> Result<bool> {
        let result = sqlx::query("UPDATE users SET activated = $1 WHERE id = $2")
            .bind(activated)
            .bind(id)
            .execute(pool)
            .await
            .context("failed to update activation state")?;

        Ok(result.rows_affected() > 0)
    }

    /// Clear theme overrides: all of them, or only those naming `theme`.
    pub async fn reset_theme(pool: &PgPool, theme: Option<&str>) -> Result<u64> {
        let result = match theme {
            Some(theme) => {
                sqlx::query("UPDATE users SET theme = '' WHERE theme = $1")
                    .bind(theme)
                    .execute(pool)
                    .await
            }
            None => sqlx::query("UPDATE users SET theme = ''").execute(pool).await,
        }
        .context("failed to reset user theme selections")?;

        Ok(result.rows_affected())
    }

    /// Count registrations awaiting approval.
    pub async fn count_pending_registrations(pool: &PgPool) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE activated = $1")
            .bind(activation::PENDING_REG)
            .fetch_one(pool)
            .await
            .context("failed to count pending registrations")?;

        Ok(count)
    }

    /// Delete pending e-mail/password change verifications.
    pub async fn delete_verifications(pool: &PgPool, id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM user_verifications WHERE user_id = $1")
            .bind(id)
            .execute(pool)
            .await
            .context("failed to delete verification records")?;

        Ok(result.rows_affected())
    }

    /// Delete every session of a user.
    pub async fn delete_sessions(pool: &PgPool, id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM user_sessions WHERE user_id = $1")
            .bind(id)
            .execute(pool)
            .await
            .context("failed to delete user sessions")?;

        Ok(result.rows_affected())
    }

    /// Delete a user.
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool> {
        // Prevent deletion of anonymous user
        if id == ANONYMOUS_USER_ID {
            anyhow::bail!("cannot delete anonymous user");
        }

        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await
            .context("failed to delete user")?;

        Ok(result.rows_affected() > 0)
    }
}

/// LIKE pattern matching `fragment` literally anywhere in the column.
fn contains_pattern(fragment: &str) -> LikeExpr {
    LikeExpr::new(format!("%{}%", escape_like(fragment))).escape('\\')
}

fn escape_like(fragment: &str) -> String {
    let mut escaped = String::with_capacity(fragment.len());
    for c in fragment.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Hash a password using Argon2id.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("failed to hash password: {e}"))?;

    Ok(hash.to_string())
}
