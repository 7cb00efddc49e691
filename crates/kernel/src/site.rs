//! Site-wide configuration variables.

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use sqlx::PgPool;

/// Variable holding the name of the site-wide default theme.
pub const DEFAULT_THEME: &str = "Default_Theme";

/// Site variable backend.
#[async_trait]
pub trait SiteVariables: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>>;

    async fn set(&self, key: &str, value: serde_json::Value) -> Result<()>;

    /// A variable holding a string.
    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .get(key)
            .await?
            .and_then(|v| v.as_str().map(str::to_string)))
    }
}

/// Variables stored in the `site_config` table.
#[derive(Clone)]
pub struct PgSiteVariables {
    pool: PgPool,
}

impl PgSiteVariables {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SiteVariables for PgSiteVariables {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        sqlx::query_scalar::<_, serde_json::Value>("SELECT value FROM site_config WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to read site variable '{key}'"))
    }

    /// Upserts the variable and stamps its update time.
    async fn set(&self, key: &str, value: serde_json::Value) -> Result<()> {
        sqlx::query(
            "INSERT INTO site_config (key, value, updated) VALUES ($1, $2, NOW()) \
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated = EXCLUDED.updated",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to write site variable '{key}'"))?;
        Ok(())
    }
}

/// Variables held in memory.
#[derive(Default)]
pub struct MemorySiteVariables {
    values: RwLock<HashMap<String, serde_json::Value>>,
}

impl MemorySiteVariables {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SiteVariables for MemorySiteVariables {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.values.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> Result<()> {
        self.values.write().insert(key.to_string(), value);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn string_lookup_ignores_other_types() {
        let vars = MemorySiteVariables::new();
        vars.set(DEFAULT_THEME, serde_json::json!("SeaBreeze"))
            .await
            .unwrap();
        vars.set("count", serde_json::json!(3)).await.unwrap();

        assert_eq!(
            vars.get_string(DEFAULT_THEME).await.unwrap().as_deref(),
            Some("SeaBreeze")
        );
        assert_eq!(vars.get_string("count").await.unwrap(), None);
        assert_eq!(vars.get_string("missing").await.unwrap(), None);
    }
}
