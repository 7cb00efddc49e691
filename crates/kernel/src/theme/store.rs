//! Theme registry persistence.
//!
//! Provides the `ThemeStore` trait with a PostgreSQL backend and an
//! in-memory backend.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{ThemeDescriptor, ThemeRecord};

/// Theme registry backend.
#[async_trait]
pub trait ThemeStore: Send + Sync {
    /// All registered themes, ordered by name.
    async fn list(&self) -> Result<Vec<ThemeRecord>>;

    async fn find_by_name(&self, name: &str) -> Result<Option<ThemeRecord>>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ThemeRecord>>;

    /// Register a theme under a fresh ID.
    async fn insert(&self, theme: &ThemeDescriptor) -> Result<ThemeRecord>;

    /// Overwrite the record with the same ID. Returns false if none exists.
    async fn update(&self, record: &ThemeRecord) -> Result<bool>;

    /// Remove a record. Returns false if none exists.
    async fn delete(&self, id: Uuid) -> Result<bool>;
}

/// Registry stored in the `themes` table.
#[derive(Clone)]
pub struct PgThemeStore {
    pool: PgPool,
}

impl PgThemeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ThemeStore for PgThemeStore {
    async fn list(&self) -> Result<Vec<ThemeRecord>> {
        ThemeRecord::list(&self.pool).await
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<ThemeRecord>> {
        ThemeRecord::find_by_name(&self.pool, name).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ThemeRecord>> {
        ThemeRecord::find_by_id(&self.pool, id).await
    }

    async fn insert(&self, theme: &ThemeDescriptor) -> Result<ThemeRecord> {
        ThemeRecord::create(&self.pool, theme).await
    }

    async fn update(&self, record: &ThemeRecord) -> Result<bool> {
        ThemeRecord::update(&self.pool, record).await
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        ThemeRecord::delete(&self.pool, id).await
    }
}

/// Registry held in memory.
///
/// Counts every successful write so callers can assert that an operation
/// left the registry untouched. Writes touching a name registered with
/// [`MemoryThemeStore::fail_on`] return an error.
#[derive(Default)]
pub struct MemoryThemeStore {
    records: RwLock<BTreeMap<Uuid, ThemeRecord>>,
    failing: RwLock<HashSet<String>>,
    writes: AtomicUsize,
}

impl MemoryThemeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with existing records.
    pub fn with_records(records: impl IntoIterator<Item = ThemeRecord>) -> Self {
        let store = Self::new();
        {
            let mut map = store.records.write();
            for record in records {
                map.insert(record.id, record);
            }
        }
        store
    }

    /// Make every write for `name` fail.
    pub fn fail_on(&self, name: impl Into<String>) {
        self.failing.write().insert(name.into());
    }

    /// Number of successful inserts, updates and deletes.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Snapshot of every record, ordered by name.
    pub fn snapshot(&self) -> Vec<ThemeRecord> {
        let mut records: Vec<_> = self.records.read().values().cloned().collect();
        records.sort_by(|a, b| a.theme.name.cmp(&b.theme.name));
        records
    }

    fn check_failing(&self, name: &str) -> Result<()> {
        if self.failing.read().contains(name) {
            anyhow::bail!("write to theme '{name}' rejected");
        }
        Ok(())
    }
}

#[async_trait]
impl ThemeStore for MemoryThemeStore {
    async fn list(&self) -> Result<Vec<ThemeRecord>> {
        Ok(self.snapshot())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<ThemeRecord>> {
        Ok(self
            .records
            .read()
            .values()
            .find(|r| r.theme.name == name)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ThemeRecord>> {
        Ok(self.records.read().get(&id).cloned())
    }

    async fn insert(&self, theme: &ThemeDescriptor) -> Result<ThemeRecord> {
        self.check_failing(&theme.name)?;

        let mut records = self.records.write();
        if records.values().any(|r| r.theme.name == theme.name) {
            anyhow::bail!("duplicate theme name '{}'", theme.name);
        }

        let record = ThemeRecord {
            id: Uuid::now_v7(),
            theme: theme.clone(),
        };
        records.insert(record.id, record.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(record)
    }

    async fn update(&self, record: &ThemeRecord) -> Result<bool> {
        self.check_failing(&record.theme.name)?;

        let mut records = self.records.write();
        let Some(existing) = records.get_mut(&record.id) else {
            return Ok(false);
        };
        *existing = record.clone();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let name = self.records.read().get(&id).map(|r| r.theme.name.clone());
        let Some(name) = name else {
            return Ok(false);
        };
        self.check_failing(&name)?;

        self.records.write().remove(&id);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::theme::version_file::default_descriptor;

    #[tokio::test]
    async fn insert_assigns_id_and_rejects_duplicates() {
        let store = MemoryThemeStore::new();
        let record = store.insert(&default_descriptor("Sea_Breeze")).await.unwrap();
        assert_eq!(record.theme.name, "Sea Breeze");

        let found = store.find_by_name("Sea Breeze").await.unwrap().unwrap();
        assert_eq!(found.id, record.id);

        assert!(store.insert(&default_descriptor("Sea_Breeze")).await.is_err());
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn update_and_delete_report_missing_rows() {
        let store = MemoryThemeStore::new();
        let ghost = ThemeRecord {
            id: Uuid::now_v7(),
            theme: default_descriptor("ghost"),
        };
        assert!(!store.update(&ghost).await.unwrap());
        assert!(!store.delete(ghost.id).await.unwrap());
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn failure_injection() {
        let store = MemoryThemeStore::new();
        let record = store.insert(&default_descriptor("Brittle")).await.unwrap();
        store.fail_on("Brittle");

        assert!(store.update(&record).await.is_err());
        assert!(store.delete(record.id).await.is_err());
        assert!(store.find_by_id(record.id).await.unwrap().is_some());
    }
}
