//! User, group, and profile persistence collaborators.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::user::activation;
use crate::models::{GroupMembership, NewUser, User, UserLookupKey, UserQuery};

/// User account backend.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find(&self, id: Uuid) -> Result<Option<User>>;

    async fn find_by_name(&self, name: &str) -> Result<Option<User>>;

    /// Users matching every filter of `query`, ordered by name.
    async fn search(&self, query: &UserQuery) -> Result<Vec<User>>;

    /// Users whose `key` column equals any of `values`.
    async fn find_any(&self, key: UserLookupKey, values: &[String]) -> Result<Vec<User>>;

    /// Insert all users or none.
    async fn insert_many(&self, users: &[NewUser]) -> Result<()>;

    async fn set_activated(&self, id: Uuid, activated: i16) -> Result<bool>;

    async fn delete(&self, id: Uuid) -> Result<bool>;

    async fn delete_sessions(&self, id: Uuid) -> Result<u64>;

    async fn delete_verifications(&self, id: Uuid) -> Result<u64>;

    /// Clear theme overrides: every one, or only those naming `theme`.
    async fn reset_theme(&self, theme: Option<&str>) -> Result<u64>;

    async fn count_pending_registrations(&self) -> Result<i64>;
}

/// Group membership backend.
#[async_trait]
pub trait GroupDirectory: Send + Sync {
    async fn members(&self, group_id: Uuid) -> Result<Vec<Uuid>>;

    async fn add_user(&self, group_id: Uuid, user_id: Uuid) -> Result<bool>;

    async fn delete_memberships(&self, user_id: Uuid) -> Result<u64>;
}

/// Search over user profile fields.
#[async_trait]
pub trait ProfileSearch: Send + Sync {
    /// IDs of users whose profile matches every given field.
    async fn search(&self, fields: &BTreeMap<String, String>) -> Result<Vec<Uuid>>;
}

/// Users and groups stored in PostgreSQL.
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find(&self, id: Uuid) -> Result<Option<User>> {
        User::find_by_id(&self.pool, id).await
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<User>> {
        User::find_by_name(&self.pool, name).await
    }

    async fn search(&self, query: &UserQuery) -> Result<Vec<User>> {
        User::search(&self.pool, query).await
    }

    async fn find_any(&self, key: UserLookupKey, values: &[String]) -> Result<Vec<User>> {
        User::find_any(&self.pool, key, values).await
    }

    async fn insert_many(&self, users: &[NewUser]) -> Result<()> {
        User::create_many(&self.pool, users).await
    }

    async fn set_activated(&self, id: Uuid, activated: i16) -> Result<bool> {
        User::set_activated(&self.pool, id, activated).await
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        User::delete(&self.pool, id).await
    }

    async fn delete_sessions(&self, id: Uuid) -> Result<u64> {
        User::delete_sessions(&self.pool, id).await
    }

    async fn delete_verifications(&self, id: Uuid) -> Result<u64> {
        User::delete_verifications(&self.pool, id).await
    }

    async fn reset_theme(&self, theme: Option<&str>) -> Result<u64> {
        User::reset_theme(&self.pool, theme).await
    }

    async fn count_pending_registrations(&self) -> Result<i64> {
        User::count_pending_registrations(&self.pool).await
    }
}

#[async_trait]
impl GroupDirectory for PgUserStore {
    async fn members(&self, group_id: Uuid) -> Result<Vec<Uuid>> {
        GroupMembership::members(&self.pool, group_id).await
    }

    async fn add_user(&self, group_id: Uuid, user_id: Uuid) -> Result<bool> {
        GroupMembership::add(&self.pool, group_id, user_id).await
    }

    async fn delete_memberships(&self, user_id: Uuid) -> Result<u64> {
        GroupMembership::delete_for_user(&self.pool, user_id).await
    }
}

/// Users, groups, sessions and verifications held in memory.
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<BTreeMap<Uuid, User>>,
    memberships: RwLock<BTreeSet<(Uuid, Uuid)>>,
    sessions: RwLock<HashMap<Uuid, u64>>,
    verifications: RwLock<HashMap<Uuid, u64>>,
    fail_group_writes: AtomicBool,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with existing users.
    pub fn with_users(users: impl IntoIterator<Item = User>) -> Self {
        let store = Self::new();
        {
            let mut map = store.users.write();
            for user in users {
                map.insert(user.id, user);
            }
        }
        store
    }

    /// Record an open session for `user_id`.
    pub fn add_session(&self, user_id: Uuid) {
        *self.sessions.write().entry(user_id).or_default() += 1;
    }

    /// Record a pending verification for `user_id`.
    pub fn add_verification(&self, user_id: Uuid) {
        *self.verifications.write().entry(user_id).or_default() += 1;
    }

    pub fn session_count(&self, user_id: Uuid) -> u64 {
        self.sessions.read().get(&user_id).copied().unwrap_or(0)
    }

    pub fn verification_count(&self, user_id: Uuid) -> u64 {
        self.verifications.read().get(&user_id).copied().unwrap_or(0)
    }

    /// Groups `user_id` belongs to.
    pub fn groups_of(&self, user_id: Uuid) -> Vec<Uuid> {
        self.memberships
            .read()
            .iter()
            .filter(|(_, u)| *u == user_id)
            .map(|(g, _)| *g)
            .collect()
    }

    /// Make group membership writes fail.
    pub fn fail_group_writes(&self, fail: bool) {
        self.fail_group_writes.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of every user, ordered by name.
    pub fn snapshot(&self) -> Vec<User> {
        let mut users: Vec<_> = self.users.read().values().cloned().collect();
        users.sort_by(|a, b| a.name.cmp(&b.name));
        users
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.users.read().get(&id).cloned())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<User>> {
        Ok(self.users.read().values().find(|u| u.name == name).cloned())
    }

    async fn search(&self, query: &UserQuery) -> Result<Vec<User>> {
        Ok(self
            .snapshot()
            .into_iter()
            .filter(|u| query.matches(u))
            .collect())
    }

    async fn find_any(&self, key: UserLookupKey, values: &[String]) -> Result<Vec<User>> {
        Ok(self
            .snapshot()
            .into_iter()
            .filter(|u| {
                let column = match key {
                    UserLookupKey::Name => &u.name,
                    UserLookupKey::Mail => &u.mail,
                };
                values.contains(column)
            })
            .collect())
    }

    async fn insert_many(&self, users: &[NewUser]) -> Result<()> {
        let mut map = self.users.write();
        for new in users {
            if map.values().any(|u| u.name == new.name) {
                anyhow::bail!("failed to create user '{}': name taken", new.name);
            }
        }
        for new in users {
            let user = User {
                id: Uuid::now_v7(),
                name: new.name.clone(),
                pass: new.pass.clone(),
                mail: new.mail.clone(),
                is_admin: false,
                activated: new.activated,
                registered: chrono::Utc::now(),
                theme: String::new(),
            };
            map.insert(user.id, user);
        }
        Ok(())
    }

    async fn set_activated(&self, id: Uuid, activated: i16) -> Result<bool> {
        Ok(match self.users.write().get_mut(&id) {
            Some(user) => {
                user.activated = activated;
                true
            }
            None => false,
        })
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        if id == crate::models::user::ANONYMOUS_USER_ID {
            anyhow::bail!("cannot delete anonymous user");
        }
        Ok(self.users.write().remove(&id).is_some())
    }

    async fn delete_sessions(&self, id: Uuid) -> Result<u64> {
        Ok(self.sessions.write().remove(&id).unwrap_or(0))
    }

    async fn delete_verifications(&self, id: Uuid) -> Result<u64> {
        Ok(self.verifications.write().remove(&id).unwrap_or(0))
    }

    async fn reset_theme(&self, theme: Option<&str>) -> Result<u64> {
        let mut reset = 0;
        for user in self.users.write().values_mut() {
            let hit = match theme {
                Some(theme) => user.theme == theme,
                None => true,
            };
            if hit {
                user.theme.clear();
                reset += 1;
            }
        }
        Ok(reset)
    }

    async fn count_pending_registrations(&self) -> Result<i64> {
        let count = self
            .users
            .read()
            .values()
            .filter(|u| u.activated == activation::PENDING_REG)
            .count();
        Ok(i64::try_from(count)?)
    }
}

#[async_trait]
impl GroupDirectory for MemoryUserStore {
    async fn members(&self, group_id: Uuid) -> Result<Vec<Uuid>> {
        Ok(self
            .memberships
            .read()
            .iter()
            .filter(|(g, _)| *g == group_id)
            .map(|(_, u)| *u)
            .collect())
    }

    async fn add_user(&self, group_id: Uuid, user_id: Uuid) -> Result<bool> {
        if self.fail_group_writes.load(Ordering::SeqCst) {
            anyhow::bail!("failed to add user to group {group_id}");
        }
        Ok(self.memberships.write().insert((group_id, user_id)))
    }

    async fn delete_memberships(&self, user_id: Uuid) -> Result<u64> {
        let mut memberships = self.memberships.write();
        let before = memberships.len();
        memberships.retain(|(_, u)| *u != user_id);
        Ok((before - memberships.len()) as u64)
    }
}

/// Profile fields held in memory.
#[derive(Default)]
pub struct MemoryProfileSearch {
    profiles: RwLock<HashMap<Uuid, BTreeMap<String, String>>>,
}

impl MemoryProfileSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_field(&self, user_id: Uuid, field: &str, value: &str) {
        self.profiles
            .write()
            .entry(user_id)
            .or_default()
            .insert(field.to_string(), value.to_string());
    }
}

#[async_trait]
impl ProfileSearch for MemoryProfileSearch {
    async fn search(&self, fields: &BTreeMap<String, String>) -> Result<Vec<Uuid>> {
        let mut ids: Vec<Uuid> = self
            .profiles
            .read()
            .iter()
            .filter(|(_, profile)| {
                fields.iter().all(|(field, wanted)| {
                    profile
                        .get(field)
                        .is_some_and(|value| value.contains(wanted.as_str()))
                })
            })
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn new_user(name: &str) -> NewUser {
        NewUser {
            name: name.to_string(),
            mail: format!("{name}@example.com"),
            pass: "hash".to_string(),
            activated: activation::ACTIVE,
        }
    }

    #[tokio::test]
    async fn insert_many_is_all_or_nothing() {
        let store = MemoryUserStore::new();
        store.insert_many(&[new_user("alice")]).await.unwrap();

        let result = store
            .insert_many(&[new_user("bob"), new_user("alice")])
            .await;
        assert!(result.is_err());
        assert!(store.find_by_name("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reset_theme_targets_one_theme() {
        let store = MemoryUserStore::new();
        store
            .insert_many(&[new_user("alice"), new_user("bob")])
            .await
            .unwrap();
        {
            let mut users = store.users.write();
            for user in users.values_mut() {
                user.theme = if user.name == "alice" { "Sea" } else { "Dune" }.to_string();
            }
        }

        assert_eq!(store.reset_theme(Some("Sea")).await.unwrap(), 1);
        let alice = store.find_by_name("alice").await.unwrap().unwrap();
        let bob = store.find_by_name("bob").await.unwrap().unwrap();
        assert_eq!(alice.theme, "");
        assert_eq!(bob.theme, "Dune");
    }

    #[tokio::test]
    async fn memberships() {
        let store = MemoryUserStore::new();
        let group = Uuid::now_v7();
        let user = Uuid::now_v7();

        assert!(store.add_user(group, user).await.unwrap());
        assert!(!store.add_user(group, user).await.unwrap());
        assert_eq!(store.members(group).await.unwrap(), vec![user]);
        assert_eq!(store.delete_memberships(user).await.unwrap(), 1);
        assert!(store.members(group).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn profile_search_requires_every_field() {
        let profiles = MemoryProfileSearch::new();
        let a = Uuid::now_v7();
        let b = Uuid::now_v7();
        profiles.set_field(a, "city", "Berlin");
        profiles.set_field(a, "lang", "de");
        profiles.set_field(b, "city", "Berlin");

        let mut fields = BTreeMap::new();
        fields.insert("city".to_string(), "Berl".to_string());
        fields.insert("lang".to_string(), "de".to_string());
        assert_eq!(profiles.search(&fields).await.unwrap(), vec![a]);
    }
}
