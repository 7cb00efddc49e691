//! Permission checking with schema rules and DashMap-based caching.
//!
//! A permission is addressed by a component string (`"Theme::"`), an
//! instance string (`"Andreas08::"`) and a required [`AccessLevel`]. Rules
//! are checked in order; the first rule whose subject, component pattern
//! and instance pattern all match decides the granted level.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::context::{ActingUser, AdminContext};
use crate::error::{AdminError, AdminResult};

/// Access levels, ordered from least to most privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(i16)]
pub enum AccessLevel {
    None = 0,
    Overview = 100,
    Read = 200,
    Comment = 300,
    Moderate = 400,
    Edit = 500,
    Add = 600,
    Delete = 700,
    Admin = 800,
}

impl AccessLevel {
    /// Map a stored level to the closest level not above it.
    pub fn from_i16(value: i16) -> Self {
        match value {
            v if v >= 800 => Self::Admin,
            v if v >= 700 => Self::Delete,
            v if v >= 600 => Self::Add,
            v if v >= 500 => Self::Edit,
            v if v >= 400 => Self::Moderate,
            v if v >= 300 => Self::Comment,
            v if v >= 200 => Self::Read,
            v if v >= 100 => Self::Overview,
            _ => Self::None,
        }
    }
}

/// Decides whether a user may act on a component instance.
#[async_trait]
pub trait PermissionChecker: Send + Sync {
    /// Highest level granted to `user` (None = anonymous) on the instance.
    async fn access_level(
        &self,
        user: Option<&ActingUser>,
        component: &str,
        instance: &str,
    ) -> Result<AccessLevel>;

    /// Check that the granted level is at least `required`.
    async fn has_access(
        &self,
        user: Option<&ActingUser>,
        component: &str,
        instance: &str,
        required: AccessLevel,
    ) -> Result<bool> {
        Ok(self.access_level(user, component, instance).await? >= required)
    }
}

/// Who a rule applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleSubject {
    Everyone,
    Anonymous,
    Authenticated,
    User(Uuid),
}

impl RuleSubject {
    /// Parse the stored form: `all`, `anonymous`, `authenticated`, or
    /// `user:<uuid>`.
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "all" => Ok(Self::Everyone),
            "anonymous" => Ok(Self::Anonymous),
            "authenticated" => Ok(Self::Authenticated),
            other => {
                let id = other
                    .strip_prefix("user:")
                    .with_context(|| format!("unknown rule subject '{other}'"))?;
                let id = Uuid::parse_str(id)
                    .with_context(|| format!("invalid user id in rule subject '{other}'"))?;
                Ok(Self::User(id))
            }
        }
    }

    fn applies_to(&self, user: Option<&ActingUser>) -> bool {
        match (self, user) {
            (Self::Everyone, _) => true,
            (Self::Anonymous, None) => true,
            (Self::Authenticated, Some(_)) => true,
            (Self::User(id), Some(u)) => *id == u.id,
            _ => false,
        }
    }
}

/// A single compiled permission rule.
#[derive(Debug, Clone)]
pub struct PermissionRule {
    subject: RuleSubject,
    component: Regex,
    instance: Regex,
    level: AccessLevel,
}

impl PermissionRule {
    /// Compile a rule. Patterns are anchored regular expressions.
    pub fn new(
        subject: RuleSubject,
        component: &str,
        instance: &str,
        level: AccessLevel,
    ) -> Result<Self> {
        Ok(Self {
            subject,
            component: anchored(component)?,
            instance: anchored(instance)?,
            level,
        })
    }

    fn matches(&self, user: Option<&ActingUser>, component: &str, instance: &str) -> bool {
        self.subject.applies_to(user)
            && self.component.is_match(component)
            && self.instance.is_match(instance)
    }
}

fn anchored(pattern: &str) -> Result<Regex> {
    Regex::new(&format!("^(?:{pattern})$"))
        .with_context(|| format!("invalid permission pattern '{pattern}'"))
}

/// A row from the `permission_rules` table.
#[derive(Debug, Clone, FromRow)]
struct PermissionRuleRow {
    subject: String,
    component: String,
    instance: String,
    level: i16,
}

/// Cache key: (user id or nil for anonymous, component, instance).
type DecisionKey = (Uuid, String, String);

/// Rule-based permission checker with cached decisions.
#[derive(Clone)]
pub struct SchemaPermissions {
    inner: Arc<SchemaPermissionsInner>,
}

struct SchemaPermissionsInner {
    rules: Vec<PermissionRule>,
    decisions: DashMap<DecisionKey, AccessLevel>,
}

impl SchemaPermissions {
    /// Create a checker from an ordered rule list.
    pub fn new(rules: Vec<PermissionRule>) -> Self {
        Self {
            inner: Arc::new(SchemaPermissionsInner {
                rules,
                decisions: DashMap::new(),
            }),
        }
    }

    /// Load rules from the `permission_rules` table, ordered by weight.
    pub async fn load(pool: &PgPool) -> Result<Self> {
        let rows = sqlx::query_as::<_, PermissionRuleRow>(
            "SELECT subject, component, instance, level FROM permission_rules ORDER BY weight",
        )
        .fetch_all(pool)
        .await
        .context("failed to load permission rules")?;

        let mut rules = Vec::with_capacity(rows.len());
        for row in rows {
            rules.push(PermissionRule::new(
                RuleSubject::parse(&row.subject)?,
                &row.component,
                &row.instance,
                AccessLevel::from_i16(row.level),
            )?);
        }

        tracing::debug!(count = rules.len(), "loaded permission rules");
        Ok(Self::new(rules))
    }

    fn decide(&self, user: Option<&ActingUser>, component: &str, instance: &str) -> AccessLevel {
        self.inner
            .rules
            .iter()
            .find(|rule| rule.matches(user, component, instance))
            .map_or(AccessLevel::None, |rule| rule.level)
    }

    /// Get the number of cached decisions (for monitoring).
    pub fn cache_size(&self) -> usize {
        self.inner.decisions.len()
    }
}

#[async_trait]
impl PermissionChecker for SchemaPermissions {
    async fn access_level(
        &self,
        user: Option<&ActingUser>,
        component: &str,
        instance: &str,
    ) -> Result<AccessLevel> {
        // Admins have all permissions
        if user.is_some_and(|u| u.is_admin) {
            return Ok(AccessLevel::Admin);
        }

        let key = (
            user.map_or(Uuid::nil(), |u| u.id),
            component.to_string(),
            instance.to_string(),
        );
        if let Some(level) = self.inner.decisions.get(&key) {
            return Ok(*level);
        }

        let level = self.decide(user, component, instance);
        self.inner.decisions.insert(key, level);
        Ok(level)
    }
}

/// Fail with `PermissionDenied` unless the context's user holds `required`.
///
/// The denial is registered on the context's status log.
pub async fn require_access(
    checker: &dyn PermissionChecker,
    ctx: &AdminContext,
    component: &str,
    instance: &str,
    required: AccessLevel,
) -> AdminResult<()> {
    if check_access(checker, ctx, component, instance, required).await? {
        Ok(())
    } else {
        tracing::debug!(component, instance, ?required, "permission denied");
        Err(ctx.fail(AdminError::PermissionDenied))
    }
}

/// Non-failing variant of [`require_access`], for building menus.
pub async fn check_access(
    checker: &dyn PermissionChecker,
    ctx: &AdminContext,
    component: &str,
    instance: &str,
    required: AccessLevel,
) -> AdminResult<bool> {
    Ok(checker
        .has_access(ctx.user(), component, instance, required)
        .await?)
}
