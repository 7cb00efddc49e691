//! Theme registry reconciliation.
//!
//! `regenerate` brings the registry in line with the themes directory:
//! themes gone from disk are removed (running configuration first), new
//! themes are registered as active, and themes whose comparable fields
//! changed are rewritten under their existing ID.
//!
//! Once registered, a theme's `state` belongs to the registry: a state
//! declared in `version.toml` never triggers or overrides an update.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use super::running_config::{ThemeConfigStore, purge_running_config};
use super::scanner::{ScanWarning, ScanWarningKind, ThemeScanner};
use super::store::ThemeStore;
use super::THEME_COMPONENT;
use crate::context::AdminContext;
use crate::error::{AdminError, AdminResult};
use crate::models::{ThemeDescriptor, ThemeRecord, ThemeState};
use crate::permissions::{AccessLevel, PermissionChecker, require_access};

/// Step of a reconciliation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileAction {
    PurgeRunningConfig,
    Delete,
    Insert,
    Update,
}

/// A step that failed without stopping the rest of the run.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileFailure {
    pub name: String,
    pub action: ReconcileAction,
    pub message: String,
}

/// Outcome of one `regenerate` run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    pub inserted: Vec<String>,
    pub updated: Vec<String>,
    pub deleted: Vec<String>,
    pub warnings: Vec<ScanWarning>,
    pub failures: Vec<ReconcileFailure>,
}

impl ReconcileReport {
    /// Whether the run changed nothing.
    pub fn is_unchanged(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    fn fail(&mut self, name: &str, action: ReconcileAction, err: &anyhow::Error) {
        warn!(theme = %name, ?action, error = %err, "theme reconciliation step failed");
        self.failures.push(ReconcileFailure {
            name: name.to_string(),
            action,
            message: format!("{err:#}"),
        });
    }
}

/// Reconciles the theme registry with the filesystem.
#[derive(Clone)]
pub struct ThemeReconciler {
    scanner: ThemeScanner,
    store: Arc<dyn ThemeStore>,
    config: Arc<dyn ThemeConfigStore>,
    permissions: Arc<dyn PermissionChecker>,
}

impl ThemeReconciler {
    pub fn new(
        scanner: ThemeScanner,
        store: Arc<dyn ThemeStore>,
        config: Arc<dyn ThemeConfigStore>,
        permissions: Arc<dyn PermissionChecker>,
    ) -> Self {
        Self {
            scanner,
            store,
            config,
            permissions,
        }
    }

    /// Regenerate the theme registry from the themes directory.
    ///
    /// Requires ADMIN on `Theme::`/`::` unless the context is installing.
    /// Fails before touching the registry if the directory or the registry
    /// cannot be read; after that every step is attempted and failures are
    /// collected in the report.
    pub async fn regenerate(&self, ctx: &AdminContext) -> AdminResult<ReconcileReport> {
        if !ctx.is_installing() {
            require_access(
                self.permissions.as_ref(),
                ctx,
                THEME_COMPONENT,
                "::",
                AccessLevel::Admin,
            )
            .await?;
        }

        let scan = self
            .scanner
            .scan()
            .map_err(|e| ctx.fail(AdminError::Filesystem(e)))?;

        let mut report = ReconcileReport::default();
        for warning in &scan.warnings {
            match warning.kind {
                ScanWarningKind::Unreadable => ctx.messages().error(format!(
                    "Error! Could not load theme version file: {}",
                    warning.path.display()
                )),
                ScanWarningKind::InvalidField => ctx.messages().warning(format!(
                    "Theme version file {}: {}, using the default",
                    warning.path.display(),
                    warning.message
                )),
            }
        }
        report.warnings = scan.warnings;

        let records = self
            .store
            .list()
            .await
            .map_err(|e| ctx.fail(AdminError::Persistence(e)))?;
        let registered: HashMap<String, ThemeRecord> = records
            .into_iter()
            .map(|r| (r.theme.name.clone(), r))
            .collect();

        let mut lost: Vec<&ThemeRecord> = registered
            .values()
            .filter(|r| !scan.themes.contains_key(&r.theme.name))
            .collect();
        lost.sort_by(|a, b| a.theme.name.cmp(&b.theme.name));

        for record in lost {
            let name = &record.theme.name;

            if let Err(e) = purge_running_config(self.config.as_ref(), Some(record), name).await {
                report.fail(name, ReconcileAction::PurgeRunningConfig, &e);
            }

            match self.store.delete(record.id).await {
                Ok(true) => report.deleted.push(name.clone()),
                Ok(false) => warn!(theme = %name, "theme vanished from registry during delete"),
                Err(e) => report.fail(name, ReconcileAction::Delete, &e),
            }
        }

        for (name, theme) in &scan.themes {
            if registered.contains_key(name) {
                continue;
            }

            let mut theme = theme.clone();
            theme.state = ThemeState::Active;
            match self.store.insert(&theme).await {
                Ok(_) => report.inserted.push(name.clone()),
                Err(e) => report.fail(name, ReconcileAction::Insert, &e),
            }
        }

        for (name, theme) in &scan.themes {
            let Some(stored) = registered.get(name) else {
                continue;
            };
            let theme = ThemeDescriptor {
                state: stored.theme.state,
                ..theme.clone()
            };
            if !theme.differs_from(&stored.theme) {
                continue;
            }

            let record = ThemeRecord {
                id: stored.id,
                theme,
            };
            match self.store.update(&record).await {
                Ok(true) => report.updated.push(name.clone()),
                Ok(false) => warn!(theme = %name, "theme vanished from registry during update"),
                Err(e) => report.fail(name, ReconcileAction::Update, &e),
            }
        }

        info!(
            inserted = report.inserted.len(),
            updated = report.updated.len(),
            deleted = report.deleted.len(),
            failures = report.failures.len(),
            "theme registry regenerated"
        );
        Ok(report)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::context::{ActingUser, MessageKind};
    use crate::permissions::SchemaPermissions;
    use crate::theme::running_config::FsThemeConfig;
    use crate::theme::store::MemoryThemeStore;
    use uuid::Uuid;

    fn write_theme(root: &std::path::Path, dir: &str, toml: &str) {
        std::fs::create_dir_all(root.join(dir)).unwrap();
        std::fs::write(root.join(dir).join("version.toml"), toml).unwrap();
    }

    fn reconciler(
        root: &std::path::Path,
        cache: &std::path::Path,
        store: Arc<MemoryThemeStore>,
    ) -> ThemeReconciler {
        ThemeReconciler::new(
            ThemeScanner::new(root),
            store,
            Arc::new(FsThemeConfig::new(root, cache)),
            Arc::new(SchemaPermissions::new(Vec::new())),
        )
    }

    fn admin() -> AdminContext {
        AdminContext::new(ActingUser {
            id: Uuid::now_v7(),
            name: "admin".to_string(),
            mail: "admin@example.com".to_string(),
            is_admin: true,
        })
    }

    #[tokio::test]
    async fn denied_without_permission() {
        let root = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        write_theme(root.path(), "Sea", r#"name = "Sea""#);
        let store = Arc::new(MemoryThemeStore::new());

        let ctx = AdminContext::anonymous();
        let result = reconciler(root.path(), cache.path(), store.clone())
            .regenerate(&ctx)
            .await;
        assert!(matches!(result, Err(AdminError::PermissionDenied)));
        assert_eq!(store.write_count(), 0);
        assert_eq!(ctx.messages().of_kind(MessageKind::Error).len(), 1);
    }

    #[tokio::test]
    async fn installer_bypasses_permission() {
        let root = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        write_theme(root.path(), "Sea", r#"name = "Sea""#);
        let store = Arc::new(MemoryThemeStore::new());

        let report = reconciler(root.path(), cache.path(), store.clone())
            .regenerate(&AdminContext::installer())
            .await
            .unwrap();
        assert_eq!(report.inserted, vec!["Sea"]);
    }

    #[tokio::test]
    async fn new_themes_are_forced_active() {
        let root = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        write_theme(root.path(), "Dormant", "state = \"inactive\"");
        let store = Arc::new(MemoryThemeStore::new());

        reconciler(root.path(), cache.path(), store.clone())
            .regenerate(&admin())
            .await
            .unwrap();
        assert_eq!(store.snapshot()[0].theme.state, ThemeState::Active);
    }

    #[tokio::test]
    async fn stored_state_survives_updates() {
        let root = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        write_theme(root.path(), "Sea", "name = \"Sea\"");
        let mut stored = crate::theme::version_file::default_descriptor("Sea");
        stored.state = ThemeState::Inactive;
        let id = Uuid::now_v7();
        let store = Arc::new(MemoryThemeStore::with_records([ThemeRecord { id, theme: stored }]));
        let rec = reconciler(root.path(), cache.path(), store.clone());

        let report = rec.regenerate(&admin()).await.unwrap();
        assert!(report.is_unchanged());

        write_theme(root.path(), "Sea", "name = \"Sea\"\ncontact = \"sea@example.com\"");
        let report = rec.regenerate(&admin()).await.unwrap();
        assert_eq!(report.updated, vec!["Sea"]);

        let record = &store.snapshot()[0];
        assert_eq!(record.id, id);
        assert_eq!(record.theme.contact, "sea@example.com");
        assert_eq!(record.theme.state, ThemeState::Inactive);
    }

    #[tokio::test]
    async fn failures_do_not_stop_other_work() {
        let root = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        write_theme(root.path(), "Keep", "contact = \"new@example.com\"");
        write_theme(root.path(), "Fresh", "");

        let store = Arc::new(MemoryThemeStore::new());
        let ctx = admin();
        let rec = reconciler(root.path(), cache.path(), store.clone());
        rec.regenerate(&ctx).await.unwrap();

        std::fs::write(root.path().join("Keep/version.toml"), "contact = \"other@example.com\"").unwrap();
        write_theme(root.path(), "Another", "");
        store.fail_on("Keep");

        let report = rec.regenerate(&ctx).await.unwrap();
        assert_eq!(report.inserted, vec!["Another"]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].action, ReconcileAction::Update);
    }

    #[tokio::test]
    async fn broken_version_file_is_reported() {
        let root = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        write_theme(root.path(), "Broken", "name = [");
        let store = Arc::new(MemoryThemeStore::new());
        let ctx = admin();

        let report = reconciler(root.path(), cache.path(), store.clone())
            .regenerate(&ctx)
            .await
            .unwrap();
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.inserted, vec!["Broken"]);
        assert_eq!(ctx.messages().of_kind(MessageKind::Error).len(), 1);
    }
}
