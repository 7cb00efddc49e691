//! Shared admin state.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::PgPool;
use tera::Tera;
use tracing::info;

use crate::config::Config;
use crate::db;
use crate::mail::{Mailbox, Mailer, SmtpMailer};
use crate::permissions::{PermissionChecker, SchemaPermissions};
use crate::site::{MemorySiteVariables, PgSiteVariables, SiteVariables};
use crate::theme::{
    FsThemeConfig, MemoryThemeStore, PgThemeStore, ThemeAdmin, ThemeConfigStore,
    ThemeReconciler, ThemeScanner, ThemeStore, ViewCache,
};
use crate::users::{
    self, EventBus, GroupDirectory, MemoryUserStore, PgUserStore, ProfileSearch, UserAdmin,
    UserAdminSettings, UserStore,
};

/// Collaborators shared by every admin operation.
///
/// Wrapped in Arc internally so Clone is cheap.
#[derive(Clone)]
pub struct AdminState {
    inner: Arc<AdminStateInner>,
}

struct AdminStateInner {
    /// PostgreSQL pool, absent for in-memory setups.
    db: Option<PgPool>,

    themes_dir: PathBuf,
    cache_dir: PathBuf,

    themes: Arc<dyn ThemeStore>,
    theme_config: Arc<dyn ThemeConfigStore>,
    permissions: Arc<dyn PermissionChecker>,
    users: Arc<dyn UserStore>,
    groups: Arc<dyn GroupDirectory>,
    profiles: Option<Arc<dyn ProfileSearch>>,
    site: Arc<dyn SiteVariables>,

    /// Outgoing mail (available when SMTP_HOST is configured).
    mailer: Option<Arc<dyn Mailer>>,

    events: EventBus,
    templates: Arc<Tera>,
    settings: UserAdminSettings,
}

impl AdminState {
    /// Create state backed by PostgreSQL.
    pub async fn new(config: &Config) -> Result<Self> {
        let db = db::create_pool(config)
            .await
            .context("failed to create database pool")?;

        db::run_migrations(&db)
            .await
            .context("failed to run migrations")?;

        let permissions = SchemaPermissions::load(&db)
            .await
            .context("failed to load permission rules")?;

        let mailer: Option<Arc<dyn Mailer>> = match config.smtp() {
            Some(smtp) => {
                let from = Mailbox::new(&config.site_name, &config.smtp_from_email);
                let mailer =
                    SmtpMailer::new(&smtp, from).context("failed to create SMTP mailer")?;
                info!(host = %smtp.host, "email delivery enabled");
                Some(Arc::new(mailer))
            }
            None => {
                info!("SMTP_HOST not set, email delivery disabled");
                None
            }
        };

        let user_store = Arc::new(PgUserStore::new(db.clone()));

        Ok(Self {
            inner: Arc::new(AdminStateInner {
                themes_dir: config.themes_dir.clone(),
                cache_dir: config.cache_dir.clone(),
                themes: Arc::new(PgThemeStore::new(db.clone())),
                theme_config: Arc::new(FsThemeConfig::new(&config.themes_dir, &config.cache_dir)),
                permissions: Arc::new(permissions),
                users: user_store.clone(),
                groups: user_store,
                profiles: None,
                site: Arc::new(PgSiteVariables::new(db.clone())),
                mailer,
                events: EventBus::new(),
                templates: Arc::new(users::templates()?),
                settings: UserAdminSettings {
                    site_name: config.site_name.clone(),
                    site_url: config.site_url.clone(),
                    registration_enabled: config.registration_enabled,
                    mail_batch_size: config.mail_batch_size,
                },
                db: Some(db),
            }),
        })
    }

    /// Start building state from in-memory collaborators.
    pub fn builder(themes_dir: impl Into<PathBuf>, cache_dir: impl Into<PathBuf>) -> AdminStateBuilder {
        AdminStateBuilder::new(themes_dir.into(), cache_dir.into())
    }

    pub fn db(&self) -> Option<&PgPool> {
        self.inner.db.as_ref()
    }

    pub fn themes_dir(&self) -> &Path {
        &self.inner.themes_dir
    }

    pub fn cache_dir(&self) -> &Path {
        &self.inner.cache_dir
    }

    pub fn theme_store(&self) -> &Arc<dyn ThemeStore> {
        &self.inner.themes
    }

    pub fn user_store(&self) -> &Arc<dyn UserStore> {
        &self.inner.users
    }

    pub fn site(&self) -> &Arc<dyn SiteVariables> {
        &self.inner.site
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn theme_reconciler(&self) -> ThemeReconciler {
        ThemeReconciler::new(
            ThemeScanner::new(&self.inner.themes_dir),
            self.inner.themes.clone(),
            self.inner.theme_config.clone(),
            self.inner.permissions.clone(),
        )
    }

    pub fn theme_admin(&self) -> ThemeAdmin {
        ThemeAdmin::new(
            &self.inner.themes_dir,
            self.inner.themes.clone(),
            self.inner.theme_config.clone(),
            ViewCache::new(&self.inner.cache_dir),
            self.inner.users.clone(),
            self.inner.site.clone(),
            self.inner.permissions.clone(),
        )
    }

    pub fn user_admin(&self) -> UserAdmin {
        UserAdmin::new(
            self.inner.users.clone(),
            self.inner.groups.clone(),
            self.inner.profiles.clone(),
            self.inner.permissions.clone(),
            self.inner.mailer.clone(),
            self.inner.events.clone(),
            self.inner.templates.clone(),
            self.inner.settings.clone(),
        )
    }
}

/// Builder for [`AdminState`]. Every collaborator defaults to an empty
/// in-memory implementation; permissions default to admins only.
pub struct AdminStateBuilder {
    themes_dir: PathBuf,
    cache_dir: PathBuf,
    themes: Arc<dyn ThemeStore>,
    theme_config: Option<Arc<dyn ThemeConfigStore>>,
    permissions: Arc<dyn PermissionChecker>,
    users: Arc<dyn UserStore>,
    groups: Arc<dyn GroupDirectory>,
    profiles: Option<Arc<dyn ProfileSearch>>,
    site: Arc<dyn SiteVariables>,
    mailer: Option<Arc<dyn Mailer>>,
    settings: UserAdminSettings,
}

impl AdminStateBuilder {
    fn new(themes_dir: PathBuf, cache_dir: PathBuf) -> Self {
        let users = Arc::new(MemoryUserStore::new());
        Self {
            themes_dir,
            cache_dir,
            themes: Arc::new(MemoryThemeStore::new()),
            theme_config: None,
            permissions: Arc::new(SchemaPermissions::new(Vec::new())),
            users: users.clone(),
            groups: users,
            profiles: None,
            site: Arc::new(MemorySiteVariables::new()),
            mailer: None,
            settings: UserAdminSettings::default(),
        }
    }

    pub fn theme_store(mut self, store: Arc<dyn ThemeStore>) -> Self {
        self.themes = store;
        self
    }

    pub fn theme_config(mut self, config: Arc<dyn ThemeConfigStore>) -> Self {
        self.theme_config = Some(config);
        self
    }

    pub fn permissions(mut self, permissions: Arc<dyn PermissionChecker>) -> Self {
        self.permissions = permissions;
        self
    }

    /// Use one store for both accounts and group memberships.
    pub fn user_store<S>(mut self, store: Arc<S>) -> Self
    where
        S: UserStore + GroupDirectory + 'static,
    {
        self.users = store.clone();
        self.groups = store;
        self
    }

    pub fn profiles(mut self, profiles: Arc<dyn ProfileSearch>) -> Self {
        self.profiles = Some(profiles);
        self
    }

    pub fn site(mut self, site: Arc<dyn SiteVariables>) -> Self {
        self.site = site;
        self
    }

    pub fn mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = Some(mailer);
        self
    }

    pub fn settings(mut self, settings: UserAdminSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> Result<AdminState> {
        let theme_config = self.theme_config.unwrap_or_else(|| {
            Arc::new(FsThemeConfig::new(&self.themes_dir, &self.cache_dir))
        });

        Ok(AdminState {
            inner: Arc::new(AdminStateInner {
                db: None,
                themes_dir: self.themes_dir,
                cache_dir: self.cache_dir,
                themes: self.themes,
                theme_config,
                permissions: self.permissions,
                users: self.users,
                groups: self.groups,
                profiles: self.profiles,
                site: self.site,
                mailer: self.mailer,
                events: EventBus::new(),
                templates: Arc::new(users::templates()?),
                settings: self.settings,
            }),
        })
    }
}
