//! Shared harness for admin integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use atrium_kernel::AdminState;
use atrium_kernel::mail::MemoryMailer;
use atrium_kernel::models::User;
use atrium_kernel::permissions::{AccessLevel, PermissionRule, RuleSubject, SchemaPermissions};
use atrium_kernel::site::MemorySiteVariables;
use atrium_kernel::theme::{MemoryThemeStore, ThemeConfigStore};
use atrium_kernel::users::{MemoryProfileSearch, MemoryUserStore, UserAdminSettings};
use atrium_test_utils::ThemesDir;

/// In-memory collaborators over a temporary site directory.
pub struct TestApp {
    pub site: ThemesDir,
    pub themes: Arc<MemoryThemeStore>,
    pub users: Arc<MemoryUserStore>,
    pub profiles: Arc<MemoryProfileSearch>,
    pub variables: Arc<MemorySiteVariables>,
    pub mailer: Arc<MemoryMailer>,
    pub state: AdminState,
}

impl TestApp {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> TestAppBuilder {
        TestAppBuilder::default()
    }
}

#[derive(Default)]
pub struct TestAppBuilder {
    users: Vec<User>,
    rules: Vec<PermissionRule>,
    themes: Option<Arc<MemoryThemeStore>>,
    theme_config: Option<Arc<dyn ThemeConfigStore>>,
    site: Option<ThemesDir>,
    settings: Option<UserAdminSettings>,
    without_mailer: bool,
}

impl TestAppBuilder {
    pub fn users(mut self, users: impl IntoIterator<Item = User>) -> Self {
        self.users.extend(users);
        self
    }

    /// Grant every authenticated user `level` on `component`.
    pub fn grant(mut self, component: &str, level: AccessLevel) -> Self {
        self.rules.push(
            PermissionRule::new(RuleSubject::Authenticated, component, ".*", level)
                .expect("valid rule"),
        );
        self
    }

    pub fn theme_store(mut self, store: Arc<MemoryThemeStore>) -> Self {
        self.themes = Some(store);
        self
    }

    pub fn theme_config(mut self, config: Arc<dyn ThemeConfigStore>) -> Self {
        self.theme_config = Some(config);
        self
    }

    pub fn site(mut self, site: ThemesDir) -> Self {
        self.site = Some(site);
        self
    }

    pub fn settings(mut self, settings: UserAdminSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn without_mailer(mut self) -> Self {
        self.without_mailer = true;
        self
    }

    pub fn build(self) -> TestApp {
        let site = self.site.unwrap_or_default();
        let themes = self.themes.unwrap_or_default();
        let users = Arc::new(MemoryUserStore::with_users(self.users));
        let profiles = Arc::new(MemoryProfileSearch::new());
        let variables = Arc::new(MemorySiteVariables::new());
        let mailer = Arc::new(MemoryMailer::new());

        let mut builder = AdminState::builder(site.path(), site.cache_path())
            .theme_store(themes.clone())
            .permissions(Arc::new(SchemaPermissions::new(self.rules)))
            .user_store(users.clone())
            .profiles(profiles.clone())
            .site(variables.clone())
            .settings(self.settings.unwrap_or_default());
        if let Some(config) = self.theme_config {
            builder = builder.theme_config(config);
        }
        if !self.without_mailer {
            builder = builder.mailer(mailer.clone());
        }

        TestApp {
            site,
            themes,
            users,
            profiles,
            variables,
            mailer,
            state: builder.build().expect("failed to build admin state"),
        }
    }
}
