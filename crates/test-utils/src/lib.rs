//! Atrium test utilities.
//!
//! Fixtures for integration tests: a throwaway themes directory with a
//! cache directory beside it, and builders for user accounts and acting
//! contexts.

// Fixtures panic on setup failure; a broken fixture is a broken test.
#![allow(clippy::expect_used)]

use std::fs;
use std::path::{Path, PathBuf};

use atrium_kernel::models::User;
use atrium_kernel::models::user::activation;
use atrium_kernel::{ActingUser, AdminContext};
use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;
use uuid::Uuid;

/// A temporary site layout: `themes/` and `cache/` under one tempdir.
pub struct ThemesDir {
    root: TempDir,
}

impl ThemesDir {
    /// Create the layout with both directories present and empty.
    pub fn new() -> Self {
        let root = tempfile::tempdir().expect("failed to create tempdir");
        fs::create_dir_all(root.path().join("themes")).expect("failed to create themes dir");
        fs::create_dir_all(root.path().join("cache")).expect("failed to create cache dir");
        Self { root }
    }

    /// The themes root.
    pub fn path(&self) -> PathBuf {
        self.root.path().join("themes")
    }

    /// The cache root (running configuration and view caches).
    pub fn cache_path(&self) -> PathBuf {
        self.root.path().join("cache")
    }

    /// Path of one theme directory.
    pub fn theme_path(&self, directory: &str) -> PathBuf {
        self.path().join(directory)
    }

    /// Add a theme directory with the given `version.toml` contents.
    pub fn add_theme(&self, directory: &str, version_toml: &str) -> PathBuf {
        let dir = self.theme_path(directory);
        write(&dir.join("version.toml"), version_toml);
        dir
    }

    /// Add a legacy-format theme: a version file plus `theme.php`.
    pub fn add_legacy(&self, directory: &str) -> PathBuf {
        let dir = self.add_theme(directory, &format!("name = \"{directory}\"\n"));
        write(&dir.join("theme.php"), "<?php\n");
        dir
    }

    /// Add a directory that is not a theme at all.
    pub fn add_plain_dir(&self, directory: &str) -> PathBuf {
        let dir = self.theme_path(directory);
        fs::create_dir_all(&dir).expect("failed to create directory");
        dir
    }

    /// Remove a theme directory from disk.
    pub fn remove(&self, directory: &str) {
        fs::remove_dir_all(self.theme_path(directory)).expect("failed to remove theme dir");
    }

    /// Write a default configuration file shipped with a theme
    /// (`templates/config/<file>`).
    pub fn write_config_ini(&self, directory: &str, file: &str, content: &str) -> PathBuf {
        let path = self
            .theme_path(directory)
            .join("templates")
            .join("config")
            .join(file);
        write(&path, content);
        path
    }

    /// Write a file into one of the view cache directories.
    pub fn write_view_cache(&self, dir: &str, file: &str) -> PathBuf {
        let path = self.cache_path().join(dir).join(file);
        write(&path, "cached");
        path
    }
}

impl Default for ThemesDir {
    fn default() -> Self {
        Self::new()
    }
}

fn write(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("failed to create parent dir");
    }
    fs::write(path, content).expect("failed to write fixture file");
}

/// Fixed registration date used by [`test_user`].
pub fn registered_on(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 12, 0, 0)
        .single()
        .expect("invalid fixture date")
}

/// An active, non-admin user named `name` with mail `name@example.com`.
pub fn test_user(name: &str) -> TestUser {
    TestUser {
        user: User {
            id: Uuid::now_v7(),
            name: name.to_string(),
            pass: String::new(),
            mail: format!("{name}@example.com"),
            is_admin: false,
            activated: activation::ACTIVE,
            registered: registered_on(2024, 1, 1),
            theme: String::new(),
        },
    }
}

/// An administrator account.
pub fn admin_user() -> TestUser {
    test_user("admin").admin()
}

/// Builder for user fixtures.
#[derive(Debug, Clone)]
pub struct TestUser {
    user: User,
}

impl TestUser {
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.user.id = id;
        self
    }

    pub fn admin(mut self) -> Self {
        self.user.is_admin = true;
        self
    }

    pub fn with_mail(mut self, mail: &str) -> Self {
        self.user.mail = mail.to_string();
        self
    }

    pub fn with_activated(mut self, activated: i16) -> Self {
        self.user.activated = activated;
        self
    }

    /// Mark as a registration awaiting approval.
    pub fn pending(self) -> Self {
        self.with_activated(activation::PENDING_REG)
    }

    pub fn registered(mut self, at: DateTime<Utc>) -> Self {
        self.user.registered = at;
        self
    }

    pub fn with_theme(mut self, theme: &str) -> Self {
        self.user.theme = theme.to_string();
        self
    }

    pub fn build(self) -> User {
        self.user
    }
}

/// Context acting as `user`.
pub fn context_for(user: &User) -> AdminContext {
    AdminContext::new(ActingUser::from(user))
}

/// Context acting as a fresh administrator.
pub fn admin_context() -> AdminContext {
    context_for(&admin_user().build())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn themes_dir_layout() {
        let site = ThemesDir::new();
        assert!(site.path().is_dir());
        assert!(site.cache_path().is_dir());

        let dir = site.add_theme("SeaBreeze", "name = \"SeaBreeze\"\n");
        assert!(dir.join("version.toml").is_file());

        let legacy = site.add_legacy("Classic");
        assert!(legacy.join("theme.php").is_file());

        site.remove("SeaBreeze");
        assert!(!dir.exists());
    }

    #[test]
    fn config_ini_lands_under_templates() {
        let site = ThemesDir::new();
        let path = site.write_config_ini("SeaBreeze", "themevariables.ini", "[variables]\n");
        assert!(path.ends_with("SeaBreeze/templates/config/themevariables.ini"));
        assert!(path.is_file());
    }

    #[test]
    fn user_builder() {
        let user = test_user("alice").pending().with_theme("SeaBreeze").build();
        assert_eq!(user.mail, "alice@example.com");
        assert_eq!(user.activated, activation::PENDING_REG);
        assert_eq!(user.theme, "SeaBreeze");
        assert!(!user.is_admin);

        let admin = admin_user().build();
        assert!(admin.is_admin);
    }

    #[test]
    fn admin_context_has_admin_user() {
        let ctx = admin_context();
        assert!(ctx.user().is_some_and(|u| u.is_admin));
    }
}
