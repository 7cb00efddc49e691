//! Theme administration operations.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use super::running_config::{
    PAGE_CONFIGURATIONS_FILE, PALETTES_FILE, ThemeConfigStore, VARIABLES_FILE, is_plain_file_name,
    purge_running_config, referenced_files,
};
use super::scaffold::{PreparedScaffold, ThemeScaffold};
use super::store::ThemeStore;
use super::version_file::VERSION_FILE;
use super::view_cache::ViewCache;
use super::THEME_COMPONENT;
use crate::context::AdminContext;
use crate::error::{AdminError, AdminResult};
use crate::links::AdminLink;
use crate::models::ThemeRecord;
use crate::permissions::{AccessLevel, PermissionChecker, check_access, require_access};
use crate::site::{DEFAULT_THEME, SiteVariables};
use crate::users::store::UserStore;

/// Administration of registered themes.
#[derive(Clone)]
pub struct ThemeAdmin {
    themes_dir: PathBuf,
    store: Arc<dyn ThemeStore>,
    config: Arc<dyn ThemeConfigStore>,
    views: ViewCache,
    users: Arc<dyn UserStore>,
    site: Arc<dyn SiteVariables>,
    permissions: Arc<dyn PermissionChecker>,
}

fn require_arg(ctx: &AdminContext, value: &str, what: &str) -> AdminResult<()> {
    if value.trim().is_empty() {
        return Err(ctx.fail(AdminError::invalid(format!("{what} is required"))));
    }
    Ok(())
}

impl ThemeAdmin {
    pub fn new(
        themes_dir: impl Into<PathBuf>,
        store: Arc<dyn ThemeStore>,
        config: Arc<dyn ThemeConfigStore>,
        views: ViewCache,
        users: Arc<dyn UserStore>,
        site: Arc<dyn SiteVariables>,
        permissions: Arc<dyn PermissionChecker>,
    ) -> Self {
        Self {
            themes_dir: themes_dir.into(),
            store,
            config,
            views,
            users,
            site,
            permissions,
        }
    }

    pub fn themes_dir(&self) -> &Path {
        &self.themes_dir
    }

    async fn require(
        &self,
        ctx: &AdminContext,
        instance: &str,
        level: AccessLevel,
    ) -> AdminResult<()> {
        require_access(self.permissions.as_ref(), ctx, THEME_COMPONENT, instance, level).await
    }

    async fn find(&self, ctx: &AdminContext, name: &str) -> AdminResult<Option<ThemeRecord>> {
        self.store
            .find_by_name(name)
            .await
            .map_err(|e| ctx.fail(AdminError::Persistence(e)))
    }

    async fn find_existing(&self, ctx: &AdminContext, name: &str) -> AdminResult<ThemeRecord> {
        self.find(ctx, name)
            .await?
            .ok_or_else(|| ctx.fail(AdminError::not_found(format!("theme '{name}'"))))
    }

    /// All registered themes.
    pub async fn list(&self, ctx: &AdminContext) -> AdminResult<Vec<ThemeRecord>> {
        self.require(ctx, "::", AccessLevel::Admin).await?;
        self.store
            .list()
            .await
            .map_err(|e| ctx.fail(AdminError::Persistence(e)))
    }

    /// Menu entries for the theme admin panel.
    pub async fn links(&self, ctx: &AdminContext) -> AdminResult<Vec<AdminLink>> {
        let mut links = Vec::new();
        let admin =
            check_access(self.permissions.as_ref(), ctx, THEME_COMPONENT, "::", AccessLevel::Admin)
                .await?;

        if admin {
            links.push(AdminLink::new("/admin/themes", "Themes list", "list"));
            links.push(AdminLink::new("/admin/themes/settings", "Settings", "config"));
        }
        Ok(links)
    }

    /// Save an edited theme record.
    pub async fn update_settings(&self, ctx: &AdminContext, record: &ThemeRecord) -> AdminResult<()> {
        self.require(ctx, "::", AccessLevel::Admin).await?;

        match self.store.update(record).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(ctx.fail(AdminError::Persistence(anyhow::anyhow!(
                "Could not save your changes"
            )))),
            Err(e) => Err(ctx.fail(AdminError::Persistence(
                e.context("Could not save your changes"),
            ))),
        }
    }

    /// Make `name` the site default theme, optionally clearing every user's
    /// own theme selection.
    pub async fn set_as_default(
        &self,
        ctx: &AdminContext,
        name: &str,
        reset_user_selected: bool,
    ) -> AdminResult<()> {
        self.require(ctx, "::", AccessLevel::Admin).await?;
        require_arg(ctx, name, "theme name")?;

        if reset_user_selected {
            let reset = self
                .users
                .reset_theme(None)
                .await
                .map_err(|e| ctx.fail(AdminError::Persistence(e)))?;
            info!(reset, "cleared user theme selections");
        }

        self.site
            .set(DEFAULT_THEME, serde_json::Value::String(name.to_string()))
            .await
            .map_err(|e| ctx.fail(AdminError::Persistence(e)))?;

        info!(theme = %name, "default theme changed");
        Ok(())
    }

    /// Copy the theme's current settings into its running configuration.
    ///
    /// Returns the files written.
    pub async fn create_running_config(
        &self,
        ctx: &AdminContext,
        name: &str,
    ) -> AdminResult<Vec<String>> {
        require_arg(ctx, name, "theme name")?;

        let Some(theme) = self.find(ctx, name).await? else {
            return Err(ctx.fail(AdminError::invalid(format!("unknown theme '{name}'"))));
        };
        let version_file = self.themes_dir.join(&theme.theme.directory).join(VERSION_FILE);
        if !version_file.is_file() {
            return Err(ctx.fail(AdminError::invalid(format!(
                "theme '{name}' has no {VERSION_FILE}"
            ))));
        }

        self.require(ctx, &format!("{name}::"), AccessLevel::Admin)
            .await?;

        let persist = |e: anyhow::Error| ctx.fail(AdminError::Persistence(e));
        let mut written = Vec::new();

        if let Some(variables) = self.config.variables(&theme).await.map_err(persist)? {
            self.config
                .write_ini_file(name, VARIABLES_FILE, &variables)
                .await
                .map_err(persist)?;
            written.push(VARIABLES_FILE.to_string());
        }

        if let Some(palettes) = self.config.palettes(&theme).await.map_err(persist)? {
            self.config
                .write_ini_file(name, PALETTES_FILE, &palettes)
                .await
                .map_err(persist)?;
            written.push(PALETTES_FILE.to_string());
        }

        let assignments = self
            .config
            .page_configurations(&theme)
            .await
            .map_err(persist)?;
        self.config
            .write_ini_file(name, PAGE_CONFIGURATIONS_FILE, &assignments)
            .await
            .map_err(persist)?;
        written.push(PAGE_CONFIGURATIONS_FILE.to_string());

        for file in referenced_files(&assignments) {
            if !is_plain_file_name(&file) {
                warn!(theme = %name, file = %file, "skipping page configuration with unsafe file name");
                continue;
            }
            let doc = self
                .config
                .page_configuration(&theme, &file)
                .await
                .map_err(persist)?
                .unwrap_or_default();
            self.config
                .write_ini_file(name, &file, &doc)
                .await
                .map_err(persist)?;
            written.push(file);
        }

        info!(theme = %name, files = written.len(), "created running configuration");
        Ok(written)
    }

    /// Unregister a theme and clean up after it.
    pub async fn delete(&self, ctx: &AdminContext, name: &str, delete_files: bool) -> AdminResult<()> {
        require_arg(ctx, name, "theme name")?;
        let theme = self.find_existing(ctx, name).await?;

        self.require(ctx, &format!("{}::", theme.theme.name), AccessLevel::Delete)
            .await?;

        let reset = self
            .users
            .reset_theme(Some(&theme.theme.name))
            .await
            .map_err(|e| ctx.fail(AdminError::Persistence(e)))?;

        match self.store.delete(theme.id).await {
            Ok(true) => {}
            Ok(false) => {
                return Err(ctx.fail(AdminError::Persistence(anyhow::anyhow!(
                    "Could not perform the deletion"
                ))));
            }
            Err(e) => {
                return Err(ctx.fail(AdminError::Persistence(
                    e.context("Could not perform the deletion"),
                )));
            }
        }

        if let Err(e) =
            purge_running_config(self.config.as_ref(), Some(&theme), &theme.theme.name).await
        {
            warn!(theme = %theme.theme.name, error = %e, "failed to delete running configuration");
        }

        if let Err(e) = self.views.clear_compiled().await {
            warn!(error = %e, "failed to clear compiled templates");
        }
        if let Err(e) = self.views.clear_cached().await {
            warn!(error = %e, "failed to clear cached templates");
        }

        info!(theme = %theme.theme.name, users_reset = reset, "theme deleted");

        if delete_files {
            self.delete_files(ctx, &theme.theme.name, &theme.theme.directory)
                .await?;
        }
        Ok(())
    }

    /// Remove a theme's directory from disk if the process may write there.
    ///
    /// Returns `false` with a notice when the directory is not writable.
    pub async fn delete_files(
        &self,
        ctx: &AdminContext,
        name: &str,
        directory: &str,
    ) -> AdminResult<bool> {
        require_arg(ctx, name, "theme name")?;
        require_arg(ctx, directory, "theme directory")?;
        if !is_plain_file_name(directory) {
            return Err(ctx.fail(AdminError::invalid(format!(
                "invalid theme directory '{directory}'"
            ))));
        }

        self.require(ctx, &format!("{name}::"), AccessLevel::Admin)
            .await?;

        let theme_dir = self.themes_dir.join(directory);
        if !(is_writable(&self.themes_dir).await && is_writable(&theme_dir).await) {
            ctx.messages().status(format!(
                "Notice: Theme files cannot be deleted because there are no write permissions \
                 for the themes folder and/or the {directory} folder."
            ));
            return Ok(false);
        }

        tokio::fs::remove_dir_all(&theme_dir).await.map_err(|e| {
            ctx.messages().error(
                "Error! Could not delete theme files from the file system. \
                 Please remove them by another means.",
            );
            AdminError::Filesystem(e)
        })?;

        ctx.messages()
            .status("Done! Removed theme files from the file system.");
        Ok(true)
    }

    /// Delete the running configuration of a theme.
    ///
    /// Returns the files removed.
    pub async fn delete_running_config(
        &self,
        ctx: &AdminContext,
        name: &str,
    ) -> AdminResult<Vec<String>> {
        require_arg(ctx, name, "theme name")?;
        self.require(ctx, &format!("{name}::"), AccessLevel::Admin)
            .await?;

        let theme = self.find(ctx, name).await?;
        purge_running_config(self.config.as_ref(), theme.as_ref(), name)
            .await
            .map_err(|e| ctx.fail(AdminError::Persistence(e)))
    }

    /// Delete one file from a theme's running configuration.
    pub async fn delete_ini_file(
        &self,
        ctx: &AdminContext,
        name: &str,
        file: &str,
    ) -> AdminResult<bool> {
        require_arg(ctx, name, "theme name")?;
        self.require(ctx, &format!("{name}::"), AccessLevel::Admin)
            .await?;
        require_arg(ctx, file, "file name")?;
        if !is_plain_file_name(file) {
            return Err(ctx.fail(AdminError::invalid(format!("invalid file name '{file}'"))));
        }

        self.config
            .delete_ini_file(name, file)
            .await
            .map_err(|e| ctx.fail(AdminError::Persistence(e)))
    }

    /// Remove one page configuration assignment.
    pub async fn delete_page_configuration_assignment(
        &self,
        ctx: &AdminContext,
        name: &str,
        pc_name: &str,
    ) -> AdminResult<()> {
        require_arg(ctx, name, "theme name")?;
        require_arg(ctx, pc_name, "page configuration name")?;
        let theme = self.find_existing(ctx, name).await?;

        self.require(
            ctx,
            &format!("{}::pageconfigurations", theme.theme.name),
            AccessLevel::Delete,
        )
        .await?;

        let persist = |e: anyhow::Error| ctx.fail(AdminError::Persistence(e));
        let mut assignments = self
            .config
            .page_configurations(&theme)
            .await
            .map_err(persist)?;
        if !assignments.remove_section(pc_name) {
            warn!(theme = %name, assignment = %pc_name, "page configuration assignment not present");
        }
        self.config
            .write_ini_file(name, PAGE_CONFIGURATIONS_FILE, &assignments)
            .await
            .map_err(persist)?;
        Ok(())
    }

    /// Create the files of a new theme. Registration happens on the next
    /// `regenerate`.
    pub async fn create(&self, ctx: &AdminContext, scaffold: &ThemeScaffold) -> AdminResult<PathBuf> {
        self.require(ctx, "::", AccessLevel::Admin).await?;

        let Some(prepared) = PreparedScaffold::prepare(scaffold) else {
            return Err(ctx.fail(AdminError::invalid(
                "You must enter at least the theme name",
            )));
        };

        if self.find(ctx, &prepared.name).await?.is_some() {
            return Err(ctx.fail(AdminError::invalid(format!(
                "a theme named '{}' already exists",
                prepared.name
            ))));
        }

        let root = prepared.write(&self.themes_dir).await.map_err(|e| {
            ctx.fail(AdminError::Persistence(e.context("Could not create the new item")))
        })?;

        info!(theme = %prepared.name, path = %root.display(), "theme created");
        Ok(root)
    }
}

async fn is_writable(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| !m.permissions().readonly())
        .unwrap_or(false)
}
