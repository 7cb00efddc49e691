//! Running configuration of themes.
//!
//! A theme ships default INI files under `templates/config/`. Once an
//! administrator edits them, the edited copies live in the cache directory
//! as `Theme_Config/<theme>_<file>` and take precedence over the defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, warn};

use super::ini::IniDocument;
use crate::models::ThemeRecord;

pub const VARIABLES_FILE: &str = "themevariables.ini";
pub const PALETTES_FILE: &str = "themepalettes.ini";
pub const PAGE_CONFIGURATIONS_FILE: &str = "pageconfigurations.ini";

/// Files every running configuration may contain.
pub const BASE_FILES: [&str; 3] = [PAGE_CONFIGURATIONS_FILE, PALETTES_FILE, VARIABLES_FILE];

/// Directory under the cache root that holds running configurations.
pub const RUNNING_CONFIG_DIR: &str = "Theme_Config";

/// Storage for theme configuration INI files.
#[async_trait]
pub trait ThemeConfigStore: Send + Sync {
    /// Theme variables, if the theme defines any.
    async fn variables(&self, theme: &ThemeRecord) -> Result<Option<IniDocument>>;

    /// Colour palettes, if the theme defines any.
    async fn palettes(&self, theme: &ThemeRecord) -> Result<Option<IniDocument>>;

    /// Page configuration assignments. Empty when the theme has none.
    async fn page_configurations(&self, theme: &ThemeRecord) -> Result<IniDocument>;

    /// One page configuration file.
    async fn page_configuration(
        &self,
        theme: &ThemeRecord,
        file: &str,
    ) -> Result<Option<IniDocument>>;

    /// Write `file` into the running configuration of `theme_name`.
    async fn write_ini_file(&self, theme_name: &str, file: &str, doc: &IniDocument) -> Result<()>;

    /// Remove `file` from the running configuration. Returns whether a file
    /// was removed.
    async fn delete_ini_file(&self, theme_name: &str, file: &str) -> Result<bool>;
}

/// Whether `file` names a single file with no path components.
pub fn is_plain_file_name(file: &str) -> bool {
    !file.is_empty()
        && file != "."
        && file != ".."
        && !file.contains(['/', '\\', '\0'])
        && !file.contains("..")
}

/// Page configuration files referenced by an assignments document.
pub fn referenced_files(assignments: &IniDocument) -> Vec<String> {
    let mut files: Vec<String> = Vec::new();
    for (_, section) in assignments.sections() {
        if let Some(file) = section.get("file")
            && !file.is_empty()
            && !files.contains(file)
        {
            files.push(file.clone());
        }
    }
    files
}

/// Delete the whole running configuration of a theme.
///
/// Removes the base files plus, when the theme is still registered, every
/// page configuration file it references. Every file is attempted; the
/// first failure is returned afterwards.
pub async fn purge_running_config(
    config: &dyn ThemeConfigStore,
    theme: Option<&ThemeRecord>,
    theme_name: &str,
) -> Result<Vec<String>> {
    let mut files: Vec<String> = BASE_FILES.iter().map(|f| f.to_string()).collect();

    if let Some(theme) = theme {
        match config.page_configurations(theme).await {
            Ok(assignments) => {
                for file in referenced_files(&assignments) {
                    if !files.contains(&file) {
                        files.push(file);
                    }
                }
            }
            Err(e) => warn!(theme = %theme_name, error = %e, "failed to read page configurations"),
        }
    }

    let mut removed = Vec::new();
    let mut first_error = None;
    for file in files {
        if !is_plain_file_name(&file) {
            warn!(theme = %theme_name, file = %file, "skipping page configuration with unsafe file name");
            continue;
        }
        match config.delete_ini_file(theme_name, &file).await {
            Ok(true) => removed.push(file),
            Ok(false) => {}
            Err(e) => {
                warn!(theme = %theme_name, file = %file, error = %e, "failed to delete running config file");
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(removed),
    }
}

/// Running configuration kept on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsThemeConfig {
    themes_dir: PathBuf,
    cache_dir: PathBuf,
}

impl FsThemeConfig {
    pub fn new(themes_dir: impl Into<PathBuf>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            themes_dir: themes_dir.into(),
            cache_dir: cache_dir.into(),
        }
    }

    /// Path of the running copy of `file` for `theme_name`.
    pub fn running_path(&self, theme_name: &str, file: &str) -> PathBuf {
        let theme = theme_name.replace(['/', '\\'], "_");
        self.cache_dir
            .join(RUNNING_CONFIG_DIR)
            .join(format!("{theme}_{file}"))
    }

    /// Path of the default copy shipped with the theme.
    pub fn default_path(&self, theme: &ThemeRecord, file: &str) -> PathBuf {
        self.themes_dir
            .join(&theme.theme.directory)
            .join("templates")
            .join("config")
            .join(file)
    }

    async fn load(&self, theme: &ThemeRecord, file: &str) -> Result<Option<IniDocument>> {
        if !is_plain_file_name(file) {
            anyhow::bail!("invalid configuration file name '{file}'");
        }

        for path in [
            self.running_path(&theme.theme.name, file),
            self.default_path(theme, file),
        ] {
            if exists(&path).await {
                debug!(path = %path.display(), "loading theme config");
                return IniDocument::read(&path).await.map(Some);
            }
        }
        Ok(None)
    }
}

async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

#[async_trait]
impl ThemeConfigStore for FsThemeConfig {
    async fn variables(&self, theme: &ThemeRecord) -> Result<Option<IniDocument>> {
        self.load(theme, VARIABLES_FILE).await
    }

    async fn palettes(&self, theme: &ThemeRecord) -> Result<Option<IniDocument>> {
        self.load(theme, PALETTES_FILE).await
    }

    async fn page_configurations(&self, theme: &ThemeRecord) -> Result<IniDocument> {
        Ok(self
            .load(theme, PAGE_CONFIGURATIONS_FILE)
            .await?
            .unwrap_or_default())
    }

    async fn page_configuration(
        &self,
        theme: &ThemeRecord,
        file: &str,
    ) -> Result<Option<IniDocument>> {
        self.load(theme, file).await
    }

    async fn write_ini_file(&self, theme_name: &str, file: &str, doc: &IniDocument) -> Result<()> {
        if !is_plain_file_name(file) {
            anyhow::bail!("invalid configuration file name '{file}'");
        }
        let path = self.running_path(theme_name, file);
        doc.write(&path).await?;
        debug!(path = %path.display(), "wrote running config file");
        Ok(())
    }

    async fn delete_ini_file(&self, theme_name: &str, file: &str) -> Result<bool> {
        if !is_plain_file_name(file) {
            anyhow::bail!("invalid configuration file name '{file}'");
        }
        let path = self.running_path(theme_name, file);
        if !exists(&path).await {
            return Ok(false);
        }
        tokio::fs::remove_file(&path)
            .await
            .with_context(|| format!("failed to delete {}", path.display()))?;
        debug!(path = %path.display(), "deleted running config file");
        Ok(true)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::theme::version_file::default_descriptor;
    use uuid::Uuid;

    fn record(directory: &str) -> ThemeRecord {
        ThemeRecord {
            id: Uuid::now_v7(),
            theme: default_descriptor(directory),
        }
    }

    #[test]
    fn plain_file_names() {
        assert!(is_plain_file_name("master.ini"));
        assert!(!is_plain_file_name(""));
        assert!(!is_plain_file_name("../secrets.ini"));
        assert!(!is_plain_file_name("a/b.ini"));
        assert!(!is_plain_file_name("a\\b.ini"));
    }

    #[test]
    fn referenced_files_are_unique() {
        let doc = IniDocument::parse(
            "[master]\nfile = master.ini\n[*home]\nfile = home.ini\n[*admin]\nfile = master.ini\n",
        )
        .unwrap();
        assert_eq!(referenced_files(&doc), vec!["master.ini", "home.ini"]);
    }

    #[tokio::test]
    async fn running_copy_overrides_default() {
        let themes = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let config = FsThemeConfig::new(themes.path(), cache.path());
        let theme = record("Sea");

        let default_path = config.default_path(&theme, VARIABLES_FILE);
        std::fs::create_dir_all(default_path.parent().unwrap()).unwrap();
        std::fs::write(&default_path, "colour = blue\n").unwrap();

        let vars = config.variables(&theme).await.unwrap().unwrap();
        assert_eq!(vars.get("", "colour"), Some("blue"));

        let mut edited = IniDocument::new();
        edited.set("", "colour", "green");
        config
            .write_ini_file("Sea", VARIABLES_FILE, &edited)
            .await
            .unwrap();

        let vars = config.variables(&theme).await.unwrap().unwrap();
        assert_eq!(vars.get("", "colour"), Some("green"));
        assert!(config.palettes(&theme).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn purge_removes_base_and_referenced_files() {
        let themes = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let config = FsThemeConfig::new(themes.path(), cache.path());
        let theme = record("Sea");

        let mut assignments = IniDocument::new();
        assignments.set("master", "file", "master.ini");
        config
            .write_ini_file("Sea", PAGE_CONFIGURATIONS_FILE, &assignments)
            .await
            .unwrap();
        config
            .write_ini_file("Sea", "master.ini", &IniDocument::new())
            .await
            .unwrap();
        config
            .write_ini_file("Sea", VARIABLES_FILE, &IniDocument::new())
            .await
            .unwrap();

        let removed = purge_running_config(&config, Some(&theme), "Sea")
            .await
            .unwrap();
        assert_eq!(removed.len(), 3);
        assert!(removed.contains(&"master.ini".to_string()));
        assert!(!config.running_path("Sea", "master.ini").exists());
    }
}
