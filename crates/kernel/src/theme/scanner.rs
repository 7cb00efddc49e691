//! Theme discovery on disk.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use super::version_file::{LEGACY_MARKER, ThemeVersionFile, VERSION_FILE, default_descriptor};
use crate::models::ThemeDescriptor;

/// What was wrong with a version file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanWarningKind {
    /// The file could not be read or parsed; every field was defaulted.
    Unreadable,
    /// One field had an unusable value and was defaulted.
    InvalidField,
}

/// A version file problem that did not stop the scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanWarning {
    pub directory: String,
    pub path: PathBuf,
    pub kind: ScanWarningKind,
    pub message: String,
}

/// Result of scanning the themes directory.
#[derive(Debug, Clone, Default)]
pub struct ThemeScan {
    /// Discovered themes keyed by name.
    pub themes: BTreeMap<String, ThemeDescriptor>,
    pub warnings: Vec<ScanWarning>,
}

/// Scans the immediate subdirectories of a themes root.
#[derive(Debug, Clone)]
pub struct ThemeScanner {
    root: PathBuf,
}

impl ThemeScanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether a directory is a registry-managed theme: it has a version
    /// file and is not a legacy-format theme.
    pub fn is_theme_dir(dir: &Path) -> bool {
        dir.join(VERSION_FILE).is_file() && !dir.join(LEGACY_MARKER).exists()
    }

    /// Discover every theme under the root.
    ///
    /// A missing root yields an empty scan. A root that exists but cannot
    /// be listed is an error, so callers never mistake it for "no themes".
    /// Version files that fail to load produce a warning and a descriptor
    /// built from defaults.
    pub fn scan(&self) -> io::Result<ThemeScan> {
        let mut scan = ThemeScan::default();

        if !self.root.is_dir() {
            info!(root = %self.root.display(), "themes directory does not exist, nothing to scan");
            return Ok(scan);
        }

        let mut dirs: Vec<_> = std::fs::read_dir(&self.root)?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .collect();

        dirs.sort_by_key(|e| e.file_name());

        for entry in dirs {
            let dir = entry.path();
            let Some(directory) = entry.file_name().to_str().map(str::to_string) else {
                warn!(dir = %dir.display(), "skipping theme directory with non UTF-8 name");
                continue;
            };

            if !Self::is_theme_dir(&dir) {
                debug!(dir = %dir.display(), "not a theme, skipping");
                continue;
            }

            let version_path = dir.join(VERSION_FILE);
            let theme = match ThemeVersionFile::parse(&version_path) {
                Ok(file) => {
                    let (theme, invalid) = file.into_descriptor(&directory);
                    for message in invalid {
                        warn!(path = %version_path.display(), %message, "invalid value in theme version file");
                        scan.warnings.push(ScanWarning {
                            directory: directory.clone(),
                            path: version_path.clone(),
                            kind: ScanWarningKind::InvalidField,
                            message,
                        });
                    }
                    theme
                }
                Err(e) => {
                    warn!(path = %version_path.display(), error = %e, "failed to load theme version file");
                    scan.warnings.push(ScanWarning {
                        directory: directory.clone(),
                        path: version_path,
                        kind: ScanWarningKind::Unreadable,
                        message: format!("{e:#}"),
                    });
                    default_descriptor(&directory)
                }
            };

            if let Some(previous) = scan.themes.get(&theme.name) {
                warn!(
                    name = %theme.name,
                    kept = %theme.directory,
                    dropped = %previous.directory,
                    "two theme directories share a name, keeping the later one"
                );
            }
            scan.themes.insert(theme.name.clone(), theme);
        }

        debug!(count = scan.themes.len(), "scanned themes");
        Ok(scan)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::ThemeState;

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn missing_root_is_empty() {
        let scan = ThemeScanner::new("/nonexistent/atrium/themes").scan().unwrap();
        assert!(scan.themes.is_empty());
        assert!(scan.warnings.is_empty());
    }

    #[test]
    fn eligibility_rules() {
        let root = tempfile::tempdir().unwrap();
        write(&root.path().join("Modern/version.toml"), r#"name = "Modern""#);
        write(&root.path().join("Old/version.toml"), r#"name = "Old""#);
        write(&root.path().join("Old/theme.php"), "<?php");
        write(&root.path().join("Assets/style.css"), "body {}");
        write(&root.path().join("stray.toml"), r#"name = "Stray""#);

        let scan = ThemeScanner::new(root.path()).scan().unwrap();
        assert_eq!(scan.themes.keys().collect::<Vec<_>>(), vec!["Modern"]);
    }

    #[test]
    fn broken_version_file_uses_defaults() {
        let root = tempfile::tempdir().unwrap();
        write(&root.path().join("Broken_Theme/version.toml"), "name = [");

        let scan = ThemeScanner::new(root.path()).scan().unwrap();
        assert_eq!(scan.warnings.len(), 1);
        assert_eq!(scan.warnings[0].directory, "Broken_Theme");
        assert_eq!(scan.warnings[0].kind, ScanWarningKind::Unreadable);

        let theme = &scan.themes["Broken Theme"];
        assert_eq!(theme.directory, "Broken_Theme");
        assert_eq!(theme.version, "0");
        assert_eq!(theme.state, ThemeState::Active);
    }

    #[test]
    fn invalid_state_keeps_declared_name() {
        let root = tempfile::tempdir().unwrap();
        write(
            &root.path().join("sea_breeze/version.toml"),
            "name = \"SeaBreeze\"\ncontact = \"themes@example.com\"\nstate = \"retired\"",
        );

        let scan = ThemeScanner::new(root.path()).scan().unwrap();
        assert_eq!(scan.warnings.len(), 1);
        assert_eq!(scan.warnings[0].kind, ScanWarningKind::InvalidField);

        let theme = &scan.themes["SeaBreeze"];
        assert_eq!(theme.contact, "themes@example.com");
        assert_eq!(theme.state, ThemeState::Active);
    }

    #[test]
    fn name_collision_keeps_last_directory() {
        let root = tempfile::tempdir().unwrap();
        write(&root.path().join("a_first/version.toml"), r#"name = "Same""#);
        write(&root.path().join("b_second/version.toml"), r#"name = "Same""#);

        let scan = ThemeScanner::new(root.path()).scan().unwrap();
        assert_eq!(scan.themes.len(), 1);
        assert_eq!(scan.themes["Same"].directory, "b_second");
    }
}
