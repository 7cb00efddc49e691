//! Skeleton for a newly created theme.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::running_config::{PAGE_CONFIGURATIONS_FILE, PALETTES_FILE, VARIABLES_FILE};
use super::version_file::VERSION_FILE;

/// Directories of a new theme, parents first. Each gets an empty `index.html`.
pub const SKELETON_DIRS: [&str; 12] = [
    "",
    "docs",
    "images",
    "plugins",
    "locale",
    "locale/en",
    "locale/en/LC_MESSAGES",
    "style",
    "templates",
    "templates/blocks",
    "templates/config",
    "templates/modules",
];

/// File contents a caller may supply instead of the generated defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScaffoldFiles {
    pub pot: Option<String>,
    pub palettes: Option<String>,
    pub variables: Option<String>,
    pub page_configurations: Option<String>,
    pub page_configuration: Option<String>,
    pub page_template: Option<String>,
    pub block_template: Option<String>,
    pub stylesheet: Option<String>,
}

/// Request to create a theme.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ThemeScaffold {
    pub name: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub version: Option<String>,
    pub contact: Option<String>,
    #[serde(default)]
    pub files: ScaffoldFiles,
}

/// Replace every character outside `[A-Za-z0-9_]` with `_`.
pub fn sanitize_theme_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[derive(Serialize)]
struct VersionToml<'a> {
    name: &'a str,
    displayname: &'a str,
    version: &'a str,
    description: &'a str,
    contact: &'a str,
    admin: u8,
    user: u8,
    system: u8,
}

/// A validated scaffold with every default applied.
#[derive(Debug, Clone)]
pub struct PreparedScaffold {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub version: String,
    pub contact: String,
    pub files: ScaffoldFiles,
}

impl PreparedScaffold {
    /// Apply defaults. Returns `None` when no name was given.
    pub fn prepare(scaffold: &ThemeScaffold) -> Option<Self> {
        let raw = scaffold.name.trim();
        if raw.is_empty() {
            return None;
        }

        let non_empty = |v: &Option<String>| v.as_ref().filter(|s| !s.trim().is_empty()).cloned();

        Some(Self {
            name: sanitize_theme_name(raw),
            display_name: non_empty(&scaffold.display_name).unwrap_or_else(|| raw.to_string()),
            description: non_empty(&scaffold.description).unwrap_or_else(|| raw.to_string()),
            version: non_empty(&scaffold.version).unwrap_or_else(|| "1.0".to_string()),
            contact: scaffold.contact.clone().unwrap_or_default(),
            files: scaffold.files.clone(),
        })
    }

    fn version_toml(&self) -> Result<String> {
        toml::to_string(&VersionToml {
            name: &self.name,
            displayname: &self.display_name,
            version: &self.version,
            description: &self.description,
            contact: &self.contact,
            admin: 0,
            user: 1,
            system: 0,
        })
        .context("failed to serialize theme version file")
    }

    /// Every file of the skeleton as (relative path, contents).
    fn files(&self) -> Result<Vec<(PathBuf, String)>> {
        let files = &self.files;
        let pick = |supplied: &Option<String>, default: String| supplied.clone().unwrap_or(default);
        let config = Path::new("templates").join("config");

        Ok(vec![
            (PathBuf::from(VERSION_FILE), self.version_toml()?),
            (
                Path::new("locale").join(format!("theme_{}.pot", self.name)),
                pick(&files.pot, default_pot(&self.name)),
            ),
            (
                config.join(PALETTES_FILE),
                pick(&files.palettes, DEFAULT_PALETTES.to_string()),
            ),
            (
                config.join(VARIABLES_FILE),
                pick(&files.variables, DEFAULT_VARIABLES.to_string()),
            ),
            (
                config.join(PAGE_CONFIGURATIONS_FILE),
                pick(&files.page_configurations, DEFAULT_PAGE_CONFIGURATIONS.to_string()),
            ),
            (
                config.join("master.ini"),
                pick(&files.page_configuration, DEFAULT_MASTER_CONFIG.to_string()),
            ),
            (
                Path::new("templates").join("master.html"),
                pick(&files.page_template, DEFAULT_PAGE_TEMPLATE.to_string()),
            ),
            (
                Path::new("templates").join("blocks").join("block.html"),
                pick(&files.block_template, DEFAULT_BLOCK_TEMPLATE.to_string()),
            ),
            (
                Path::new("style").join("style.css"),
                pick(&files.stylesheet, DEFAULT_STYLESHEET.to_string()),
            ),
        ])
    }

    /// Create the theme under `themes_dir`. Fails if the directory exists.
    pub async fn write(&self, themes_dir: &Path) -> Result<PathBuf> {
        let root = themes_dir.join(&self.name);

        for dir in SKELETON_DIRS {
            let path = if dir.is_empty() {
                root.clone()
            } else {
                root.join(dir)
            };
            tokio::fs::create_dir(&path)
                .await
                .with_context(|| format!("failed to create {}", path.display()))?;
            let index = path.join("index.html");
            tokio::fs::write(&index, "")
                .await
                .with_context(|| format!("failed to create {}", index.display()))?;
        }

        for (relative, contents) in self.files()? {
            let path = root.join(relative);
            tokio::fs::write(&path, contents)
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;
        }

        debug!(theme = %self.name, path = %root.display(), "created theme skeleton");
        Ok(root)
    }
}

fn default_pot(name: &str) -> String {
    format!(
        "# Translation template for the {name} theme.\n\
         msgid \"\"\n\
         msgstr \"\"\n\
         \"Content-Type: text/plain; charset=UTF-8\\n\"\n"
    )
}

const DEFAULT_PALETTES: &str = "[default]\nbgcolor = \"#ffffff\"\ncolor = \"#000000\"\n";

const DEFAULT_VARIABLES: &str = "[variables]\nlayout = \"master\"\n";

const DEFAULT_PAGE_CONFIGURATIONS: &str = "[master]\nfile = \"master.ini\"\n";

const DEFAULT_MASTER_CONFIG: &str = "[page]\ntemplate = \"master.html\"\n\n[blockpositions]\nleft = \"block.html\"\n";

const DEFAULT_PAGE_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="{{ lang | default(value="en") }}">
<head>
    <meta charset="utf-8">
    <title>{{ title }}</title>
    <link rel="stylesheet" href="{{ theme_path }}/style/style.css">
</head>
<body>
    <aside>{{ blocks.left | safe }}</aside>
    <main>{{ content | safe }}</main>
</body>
</html>
"#;

const DEFAULT_BLOCK_TEMPLATE: &str = r#"<div class="block">
    <h4>{{ block.title }}</h4>
    {{ block.content | safe }}
</div>
"#;

const DEFAULT_STYLESHEET: &str = "body {\n    margin: 0;\n    font-family: sans-serif;\n}\n";
