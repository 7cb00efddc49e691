//! Parser for theme `version.toml` metadata files.
//!
//! Every key is optional; whatever a theme leaves out is filled from
//! defaults derived from its directory name:
//!
//! ```toml
//! name = "SeaBreeze"
//! displayname = "Sea Breeze"
//! version = "3.2"
//! description = "A light, airy theme"
//! contact = "themes@example.com"
//! admin = 0
//! user = 1
//! system = 0
//! state = "active"
//! xhtml = true
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::models::{ThemeDescriptor, ThemeState, ThemeType};

/// Metadata file that marks a directory as a theme.
pub const VERSION_FILE: &str = "version.toml";

/// Entry point of legacy-format themes, which the registry does not manage.
pub const LEGACY_MARKER: &str = "theme.php";

/// A flag written either as `0`/`1` or as a TOML boolean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Flag {
    Bool(bool),
    Int(i64),
}

impl Flag {
    pub fn is_set(self) -> bool {
        match self {
            Self::Bool(b) => b,
            Self::Int(i) => i != 0,
        }
    }
}

/// Free text that authors sometimes write as a bare number (`version = 1.0`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Text {
    String(String),
    Integer(i64),
    Float(f64),
}

impl Text {
    fn into_string(self) -> String {
        match self {
            Self::String(s) => s,
            Self::Integer(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
        }
    }
}

/// A state given as its numeric code or its label.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum StateValue {
    Code(i16),
    Label(String),
}

impl StateValue {
    fn to_state(&self) -> Result<ThemeState> {
        match self {
            Self::Code(code) => ThemeState::from_i16(*code),
            Self::Label(label) => match label.to_lowercase().as_str() {
                "active" => Ok(ThemeState::Active),
                "inactive" => Ok(ThemeState::Inactive),
                other => anyhow::bail!("unknown theme state '{other}'"),
            },
        }
    }
}

/// Contents of a `version.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ThemeVersionFile {
    pub name: Option<String>,
    pub displayname: Option<String>,
    pub version: Option<Text>,
    pub description: Option<String>,
    pub contact: Option<String>,
    pub admin: Option<Flag>,
    pub user: Option<Flag>,
    pub system: Option<Flag>,
    pub state: Option<StateValue>,
    pub xhtml: Option<Flag>,
}

impl ThemeVersionFile {
    /// Parse a version file from the given path.
    pub fn parse(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read theme version file: {}", path.display()))?;

        Self::parse_str(&content, path)
    }

    /// Parse version file contents from a TOML string.
    ///
    /// Only unreadable TOML fails here. Field values are checked when the
    /// descriptor is built.
    pub fn parse_str(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content)
            .with_context(|| format!("failed to parse theme version TOML at {}", path.display()))
    }

    /// Build the descriptor for `directory`, filling every missing field.
    ///
    /// An invalid value falls back to that field's default and is named in
    /// the returned list; every other field is still taken from the file.
    pub fn into_descriptor(self, directory: &str) -> (ThemeDescriptor, Vec<String>) {
        let mut theme = default_descriptor(directory);
        let mut invalid = Vec::new();

        match self.name {
            Some(name) if name.trim().is_empty() => {
                invalid.push("empty 'name' field".to_string());
            }
            Some(name) => theme.name = name,
            None => {}
        }
        if let Some(display_name) = self.displayname {
            theme.display_name = display_name;
        }
        theme.description = self
            .description
            .unwrap_or_else(|| theme.display_name.clone());
        if let Some(version) = self.version {
            theme.version = version.into_string();
        }
        if let Some(contact) = self.contact {
            theme.contact = contact;
        }
        if let Some(admin) = self.admin {
            theme.admin = admin.is_set();
        }
        if let Some(user) = self.user {
            theme.user = user.is_set();
        }
        if let Some(system) = self.system {
            theme.system = system.is_set();
        }
        if let Some(state) = self.state {
            match state.to_state() {
                Ok(state) => theme.state = state,
                Err(e) => invalid.push(format!("invalid 'state': {e}")),
            }
        }
        if let Some(xhtml) = self.xhtml {
            theme.xhtml = xhtml.is_set();
        }

        (theme, invalid)
    }
}

/// The descriptor of a theme whose version file defines nothing.
pub fn default_descriptor(directory: &str) -> ThemeDescriptor {
    let readable = directory.replace('_', " ");

    ThemeDescriptor {
        directory: directory.to_string(),
        name: readable.clone(),
        theme_type: ThemeType::VersionFile,
        display_name: readable.clone(),
        version: "0".to_string(),
        description: readable,
        contact: String::new(),
        admin: false,
        user: true,
        system: false,
        state: ThemeState::Active,
        xhtml: true,
    }
}
