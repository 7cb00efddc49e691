//! Minimal INI documents for theme configuration files.
//!
//! Keys before the first section header live in the unnamed section `""`.
//! Lines starting with `;` or `#` are comments. Values may be wrapped in
//! double quotes; serialization always quotes them.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};

/// Key/value pairs of one section.
pub type IniSection = BTreeMap<String, String>;

/// A parsed INI file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IniDocument {
    sections: BTreeMap<String, IniSection>,
}

impl IniDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse INI text.
    pub fn parse(content: &str) -> Result<Self> {
        let mut doc = Self::new();
        let mut current = String::new();

        for (index, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            if let Some(header) = line.strip_prefix('[') {
                let name = header
                    .strip_suffix(']')
                    .with_context(|| format!("line {}: unterminated section header", index + 1))?;
                current = name.trim().to_string();
                doc.sections.entry(current.clone()).or_default();
                continue;
            }

            let (key, value) = line
                .split_once('=')
                .with_context(|| format!("line {}: expected 'key = value'", index + 1))?;
            let key = key.trim();
            if key.is_empty() {
                anyhow::bail!("line {}: empty key", index + 1);
            }

            doc.sections
                .entry(current.clone())
                .or_default()
                .insert(key.to_string(), unquote(value.trim()).to_string());
        }

        Ok(doc)
    }

    /// Read and parse an INI file.
    pub async fn read(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Write the document, creating parent directories.
    pub async fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        tokio::fs::write(path, self.to_ini_string())
            .await
            .with_context(|| format!("failed to write {}", path.display()))
    }

    pub fn to_ini_string(&self) -> String {
        let mut out = String::new();

        if let Some(globals) = self.sections.get("") {
            write_pairs(&mut out, globals);
        }

        for (name, pairs) in self.sections.iter().filter(|(name, _)| !name.is_empty()) {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push('[');
            out.push_str(name);
            out.push_str("]\n");
            write_pairs(&mut out, pairs);
        }

        out
    }

    pub fn section(&self, name: &str) -> Option<&IniSection> {
        self.sections.get(name)
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(section)
            .and_then(|s| s.get(key))
            .map(String::as_str)
    }

    pub fn set(&mut self, section: &str, key: &str, value: impl Into<String>) {
        self.sections
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value.into());
    }

    /// Remove a section. Returns whether it existed.
    pub fn remove_section(&mut self, name: &str) -> bool {
        self.sections.remove(name).is_some()
    }

    pub fn sections(&self) -> impl Iterator<Item = (&str, &IniSection)> {
        self.sections.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.sections.values().all(|s| s.is_empty())
    }
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

fn write_pairs(out: &mut String, pairs: &IniSection) {
    for (key, value) in pairs {
        out.push_str(key);
        out.push_str(" = \"");
        out.push_str(&value.replace('"', "'"));
        out.push_str("\"\n");
    }
}
