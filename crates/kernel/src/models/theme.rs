//! Theme registry model and CRUD operations.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// How a theme declares its metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i16)]
pub enum ThemeType {
    Legacy = 1,
    Xml = 2,
    VersionFile = 3,
}

impl ThemeType {
    pub fn as_i16(self) -> i16 {
        self as i16
    }

    pub fn from_i16(value: i16) -> Result<Self> {
        match value {
            1 => Ok(Self::Legacy),
            2 => Ok(Self::Xml),
            3 => Ok(Self::VersionFile),
            other => anyhow::bail!("unknown theme type {other}"),
        }
    }
}

/// Availability state of a registered theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(i16)]
pub enum ThemeState {
    Active = 1,
    Inactive = 2,
}

impl ThemeState {
    pub fn as_i16(self) -> i16 {
        self as i16
    }

    pub fn from_i16(value: i16) -> Result<Self> {
        match value {
            1 => Ok(Self::Active),
            2 => Ok(Self::Inactive),
            other => anyhow::bail!("unknown theme state {other}"),
        }
    }
}

/// A theme as derived from its directory on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeDescriptor {
    /// Folder name under the themes root.
    pub directory: String,
    /// Unique registry key.
    pub name: String,
    pub theme_type: ThemeType,
    pub display_name: String,
    pub version: String,
    pub description: String,
    pub contact: String,
    /// Usable as the administration theme.
    pub admin: bool,
    /// Selectable by users.
    pub user: bool,
    /// Hidden system theme.
    pub system: bool,
    pub state: ThemeState,
    pub xhtml: bool,
}

impl ThemeDescriptor {
    /// Whether the registry copy needs rewriting to match this descriptor.
    ///
    /// Display name, description and version are informational and do
    /// not participate.
    pub fn differs_from(&self, stored: &ThemeDescriptor) -> bool {
        self.directory != stored.directory
            || self.theme_type != stored.theme_type
            || self.admin != stored.admin
            || self.user != stored.user
            || self.system != stored.system
            || self.state != stored.state
            || self.contact != stored.contact
            || self.xhtml != stored.xhtml
    }
}

/// A row in the `themes` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeRecord {
    pub id: Uuid,
    #[serde(flatten)]
    pub theme: ThemeDescriptor,
}

/// Raw column values; flags and enums are smallints in the table.
#[derive(Debug, sqlx::FromRow)]
struct ThemeRow {
    id: Uuid,
    name: String,
    theme_type: i16,
    display_name: String,
    description: String,
    directory: String,
    version: String,
    contact: String,
    admin: i16,
    user: i16,
    system: i16,
    state: i16,
    xhtml: i16,
}

impl TryFrom<ThemeRow> for ThemeRecord {
    type Error = anyhow::Error;

    fn try_from(row: ThemeRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            theme: ThemeDescriptor {
                directory: row.directory,
                name: row.name,
                theme_type: ThemeType::from_i16(row.theme_type)?,
                display_name: row.display_name,
                version: row.version,
                description: row.description,
                contact: row.contact,
                admin: row.admin != 0,
                user: row.user != 0,
                system: row.system != 0,
                state: ThemeState::from_i16(row.state)?,
                xhtml: row.xhtml != 0,
            },
        })
    }
}

const SELECT_THEME: &str = r#"SELECT id, name, theme_type, display_name, description, directory,
    version, contact, admin, "user", system, state, xhtml FROM themes"#;

fn flag(value: bool) -> i16 {
    i16::from(value)
}

impl ThemeRecord {
    /// List all registered themes ordered by name.
    pub async fn list(pool: &PgPool) -> Result<Vec<Self>> {
        let rows = sqlx::query_as::<_, ThemeRow>(&format!("{SELECT_THEME} ORDER BY name"))
            .fetch_all(pool)
            .await
            .context("failed to list themes")?;

        rows.into_iter().map(Self::try_from).collect()
    }

    /// Find a theme by name.
    pub async fn find_by_name(pool: &PgPool, name: &str) -> Result<Option<Self>> {
        let row = sqlx::query_as::<_, ThemeRow>(&format!("{SELECT_THEME} WHERE name = $1"))
            .bind(name)
            .fetch_optional(pool)
            .await
            .context("failed to fetch theme by name")?;

        row.map(Self::try_from).transpose()
    }

    /// Find a theme by ID.
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>> {
        let row = sqlx::query_as::<_, ThemeRow>(&format!("{SELECT_THEME} WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await
            .context("failed to fetch theme by id")?;

        row.map(Self::try_from).transpose()
    }

    /// Register a new theme, assigning a fresh ID.
    pub async fn create(pool: &PgPool, theme: &ThemeDescriptor) -> Result<Self> {
        let id = Uuid::now_v7();

        sqlx::query(
            r#"
            INSERT INTO themes (id, name, theme_type, display_name, description, directory,
                version, contact, admin, "user", system, state, xhtml)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(id)
        .bind(&theme.name)
        .bind(theme.theme_type.as_i16())
        .bind(&theme.display_name)
        .bind(&theme.description)
        .bind(&theme.directory)
        .bind(&theme.version)
        .bind(&theme.contact)
        .bind(flag(theme.admin))
        .bind(flag(theme.user))
        .bind(flag(theme.system))
        .bind(theme.state.as_i16())
        .bind(flag(theme.xhtml))
        .execute(pool)
        .await
        .with_context(|| format!("failed to insert theme '{}'", theme.name))?;

        Ok(Self {
            id,
            theme: theme.clone(),
        })
    }

    /// Overwrite every column of an existing theme.
    pub async fn update(pool: &PgPool, record: &ThemeRecord) -> Result<bool> {
        let theme = &record.theme;
        let result = sqlx::query(
            r#"
            UPDATE themes SET name = $2, theme_type = $3, display_name = $4, description = $5,
                directory = $6, version = $7, contact = $8, admin = $9, "user" = $10,
                system = $11, state = $12, xhtml = $13
            WHERE id = $1
            "#,
        )
        .bind(record.id)
        .bind(&theme.name)
        .bind(theme.theme_type.as_i16())
        .bind(&theme.display_name)
        .bind(&theme.description)
        .bind(&theme.directory)
        .bind(&theme.version)
        .bind(&theme.contact)
        .bind(flag(theme.admin))
        .bind(flag(theme.user))
        .bind(flag(theme.system))
        .bind(theme.state.as_i16())
        .bind(flag(theme.xhtml))
        .execute(pool)
        .await
        .with_context(|| format!("failed to update theme '{}'", theme.name))?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a theme by ID.
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM themes WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await
            .context("failed to delete theme")?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn descriptor() -> ThemeDescriptor {
        ThemeDescriptor {
            directory: "SeaBreeze".to_string(),
            name: "SeaBreeze".to_string(),
            theme_type: ThemeType::VersionFile,
            display_name: "Sea Breeze".to_string(),
            version: "3.2".to_string(),
            description: "A light theme".to_string(),
            contact: String::new(),
            admin: false,
            user: true,
            system: false,
            state: ThemeState::Active,
            xhtml: true,
        }
    }

    #[test]
    fn informational_fields_do_not_count_as_changes() {
        let stored = descriptor();
        let mut scanned = descriptor();
        scanned.description = "Now darker".to_string();
        scanned.version = "4.0".to_string();
        scanned.display_name = "Sea Breeze 4".to_string();
        assert!(!scanned.differs_from(&stored));
    }

    #[test]
    fn comparable_fields_count_as_changes() {
        let stored = descriptor();

        let mut scanned = descriptor();
        scanned.contact = "webmaster@example.com".to_string();
        assert!(scanned.differs_from(&stored));

        let mut scanned = descriptor();
        scanned.admin = true;
        assert!(scanned.differs_from(&stored));

        let mut scanned = descriptor();
        scanned.state = ThemeState::Inactive;
        assert!(scanned.differs_from(&stored));
    }

    #[test]
    fn enum_codes_round_trip() {
        assert_eq!(ThemeType::from_i16(3).unwrap(), ThemeType::VersionFile);
        assert_eq!(ThemeState::from_i16(2).unwrap(), ThemeState::Inactive);
        assert!(ThemeType::from_i16(9).is_err());
    }

    #[test]
    fn record_serializes_flat() {
        let record = ThemeRecord {
            id: Uuid::nil(),
            theme: descriptor(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["name"], "SeaBreeze");
        assert_eq!(json["state"], "active");
    }
}
