//! Bulk user import rows.
//!
//! CSV input has a header row with the columns `uname`, `email`, `pass`,
//! `activated`, `sendmail` and `groups`. The last three are optional;
//! `groups` holds group IDs separated by `|`.

use std::io::Read;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::User;

/// One account to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRow {
    pub name: String,
    pub mail: String,
    /// Plain-text password; hashed before storage.
    pub pass: String,
    /// Inactive rows become pending registrations.
    pub activated: bool,
    /// Notify the user of their password after creation.
    pub send_mail: bool,
    pub groups: Vec<Uuid>,
}

/// Result of an import.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportOutcome {
    /// Created accounts, in input order.
    pub created: Vec<User>,
    /// Names of users that were sent a notification.
    pub notified: Vec<String>,
    /// Name of the user whose notification failed, if any.
    pub notification_failed: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    uname: String,
    email: String,
    pass: String,
    #[serde(default)]
    activated: Option<String>,
    #[serde(default)]
    sendmail: Option<String>,
    #[serde(default)]
    groups: Option<String>,
}

fn flag(value: Option<&str>, default: bool) -> bool {
    match value.map(str::trim) {
        None | Some("") => default,
        Some(v) => matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"),
    }
}

/// Parse `|`-separated group IDs.
pub fn parse_groups(value: &str) -> Result<Vec<Uuid>> {
    value
        .split('|')
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .map(|g| Uuid::parse_str(g).with_context(|| format!("invalid group id '{g}'")))
        .collect()
}

/// Read import rows from CSV.
pub fn read_csv(input: impl Read) -> Result<Vec<ImportRow>> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(input);

    let mut rows = Vec::new();
    for (index, record) in reader.deserialize::<CsvRow>().enumerate() {
        let line = index + 2;
        let row = record.with_context(|| format!("invalid import row on line {line}"))?;
        let groups = parse_groups(row.groups.as_deref().unwrap_or(""))
            .with_context(|| format!("invalid groups on line {line}"))?;

        rows.push(ImportRow {
            name: row.uname,
            mail: row.email,
            pass: row.pass,
            activated: flag(row.activated.as_deref(), true),
            send_mail: flag(row.sendmail.as_deref(), false),
            groups,
        });
    }
    Ok(rows)
}
