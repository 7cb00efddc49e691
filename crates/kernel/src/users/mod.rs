//! User account administration.

pub mod admin;
pub mod events;
pub mod import;
pub mod store;

use anyhow::{Context, Result};
use tera::Tera;

pub use admin::{MailFormat, MailRecipient, MailRequest, UserAdmin, UserAdminSettings, UserCriteria};
pub use events::{EventBus, UserEvent};
pub use import::{ImportOutcome, ImportRow};
pub use store::{
    GroupDirectory, MemoryProfileSearch, MemoryUserStore, PgUserStore, ProfileSearch, UserStore,
};

/// Permission component for user administration.
pub const USERS_COMPONENT: &str = "Users::";

/// Permission component for bulk mail to users.
pub const MAIL_COMPONENT: &str = "Users::MailUsers";

/// Template for the password notification sent to imported users.
pub const IMPORT_NOTIFY_TEMPLATE: &str = "users/import_notify.html";

/// Templates used by user administration.
pub fn templates() -> Result<Tera> {
    let mut tera = Tera::default();
    tera.add_raw_template(
        IMPORT_NOTIFY_TEMPLATE,
        include_str!("../../templates/users/import_notify.html"),
    )
    .context("failed to load user notification templates")?;
    Ok(tera)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn import_notification_renders() {
        let tera = templates().unwrap();
        let mut ctx = tera::Context::new();
        ctx.insert("sitename", "Atrium");
        ctx.insert("siteurl", "https://example.com");
        ctx.insert("uname", "alice");
        ctx.insert("email", "alice@example.com");
        ctx.insert("pass", "s3cret");

        let html = tera.render(IMPORT_NOTIFY_TEMPLATE, &ctx).unwrap();
        assert!(html.contains("Hello alice"));
        assert!(html.contains("s3cret"));
        assert!(html.contains("example.com"));
    }
}
