//! User account administration operations.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tera::Tera;
use tracing::{info, warn};
use uuid::Uuid;

use super::events::{EventBus, UserEvent};
use super::import::{ImportOutcome, ImportRow};
use super::store::{GroupDirectory, ProfileSearch, UserStore};
use super::{IMPORT_NOTIFY_TEMPLATE, MAIL_COMPONENT, USERS_COMPONENT};
use crate::context::AdminContext;
use crate::error::{AdminError, AdminResult};
use crate::links::AdminLink;
use crate::mail::{MailMessage, Mailbox, Mailer};
use crate::models::user::{ANONYMOUS_USER_ID, activation, hash_password};
use crate::models::{NewUser, User, UserLookupKey, UserQuery};
use crate::permissions::{AccessLevel, PermissionChecker, check_access, require_access};

/// Site settings the user admin needs.
#[derive(Debug, Clone)]
pub struct UserAdminSettings {
    pub site_name: String,
    pub site_url: String,
    /// Open registration lowers the level needed to create users to ADD.
    pub registration_enabled: bool,
    /// Default BCC batch size for bulk mail; 0 sends one message.
    pub mail_batch_size: usize,
}

impl Default for UserAdminSettings {
    fn default() -> Self {
        Self {
            site_name: "Atrium".to_string(),
            site_url: "http://localhost".to_string(),
            registration_enabled: false,
            mail_batch_size: 100,
        }
    }
}

/// Filters for [`UserAdmin::find_users`]. Unset filters match everyone.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserCriteria {
    pub name: Option<String>,
    pub mail: Option<String>,
    pub group: Option<Uuid>,
    pub registered_after: Option<DateTime<Utc>>,
    pub registered_before: Option<DateTime<Utc>>,
    /// Profile field filters, applied when profile search is available.
    #[serde(default)]
    pub profile: BTreeMap<String, String>,
}

/// Body format of a bulk message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailFormat {
    /// Whatever the mailer defaults to.
    #[default]
    Default,
    Html,
    Text,
}

impl MailFormat {
    fn html(self) -> Option<bool> {
        match self {
            Self::Default => None,
            Self::Html => Some(true),
            Self::Text => Some(false),
        }
    }
}

/// A candidate recipient of a bulk message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MailRecipient {
    pub id: Uuid,
    pub name: String,
    pub address: String,
}

/// A bulk message to selected users.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MailRequest {
    /// Users selected to receive the message.
    pub recipient_ids: Vec<Uuid>,
    /// Known recipients; those not selected are skipped.
    pub recipients: Vec<MailRecipient>,
    /// Sender name.
    pub from: String,
    /// Sender and reply-to address.
    pub reply_to: String,
    pub subject: String,
    pub message: String,
    #[serde(default)]
    pub format: MailFormat,
    /// Overrides the configured batch size.
    pub batch_size: Option<usize>,
}

/// Administration of user accounts.
#[derive(Clone)]
pub struct UserAdmin {
    users: Arc<dyn UserStore>,
    groups: Arc<dyn GroupDirectory>,
    profiles: Option<Arc<dyn ProfileSearch>>,
    permissions: Arc<dyn PermissionChecker>,
    mailer: Option<Arc<dyn Mailer>>,
    events: EventBus,
    templates: Arc<Tera>,
    settings: UserAdminSettings,
}

impl UserAdmin {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        users: Arc<dyn UserStore>,
        groups: Arc<dyn GroupDirectory>,
        profiles: Option<Arc<dyn ProfileSearch>>,
        permissions: Arc<dyn PermissionChecker>,
        mailer: Option<Arc<dyn Mailer>>,
        events: EventBus,
        templates: Arc<Tera>,
        settings: UserAdminSettings,
    ) -> Self {
        Self {
            users,
            groups,
            profiles,
            permissions,
            mailer,
            events,
            templates,
            settings,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    async fn require(
        &self,
        ctx: &AdminContext,
        component: &str,
        instance: &str,
        level: AccessLevel,
    ) -> AdminResult<()> {
        require_access(self.permissions.as_ref(), ctx, component, instance, level).await
    }

    async fn allowed(
        &self,
        ctx: &AdminContext,
        component: &str,
        level: AccessLevel,
    ) -> AdminResult<bool> {
        check_access(self.permissions.as_ref(), ctx, component, "::", level).await
    }

    /// Search user accounts.
    ///
    /// The anonymous user and pending registrations are never returned.
    pub async fn find_users(
        &self,
        ctx: &AdminContext,
        criteria: &UserCriteria,
    ) -> AdminResult<Vec<User>> {
        self.require(ctx, USERS_COMPONENT, "::", AccessLevel::Read)
            .await?;

        let persist = |e: anyhow::Error| ctx.fail(AdminError::Persistence(e));
        let non_empty = |v: &Option<String>| v.as_ref().filter(|s| !s.is_empty()).cloned();

        let mut query = UserQuery {
            name_contains: non_empty(&criteria.name),
            mail_contains: non_empty(&criteria.mail),
            registered_after: criteria.registered_after,
            registered_before: criteria.registered_before,
            exclude_anonymous: true,
            exclude_activated: Some(activation::PENDING_REG),
            ..Default::default()
        };

        let mut allowed: Option<HashSet<Uuid>> = None;
        let mut restrict = |ids: Vec<Uuid>| {
            let ids: HashSet<Uuid> = ids.into_iter().collect();
            allowed = Some(match allowed.take() {
                Some(current) => current.intersection(&ids).copied().collect(),
                None => ids,
            });
        };

        if let Some(group) = criteria.group {
            restrict(self.groups.members(group).await.map_err(persist)?);
        }

        if !criteria.profile.is_empty() {
            match self.profiles {
                Some(ref profiles) => {
                    restrict(profiles.search(&criteria.profile).await.map_err(persist)?);
                }
                None => warn!("profile criteria ignored, no profile search configured"),
            }
        }

        if let Some(ids) = allowed {
            if ids.is_empty() {
                return Ok(Vec::new());
            }
            let mut ids: Vec<Uuid> = ids.into_iter().collect();
            ids.sort();
            query.id_in = Some(ids);
        }

        self.users.search(&query).await.map_err(persist)
    }

    /// Delete accounts, or only mark them for deletion.
    ///
    /// Every ID is validated before anything changes. Returns the IDs
    /// processed.
    pub async fn delete_users(
        &self,
        ctx: &AdminContext,
        ids: &[Uuid],
        mark_only: bool,
    ) -> AdminResult<Vec<Uuid>> {
        self.require(ctx, USERS_COMPONENT, "ANY", AccessLevel::Delete)
            .await?;

        if ids.is_empty() {
            return Err(ctx.fail(AdminError::invalid("no users selected for deletion")));
        }

        let persist = |e: anyhow::Error| ctx.fail(AdminError::Persistence(e));
        let mut targets = Vec::with_capacity(ids.len());
        for &id in ids {
            if Some(id) == ctx.user_id() {
                return Err(ctx.fail(AdminError::invalid("you cannot delete your own account")));
            }
            if id == ANONYMOUS_USER_ID {
                return Err(ctx.fail(AdminError::invalid("the anonymous user cannot be deleted")));
            }

            let user = self
                .users
                .find(id)
                .await
                .map_err(persist)?
                .ok_or_else(|| ctx.fail(AdminError::not_found(format!("user {id}"))))?;

            self.require(
                ctx,
                USERS_COMPONENT,
                &format!("{}::{}", user.name, user.id),
                AccessLevel::Delete,
            )
            .await?;

            targets.push(user);
        }

        for user in targets {
            if mark_only {
                self.users
                    .set_activated(user.id, activation::PENDING_DELETE)
                    .await
                    .map_err(persist)?;
                info!(user = %user.name, "user marked for deletion");
                continue;
            }

            self.groups
                .delete_memberships(user.id)
                .await
                .map_err(persist)?;
            self.users
                .delete_verifications(user.id)
                .await
                .map_err(persist)?;
            self.users
                .delete_sessions(user.id)
                .await
                .map_err(persist)?;
            self.users.delete(user.id).await.map_err(persist)?;

            info!(user = %user.name, "user deleted");
            self.events.publish(UserEvent::AccountDeleted(user));
        }

        Ok(ids.to_vec())
    }

    /// Send one message to the selected users in BCC batches.
    ///
    /// Returns the number of recipients.
    pub async fn send_mail(&self, ctx: &AdminContext, request: &MailRequest) -> AdminResult<usize> {
        self.require(ctx, MAIL_COMPONENT, "::", AccessLevel::Comment)
            .await?;

        if request.recipient_ids.is_empty() {
            return Err(ctx.fail(AdminError::invalid(
                "No users selected to receive e-mail, or invalid user list",
            )));
        }

        let missing: Vec<&str> = [
            ("from", &request.from),
            ("reply-to e-mail address", &request.reply_to),
            ("subject", &request.subject),
            ("message", &request.message),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
        .collect();

        match missing.as_slice() {
            [] => {}
            [field] => {
                return Err(ctx.fail(AdminError::invalid(format!(
                    "The required field '{field}' was blank or missing"
                ))));
            }
            fields => {
                return Err(ctx.fail(AdminError::invalid(format!(
                    "{} required fields were blank or missing: '{}'",
                    fields.len(),
                    fields.join("', '")
                ))));
            }
        }

        let Some(ref mailer) = self.mailer else {
            return Err(ctx.fail(AdminError::Delivery("mail is not configured".to_string())));
        };

        let selected: HashSet<Uuid> = request.recipient_ids.iter().copied().collect();
        let bcc: Vec<Mailbox> = request
            .recipients
            .iter()
            .filter(|r| selected.contains(&r.id))
            .map(|r| Mailbox::new(&r.name, &r.address))
            .collect();

        let batch_size = match request.batch_size.unwrap_or(self.settings.mail_batch_size) {
            0 => usize::MAX,
            n => n,
        };

        let to = match ctx.user() {
            Some(user) => Mailbox::new(&user.name, &user.mail),
            None => Mailbox::new(&request.from, &request.reply_to),
        };

        let mut sent = 0;
        for batch in bcc.chunks(batch_size) {
            let message = MailMessage {
                from: Some(Mailbox::new(&request.from, &request.reply_to)),
                to: to.clone(),
                reply_to: Some(Mailbox::new(&to.name, &request.reply_to)),
                subject: request.subject.clone(),
                body: request.message.clone(),
                html: request.format.html(),
                bcc: batch.to_vec(),
            };

            if let Err(e) = mailer.send(&message).await {
                warn!(error = %e, sent, "bulk mail batch failed");
                return Err(ctx.fail(AdminError::Delivery(
                    "Could not send the e-mail message".to_string(),
                )));
            }
            sent += batch.len();
        }

        if sent > 0 {
            let noun = if sent == 1 { "user" } else { "users" };
            ctx.messages()
                .status(format!("Done! E-mail message has been sent to {sent} {noun}."));
        }
        Ok(sent)
    }

    /// Menu entries for the user admin panel.
    pub async fn links(&self, ctx: &AdminContext) -> AdminResult<Vec<AdminLink>> {
        let mut links = Vec::new();
        let moderate = self
            .allowed(ctx, USERS_COMPONENT, AccessLevel::Moderate)
            .await?;
        let admin = self.allowed(ctx, USERS_COMPONENT, AccessLevel::Admin).await?;

        if moderate {
            links.push(AdminLink::new("/admin/users", "Users list", "list"));

            let pending = self
                .users
                .count_pending_registrations()
                .await
                .map_err(|e| ctx.fail(AdminError::Persistence(e)))?;
            if pending > 0 {
                links.push(AdminLink::new(
                    "/admin/users/registrations",
                    format!("Pending registrations ({pending})"),
                    "plus",
                ));
            }
        }

        let create_level = if self.settings.registration_enabled {
            AccessLevel::Add
        } else {
            AccessLevel::Admin
        };
        if self.allowed(ctx, USERS_COMPONENT, create_level).await? {
            let mut create = AdminLink::new("/admin/users/new", "Create new user", "plus")
                .with_link(AdminLink::new("/admin/users/new", "Create new user", ""))
                .with_link(AdminLink::new("/admin/users/import", "Import users", ""));
            if admin {
                create = create.with_link(AdminLink::new("/admin/users/export", "Export users", ""));
            }
            links.push(create);
        }

        if moderate {
            links.push(AdminLink::new("/admin/users/search", "Find users", "search"));
        }
        if self
            .allowed(ctx, MAIL_COMPONENT, AccessLevel::Moderate)
            .await?
        {
            links.push(AdminLink::new("/admin/users/mail", "E-mail users", "envelope"));
        }
        if admin {
            links.push(AdminLink::new("/admin/users/settings", "Settings", "wrench"));
        }

        Ok(links)
    }

    /// Users whose `key` column matches any of `values`, keyed by name.
    pub async fn check_multiple_existence(
        &self,
        ctx: &AdminContext,
        key: UserLookupKey,
        values: &[String],
    ) -> AdminResult<BTreeMap<String, User>> {
        self.require(ctx, USERS_COMPONENT, "::", AccessLevel::Read)
            .await?;

        if values.is_empty() {
            return Ok(BTreeMap::new());
        }

        let users = self
            .users
            .find_any(key, values)
            .await
            .map_err(|e| ctx.fail(AdminError::Persistence(e)))?;
        Ok(users.into_iter().map(|u| (u.name.clone(), u)).collect())
    }

    /// Create accounts from import rows.
    pub async fn create_import(
        &self,
        ctx: &AdminContext,
        rows: &[ImportRow],
    ) -> AdminResult<ImportOutcome> {
        self.require(ctx, USERS_COMPONENT, "::", AccessLevel::Add)
            .await?;

        if rows.is_empty() {
            return Err(ctx.fail(AdminError::invalid("no users to import")));
        }

        let persist = |e: anyhow::Error| ctx.fail(AdminError::Persistence(e));

        let mut new_users = Vec::with_capacity(rows.len());
        for row in rows {
            new_users.push(NewUser {
                name: row.name.clone(),
                mail: row.mail.clone(),
                pass: hash_password(&row.pass).map_err(persist)?,
                activated: if row.activated {
                    activation::ACTIVE
                } else {
                    activation::PENDING_REG
                },
            });
        }

        self.users.insert_many(&new_users).await.map_err(persist)?;

        let names: Vec<String> = rows.iter().map(|r| r.name.clone()).collect();
        let created: HashMap<String, User> = match self.users.find_any(UserLookupKey::Name, &names).await {
            Ok(users) if users.len() >= names.len() => {
                users.into_iter().map(|u| (u.name.clone(), u)).collect()
            }
            Ok(_) => {
                return Err(ctx.fail(AdminError::Persistence(anyhow::anyhow!(
                    "The users have been created but could not be read back from the database; \
                     they do not belong to any group"
                ))));
            }
            Err(e) => {
                return Err(ctx.fail(AdminError::Persistence(e.context(
                    "The users have been created but could not be read back from the database; \
                     they do not belong to any group",
                ))));
            }
        };

        let mut outcome = ImportOutcome::default();
        let mut membership_failed = false;
        for row in rows {
            let Some(user) = created.get(&row.name) else {
                membership_failed = true;
                continue;
            };
            for &group in &row.groups {
                if let Err(e) = self.groups.add_user(group, user.id).await {
                    warn!(user = %user.name, %group, error = %e, "failed to add imported user to group");
                    membership_failed = true;
                }
            }
            outcome.created.push(user.clone());
        }

        if membership_failed {
            return Err(ctx.fail(AdminError::Persistence(anyhow::anyhow!(
                "The users have been created but not assigned to groups"
            ))));
        }

        for user in &outcome.created {
            let event = if user.activated == activation::PENDING_REG {
                UserEvent::RegistrationCreated(user.clone())
            } else {
                UserEvent::AccountCreated(user.clone())
            };
            self.events.publish(event);
        }

        if let Some(ref mailer) = self.mailer {
            for row in rows.iter().filter(|r| r.activated && r.send_mail) {
                match self.notify_imported(mailer.as_ref(), row).await {
                    Ok(()) => outcome.notified.push(row.name.clone()),
                    Err(e) => {
                        warn!(user = %row.name, error = %e, "import notification failed");
                        ctx.messages().error(format!(
                            "Error! A problem has occurred while sending e-mail messages. The \
                             error happened trying to send a message to the user {}. After this \
                             error, no more messages were sent.",
                            row.name
                        ));
                        outcome.notification_failed = Some(row.name.clone());
                        break;
                    }
                }
            }
        }

        info!(
            created = outcome.created.len(),
            notified = outcome.notified.len(),
            "users imported"
        );
        Ok(outcome)
    }

    async fn notify_imported(&self, mailer: &dyn Mailer, row: &ImportRow) -> anyhow::Result<()> {
        let mut context = tera::Context::new();
        context.insert("sitename", &self.settings.site_name);
        context.insert("siteurl", &self.settings.site_url);
        context.insert("uname", &row.name);
        context.insert("email", &row.mail);
        context.insert("pass", &row.pass);

        let body = self.templates.render(IMPORT_NOTIFY_TEMPLATE, &context)?;
        let mut message = MailMessage::new(
            Mailbox::new(&row.name, &row.mail),
            format!("Password for {} from {}", row.name, self.settings.site_name),
            body,
        );
        message.html = Some(true);
        mailer.send(&message).await
    }
}
