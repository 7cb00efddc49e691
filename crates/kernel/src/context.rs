//! Per-request admin context: acting user, install mode, status messages.

use parking_lot::Mutex;
use serde::Serialize;
use uuid::Uuid;

use crate::error::AdminError;
use crate::models::User;

/// The user on whose behalf an admin operation runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActingUser {
    pub id: Uuid,
    pub name: String,
    pub mail: String,
    pub is_admin: bool,
}

impl From<&User> for ActingUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            mail: user.mail.clone(),
            is_admin: user.is_admin,
        }
    }
}

/// Severity of a status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Status,
    Warning,
    Error,
}

/// A message registered for display to the administrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusMessage {
    pub kind: MessageKind,
    pub text: String,
}

/// Collects status, warning, and error messages during a request.
#[derive(Debug, Default)]
pub struct StatusLog {
    messages: Mutex<Vec<StatusMessage>>,
}

impl StatusLog {
    pub fn status(&self, text: impl Into<String>) {
        let text = text.into();
        tracing::info!(message = %text, "status");
        self.push(MessageKind::Status, text);
    }

    pub fn warning(&self, text: impl Into<String>) {
        let text = text.into();
        tracing::warn!(message = %text, "warning");
        self.push(MessageKind::Warning, text);
    }

    pub fn error(&self, text: impl Into<String>) {
        let text = text.into();
        tracing::warn!(message = %text, "error registered");
        self.push(MessageKind::Error, text);
    }

    fn push(&self, kind: MessageKind, text: String) {
        self.messages.lock().push(StatusMessage { kind, text });
    }

    /// Snapshot of all messages registered so far.
    pub fn messages(&self) -> Vec<StatusMessage> {
        self.messages.lock().clone()
    }

    /// Messages of one kind, in registration order.
    pub fn of_kind(&self, kind: MessageKind) -> Vec<String> {
        self.messages
            .lock()
            .iter()
            .filter(|m| m.kind == kind)
            .map(|m| m.text.clone())
            .collect()
    }

    /// Take all messages, leaving the log empty.
    pub fn drain(&self) -> Vec<StatusMessage> {
        std::mem::take(&mut *self.messages.lock())
    }
}

/// Explicit context handed to every admin operation.
#[derive(Debug, Default)]
pub struct AdminContext {
    user: Option<ActingUser>,
    installing: bool,
    messages: StatusLog,
}

impl AdminContext {
    /// Context for a logged-in user.
    pub fn new(user: ActingUser) -> Self {
        Self {
            user: Some(user),
            installing: false,
            messages: StatusLog::default(),
        }
    }

    /// Context for an unauthenticated request.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Context for the installer, which may regenerate the theme
    /// registry before any permissions exist.
    pub fn installer() -> Self {
        Self {
            user: None,
            installing: true,
            messages: StatusLog::default(),
        }
    }

    pub fn user(&self) -> Option<&ActingUser> {
        self.user.as_ref()
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.user.as_ref().map(|u| u.id)
    }

    pub fn is_installing(&self) -> bool {
        self.installing
    }

    pub fn messages(&self) -> &StatusLog {
        &self.messages
    }

    /// Register the user-facing message of `err` and hand the error back.
    pub fn fail(&self, err: AdminError) -> AdminError {
        self.messages.error(err.user_message());
        err
    }
}
