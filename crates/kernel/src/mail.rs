//! Outgoing mail using lettre/SMTP.

use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Mailbox as LettreMailbox, MessageBuilder};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use parking_lot::Mutex;
use serde::Serialize;

use crate::config::SmtpConfig;

/// A named address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mailbox {
    pub name: String,
    pub address: String,
}

impl Mailbox {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }

    fn to_lettre(&self) -> Result<LettreMailbox> {
        let address = self
            .address
            .parse()
            .with_context(|| format!("invalid e-mail address '{}'", self.address))?;
        let name = (!self.name.is_empty()).then(|| self.name.clone());
        Ok(LettreMailbox::new(name, address))
    }
}

/// One message to deliver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailMessage {
    /// Sender. `None` uses the mailer's configured sender.
    pub from: Option<Mailbox>,
    pub to: Mailbox,
    pub reply_to: Option<Mailbox>,
    pub subject: String,
    pub body: String,
    /// `None` sends the mailer's default format (plain text).
    pub html: Option<bool>,
    pub bcc: Vec<Mailbox>,
}

impl MailMessage {
    pub fn new(to: Mailbox, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            from: None,
            to,
            reply_to: None,
            subject: subject.into(),
            body: body.into(),
            html: None,
            bcc: Vec::new(),
        }
    }
}

/// Mail transport.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &MailMessage) -> Result<()>;
}

/// Delivery over SMTP.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    /// Create a new SMTP mailer.
    ///
    /// `encryption` controls the SMTP transport mode:
    /// - `"starttls"` (default): Opportunistic STARTTLS on port 587
    /// - `"tls"`: Implicit TLS (SMTPS) on port 465
    /// - `"none"`: Unencrypted (for local dev only)
    pub fn new(config: &SmtpConfig, from: Mailbox) -> Result<Self> {
        let mut builder = match config.encryption.as_str() {
            "tls" => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .context("failed to create SMTP relay transport")?
                .port(config.port),
            "none" => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
                .port(config.port),
            _ => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .context("failed to create SMTP STARTTLS transport")?
                .port(config.port),
        };

        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    fn build(&self, message: &MailMessage) -> Result<Message> {
        let from = message.from.as_ref().unwrap_or(&self.from);
        let mut builder: MessageBuilder = Message::builder()
            .from(from.to_lettre().context("invalid from address")?)
            .to(message.to.to_lettre().context("invalid recipient address")?)
            .subject(&message.subject);

        if let Some(ref reply_to) = message.reply_to {
            builder = builder.reply_to(reply_to.to_lettre().context("invalid reply-to address")?);
        }
        for bcc in &message.bcc {
            builder = builder.bcc(bcc.to_lettre().context("invalid bcc address")?);
        }

        let content_type = if message.html == Some(true) {
            ContentType::TEXT_HTML
        } else {
            ContentType::TEXT_PLAIN
        };

        builder
            .header(content_type)
            .body(message.body.clone())
            .context("failed to build email message")
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, message: &MailMessage) -> Result<()> {
        let email = self.build(message)?;
        self.transport
            .send(email)
            .await
            .context("failed to send email")?;

        tracing::debug!(to = %message.to.address, bcc = message.bcc.len(), "email sent");
        Ok(())
    }
}

/// Mailer that records messages instead of sending them.
#[derive(Debug, Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<MailMessage>>,
    fail_after: Mutex<Option<usize>>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `count` more messages, then fail every send.
    pub fn fail_after(&self, count: usize) {
        *self.fail_after.lock() = Some(count);
    }

    pub fn sent(&self) -> Vec<MailMessage> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, message: &MailMessage) -> Result<()> {
        let mut fail_after = self.fail_after.lock();
        if let Some(remaining) = fail_after.as_mut() {
            if *remaining == 0 {
                anyhow::bail!("mail transport unavailable");
            }
            *remaining -= 1;
        }
        self.sent.lock().push(message.clone());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn smtp(host: &str, port: u16, encryption: &str) -> SmtpConfig {
        SmtpConfig {
            host: host.to_string(),
            port,
            username: None,
            password: None,
            encryption: encryption.to_string(),
        }
    }

    fn from() -> Mailbox {
        Mailbox::new("Site", "noreply@example.com")
    }

    #[test]
    fn mailer_supports_every_encryption_mode() {
        // Construction is lazy; no connection is attempted.
        assert!(SmtpMailer::new(&smtp("nonexistent.invalid", 587, "starttls"), from()).is_ok());
        assert!(SmtpMailer::new(&smtp("nonexistent.invalid", 465, "tls"), from()).is_ok());
        assert!(SmtpMailer::new(&smtp("localhost", 25, "none"), from()).is_ok());
    }

    #[test]
    fn build_message_with_bcc() {
        let mailer = SmtpMailer::new(&smtp("localhost", 25, "none"), from()).unwrap();
        let mut message = MailMessage::new(
            Mailbox::new("admin", "admin@example.com"),
            "Hello",
            "Body",
        );
        message.bcc = vec![
            Mailbox::new("a", "a@example.com"),
            Mailbox::new("", "b@example.com"),
        ];
        message.html = Some(true);

        let built = mailer.build(&message).unwrap();
        let envelope = built.envelope();
        assert_eq!(envelope.to().len(), 3);
    }

    #[test]
    fn reject_invalid_address() {
        let mailer = SmtpMailer::new(&smtp("localhost", 25, "none"), from()).unwrap();
        let message = MailMessage::new(Mailbox::new("x", "not an address"), "s", "b");
        assert!(mailer.build(&message).is_err());
    }

    #[tokio::test]
    async fn memory_mailer_failure_toggle() {
        let mailer = MemoryMailer::new();
        mailer.fail_after(1);
        let message = MailMessage::new(Mailbox::new("a", "a@example.com"), "s", "b");
        assert!(mailer.send(&message).await.is_ok());
        assert!(mailer.send(&message).await.is_err());
        assert_eq!(mailer.sent().len(), 1);
    }
}
