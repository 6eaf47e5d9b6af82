use super::traits::{MailError, TranscriptMail, TranscriptMailer};
use crate::config::SmtpConfig;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

/// SMTP delivery over a STARTTLS relay.
pub struct SmtpMailer {
    server: String,
    port: u16,
    from: Mailbox,
    credentials: Option<Credentials>,
}

impl SmtpMailer {
    pub fn from_config(config: &SmtpConfig) -> Result<Self, MailError> {
        let server = config
            .server
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(MailError::NotConfigured)?;
        let from = config
            .sender()
            .ok_or_else(|| MailError::Address("no sender: set smtp.from or smtp.username".into()))?;
        let from = parse_mailbox(from)?;
        let credentials = config
            .credentials()
            .map(|(user, pass)| Credentials::new(user.to_string(), pass.to_string()));

        Ok(Self {
            server: server.to_string(),
            port: config.port,
            from,
            credentials,
        })
    }

    fn transport(&self) -> Result<SmtpTransport, MailError> {
        let mut builder = SmtpTransport::starttls_relay(&self.server)
            .map_err(|e| MailError::Transport(e.to_string()))?
            .port(self.port);
        if let Some(creds) = &self.credentials {
            builder = builder.credentials(creds.clone());
        }
        Ok(builder.build())
    }
}

fn parse_mailbox(raw: &str) -> Result<Mailbox, MailError> {
    raw.trim()
        .parse::<Mailbox>()
        .map_err(|e| MailError::Address(format!("{raw}: {e}")))
}

/// Plain-text body plus the raw transcript as an attachment.
pub(crate) fn build_message(from: &Mailbox, mail: &TranscriptMail) -> Result<Message, MailError> {
    let attachment_type = ContentType::parse("application/octet-stream")
        .map_err(|e| MailError::Build(e.to_string()))?;

    Message::builder()
        .from(from.clone())
        .to(parse_mailbox(&mail.to)?)
        .subject(mail.subject.as_str())
        .multipart(
            MultiPart::mixed()
                .singlepart(SinglePart::plain(mail.body.clone()))
                .singlepart(
                    Attachment::new(mail.attachment_name.clone())
                        .body(mail.attachment.clone(), attachment_type),
                ),
        )
        .map_err(|e| MailError::Build(e.to_string()))
}

#[async_trait]
impl TranscriptMailer for SmtpMailer {
    async fn deliver(&self, mail: &TranscriptMail) -> Result<(), MailError> {
        let message = build_message(&self.from, mail)?;
        let transport = self.transport()?;

        tokio::task::spawn_blocking(move || transport.send(&message))
            .await
            .map_err(|e| MailError::Transport(format!("mail task failed: {e}")))?
            .map_err(|e| MailError::Transport(e.to_string()))?;

        tracing::info!(server = %self.server, port = self.port, "Transcript email sent");
        Ok(())
    }

    fn name(&self) -> &str {
        "smtp"
    }
}
