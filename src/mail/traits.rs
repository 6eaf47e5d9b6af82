use async_trait::async_trait;
use thiserror::Error;

/// One fully composed transcript email for a single recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptMail {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub attachment_name: String,
    pub attachment: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Chat history not found")]
    TranscriptNotFound,
    #[error("Transcript mailing is not configured (smtp.server is unset)")]
    NotConfigured,
    #[error("Invalid email address: {0}")]
    Address(String),
    #[error("Failed to build email: {0}")]
    Build(String),
    #[error("Failed to send transcript: {0}")]
    Transport(String),
    #[error("Failed to read transcript: {0}")]
    Read(String),
}

/// Delivers composed transcript emails.
#[async_trait]
pub trait TranscriptMailer: Send + Sync {
    async fn deliver(&self, mail: &TranscriptMail) -> Result<(), MailError>;

    fn name(&self) -> &str;
}
