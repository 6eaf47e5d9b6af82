//! Transcript email delivery.
//!
//! [`send_transcript`] reads a session's full transcript, writes one message
//! per recipient and hands each to a [`TranscriptMailer`].

pub mod smtp;
pub mod traits;

pub use smtp::SmtpMailer;
pub use traits::{MailError, TranscriptMail, TranscriptMailer};

use crate::sessions::{SessionToken, TranscriptStore};
use chrono::NaiveDateTime;

pub const SENT_AT_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

/// Who receives the transcript and how the message is labelled.
#[derive(Debug, Clone)]
pub struct TranscriptRequest {
    pub token: SessionToken,
    pub professor_email: String,
    pub professor_name: String,
    pub extra_note: String,
    pub student_email: Option<String>,
    pub student_name: String,
    pub chatbot_name: String,
}

pub fn subject_for(student_name: &str) -> String {
    format!("Language Chatbot Conversation Transcript - {student_name}")
}

/// Plain-text body: greeting, optional student note, then the raw transcript.
pub fn compose_body(
    greeting_name: &str,
    student_name: &str,
    chatbot_name: &str,
    sent_at: &str,
    extra_note: &str,
    transcript: &str,
) -> String {
    let mut body = format!(
        "Hi {greeting_name},\n\nHere is {student_name}'s transcript for chatbot {chatbot_name} on {sent_at}.\n\nThanks\n\n"
    );
    if !extra_note.is_empty() {
        body.push_str("Additional Note from Student:\n");
        body.push_str(extra_note);
        body.push_str("\n\n");
    }
    body.push_str("--- Conversation Transcript Below ---\n\n");
    body.push_str(transcript);
    body
}

/// The professor always; the student too when their address is non-blank and
/// differs from the professor's ignoring case.
pub fn student_copy_wanted(professor_email: &str, student_email: Option<&str>) -> bool {
    student_email
        .map(str::trim)
        .is_some_and(|s| !s.is_empty() && !s.eq_ignore_ascii_case(professor_email.trim()))
}

/// Mail the transcript for `request.token`. Returns the addresses written to.
pub async fn send_transcript(
    store: &dyn TranscriptStore,
    mailer: &dyn TranscriptMailer,
    request: &TranscriptRequest,
    sent_at: NaiveDateTime,
) -> Result<Vec<String>, MailError> {
    let token = &request.token;
    if !store
        .exists(token)
        .await
        .map_err(|e| MailError::Read(e.to_string()))?
    {
        return Err(MailError::TranscriptNotFound);
    }
    let transcript = store
        .read_raw(token)
        .await
        .map_err(|e| MailError::Read(e.to_string()))?;

    let sent_at = sent_at.format(SENT_AT_FORMAT).to_string();
    let subject = subject_for(&request.student_name);
    let attachment_name = token.transcript_file_name();

    let mut recipients = vec![(request.professor_email.trim(), request.professor_name.as_str())];
    if student_copy_wanted(&request.professor_email, request.student_email.as_deref()) {
        if let Some(student_email) = request.student_email.as_deref() {
            recipients.push((student_email.trim(), request.student_name.as_str()));
        }
    }

    let mut delivered = Vec::with_capacity(recipients.len());
    for (to, greeting_name) in recipients {
        let mail = TranscriptMail {
            to: to.to_string(),
            subject: subject.clone(),
            body: compose_body(
                greeting_name,
                &request.student_name,
                &request.chatbot_name,
                &sent_at,
                &request.extra_note,
                &transcript,
            ),
            attachment_name: attachment_name.clone(),
            attachment: transcript.as_bytes().to_vec(),
        };
        mailer.deliver(&mail).await?;
        delivered.push(mail.to);
    }

    tracing::info!(
        token = %token.redacted(),
        mailer = mailer.name(),
        recipients = delivered.len(),
        "Transcript mailed"
    );
    Ok(delivered)
}
