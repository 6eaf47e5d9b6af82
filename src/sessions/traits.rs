//! Transcript storage traits and record types.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::token::SessionToken;

/// Who authored a transcript line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Speaker {
    User,
    Assistant,
}

impl Speaker {
    /// Role label exactly as written to the transcript file.
    pub fn label(self) -> &'static str {
        match self {
            Speaker::User => "User",
            Speaker::Assistant => "Assistant",
        }
    }
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One transcript line: a single message from one speaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    /// `DD/MM HH:MM:SS` prefix as stored. Informational only.
    pub timestamp: Option<String>,
    pub speaker: Speaker,
    pub message: String,
}

impl Exchange {
    pub fn new(speaker: Speaker, message: impl Into<String>) -> Self {
        Self {
            timestamp: None,
            speaker,
            message: message.into(),
        }
    }
}

/// A complete user turn and its reply, as shown to people.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationPair {
    pub user: String,
    pub assistant: String,
}

/// Result of a best-effort transcript append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    Written,
    Failed { reason: String },
}

impl AppendOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, AppendOutcome::Written)
    }
}

/// Exclusive hold on one session's transcript. Released on drop.
pub type TranscriptLock = tokio::sync::OwnedMutexGuard<()>;

/// Durable per-session transcript storage.
///
/// Reads never fail on a missing transcript (it is simply empty), appends
/// never fail the caller (see [`AppendOutcome`]), and clearing is idempotent.
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    /// Acquire the per-session lock. Hold it across read → append to keep
    /// concurrent turns for the same token from interleaving.
    async fn lock(&self, token: &SessionToken) -> TranscriptLock;

    /// Full raw transcript text. Missing transcript → empty string.
    async fn read_raw(&self, token: &SessionToken) -> Result<String>;

    /// Append one User line and one Assistant line sharing a timestamp.
    async fn append_exchange(
        &self,
        token: &SessionToken,
        user_message: &str,
        assistant_message: &str,
    ) -> AppendOutcome;

    /// Delete the transcript. Succeeds when nothing exists.
    async fn clear(&self, token: &SessionToken) -> Result<()>;

    /// Whether any transcript has been written for this session.
    async fn exists(&self, token: &SessionToken) -> Result<bool>;

    /// The name of this store implementation.
    fn name(&self) -> &str;
}
