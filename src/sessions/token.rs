//! Opaque per-conversation session tokens.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest caller-supplied token accepted before it is used as part of a file name.
const MAX_TOKEN_LEN: usize = 128;

/// Number of random bytes behind a freshly issued token (32 hex chars).
const TOKEN_BYTES: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("session token must not be empty")]
    Empty,
    #[error("session token exceeds {MAX_TOKEN_LEN} characters")]
    TooLong,
    #[error("session token contains invalid character {0:?}")]
    InvalidChar(char),
}

/// Identifies one conversation and, through it, one transcript file.
///
/// Only `[A-Za-z0-9_-]` is accepted so a token can never escape the
/// transcript directory when spliced into a file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionToken(String);

impl SessionToken {
    /// Issue a fresh random token.
    pub fn generate() -> Self {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// Validate a caller-supplied token.
    pub fn parse(raw: &str) -> Result<Self, TokenError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(TokenError::Empty);
        }
        if trimmed.len() > MAX_TOKEN_LEN {
            return Err(TokenError::TooLong);
        }
        if let Some(bad) = trimmed
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_')))
        {
            return Err(TokenError::InvalidChar(bad));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Use the supplied token when present and non-blank, otherwise issue a new one.
    pub fn parse_or_generate(raw: Option<&str>) -> Result<Self, TokenError> {
        match raw.map(str::trim).filter(|s| !s.is_empty()) {
            Some(value) => Self::parse(value),
            None => Ok(Self::generate()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name of the transcript backing this session.
    pub fn transcript_file_name(&self) -> String {
        format!("chat_history{}.txt", self.0)
    }

    /// Redacted form for log fields.
    pub fn redacted(&self) -> String {
        crate::security::redact(&self.0)
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SessionToken {
    type Error = TokenError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SessionToken> for String {
    fn from(token: SessionToken) -> Self {
        token.0
    }
}
