//! In-memory transcript store implementation.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::clock::{Clock, SystemClock};
use super::locks::TokenLocks;
use super::token::SessionToken;
use super::transcript::render_pair;
use super::traits::{AppendOutcome, TranscriptLock, TranscriptStore};

/// A transcript store backed by a mutex-protected hash map of raw text.
///
/// Renders exactly what [`super::FileTranscriptStore`] would write, which
/// makes it a drop-in for tests and for ephemeral deployments.
pub struct InMemoryTranscriptStore {
    transcripts: Mutex<HashMap<SessionToken, String>>,
    clock: Arc<dyn Clock>,
    locks: TokenLocks,
    fail_appends: AtomicBool,
}

impl InMemoryTranscriptStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            transcripts: Mutex::new(HashMap::new()),
            clock,
            locks: TokenLocks::new(),
            fail_appends: AtomicBool::new(false),
        }
    }

    /// Seed a transcript verbatim.
    pub fn insert_raw(&self, token: &SessionToken, raw: impl Into<String>) {
        self.transcripts.lock().insert(token.clone(), raw.into());
    }

    /// Make every subsequent append report failure.
    pub fn set_fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }
}

impl Default for InMemoryTranscriptStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TranscriptStore for InMemoryTranscriptStore {
    async fn lock(&self, token: &SessionToken) -> TranscriptLock {
        self.locks.acquire(token).await
    }

    async fn read_raw(&self, token: &SessionToken) -> Result<String> {
        let transcripts = self.transcripts.lock();
        Ok(transcripts.get(token).cloned().unwrap_or_default())
    }

    async fn append_exchange(
        &self,
        token: &SessionToken,
        user_message: &str,
        assistant_message: &str,
    ) -> AppendOutcome {
        if self.fail_appends.load(Ordering::SeqCst) {
            tracing::error!(token = %token.redacted(), "in-memory append rejected");
            return AppendOutcome::Failed {
                reason: "appends disabled".to_string(),
            };
        }

        let stamp = self.clock.stamp();
        let mut transcripts = self.transcripts.lock();
        let raw = transcripts.entry(token.clone()).or_default();
        let continues_file = !raw.is_empty();
        raw.push_str(&render_pair(
            &stamp,
            user_message,
            assistant_message,
            continues_file,
        ));
        AppendOutcome::Written
    }

    async fn clear(&self, token: &SessionToken) -> Result<()> {
        self.transcripts.lock().remove(token);
        Ok(())
    }

    async fn exists(&self, token: &SessionToken) -> Result<bool> {
        Ok(self.transcripts.lock().contains_key(token))
    }

    fn name(&self) -> &str {
        "in_memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sessions::clock::FixedClock;
    use crate::sessions::transcript::parse_recent_exchanges;
    use chrono::NaiveDate;

    fn test_token() -> SessionToken {
        SessionToken::parse("feedface").unwrap()
    }

    #[tokio::test]
    async fn read_returns_empty_for_missing_session() {
        let store = InMemoryTranscriptStore::new();
        assert_eq!(store.read_raw(&test_token()).await.unwrap(), "");
        assert!(!store.exists(&test_token()).await.unwrap());
    }

    #[tokio::test]
    async fn append_and_retrieve() {
        let clock = Arc::new(FixedClock::new(
            NaiveDate::from_ymd_opt(2024, 12, 31)
                .unwrap()
                .and_hms_opt(23, 59, 0)
                .unwrap(),
        ));
        let store = InMemoryTranscriptStore::with_clock(clock);
        let key = test_token();

        for i in 0..5 {
            store
                .append_exchange(&key, &format!("question {i}"), &format!("answer {i}"))
                .await;
        }

        let raw = store.read_raw(&key).await.unwrap();
        assert!(raw.starts_with("31/12 23:59:00 User: question 0\n"));
        assert!(!raw.ends_with('\n'));

        // Window returns the most recent exchanges
        let last_two = parse_recent_exchanges(&raw, 2);
        assert_eq!(last_two.len(), 4);
        assert_eq!(last_two[0].message, "question 3");
        assert_eq!(last_two[3].message, "answer 4");
    }

    #[tokio::test]
    async fn clear_removes_transcript() {
        let store = InMemoryTranscriptStore::new();
        let key = test_token();
        store.append_exchange(&key, "hello", "hi").await;

        store.clear(&key).await.unwrap();
        assert!(store.read_raw(&key).await.unwrap().is_empty());
        store.clear(&key).await.unwrap();
    }

    #[tokio::test]
    async fn failing_appends_leave_transcript_untouched() {
        let store = InMemoryTranscriptStore::new();
        let key = test_token();
        store.set_fail_appends(true);

        let outcome = store.append_exchange(&key, "hello", "hi").await;
        assert!(!outcome.is_written());
        assert!(!store.exists(&key).await.unwrap());
    }
}
