//! Per-token mutual exclusion for transcript writers.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use super::token::SessionToken;
use super::traits::TranscriptLock;

/// Lazily created async mutex per session token.
///
/// Entries nobody holds are pruned on the next acquire, so the table only
/// grows with the number of sessions that are active at the same time.
#[derive(Default)]
pub struct TokenLocks {
    locks: Mutex<HashMap<SessionToken, Arc<tokio::sync::Mutex<()>>>>,
}

impl TokenLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, token: &SessionToken) -> TranscriptLock {
        let lock = {
            let mut locks = self.locks.lock();
            locks.retain(|key, lock| key == token || Arc::strong_count(lock) > 1);
            locks
                .entry(token.clone())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Number of tokens currently tracked.
    pub fn tracked(&self) -> usize {
        self.locks.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_token_is_exclusive() {
        let locks = Arc::new(TokenLocks::new());
        let token = SessionToken::parse("abc").unwrap();

        let guard = locks.acquire(&token).await;
        let contender = {
            let locks = Arc::clone(&locks);
            let token = token.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(&token).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn different_tokens_do_not_block() {
        let locks = TokenLocks::new();
        let a = SessionToken::parse("aaa").unwrap();
        let b = SessionToken::parse("bbb").unwrap();

        let _ga = locks.acquire(&a).await;
        let gb = tokio::time::timeout(Duration::from_millis(100), locks.acquire(&b)).await;
        assert!(gb.is_ok());
    }

    #[tokio::test]
    async fn idle_entries_are_pruned() {
        let locks = TokenLocks::new();
        for raw in ["t1", "t2", "t3"] {
            let token = SessionToken::parse(raw).unwrap();
            drop(locks.acquire(&token).await);
        }
        assert_eq!(locks.tracked(), 1);
    }
}
