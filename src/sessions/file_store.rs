//! Flat-file transcript store: one `chat_history<token>.txt` per session.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use super::clock::Clock;
use super::locks::TokenLocks;
use super::token::SessionToken;
use super::transcript::render_pair;
use super::traits::{AppendOutcome, TranscriptLock, TranscriptStore};

pub struct FileTranscriptStore {
    dir: PathBuf,
    clock: Arc<dyn Clock>,
    locks: TokenLocks,
}

impl FileTranscriptStore {
    pub fn new(dir: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            dir: dir.into(),
            clock,
            locks: TokenLocks::new(),
        }
    }

    /// Path of the transcript file for `token`.
    pub fn path_for(&self, token: &SessionToken) -> PathBuf {
        self.dir.join(token.transcript_file_name())
    }

    async fn write_pair(&self, path: &Path, chunk_for: impl FnOnce(bool) -> String) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir).await?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        let continues_file = file.metadata().await?.len() > 0;
        file.write_all(chunk_for(continues_file).as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl TranscriptStore for FileTranscriptStore {
    async fn lock(&self, token: &SessionToken) -> TranscriptLock {
        self.locks.acquire(token).await
    }

    async fn read_raw(&self, token: &SessionToken) -> Result<String> {
        let path = self.path_for(token);
        match fs::read(&path).await {
            Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to read transcript: {}", path.display())),
        }
    }

    async fn append_exchange(
        &self,
        token: &SessionToken,
        user_message: &str,
        assistant_message: &str,
    ) -> AppendOutcome {
        let path = self.path_for(token);

        if user_message.contains('\n') || assistant_message.contains('\n') {
            tracing::warn!(
                token = %token.redacted(),
                "message contains a newline; transcript line boundaries will not round-trip"
            );
        }

        let stamp = self.clock.stamp();
        let result = self
            .write_pair(&path, |continues_file| {
                render_pair(&stamp, user_message, assistant_message, continues_file)
            })
            .await;

        match result {
            Ok(()) => {
                tracing::debug!(
                    token = %token.redacted(),
                    path = %path.display(),
                    "transcript pair appended"
                );
                AppendOutcome::Written
            }
            Err(e) => {
                tracing::error!(
                    token = %token.redacted(),
                    path = %path.display(),
                    error = %e,
                    "failed to write transcript; check permissions on the transcript directory"
                );
                AppendOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn clear(&self, token: &SessionToken) -> Result<()> {
        let path = self.path_for(token);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to delete transcript: {}", path.display())),
        }
    }

    async fn exists(&self, token: &SessionToken) -> Result<bool> {
        let path = self.path_for(token);
        fs::try_exists(&path)
            .await
            .with_context(|| format!("Failed to stat transcript: {}", path.display()))
    }

    fn name(&self) -> &str {
        "file"
    }
}
