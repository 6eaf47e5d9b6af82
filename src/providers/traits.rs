use async_trait::async_trait;

/// A hosted language model reachable with a single system + user exchange.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Send one system prompt plus one user message and return the reply text.
    ///
    /// Implementations do not retry. Errors carry a sanitized upstream message.
    async fn chat_with_system(
        &self,
        system_prompt: Option<&str>,
        message: &str,
        model: &str,
        max_output_tokens: u32,
    ) -> anyhow::Result<String>;

    /// Provider key used in logs and error messages.
    fn name(&self) -> &str;
}

#[cfg(test)]
pub(crate) mod scripted {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// A single recorded call.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct RecordedCall {
        pub system_prompt: Option<String>,
        pub message: String,
        pub model: String,
        pub max_output_tokens: u32,
    }

    /// Replays queued replies in order and records every call.
    #[derive(Default)]
    pub struct ScriptedProvider {
        replies: Mutex<VecDeque<Result<String, String>>>,
        calls: Mutex<Vec<RecordedCall>>,
    }

    impl ScriptedProvider {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn reply(self, text: &str) -> Self {
            self.replies.lock().push_back(Ok(text.to_string()));
            self
        }

        pub fn fail(self, error: &str) -> Self {
            self.replies.lock().push_back(Err(error.to_string()));
            self
        }

        pub fn calls(&self) -> Vec<RecordedCall> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        async fn chat_with_system(
            &self,
            system_prompt: Option<&str>,
            message: &str,
            model: &str,
            max_output_tokens: u32,
        ) -> anyhow::Result<String> {
            self.calls.lock().push(RecordedCall {
                system_prompt: system_prompt.map(str::to_string),
                message: message.to_string(),
                model: model.to_string(),
                max_output_tokens,
            });
            match self.replies.lock().pop_front() {
                Some(Ok(text)) => Ok(text),
                Some(Err(error)) => Err(anyhow::anyhow!(error)),
                None => Ok(format!("echo: {message}")),
            }
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }
}
