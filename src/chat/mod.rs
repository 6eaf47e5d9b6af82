//! Per-turn chat orchestration.
//!
//! A turn holds the session lock for its whole lifetime: read history, build
//! the system prompt, call the model, append the pair. Two submissions for the
//! same token therefore land as `U1,A1,U2,A2` and never interleave.

use crate::observability::{Observer, ObserverEvent};
use crate::providers::{sanitize_api_error, ModelSelector, Provider};
use crate::sessions::{
    build_conversation_pairs, format_context, parse_recent_exchanges_with_stats, AppendOutcome,
    SessionToken, TokenError, TranscriptStore, LIVE_TURN_PAIR_LIMIT,
};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

pub const CONCISE_PREAMBLE: &str =
    "Respond concisely, using no more than 2–3 sentences unless clarification is requested.\n\n";
pub const HISTORY_HEADER: &str = "\n\nPrevious conversation history:\n";

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("invalid session token: {0}")]
    InvalidToken(#[from] TokenError),
    #[error("Message is required")]
    EmptyMessage,
    #[error("model request failed: {0}")]
    Upstream(String),
}

/// One incoming user message.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub token: SessionToken,
    pub message: String,
    pub chatbot_prompt: String,
    pub language: Option<String>,
}

impl ChatTurn {
    /// Validate the caller's token (or mint one) and reject blank messages.
    pub fn new(
        token: Option<&str>,
        message: impl Into<String>,
        chatbot_prompt: impl Into<String>,
        language: Option<String>,
    ) -> Result<Self, ChatError> {
        let message = message.into();
        if message.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        Ok(Self {
            token: SessionToken::parse_or_generate(token)?,
            message,
            chatbot_prompt: chatbot_prompt.into(),
            language,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub response: String,
    pub token: SessionToken,
    pub model: String,
    /// Complete pairs on record after this turn, capped at the live-turn limit.
    pub conversation_length: usize,
    pub persisted: bool,
}

/// Concise-reply preamble, the chatbot's role prompt, and the history block
/// when there is any history at all.
pub fn build_system_prompt(chatbot_prompt: &str, context: &str) -> String {
    let mut prompt = String::with_capacity(
        CONCISE_PREAMBLE.len() + chatbot_prompt.len() + HISTORY_HEADER.len() + context.len(),
    );
    prompt.push_str(CONCISE_PREAMBLE);
    prompt.push_str(chatbot_prompt);
    if !context.is_empty() {
        prompt.push_str(HISTORY_HEADER);
        prompt.push_str(context);
    }
    prompt
}

pub struct ChatService {
    store: Arc<dyn TranscriptStore>,
    provider: Arc<dyn Provider>,
    selector: ModelSelector,
    observer: Arc<dyn Observer>,
    context_window: usize,
    max_output_tokens: u32,
}

impl ChatService {
    pub fn new(
        store: Arc<dyn TranscriptStore>,
        provider: Arc<dyn Provider>,
        selector: ModelSelector,
        observer: Arc<dyn Observer>,
        context_window: usize,
        max_output_tokens: u32,
    ) -> Self {
        Self {
            store,
            provider,
            selector,
            observer,
            context_window,
            max_output_tokens,
        }
    }

    pub fn store(&self) -> &Arc<dyn TranscriptStore> {
        &self.store
    }

    pub async fn respond(&self, turn: ChatTurn) -> Result<ChatReply, ChatError> {
        let token = turn.token;
        let _guard = self.store.lock(&token).await;

        let raw = self.store.read_raw(&token).await.unwrap_or_else(|e| {
            tracing::warn!(token = %token.redacted(), error = %e, "Transcript unreadable, continuing without history");
            String::new()
        });

        let (exchanges, stats) = parse_recent_exchanges_with_stats(&raw, self.context_window);
        if stats.dropped_lines > 0 {
            tracing::debug!(
                token = %token.redacted(),
                dropped = stats.dropped_lines,
                "Skipped malformed transcript lines"
            );
            self.observer.record_event(&ObserverEvent::MalformedLinesDropped {
                count: stats.dropped_lines,
            });
        }

        let context = format_context(&exchanges);
        let system_prompt = build_system_prompt(&turn.chatbot_prompt, &context);
        let model = self.selector.select(turn.language.as_deref()).to_string();

        tracing::info!(
            token = %token.redacted(),
            language = turn.language.as_deref().unwrap_or("-"),
            model = %model,
            history_lines = exchanges.len(),
            max_history_exchanges = self.context_window,
            "Chat turn"
        );
        self.observer.record_event(&ObserverEvent::LlmRequest {
            model: model.clone(),
            history_lines: exchanges.len(),
        });

        let started = Instant::now();
        let result = self
            .provider
            .chat_with_system(
                Some(&system_prompt),
                &turn.message,
                &model,
                self.max_output_tokens,
            )
            .await;
        self.observer.record_event(&ObserverEvent::LlmResponse {
            model: model.clone(),
            duration: started.elapsed(),
            success: result.is_ok(),
        });

        let response = result.map_err(|e| {
            let message = sanitize_api_error(&e.to_string());
            tracing::warn!(token = %token.redacted(), provider = self.provider.name(), error = %message, "Model request failed");
            self.observer.record_event(&ObserverEvent::Error {
                component: "provider".into(),
                message: message.clone(),
            });
            ChatError::Upstream(message)
        })?;

        let persisted = match self
            .store
            .append_exchange(&token, &turn.message, &response)
            .await
        {
            AppendOutcome::Written => {
                self.observer.record_event(&ObserverEvent::TranscriptAppended);
                true
            }
            AppendOutcome::Failed { reason } => {
                self.observer.record_event(&ObserverEvent::TranscriptAppendFailed);
                self.observer.record_event(&ObserverEvent::Error {
                    component: "transcript".into(),
                    message: reason,
                });
                false
            }
        };

        let conversation_length = match self.store.read_raw(&token).await {
            Ok(raw) => build_conversation_pairs(&raw, LIVE_TURN_PAIR_LIMIT).len(),
            Err(_) => 0,
        };

        Ok(ChatReply {
            response,
            token,
            model,
            conversation_length,
            persisted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::{NoopObserver, PrometheusObserver};
    use crate::providers::traits::scripted::ScriptedProvider;
    use crate::sessions::{FixedClock, InMemoryTranscriptStore};
    use chrono::NaiveDate;

    fn clock() -> Arc<FixedClock> {
        Arc::new(FixedClock::new(
            NaiveDate::from_ymd_opt(2025, 3, 7)
                .unwrap()
                .and_hms_opt(9, 5, 3)
                .unwrap(),
        ))
    }

    fn service(
        store: Arc<InMemoryTranscriptStore>,
        provider: Arc<ScriptedProvider>,
        window: usize,
    ) -> ChatService {
        ChatService::new(
            store,
            provider,
            ModelSelector::new("gpt-4.1", "gpt-4.1-mini", vec!["Japanese".to_string()]),
            Arc::new(NoopObserver),
            window,
            2000,
        )
    }

    fn turn(token: &SessionToken, message: &str, language: &str) -> ChatTurn {
        ChatTurn::new(
            Some(token.as_str()),
            message,
            "You are a barista.",
            Some(language.to_string()),
        )
        .unwrap()
    }

    #[test]
    fn system_prompt_without_history_has_no_history_section() {
        let prompt = build_system_prompt("You are a barista.", "");
        assert_eq!(
            prompt,
            "Respond concisely, using no more than 2–3 sentences unless clarification is requested.\n\nYou are a barista."
        );
        assert!(!prompt.contains("Previous conversation history"));
    }

    #[test]
    fn system_prompt_with_history_appends_block() {
        let prompt = build_system_prompt("Role.", "User: Hola\nAssistant: ¡Hola!");
        assert!(prompt.ends_with(
            "Role.\n\nPrevious conversation history:\nUser: Hola\nAssistant: ¡Hola!"
        ));
    }

    #[test]
    fn turn_rejects_blank_message() {
        assert!(matches!(
            ChatTurn::new(None, "   ", "p", None),
            Err(ChatError::EmptyMessage)
        ));
    }

    #[test]
    fn turn_rejects_bad_token_and_mints_missing() {
        assert!(matches!(
            ChatTurn::new(Some("../etc/passwd"), "hi", "p", None),
            Err(ChatError::InvalidToken(_))
        ));
        let minted = ChatTurn::new(None, "hi", "p", None).unwrap();
        assert_eq!(minted.token.as_str().len(), 32);
    }

    #[tokio::test]
    async fn first_turn_sends_no_history_and_persists_pair() {
        let store = Arc::new(InMemoryTranscriptStore::with_clock(clock()));
        let provider = Arc::new(ScriptedProvider::new().reply("¡Hola! ¿Qué te pongo?"));
        let svc = service(store.clone(), provider.clone(), 30);
        let token = SessionToken::generate();

        let reply = svc.respond(turn(&token, "Hola", "Spanish")).await.unwrap();
        assert_eq!(reply.response, "¡Hola! ¿Qué te pongo?");
        assert_eq!(reply.model, "gpt-4.1-mini");
        assert_eq!(reply.conversation_length, 1);
        assert!(reply.persisted);

        let calls = provider.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].message, "Hola");
        assert_eq!(calls[0].max_output_tokens, 2000);
        assert!(!calls[0]
            .system_prompt
            .as_deref()
            .unwrap()
            .contains("Previous conversation history"));

        assert_eq!(
            store.read_raw(&token).await.unwrap(),
            "07/03 09:05:03 User: Hola\n07/03 09:05:03 Assistant: ¡Hola! ¿Qué te pongo?"
        );
    }

    #[tokio::test]
    async fn history_window_limits_context() {
        let store = Arc::new(InMemoryTranscriptStore::with_clock(clock()));
        let token = SessionToken::generate();
        store.insert_raw(
            &token,
            "01/03 10:00:00 User: U1\n01/03 10:00:00 Assistant: A1\n01/03 10:01:00 User: U2\n01/03 10:01:00 Assistant: A2\n01/03 10:02:00 User: U3\n01/03 10:02:00 Assistant: A3",
        );
        let provider = Arc::new(ScriptedProvider::new().reply("A4"));
        let svc = service(store.clone(), provider.clone(), 2);

        let reply = svc.respond(turn(&token, "U4", "Spanish")).await.unwrap();
        assert_eq!(reply.conversation_length, 4);

        let system = provider.calls()[0].system_prompt.clone().unwrap();
        assert!(system.ends_with(
            "Previous conversation history:\nUser: U2\nAssistant: A2\nUser: U3\nAssistant: A3"
        ));
        assert!(!system.contains("U1"));
    }

    #[tokio::test]
    async fn complex_language_uses_advanced_model() {
        let store = Arc::new(InMemoryTranscriptStore::new());
        let provider = Arc::new(ScriptedProvider::new());
        let svc = service(store, provider.clone(), 30);

        let reply = svc
            .respond(turn(&SessionToken::generate(), "こんにちは", "Japanese"))
            .await
            .unwrap();
        assert_eq!(reply.model, "gpt-4.1");
        assert_eq!(provider.calls()[0].model, "gpt-4.1");
    }

    #[tokio::test]
    async fn upstream_failure_appends_nothing() {
        let store = Arc::new(InMemoryTranscriptStore::new());
        let provider = Arc::new(ScriptedProvider::new().fail("401 invalid key sk-abcdef123456"));
        let svc = service(store.clone(), provider, 30);
        let token = SessionToken::generate();

        let err = svc.respond(turn(&token, "Hola", "Spanish")).await.unwrap_err();
        match err {
            ChatError::Upstream(message) => {
                assert!(message.contains("[REDACTED]"));
                assert!(!message.contains("sk-abcdef123456"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!store.exists(&token).await.unwrap());
    }

    #[tokio::test]
    async fn append_failure_still_returns_reply() {
        let store = Arc::new(InMemoryTranscriptStore::new());
        store.set_fail_appends(true);
        let provider = Arc::new(ScriptedProvider::new().reply("Claro."));
        let observer = Arc::new(PrometheusObserver::new().unwrap());
        let svc = ChatService::new(
            store.clone(),
            provider,
            ModelSelector::new("gpt-4.1", "gpt-4.1-mini", Vec::new()),
            observer.clone(),
            30,
            2000,
        );

        let reply = svc
            .respond(turn(&SessionToken::generate(), "Hola", "Spanish"))
            .await
            .unwrap();
        assert_eq!(reply.response, "Claro.");
        assert!(!reply.persisted);
        assert_eq!(reply.conversation_length, 0);

        let metrics = observer.render_metrics().unwrap();
        assert!(metrics.contains("outcome=\"failed\"} 1"));
    }

    #[tokio::test]
    async fn malformed_lines_are_reported() {
        let store = Arc::new(InMemoryTranscriptStore::new());
        let token = SessionToken::generate();
        store.insert_raw(
            &token,
            "garbage line\n01/03 10:00:00 User: U1\nmore garbage\n01/03 10:00:00 Assistant: A1",
        );
        let observer = Arc::new(PrometheusObserver::new().unwrap());
        let svc = ChatService::new(
            store,
            Arc::new(ScriptedProvider::new()),
            ModelSelector::new("gpt-4.1", "gpt-4.1-mini", Vec::new()),
            observer.clone(),
            30,
            2000,
        );

        svc.respond(turn(&token, "U2", "Spanish")).await.unwrap();
        let metrics = observer.render_metrics().unwrap();
        assert!(metrics.contains("linguabot_transcript_malformed_lines_total 2"));
    }

    #[tokio::test]
    async fn concurrent_turns_for_one_token_never_interleave() {
        let store = Arc::new(InMemoryTranscriptStore::new());
        let provider = Arc::new(ScriptedProvider::new());
        let svc = Arc::new(service(store.clone(), provider, 30));
        let token = SessionToken::generate();

        let mut handles = Vec::new();
        for i in 0..8 {
            let svc = svc.clone();
            let token = token.clone();
            handles.push(tokio::spawn(async move {
                svc.respond(turn(&token, &format!("msg{i}"), "Spanish"))
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let raw = store.read_raw(&token).await.unwrap();
        let pairs = build_conversation_pairs(&raw, 100);
        assert_eq!(pairs.len(), 8);
        for pair in pairs {
            assert_eq!(pair.assistant, format!("echo: {}", pair.user));
        }
    }
}
