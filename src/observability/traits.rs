use std::time::Duration;

/// Discrete events emitted around a chat turn.
///
/// Events carry counts, model names and durations only. Message text and
/// session tokens never go into an event.
#[derive(Debug, Clone)]
pub enum ObserverEvent {
    /// Transcript lines without a role separator were skipped while
    /// building context.
    MalformedLinesDropped { count: usize },
    /// A request is about to be sent to the model provider.
    LlmRequest { model: String, history_lines: usize },
    /// Result of a single model call.
    LlmResponse {
        model: String,
        duration: Duration,
        success: bool,
    },
    /// A User/Assistant pair reached the transcript.
    TranscriptAppended,
    /// A transcript append failed; the reply was still delivered.
    TranscriptAppendFailed,
    /// A transcript was mailed to `recipients` addresses.
    TranscriptMailed { recipients: usize },
    /// An error occurred in a named component.
    Error {
        /// Subsystem where the error originated (e.g., `"provider"`, `"mail"`).
        component: String,
        /// Human-readable error description. Must not contain secrets or tokens.
        message: String,
    },
}

/// Core observability trait.
///
/// Implementations must be `Send + Sync + 'static` because the observer is
/// shared across request handlers via `Arc`.
pub trait Observer: Send + Sync + 'static {
    /// Record a discrete event. Called synchronously on the request path.
    fn record_event(&self, event: &ObserverEvent);

    /// Text exposition of collected metrics, if this backend keeps any.
    fn render_metrics(&self) -> Option<String> {
        None
    }

    /// Return the human-readable name of this observer backend.
    fn name(&self) -> &str;
}
