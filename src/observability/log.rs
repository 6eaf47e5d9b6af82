use super::traits::{Observer, ObserverEvent};
use tracing::{info, warn};

/// Log-based observer backed by `tracing`.
pub struct LogObserver;

impl LogObserver {
    pub fn new() -> Self {
        Self
    }
}

impl Observer for LogObserver {
    fn record_event(&self, event: &ObserverEvent) {
        match event {
            ObserverEvent::MalformedLinesDropped { count } => {
                warn!(count = count, "transcript.malformed_lines_dropped");
            }
            ObserverEvent::LlmRequest {
                model,
                history_lines,
            } => {
                info!(model = %model, history_lines = history_lines, "llm.request");
            }
            ObserverEvent::LlmResponse {
                model,
                duration,
                success,
            } => {
                let ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
                info!(model = %model, duration_ms = ms, success = success, "llm.response");
            }
            ObserverEvent::TranscriptAppended => {
                info!("transcript.appended");
            }
            ObserverEvent::TranscriptAppendFailed => {
                warn!("transcript.append_failed");
            }
            ObserverEvent::TranscriptMailed { recipients } => {
                info!(recipients = recipients, "transcript.mailed");
            }
            ObserverEvent::Error { component, message } => {
                warn!(component = %component, error = %message, "error");
            }
        }
    }

    fn name(&self) -> &str {
        "log"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn log_observer_name() {
        assert_eq!(LogObserver::new().name(), "log");
    }

    #[test]
    fn log_observer_all_events_no_panic() {
        let obs = LogObserver::new();
        obs.record_event(&ObserverEvent::MalformedLinesDropped { count: 3 });
        obs.record_event(&ObserverEvent::LlmRequest {
            model: "gpt-4.1-mini".into(),
            history_lines: 4,
        });
        obs.record_event(&ObserverEvent::LlmResponse {
            model: "gpt-4.1-mini".into(),
            duration: Duration::from_millis(250),
            success: true,
        });
        obs.record_event(&ObserverEvent::TranscriptAppended);
        obs.record_event(&ObserverEvent::TranscriptAppendFailed);
        obs.record_event(&ObserverEvent::TranscriptMailed { recipients: 2 });
        obs.record_event(&ObserverEvent::Error {
            component: "provider".into(),
            message: "timeout".into(),
        });
    }
}
