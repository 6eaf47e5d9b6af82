use super::traits::{Observer, ObserverEvent};

/// Zero-overhead observer
pub struct NoopObserver;

impl Observer for NoopObserver {
    #[inline(always)]
    fn record_event(&self, _event: &ObserverEvent) {}

    fn name(&self) -> &str {
        "noop"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_name() {
        assert_eq!(NoopObserver.name(), "noop");
    }

    #[test]
    fn noop_has_no_metrics() {
        NoopObserver.record_event(&ObserverEvent::TranscriptAppended);
        assert!(NoopObserver.render_metrics().is_none());
    }
}
