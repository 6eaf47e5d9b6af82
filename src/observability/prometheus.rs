use super::traits::{Observer, ObserverEvent};
use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

const LATENCY_BUCKETS: [f64; 10] = [0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0];

pub struct PrometheusObserver {
    registry: Registry,
    malformed_lines: IntCounter,
    llm_requests: IntCounterVec,
    llm_responses: IntCounterVec,
    llm_duration_seconds: Histogram,
    transcript_appends: IntCounterVec,
    transcripts_mailed: IntCounter,
    errors: IntCounterVec,
}

impl PrometheusObserver {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let malformed_lines = IntCounter::new(
            "linguabot_transcript_malformed_lines_total",
            "Transcript lines skipped because they carry no role separator",
        )?;
        registry.register(Box::new(malformed_lines.clone()))?;

        let llm_requests = IntCounterVec::new(
            Opts::new("linguabot_llm_requests_total", "Model requests by model"),
            &["model"],
        )?;
        registry.register(Box::new(llm_requests.clone()))?;

        let llm_responses = IntCounterVec::new(
            Opts::new(
                "linguabot_llm_responses_total",
                "Model responses by model and outcome",
            ),
            &["model", "success"],
        )?;
        registry.register(Box::new(llm_responses.clone()))?;

        let llm_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "linguabot_llm_duration_seconds",
                "Model call duration in seconds",
            )
            .buckets(LATENCY_BUCKETS.to_vec()),
        )?;
        registry.register(Box::new(llm_duration_seconds.clone()))?;

        let transcript_appends = IntCounterVec::new(
            Opts::new(
                "linguabot_transcript_appends_total",
                "Transcript appends by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(transcript_appends.clone()))?;

        let transcripts_mailed = IntCounter::new(
            "linguabot_transcripts_mailed_total",
            "Transcript emails sent",
        )?;
        registry.register(Box::new(transcripts_mailed.clone()))?;

        let errors = IntCounterVec::new(
            Opts::new("linguabot_errors_total", "Error events by component"),
            &["component"],
        )?;
        registry.register(Box::new(errors.clone()))?;

        Ok(Self {
            registry,
            malformed_lines,
            llm_requests,
            llm_responses,
            llm_duration_seconds,
            transcript_appends,
            transcripts_mailed,
            errors,
        })
    }

    pub fn encode(&self) -> String {
        TextEncoder::new()
            .encode_to_string(&self.registry.gather())
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "prometheus text encoding failed");
                String::new()
            })
    }
}

impl Observer for PrometheusObserver {
    fn record_event(&self, event: &ObserverEvent) {
        match event {
            ObserverEvent::MalformedLinesDropped { count } => {
                self.malformed_lines
                    .inc_by(u64::try_from(*count).unwrap_or(u64::MAX));
            }
            ObserverEvent::LlmRequest { model, .. } => {
                self.llm_requests.with_label_values(&[model.as_str()]).inc();
            }
            ObserverEvent::LlmResponse {
                model,
                duration,
                success,
            } => {
                let success = if *success { "true" } else { "false" };
                self.llm_responses
                    .with_label_values(&[model.as_str(), success])
                    .inc();
                self.llm_duration_seconds.observe(duration.as_secs_f64());
            }
            ObserverEvent::TranscriptAppended => {
                self.transcript_appends.with_label_values(&["written"]).inc();
            }
            ObserverEvent::TranscriptAppendFailed => {
                self.transcript_appends.with_label_values(&["failed"]).inc();
            }
            ObserverEvent::TranscriptMailed { .. } => {
                self.transcripts_mailed.inc();
            }
            ObserverEvent::Error { component, .. } => {
                self.errors.with_label_values(&[component.as_str()]).inc();
            }
        }
    }

    fn render_metrics(&self) -> Option<String> {
        Some(self.encode())
    }

    fn name(&self) -> &str {
        "prometheus"
    }
}
