pub mod schema;

pub use schema::{
    Config, GatewayConfig, ObservabilityConfig, PromptsConfig, ProviderConfig, SmtpConfig,
    TranscriptConfig,
};
