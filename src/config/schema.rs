use crate::providers::selector::parse_language_list;
use anyhow::{Context, Result};
use directories::UserDirs;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
#[cfg(unix)]
use tokio::fs::File;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

const CONFIG_FILE_NAME: &str = "config.toml";

// ── Top-level config ──────────────────────────────────────────────

/// Top-level linguabot configuration, loaded from `config.toml`.
///
/// Resolution order: `--config-dir` flag → `LINGUABOT_CONFIG_DIR` env → `~/.linguabot`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Config {
    /// Directory holding `config.toml`; relative data paths resolve against it.
    #[serde(skip)]
    pub config_dir: PathBuf,
    /// Path to config.toml - computed from home, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub transcript: TranscriptConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub smtp: SmtpConfig,

    #[serde(default)]
    pub prompts: PromptsConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ── Provider ─────────────────────────────────────────────────────

/// Model provider configuration (`[provider]` section).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProviderConfig {
    /// Provider key. Only `"openai"` is built in.
    #[serde(default = "default_provider_name")]
    pub name: String,
    /// API key. Prefer `OPENAI_API_KEY` over storing it here.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Base URL override for OpenAI-compatible endpoints.
    #[serde(default)]
    pub api_url: Option<String>,
    /// Model used for languages listed in `complex_languages` (default: gpt-4.1)
    #[serde(default = "default_advanced_model")]
    pub advanced_model: String,
    /// Model used for every other language (default: gpt-4.1-mini)
    #[serde(default = "default_base_model")]
    pub base_model: String,
    /// Languages routed to the advanced model. Exact, case-sensitive match.
    #[serde(default)]
    pub complex_languages: Vec<String>,
    /// Output token cap sent with every request (default: 2000)
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

fn default_provider_name() -> String {
    "openai".into()
}

fn default_advanced_model() -> String {
    "gpt-4.1".into()
}

fn default_base_model() -> String {
    "gpt-4.1-mini".into()
}

fn default_max_output_tokens() -> u32 {
    2000
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: default_provider_name(),
            api_key: None,
            api_url: None,
            advanced_model: default_advanced_model(),
            base_model: default_base_model(),
            complex_languages: Vec::new(),
            max_output_tokens: default_max_output_tokens(),
        }
    }
}

// ── Transcripts ──────────────────────────────────────────────────

/// Transcript storage configuration (`[transcript]` section).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TranscriptConfig {
    /// Directory for `chat_history<token>.txt` files. Relative paths resolve
    /// under the config directory.
    #[serde(default = "default_transcript_dir")]
    pub dir: String,
    /// Exchanges (User + Assistant pairs) fed back to the model as context.
    /// `CUTOFF_LINE_INDEX` sets it from a line count instead.
    #[serde(default = "default_context_window")]
    pub context_window: usize,
    /// Age after which `linguabot cleanup` removes transcript files.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_transcript_dir() -> String {
    "transcripts".into()
}

/// 15 exchanges, i.e. 30 transcript lines.
fn default_context_window() -> usize {
    15
}

/// Exchanges covering a line budget; an odd budget rounds up to a full exchange.
pub fn context_window_from_lines(lines: usize) -> usize {
    lines.div_ceil(2)
}

fn default_retention_days() -> u32 {
    crate::sessions::retention::DEFAULT_RETENTION_DAYS
}

impl Default for TranscriptConfig {
    fn default() -> Self {
        Self {
            dir: default_transcript_dir(),
            context_window: default_context_window(),
            retention_days: default_retention_days(),
        }
    }
}

// ── Gateway ──────────────────────────────────────────────────────

/// Gateway server configuration (`[gateway]` section).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GatewayConfig {
    /// Gateway port (default: 8034)
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    /// Gateway host (default: 0.0.0.0)
    #[serde(default = "default_gateway_host")]
    pub host: String,
    /// Maximum accepted request body in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Whole-request timeout. Must exceed the provider's 120 s HTTP timeout.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Origins allowed by CORS. Empty allows any origin.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

fn default_gateway_port() -> u16 {
    8034
}

fn default_gateway_host() -> String {
    "0.0.0.0".into()
}

fn default_max_body_bytes() -> usize {
    65_536
}

fn default_request_timeout_secs() -> u64 {
    150
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            host: default_gateway_host(),
            max_body_bytes: default_max_body_bytes(),
            request_timeout_secs: default_request_timeout_secs(),
            allowed_origins: Vec::new(),
        }
    }
}

// ── SMTP ─────────────────────────────────────────────────────────

/// Outgoing mail configuration (`[smtp]` section).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SmtpConfig {
    /// SMTP relay host. Transcript mailing is disabled while unset.
    #[serde(default)]
    pub server: Option<String>,
    /// SMTP port (default: 587, STARTTLS)
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Sender address. Falls back to `username`.
    #[serde(default)]
    pub from: Option<String>,
}

fn default_smtp_port() -> u16 {
    587
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            server: None,
            port: default_smtp_port(),
            username: None,
            password: None,
            from: None,
        }
    }
}

impl SmtpConfig {
    /// Login is attempted only when both halves of the credential are present.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let username = self.username.as_deref().map(str::trim)?;
        let password = self.password.as_deref()?;
        if username.is_empty() || password.is_empty() {
            return None;
        }
        Some((username, password))
    }

    pub fn sender(&self) -> Option<&str> {
        self.from
            .as_deref()
            .or(self.username.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

// ── Prompts ──────────────────────────────────────────────────────

/// Chatbot prompt catalog configuration (`[prompts]` section).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PromptsConfig {
    /// JSON catalog path. Relative paths resolve under the config directory.
    #[serde(default = "default_prompts_path")]
    pub path: String,
}

fn default_prompts_path() -> String {
    "prompts.json".into()
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            path: default_prompts_path(),
        }
    }
}

// ── Observability ────────────────────────────────────────────────

/// Observability backend configuration (`[observability]` section).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ObservabilityConfig {
    /// "none" | "log" | "prometheus"
    pub backend: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            backend: "log".into(),
        }
    }
}

// ── Config impl ──────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        let home =
            UserDirs::new().map_or_else(|| PathBuf::from("."), |u| u.home_dir().to_path_buf());
        let config_dir = home.join(".linguabot");

        Self {
            config_path: config_dir.join(CONFIG_FILE_NAME),
            config_dir,
            provider: ProviderConfig::default(),
            transcript: TranscriptConfig::default(),
            gateway: GatewayConfig::default(),
            smtp: SmtpConfig::default(),
            prompts: PromptsConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

fn default_config_dir() -> Result<PathBuf> {
    let home = UserDirs::new()
        .map(|u| u.home_dir().to_path_buf())
        .context("Could not find home directory")?;
    Ok(home.join(".linguabot"))
}

fn resolve_config_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        return Ok(dir.to_path_buf());
    }
    if let Some(dir) = env_first(&["LINGUABOT_CONFIG_DIR"]) {
        return Ok(PathBuf::from(dir));
    }
    default_config_dir()
}

/// First non-empty value among `keys`, in order.
fn env_first(keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| std::env::var(key).ok())
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

fn resolve_under(base: &Path, raw: &str) -> PathBuf {
    let path = PathBuf::from(raw);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

impl Config {
    pub async fn load_or_init(config_dir: Option<&Path>) -> Result<Self> {
        let config_dir = resolve_config_dir(config_dir)?;
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        fs::create_dir_all(&config_dir).await.with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let initialized = !config_path.exists();
        let mut config = if initialized {
            let config = Config {
                config_dir,
                config_path: config_path.clone(),
                ..Config::default()
            };
            config.save().await?;

            // Restrict permissions on newly created config file (may contain API keys)
            #[cfg(unix)]
            {
                use std::{fs::Permissions, os::unix::fs::PermissionsExt};
                let _ = fs::set_permissions(&config_path, Permissions::from_mode(0o600)).await;
            }
            config
        } else {
            // Warn if config file is world-readable (may contain API keys)
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Ok(meta) = fs::metadata(&config_path).await {
                    if meta.permissions().mode() & 0o004 != 0 {
                        tracing::warn!(
                            "Config file {:?} is world-readable (mode {:o}). \
                             Consider restricting with: chmod 600 {:?}",
                            config_path,
                            meta.permissions().mode() & 0o777,
                            config_path,
                        );
                    }
                }
            }

            let contents = fs::read_to_string(&config_path)
                .await
                .context("Failed to read config file")?;
            let mut config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            // Set computed paths that are skipped during serialization
            config.config_path = config_path;
            config.config_dir = config_dir;
            config
        };

        config.apply_env_overrides();
        config.validate()?;
        tracing::info!(
            path = %config.config_path.display(),
            initialized = initialized,
            "Config loaded"
        );
        Ok(config)
    }

    /// Resolved transcript directory.
    pub fn transcript_dir(&self) -> PathBuf {
        resolve_under(&self.config_dir, &self.transcript.dir)
    }

    /// Resolved prompt catalog path.
    pub fn prompts_path(&self) -> PathBuf {
        resolve_under(&self.config_dir, &self.prompts.path)
    }

    /// Validate configuration values that would cause runtime failures.
    pub fn validate(&self) -> Result<()> {
        if self.gateway.host.trim().is_empty() {
            anyhow::bail!("gateway.host must not be empty");
        }
        if self.transcript.context_window == 0 {
            anyhow::bail!("transcript.context_window must be greater than 0");
        }
        if self.transcript.dir.trim().is_empty() {
            anyhow::bail!("transcript.dir must not be empty");
        }
        if self.smtp.port == 0 {
            anyhow::bail!("smtp.port must be greater than 0");
        }
        if self.provider.max_output_tokens == 0 {
            anyhow::bail!("provider.max_output_tokens must be greater than 0");
        }
        if self.provider.advanced_model.trim().is_empty()
            || self.provider.base_model.trim().is_empty()
        {
            anyhow::bail!("provider.advanced_model and provider.base_model must not be empty");
        }
        Ok(())
    }

    /// Apply environment variable overrides to config.
    ///
    /// `LINGUABOT_*` names win over the plain legacy names.
    pub fn apply_env_overrides(&mut self) {
        if let Some(key) = env_first(&["LINGUABOT_API_KEY", "OPENAI_API_KEY"]) {
            self.provider.api_key = Some(key);
        }
        if let Some(url) = env_first(&["LINGUABOT_API_URL", "OPENAI_BASE_URL"]) {
            self.provider.api_url = Some(url);
        }
        if let Some(model) = env_first(&["LINGUABOT_ADVANCED_MODEL", "ADVANCED_MODEL"]) {
            self.provider.advanced_model = model;
        }
        if let Some(model) = env_first(&["LINGUABOT_BASE_MODEL", "BASE_MODEL"]) {
            self.provider.base_model = model;
        }
        if let Some(raw) = env_first(&["LINGUABOT_COMPLEX_LANGUAGES", "COMPLEX_MODEL_LANGUAGES"]) {
            self.provider.complex_languages = parse_language_list(&raw);
        }

        if let Some(host) = env_first(&["LINGUABOT_GATEWAY_HOST", "HOST"]) {
            self.gateway.host = host;
        }
        if let Some(port_str) = env_first(&["LINGUABOT_GATEWAY_PORT", "PORT"]) {
            match port_str.parse::<u16>() {
                Ok(port) => self.gateway.port = port,
                Err(_) => tracing::warn!(value = %port_str, "Ignoring invalid gateway port"),
            }
        }

        if let Some(window) = env_first(&["LINGUABOT_CONTEXT_WINDOW"]) {
            match window.parse::<usize>() {
                Ok(n) => self.transcript.context_window = n,
                Err(_) => tracing::warn!(value = %window, "Ignoring invalid context window"),
            }
        } else if let Some(lines) = env_first(&["CUTOFF_LINE_INDEX"]) {
            // Legacy budget counts transcript lines, two per exchange.
            match lines.parse::<usize>() {
                Ok(n) => self.transcript.context_window = context_window_from_lines(n),
                Err(_) => tracing::warn!(value = %lines, "Ignoring invalid CUTOFF_LINE_INDEX"),
            }
        }
        if let Some(dir) = env_first(&["LINGUABOT_TRANSCRIPT_DIR"]) {
            self.transcript.dir = dir;
        }

        if let Some(server) = env_first(&["LINGUABOT_SMTP_SERVER", "SMTP_SERVER"]) {
            self.smtp.server = Some(server);
        }
        if let Some(port_str) = env_first(&["LINGUABOT_SMTP_PORT", "SMTP_PORT"]) {
            match port_str.parse::<u16>() {
                Ok(port) => self.smtp.port = port,
                Err(_) => tracing::warn!(value = %port_str, "Ignoring invalid SMTP port"),
            }
        }
        if let Some(username) = env_first(&["LINGUABOT_SMTP_USERNAME", "SMTP_USERNAME"]) {
            self.smtp.username = Some(username);
        }
        if let Some(password) = env_first(&["LINGUABOT_SMTP_PASSWORD", "SMTP_PASSWORD"]) {
            self.smtp.password = Some(password);
        }

        if let Some(backend) = env_first(&["LINGUABOT_OBSERVABILITY"]) {
            self.observability.backend = backend;
        }
    }

    pub async fn save(&self) -> Result<()> {
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;

        let parent_dir = self
            .config_path
            .parent()
            .context("Config path must have a parent directory")?;

        fs::create_dir_all(parent_dir).await.with_context(|| {
            format!(
                "Failed to create config directory: {}",
                parent_dir.display()
            )
        })?;

        let file_name = self
            .config_path
            .file_name()
            .and_then(|v| v.to_str())
            .unwrap_or(CONFIG_FILE_NAME);
        let temp_path = parent_dir.join(format!(".{file_name}.tmp-{}", uuid::Uuid::new_v4()));

        let mut temp_file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to create temporary config file: {}",
                    temp_path.display()
                )
            })?;
        temp_file
            .write_all(toml_str.as_bytes())
            .await
            .context("Failed to write temporary config contents")?;
        temp_file
            .sync_all()
            .await
            .context("Failed to fsync temporary config file")?;
        drop(temp_file);

        if let Err(e) = fs::rename(&temp_path, &self.config_path).await {
            let _ = fs::remove_file(&temp_path).await;
            anyhow::bail!("Failed to atomically replace config file: {e}");
        }

        sync_directory(parent_dir).await
    }
}

pub(crate) async fn sync_directory(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        let dir = File::open(path)
            .await
            .with_context(|| format!("Failed to open directory for fsync: {}", path.display()))?;
        dir.sync_all()
            .await
            .with_context(|| format!("Failed to fsync directory metadata: {}", path.display()))?;
        Ok(())
    }

    #[cfg(not(unix))]
    {
        let _ = path;
        Ok(())
    }
}
