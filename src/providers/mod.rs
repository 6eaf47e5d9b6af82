//! Provider subsystem for model inference backends.
//!
//! Each backend implements the [`Provider`] trait defined in [`traits`] and is
//! registered in [`create_provider`] by its canonical string key. Model choice
//! per conversation language lives in [`selector`].

pub mod compatible;
pub mod selector;
pub mod traits;

pub use compatible::OpenAiCompatibleProvider;
pub use selector::ModelSelector;
pub use traits::Provider;

use crate::config::ProviderConfig;
use std::sync::Arc;

const MAX_API_ERROR_CHARS: usize = 200;

fn is_secret_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':')
}

fn token_end(input: &str, from: usize) -> usize {
    let mut end = from;
    for (i, c) in input[from..].char_indices() {
        if is_secret_char(c) {
            end = from + i + c.len_utf8();
        } else {
            break;
        }
    }
    end
}

/// Scrub known secret-like token prefixes from provider error strings.
///
/// Redacts OpenAI-style keys (`sk-`, `sk-proj-`) and bearer values echoed
/// back by proxies.
pub fn scrub_secret_patterns(input: &str) -> String {
    const PREFIXES: [&str; 3] = ["sk-", "Bearer ", "bearer "];

    let mut scrubbed = input.to_string();

    for prefix in PREFIXES {
        let mut search_from = 0;
        loop {
            let Some(rel) = scrubbed[search_from..].find(prefix) else {
                break;
            };

            let start = search_from + rel;
            let content_start = start + prefix.len();
            let end = token_end(&scrubbed, content_start);

            if end == content_start {
                search_from = content_start;
                continue;
            }

            scrubbed.replace_range(start..end, "[REDACTED]");
            search_from = start + "[REDACTED]".len();
        }
    }

    scrubbed
}

/// Sanitize API error text by scrubbing secrets and truncating length.
pub fn sanitize_api_error(input: &str) -> String {
    let scrubbed = scrub_secret_patterns(input);

    if scrubbed.chars().count() <= MAX_API_ERROR_CHARS {
        return scrubbed;
    }

    let mut end = MAX_API_ERROR_CHARS;
    while end > 0 && !scrubbed.is_char_boundary(end) {
        end -= 1;
    }

    format!("{}...", &scrubbed[..end])
}

/// Build a sanitized provider error from a failed HTTP response.
pub async fn api_error(provider: &str, response: reqwest::Response) -> anyhow::Error {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read provider error body>".to_string());
    let sanitized = sanitize_api_error(&body);
    anyhow::anyhow!("{provider} API error ({status}): {sanitized}")
}

/// Factory: create the configured provider.
pub fn create_provider(config: &ProviderConfig) -> anyhow::Result<Arc<dyn Provider>> {
    let key = config
        .api_key
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty());
    let base_url = config
        .api_url
        .as_deref()
        .unwrap_or(compatible::DEFAULT_OPENAI_BASE_URL);

    match config.name.as_str() {
        "openai" | "openai-compatible" => Ok(Arc::new(OpenAiCompatibleProvider::new(
            &config.name,
            base_url,
            key,
        ))),
        other => anyhow::bail!(
            "Unknown provider: {other}. Supported: \"openai\", \"openai-compatible\"."
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_openai() {
        let config = ProviderConfig {
            api_key: Some("provider-test-credential".into()),
            ..ProviderConfig::default()
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.name(), "openai");
    }

    #[test]
    fn factory_openai_compatible_with_custom_url() {
        let config = ProviderConfig {
            name: "openai-compatible".into(),
            api_url: Some("http://localhost:8080/v1".into()),
            ..ProviderConfig::default()
        };
        assert_eq!(create_provider(&config).unwrap().name(), "openai-compatible");
    }

    #[test]
    fn factory_unknown_provider_errors() {
        let config = ProviderConfig {
            name: "nonexistent".into(),
            ..ProviderConfig::default()
        };
        let msg = create_provider(&config).err().unwrap().to_string();
        assert!(msg.contains("Unknown provider"));
    }

    #[test]
    fn factory_empty_name_errors() {
        let config = ProviderConfig {
            name: String::new(),
            ..ProviderConfig::default()
        };
        assert!(create_provider(&config).is_err());
    }

    // ── API error sanitization ───────────────────────────────

    #[test]
    fn sanitize_scrubs_sk_prefix() {
        let input = "request failed: sk-1234567890abcdef";
        let out = sanitize_api_error(input);
        assert!(!out.contains("sk-1234567890abcdef"));
        assert!(out.contains("[REDACTED]"));
    }

    #[test]
    fn sanitize_scrubs_project_keys_and_bearer() {
        let input = "keys sk-proj-abc_def Bearer abc.def.ghi";
        let out = sanitize_api_error(input);
        assert!(!out.contains("sk-proj-abc_def"));
        assert!(!out.contains("abc.def.ghi"));
        assert_eq!(out, "keys [REDACTED] [REDACTED]");
    }

    #[test]
    fn sanitize_truncates_long_error() {
        let long = "a".repeat(400);
        let result = sanitize_api_error(&long);
        assert!(result.len() <= 203);
        assert!(result.ends_with("..."));
    }

    #[test]
    fn sanitize_truncates_on_char_boundary() {
        let long = "é".repeat(300);
        let result = sanitize_api_error(&long);
        assert!(result.ends_with("..."));
        assert!(result.chars().count() <= 203);
    }

    #[test]
    fn sanitize_no_secret_no_change() {
        let input = "simple upstream timeout";
        assert_eq!(sanitize_api_error(input), input);
    }

    #[test]
    fn scrub_bare_prefix_is_left_alone() {
        assert_eq!(scrub_secret_patterns("prefix sk- only"), "prefix sk- only");
    }
}
