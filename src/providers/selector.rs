use crate::config::ProviderConfig;
use std::collections::HashSet;

/// Picks the advanced or base model for a conversation language.
#[derive(Debug, Clone)]
pub struct ModelSelector {
    advanced_model: String,
    base_model: String,
    complex_languages: HashSet<String>,
}

impl ModelSelector {
    pub fn new(
        advanced_model: impl Into<String>,
        base_model: impl Into<String>,
        complex_languages: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            advanced_model: advanced_model.into(),
            base_model: base_model.into(),
            complex_languages: complex_languages.into_iter().collect(),
        }
    }

    pub fn from_config(config: &ProviderConfig) -> Self {
        Self::new(
            config.advanced_model.clone(),
            config.base_model.clone(),
            config.complex_languages.iter().cloned(),
        )
    }

    /// Exact, case-sensitive membership test. A missing language gets the
    /// base model.
    pub fn select(&self, language: Option<&str>) -> &str {
        match language {
            Some(lang) if self.complex_languages.contains(lang) => &self.advanced_model,
            _ => &self.base_model,
        }
    }
}

/// Parse a JSON array of language names.
///
/// Anything that is not a JSON array of strings is logged and treated as the
/// empty list.
pub fn parse_language_list(raw: &str) -> Vec<String> {
    match serde_json::from_str::<Vec<String>>(raw) {
        Ok(languages) => languages,
        Err(e) => {
            tracing::warn!(error = %e, "Invalid complex-language list, expected a JSON array of strings");
            Vec::new()
        }
    }
}
