//! Chatbot prompt catalog.
//!
//! A single JSON object keyed by chatbot title. Reads are tolerant: a missing
//! or unparsable file is an empty catalog. Writes replace the whole file.

use crate::config::schema::sync_directory;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// One chatbot definition as stored in the catalog.
///
/// Fields are kept as whatever JSON the editor sent (`"level": 3` is as
/// valid as `"level": "A1"`), and unknown keys survive a rewrite.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatbotPrompt {
    #[serde(default)]
    pub name: Option<Value>,
    #[serde(default)]
    pub language: Option<Value>,
    #[serde(default)]
    pub level: Option<Value>,
    #[serde(default, rename = "initialText")]
    pub initial_text: Option<Value>,
    #[serde(default)]
    pub prompt: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatbotPrompt {
    /// The role prompt sent to the model, empty when unset or not a string.
    pub fn prompt_text(&self) -> &str {
        self.prompt
            .as_ref()
            .and_then(Value::as_str)
            .unwrap_or_default()
    }
}

pub type Catalog = BTreeMap<String, ChatbotPrompt>;

/// Decode entries one at a time so a single bad entry does not hide the rest.
fn decode_catalog(path: &Path, entries: Map<String, Value>) -> Catalog {
    entries
        .into_iter()
        .filter_map(|(title, entry)| match serde_json::from_value(entry) {
            Ok(prompt) => Some((title, prompt)),
            Err(e) => {
                tracing::warn!(path = %path.display(), title = %title, error = %e, "Skipping malformed prompt entry");
                None
            }
        })
        .collect()
}

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("Prompt not found: {0}")]
    NotFound(String),
    #[error("A prompt with this title already exists: {0}")]
    Conflict(String),
    #[error("prompt catalog I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("prompt catalog serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub struct PromptCatalog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl PromptCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whole catalog. Missing or corrupt file → empty.
    pub async fn load(&self) -> Catalog {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Catalog::new(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to read prompt catalog");
                return Catalog::new();
            }
        };
        match serde_json::from_str::<Map<String, Value>>(&raw) {
            Ok(entries) => decode_catalog(&self.path, entries),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Prompt catalog is not valid JSON, treating as empty");
                Catalog::new()
            }
        }
    }

    pub async fn get(&self, title: &str) -> Option<ChatbotPrompt> {
        self.load().await.remove(title)
    }

    /// Add a new chatbot. Fails with [`PromptError::Conflict`] if the title exists.
    pub async fn insert(&self, title: &str, prompt: ChatbotPrompt) -> Result<(), PromptError> {
        let _guard = self.write_lock.lock().await;
        let mut catalog = self.load().await;
        if catalog.contains_key(title) {
            return Err(PromptError::Conflict(title.to_string()));
        }
        catalog.insert(title.to_string(), prompt);
        self.write(&catalog).await
    }

    /// Replace an existing chatbot wholesale.
    pub async fn update(&self, title: &str, prompt: ChatbotPrompt) -> Result<(), PromptError> {
        let _guard = self.write_lock.lock().await;
        let mut catalog = self.load().await;
        let Some(slot) = catalog.get_mut(title) else {
            return Err(PromptError::NotFound(title.to_string()));
        };
        *slot = prompt;
        self.write(&catalog).await
    }

    pub async fn remove(&self, title: &str) -> Result<(), PromptError> {
        let _guard = self.write_lock.lock().await;
        let mut catalog = self.load().await;
        if catalog.remove(title).is_none() {
            return Err(PromptError::NotFound(title.to_string()));
        }
        self.write(&catalog).await
    }

    async fn write(&self, catalog: &Catalog) -> Result<(), PromptError> {
        let json = serde_json::to_string_pretty(catalog)?;
        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent).await?;

        let file_name = self
            .path
            .file_name()
            .and_then(|v| v.to_str())
            .unwrap_or("prompts.json");
        let temp_path = parent.join(format!(".{file_name}.tmp-{}", uuid::Uuid::new_v4()));

        let mut temp_file = fs::File::create(&temp_path).await?;
        temp_file.write_all(json.as_bytes()).await?;
        temp_file.sync_all().await?;
        drop(temp_file);

        if let Err(e) = fs::rename(&temp_path, &self.path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        if let Err(e) = sync_directory(parent).await {
            tracing::debug!(error = %e, "Prompt catalog directory fsync skipped");
        }
        tracing::info!(path = %self.path.display(), entries = catalog.len(), "Prompt catalog saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample(language: &str) -> ChatbotPrompt {
        ChatbotPrompt {
            name: Some(json!("Café Barista")),
            language: Some(json!(language)),
            level: Some(json!("A2")),
            initial_text: Some(json!("¡Hola! ¿Qué te pongo?")),
            prompt: Some(json!("You are a barista in Madrid.\nStay in character.")),
            extra: Map::new(),
        }
    }

    fn catalog_in(dir: &tempfile::TempDir) -> PromptCatalog {
        PromptCatalog::new(dir.path().join("prompts.json"))
    }

    #[tokio::test]
    async fn missing_file_is_empty_catalog() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(catalog_in(&tmp).load().await.is_empty());
    }

    #[tokio::test]
    async fn corrupt_file_is_empty_catalog() {
        let tmp = tempfile::tempdir().unwrap();
        let catalog = catalog_in(&tmp);
        fs::write(catalog.path(), "{not json").await.unwrap();
        assert!(catalog.load().await.is_empty());
    }

    #[tokio::test]
    async fn reads_existing_camel_case_file() {
        let tmp = tempfile::tempdir().unwrap();
        let catalog = catalog_in(&tmp);
        fs::write(
            catalog.path(),
            r#"{"Barista": {"name": "Ana", "language": "Spanish", "level": null, "initialText": "Hola", "prompt": "Be a barista."}}"#,
        )
        .await
        .unwrap();

        let entry = catalog.get("Barista").await.unwrap();
        assert_eq!(entry.initial_text, Some(json!("Hola")));
        assert_eq!(entry.level, None);
        assert_eq!(entry.prompt_text(), "Be a barista.");
    }

    #[tokio::test]
    async fn non_string_fields_load_and_survive_insert() {
        let tmp = tempfile::tempdir().unwrap();
        let catalog = catalog_in(&tmp);
        fs::write(
            catalog.path(),
            r#"{"Barista": {"name": "Ana", "level": 3, "prompt": "Be a barista.", "tags": ["food"]}}"#,
        )
        .await
        .unwrap();

        let entry = catalog.get("Barista").await.unwrap();
        assert_eq!(entry.level, Some(json!(3)));
        assert_eq!(entry.extra.get("tags"), Some(&json!(["food"])));

        catalog.insert("Tutor", sample("French")).await.unwrap();
        let raw: Value = serde_json::from_str(&fs::read_to_string(catalog.path()).await.unwrap()).unwrap();
        assert_eq!(raw["Barista"]["level"], json!(3));
        assert_eq!(raw["Barista"]["tags"], json!(["food"]));
        assert_eq!(raw["Tutor"]["language"], json!("French"));
    }

    #[tokio::test]
    async fn malformed_entry_is_skipped_not_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let catalog = catalog_in(&tmp);
        fs::write(
            catalog.path(),
            r#"{"Broken": "just a string", "Barista": {"prompt": "Be a barista."}}"#,
        )
        .await
        .unwrap();

        let loaded = catalog.load().await;
        assert_eq!(loaded.keys().collect::<Vec<_>>(), vec!["Barista"]);
        assert_eq!(loaded["Barista"].prompt_text(), "Be a barista.");
    }

    #[test]
    fn non_string_prompt_reads_as_empty() {
        let entry = ChatbotPrompt {
            prompt: Some(json!(42)),
            ..ChatbotPrompt::default()
        };
        assert_eq!(entry.prompt_text(), "");
    }

    #[tokio::test]
    async fn insert_then_get() {
        let tmp = tempfile::tempdir().unwrap();
        let catalog = catalog_in(&tmp);
        catalog.insert("Barista", sample("Spanish")).await.unwrap();

        assert_eq!(catalog.get("Barista").await, Some(sample("Spanish")));
        let raw = fs::read_to_string(catalog.path()).await.unwrap();
        assert!(raw.contains("\"initialText\""));
        assert!(raw.contains("¡Hola!"));
    }

    #[tokio::test]
    async fn insert_existing_title_conflicts() {
        let tmp = tempfile::tempdir().unwrap();
        let catalog = catalog_in(&tmp);
        catalog.insert("Barista", sample("Spanish")).await.unwrap();

        let err = catalog.insert("Barista", sample("French")).await.unwrap_err();
        assert!(matches!(err, PromptError::Conflict(_)));
        assert_eq!(
            catalog.get("Barista").await.unwrap().language,
            Some(json!("Spanish"))
        );
    }

    #[tokio::test]
    async fn update_replaces_existing_entry() {
        let tmp = tempfile::tempdir().unwrap();
        let catalog = catalog_in(&tmp);
        catalog.insert("Barista", sample("Spanish")).await.unwrap();
        catalog.update("Barista", sample("French")).await.unwrap();

        assert_eq!(
            catalog.get("Barista").await.unwrap().language,
            Some(json!("French"))
        );
    }

    #[tokio::test]
    async fn update_missing_title_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let err = catalog_in(&tmp)
            .update("Ghost", sample("Spanish"))
            .await
            .unwrap_err();
        assert!(matches!(err, PromptError::NotFound(_)));
    }

    #[tokio::test]
    async fn remove_deletes_and_reports_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let catalog = catalog_in(&tmp);
        catalog.insert("Barista", sample("Spanish")).await.unwrap();
        catalog.insert("Tutor", sample("German")).await.unwrap();

        catalog.remove("Barista").await.unwrap();
        let remaining = catalog.load().await;
        assert_eq!(remaining.keys().collect::<Vec<_>>(), vec!["Tutor"]);

        assert!(matches!(
            catalog.remove("Barista").await.unwrap_err(),
            PromptError::NotFound(_)
        ));
    }
}
