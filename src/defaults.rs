use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

const DEFAULTS_FILE_NAME: &str = "default.json";

/// Default provider chosen with `ai-cli default set`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultSettings {
    #[serde(default)]
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_url: Option<String>,
}

impl DefaultSettings {
    pub fn is_set(&self) -> bool {
        !self.provider.trim().is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct DefaultsStore {
    path: PathBuf,
}

impl DefaultsStore {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            path: dir.join(DEFAULTS_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file yields empty settings.
    pub fn load(&self) -> Result<DefaultSettings> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(DefaultSettings::default()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("Failed to read '{}'", self.path.display()));
            }
        };

        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse '{}'", self.path.display()))
    }

    pub fn save(&self, settings: &DefaultSettings) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create '{}'", dir.display()))?;
        }

        let json = serde_json::to_string_pretty(settings)
            .context("Failed to serialize default provider settings")?;
        fs::write(&self.path, json)
            .with_context(|| format!("Failed to write '{}'", self.path.display()))?;
        debug!(
            path = %self.path.display(),
            provider = %settings.provider,
            "saved default provider"
        );
        Ok(())
    }

    /// Removing settings that were never saved is not an error.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => {
                Err(err).with_context(|| format!("Failed to remove '{}'", self.path.display()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{DefaultSettings, DefaultsStore};

    #[test]
    fn load_returns_empty_settings_when_file_is_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = DefaultsStore::in_dir(dir.path());

        let settings = store.load().expect("load should succeed");
        assert_eq!(settings, DefaultSettings::default());
        assert!(!settings.is_set());
    }

    #[test]
    fn save_then_load_preserves_provider_and_url() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = DefaultsStore::in_dir(&dir.path().join("nested"));
        let settings = DefaultSettings {
            provider: "openai".to_string(),
            provider_url: Some("http://custom:8080".to_string()),
        };

        store.save(&settings).expect("save should succeed");

        assert_eq!(store.load().expect("load"), settings);
    }

    #[test]
    fn save_omits_unset_url() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = DefaultsStore::in_dir(dir.path());
        store
            .save(&DefaultSettings {
                provider: "ollama".to_string(),
                provider_url: None,
            })
            .expect("save should succeed");

        let raw = fs::read_to_string(store.path()).expect("read");
        assert!(!raw.contains("provider_url"), "unexpected file: {raw}");
    }

    #[test]
    fn clear_removes_file_and_tolerates_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = DefaultsStore::in_dir(dir.path());
        store
            .save(&DefaultSettings {
                provider: "ollama".to_string(),
                provider_url: None,
            })
            .expect("save should succeed");

        store.clear().expect("first clear");
        assert!(!store.path().exists());
        store.clear().expect("second clear");
    }

    #[test]
    fn load_reports_corrupt_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = DefaultsStore::in_dir(dir.path());
        fs::write(store.path(), "{not json").expect("write");

        let err = store.load().expect_err("corrupt file should fail");
        assert!(format!("{err:#}").contains("Failed to parse"));
    }
}
