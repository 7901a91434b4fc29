use serde::{Deserialize, Serialize};
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::services::storage::KeyValueStore;

const SETTINGS_KEY: &str = "apiBaseUrl";

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub api_base_url: String,
}

/// User-editable settings with a deployment default.
#[derive(Clone)]
pub struct SettingsStore {
    storage: Rc<dyn KeyValueStore>,
    default_api_base_url: String,
}

impl SettingsStore {
    pub fn new(storage: Rc<dyn KeyValueStore>, default_api_base_url: impl Into<String>) -> Self {
        Self {
            storage,
            default_api_base_url: default_api_base_url.into(),
        }
    }

    pub fn defaults(&self) -> Settings {
        Settings {
            api_base_url: self.default_api_base_url.clone(),
        }
    }

    /// Saved settings, or the defaults when nothing (or an empty URL) is stored.
    pub async fn get(&self) -> Result<Settings> {
        let stored = self.storage.get(SETTINGS_KEY).await?;
        let api_base_url = stored
            .as_ref()
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.default_api_base_url.clone());
        Ok(Settings { api_base_url })
    }

    /// Persist settings. An empty URL resets to the default.
    pub async fn set(&self, settings: Settings) -> Result<Settings> {
        let api_base_url = settings.api_base_url.trim();
        let api_base_url = if api_base_url.is_empty() {
            self.default_api_base_url.clone()
        } else {
            url::Url::parse(api_base_url).map_err(|e| {
                Error::precondition(format!("Invalid API base URL {:?}: {}", api_base_url, e))
            })?;
            api_base_url.to_string()
        };

        self.storage
            .set(SETTINGS_KEY, serde_json::Value::String(api_base_url.clone()))
            .await?;
        Ok(Settings { api_base_url })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::storage::MemoryStorage;

    const DEFAULT: &str = "http://localhost:8000/api";

    fn store() -> (Rc<MemoryStorage>, SettingsStore) {
        let storage = Rc::new(MemoryStorage::new());
        let settings = SettingsStore::new(storage.clone(), DEFAULT);
        (storage, settings)
    }

    #[tokio::test]
    async fn test_lazily_defaulted() {
        let (storage, settings) = store();
        assert_eq!(settings.get().await.unwrap().api_base_url, DEFAULT);
        assert!(storage.snapshot(SETTINGS_KEY).is_none());
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let (_, settings) = store();
        settings
            .set(Settings {
                api_base_url: " https://monitor.example/api ".into(),
            })
            .await
            .unwrap();
        assert_eq!(
            settings.get().await.unwrap().api_base_url,
            "https://monitor.example/api"
        );
    }

    #[tokio::test]
    async fn test_empty_url_resets_to_default() {
        let (storage, settings) = store();
        settings
            .set(Settings {
                api_base_url: "https://monitor.example/api".into(),
            })
            .await
            .unwrap();

        let saved = settings.set(Settings::default()).await.unwrap();
        assert_eq!(saved.api_base_url, DEFAULT);
        assert_eq!(storage.snapshot(SETTINGS_KEY).unwrap(), DEFAULT);
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected_and_not_stored() {
        let (storage, settings) = store();
        let err = settings
            .set(Settings {
                api_base_url: "localhost api".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Precondition(_)));
        assert!(storage.snapshot(SETTINGS_KEY).is_none());
    }
}
