// Durable record of every successful registration, keyed by remote user id

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::services::storage::KeyValueStore;

const REGISTRATIONS_KEY: &str = "registrations";

/// Identity the user registered with. Which fields are present depends on
/// the deployment's protocol variant.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredIdentity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram_username: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRecord {
    pub user_id: String,
    pub preference_id: String,
    pub telegram_link: Option<String>,
    #[serde(flatten)]
    pub identity: RegisteredIdentity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub registered_at: i64,
}

pub type Registrations = BTreeMap<String, RegistrationRecord>;

/// Read-merge-write over a single storage key.
///
/// Not atomic: two overlapping writes for the same user id can lose one.
#[derive(Clone)]
pub struct RegistrationStore {
    storage: Rc<dyn KeyValueStore>,
}

impl RegistrationStore {
    pub fn new(storage: Rc<dyn KeyValueStore>) -> Self {
        Self { storage }
    }

    pub async fn all(&self) -> Result<Registrations> {
        match self.storage.get(REGISTRATIONS_KEY).await? {
            None | Some(Value::Null) => Ok(Registrations::new()),
            Some(value) => serde_json::from_value(value)
                .map_err(|e| Error::Storage(format!("Corrupt registrations map: {}", e))),
        }
    }

    pub async fn get(&self, user_id: &str) -> Result<Option<RegistrationRecord>> {
        Ok(self.all().await?.remove(user_id))
    }

    /// Insert or wholesale replace the record for `record.user_id`.
    pub async fn record(&self, record: RegistrationRecord) -> Result<()> {
        if record.user_id.is_empty() || record.preference_id.is_empty() {
            return Err(Error::Protocol(
                "registration record without user or preference id".into(),
            ));
        }

        let mut registrations = self.all().await?;
        let user_id = record.user_id.clone();
        if registrations.insert(user_id.clone(), record).is_some() {
            log::info!("Replacing stored registration for user {}", user_id);
        }

        let value = serde_json::to_value(&registrations)
            .map_err(|e| Error::Storage(format!("Serialization error: {}", e)))?;
        self.storage.set(REGISTRATIONS_KEY, value).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::storage::MemoryStorage;
    use serde_json::json;

    fn record(user_id: &str, label: Option<&str>) -> RegistrationRecord {
        RegistrationRecord {
            user_id: user_id.into(),
            preference_id: format!("pref-{}", user_id),
            telegram_link: Some(format!("tg://{}", user_id)),
            identity: RegisteredIdentity {
                username: Some("dana".into()),
                ..Default::default()
            },
            label: label.map(str::to_string),
            registered_at: 1_700_000_000_000,
        }
    }

    #[tokio::test]
    async fn test_empty_by_default() {
        let store = RegistrationStore::new(Rc::new(MemoryStorage::new()));
        assert!(store.all().await.unwrap().is_empty());
        assert!(store.get("u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_distinct_users_accumulate() {
        let store = RegistrationStore::new(Rc::new(MemoryStorage::new()));
        store.record(record("u1", None)).await.unwrap();
        store.record(record("u2", None)).await.unwrap();

        let all = store.all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.contains_key("u1") && all.contains_key("u2"));
    }

    #[tokio::test]
    async fn test_same_user_is_overwritten_wholesale() {
        let store = RegistrationStore::new(Rc::new(MemoryStorage::new()));
        store.record(record("u1", Some("north"))).await.unwrap();

        let mut newer = record("u1", None);
        newer.preference_id = "p2".into();
        store.record(newer.clone()).await.unwrap();

        let stored = store.get("u1").await.unwrap().unwrap();
        assert_eq!(stored, newer);
        assert!(stored.label.is_none());
    }

    #[tokio::test]
    async fn test_rejects_record_without_ids() {
        let store = RegistrationStore::new(Rc::new(MemoryStorage::new()));
        let mut bad = record("u1", None);
        bad.preference_id.clear();

        assert!(matches!(store.record(bad).await, Err(Error::Protocol(_))));
        assert!(store.all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stored_shape_uses_camel_case() {
        let storage = Rc::new(MemoryStorage::new());
        let store = RegistrationStore::new(storage.clone());
        store.record(record("u1", None)).await.unwrap();

        assert_eq!(
            storage.snapshot(REGISTRATIONS_KEY).unwrap(),
            json!({
                "u1": {
                    "userId": "u1",
                    "preferenceId": "pref-u1",
                    "telegramLink": "tg://u1",
                    "username": "dana",
                    "registeredAt": 1_700_000_000_000i64
                }
            })
        );
    }
}
