// Persistent key-value storage
// chrome.storage.sync in the browser, an in-process map everywhere else

use async_trait::async_trait;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;

use crate::error::Result;

/// Async get/set over JSON values. Every call is a suspension point.
#[async_trait(?Send)]
pub trait KeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<Value>>;
    async fn set(&self, key: &str, value: Value) -> Result<()>;
}

/// Storage that lives as long as the process. Used by tests and native embedders.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: RefCell<HashMap<String, Value>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Synchronous peek, for assertions.
    pub fn snapshot(&self, key: &str) -> Option<Value> {
        self.items.borrow().get(key).cloned()
    }
}

#[async_trait(?Send)]
impl KeyValueStore for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.items.borrow().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.items.borrow_mut().insert(key.to_string(), value);
        Ok(())
    }
}

#[cfg(target_arch = "wasm32")]
pub use chrome::ChromeStorage;

#[cfg(target_arch = "wasm32")]
mod chrome {
    use super::*;
    use crate::error::Error;
    use wasm_bindgen::prelude::*;
    use wasm_bindgen_futures::JsFuture;

    #[wasm_bindgen]
    extern "C" {
        #[wasm_bindgen(catch, js_namespace = ["chrome", "storage", "sync"], js_name = get)]
        fn sync_get(keys: JsValue) -> std::result::Result<js_sys::Promise, JsValue>;

        #[wasm_bindgen(catch, js_namespace = ["chrome", "storage", "sync"], js_name = set)]
        fn sync_set(items: JsValue) -> std::result::Result<js_sys::Promise, JsValue>;
    }

    fn storage_error(e: JsValue) -> Error {
        Error::Storage(format!("{:?}", e))
    }

    /// `chrome.storage.sync`. Values are kept as JSON strings.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct ChromeStorage;

    #[async_trait(?Send)]
    impl KeyValueStore for ChromeStorage {
        async fn get(&self, key: &str) -> Result<Option<Value>> {
            let keys = js_sys::Array::new();
            keys.push(&key.into());

            let items = JsFuture::from(sync_get(keys.into()).map_err(storage_error)?)
                .await
                .map_err(storage_error)?;

            let Some(raw) = js_sys::Reflect::get(&items, &key.into())
                .map_err(storage_error)?
                .as_string()
            else {
                return Ok(None);
            };

            let value = serde_json::from_str(&raw)
                .map_err(|e| Error::Storage(format!("Parse error for {}: {}", key, e)))?;
            Ok(Some(value))
        }

        async fn set(&self, key: &str, value: Value) -> Result<()> {
            let data = serde_json::to_string(&value)
                .map_err(|e| Error::Storage(format!("Serialization error: {}", e)))?;

            let obj = js_sys::Object::new();
            js_sys::Reflect::set(&obj, &key.into(), &data.into()).map_err(storage_error)?;

            JsFuture::from(sync_set(obj.into()).map_err(storage_error)?)
                .await
                .map_err(storage_error)?;
            log::debug!("Stored {}", key);
            Ok(())
        }
    }
}
