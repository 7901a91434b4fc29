// Popup/options session logic
// Talks to the background only through messages; rendering lives in the HTML glue

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::cell::{Cell, RefCell};

use crate::config::{ProtocolVariant, RegistrationConfig};
use crate::protocol::{AuthIdentity, Credentials, DetectionRecord, RegistrationForm, Request};
use crate::services::monitor_api::RegistrationResponse;
use crate::services::registrations::Registrations;
use crate::services::settings::Settings;

/// Result of a user-facing action: data, or one message to show.
pub type Outcome<T> = std::result::Result<T, String>;

/// Sends one request to the background and waits for its reply.
#[async_trait(?Send)]
pub trait MessageChannel {
    /// `None` when no reply arrived (closed channel, unknown type, send failure).
    async fn send(&self, request: &Request) -> Option<Value>;
}

const NO_REPLY: &str = "The extension background did not respond.";
const BUSY: &str = "A request is already in progress.";
const LOAD_SETTINGS_FAILED: &str = "Unable to load settings.";

fn failure_message(reply: &Value, fallback: &str) -> String {
    reply
        .get("error")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

/// Decode `{ok: true, <field>: ...}` replies.
fn expect_ok<T: DeserializeOwned>(reply: Option<Value>, field: Option<&str>, fallback: &str) -> Outcome<T> {
    let reply = reply.ok_or_else(|| NO_REPLY.to_string())?;
    if reply.get("ok").and_then(Value::as_bool) != Some(true) {
        return Err(failure_message(&reply, fallback));
    }
    let body = match field {
        Some(name) => reply.get(name).cloned().unwrap_or(Value::Null),
        None => reply,
    };
    serde_json::from_value(body).map_err(|e| {
        log::error!("Unexpected reply shape: {}", e);
        fallback.to_string()
    })
}

struct BusyGuard<'a>(&'a Cell<bool>);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// State of one open popup. Dropped (with the identity) when the popup closes.
pub struct PopupSession<C> {
    channel: C,
    registration: RegistrationConfig,
    identity: RefCell<Option<String>>,
    busy: Cell<bool>,
}

impl<C: MessageChannel> PopupSession<C> {
    pub fn new(channel: C, registration: RegistrationConfig) -> Self {
        Self {
            channel,
            registration,
            identity: RefCell::new(None),
            busy: Cell::new(false),
        }
    }

    /// Username confirmed by a successful `authenticate`.
    pub fn identity(&self) -> Option<String> {
        self.identity.borrow().clone()
    }

    pub fn sign_out(&self) {
        self.identity.borrow_mut().take();
    }

    /// True while a submit is waiting on the background. A reply that never
    /// comes leaves this set until the popup is reopened.
    pub fn is_busy(&self) -> bool {
        self.busy.get()
    }

    fn begin(&self) -> Outcome<BusyGuard<'_>> {
        if self.busy.replace(true) {
            return Err(BUSY.to_string());
        }
        Ok(BusyGuard(&self.busy))
    }

    pub async fn load_detection(&self) -> Option<DetectionRecord> {
        let reply = self.channel.send(&Request::GetDetection).await?;
        let detection = reply.get("detection").cloned().unwrap_or(Value::Null);
        serde_json::from_value::<Option<DetectionRecord>>(detection)
            .inspect_err(|e| log::warn!("Unreadable detection reply: {}", e))
            .ok()
            .flatten()
    }

    pub async fn authenticate(&self, credentials: Credentials) -> Outcome<AuthIdentity> {
        let _guard = self.begin()?;
        let reply = self.channel.send(&Request::Authenticate(credentials)).await;
        let identity: AuthIdentity = expect_ok(reply, None, "Authentication failed")?;

        match identity.username.clone().filter(|_| identity.authenticated) {
            Some(username) => {
                *self.identity.borrow_mut() = Some(username);
                Ok(identity)
            }
            None => {
                self.sign_out();
                Err("Invalid username or password.".to_string())
            }
        }
    }

    pub async fn register(&self, mut form: RegistrationForm) -> Outcome<RegistrationResponse> {
        if self.registration.variant == ProtocolVariant::Username {
            match self.identity() {
                Some(username) => form.username = Some(username),
                None if self.registration.require_authentication => {
                    return Err("Please sign in before registering.".to_string());
                }
                None => {}
            }
        }

        let _guard = self.begin()?;
        let reply = self.channel.send(&Request::RegisterUser(form)).await;
        expect_ok(reply, Some("data"), "Registration failed.")
    }

    pub async fn load_settings(&self) -> Outcome<Settings> {
        let reply = self
            .channel
            .send(&Request::GetSettings)
            .await
            .ok_or_else(|| NO_REPLY.to_string())?;
        // Settings replies are bare; anything without the URL is a failure reply.
        match reply.get("apiBaseUrl").and_then(Value::as_str) {
            Some(url) => Ok(Settings {
                api_base_url: url.to_string(),
            }),
            None => Err(failure_message(&reply, LOAD_SETTINGS_FAILED)),
        }
    }

    pub async fn save_settings(&self, settings: Settings) -> Outcome<()> {
        let _guard = self.begin()?;
        let reply = self.channel.send(&Request::SetSettings(settings)).await;
        expect_ok::<Value>(reply, None, "Unable to save settings.").map(|_| ())
    }

    pub async fn load_registrations(&self) -> Outcome<Registrations> {
        let reply = self.channel.send(&Request::GetRegistrations).await;
        expect_ok(reply, Some("registrations"), "Unable to load registrations.")
    }
}

#[cfg(target_arch = "wasm32")]
pub use chrome::{ChromeRuntimeChannel, Popup};

#[cfg(target_arch = "wasm32")]
mod chrome {
    use super::*;
    use crate::config::DeploymentConfig;
    use crate::services::runtime;
    use std::rc::Rc;
    use wasm_bindgen::prelude::*;
    use wasm_bindgen_futures::future_to_promise;

    #[derive(Clone, Copy, Debug, Default)]
    pub struct ChromeRuntimeChannel;

    #[async_trait(?Send)]
    impl MessageChannel for ChromeRuntimeChannel {
        async fn send(&self, request: &Request) -> Option<Value> {
            match runtime::request(&request.to_envelope()).await {
                Ok(reply) => reply,
                Err(e) => {
                    log::error!("sendMessage failed: {:?}", e);
                    None
                }
            }
        }
    }

    fn outcome_to_js<T: serde::Serialize>(outcome: Outcome<T>) -> Result<JsValue, JsValue> {
        match outcome {
            Ok(data) => {
                let value = serde_json::to_value(&data)
                    .map_err(|e| JsValue::from_str(&e.to_string()))?;
                runtime::to_js(&value)
            }
            Err(message) => Err(JsValue::from_str(&message)),
        }
    }

    fn from_js<T: DeserializeOwned>(value: JsValue) -> Result<T, JsValue> {
        serde_json::from_value(runtime::from_js(&value)?)
            .map_err(|e| JsValue::from_str(&format!("Invalid input: {}", e)))
    }

    /// Popup/options handle for the HTML glue. Every method returns a Promise
    /// that resolves with data or rejects with a display message.
    #[wasm_bindgen]
    pub struct Popup {
        session: Rc<PopupSession<ChromeRuntimeChannel>>,
    }

    #[wasm_bindgen]
    impl Popup {
        #[wasm_bindgen(constructor)]
        pub fn new() -> Result<Popup, JsValue> {
            let config = DeploymentConfig::embedded()
                .map_err(|e| JsValue::from_str(&format!("{:#}", e)))?;
            Ok(Popup {
                session: Rc::new(PopupSession::new(ChromeRuntimeChannel, config.registration)),
            })
        }

        #[wasm_bindgen(js_name = isBusy)]
        pub fn is_busy(&self) -> bool {
            self.session.is_busy()
        }

        #[wasm_bindgen(js_name = loadDetection)]
        pub fn load_detection(&self) -> js_sys::Promise {
            let session = self.session.clone();
            future_to_promise(async move { outcome_to_js(Ok(session.load_detection().await)) })
        }

        pub fn authenticate(&self, credentials: JsValue) -> js_sys::Promise {
            let session = self.session.clone();
            future_to_promise(async move {
                let credentials: Credentials = from_js(credentials)?;
                outcome_to_js(session.authenticate(credentials).await)
            })
        }

        pub fn register(&self, form: JsValue) -> js_sys::Promise {
            let session = self.session.clone();
            future_to_promise(async move {
                let form: RegistrationForm = from_js(form)?;
                outcome_to_js(session.register(form).await)
            })
        }

        #[wasm_bindgen(js_name = loadSettings)]
        pub fn load_settings(&self) -> js_sys::Promise {
            let session = self.session.clone();
            future_to_promise(async move { outcome_to_js(session.load_settings().await) })
        }

        #[wasm_bindgen(js_name = saveSettings)]
        pub fn save_settings(&self, settings: JsValue) -> js_sys::Promise {
            let session = self.session.clone();
            future_to_promise(async move {
                let settings: Settings = from_js(settings)?;
                outcome_to_js(session.save_settings(settings).await)
            })
        }

        #[wasm_bindgen(js_name = loadRegistrations)]
        pub fn load_registrations(&self) -> js_sys::Promise {
            let session = self.session.clone();
            future_to_promise(async move { outcome_to_js(session.load_registrations().await) })
        }
    }
}
