// Background service worker for the Yad2 monitor
// All protocol logic lives in the library; this file only binds it to chrome.* listeners

// Dummy main for binary target
fn main() {}

#[cfg(target_arch = "wasm32")]
mod glue {
    use futures::FutureExt;
    use std::cell::RefCell;
    use std::rc::Rc;
    use wasm_bindgen::prelude::*;

    use yad2_monitor_extension::clock::SystemClock;
    use yad2_monitor_extension::services::badge::ChromeBadge;
    use yad2_monitor_extension::services::monitor_api::HttpMonitorApi;
    use yad2_monitor_extension::services::runtime::{from_js, to_js};
    use yad2_monitor_extension::services::storage::ChromeStorage;
    use yad2_monitor_extension::{DeploymentConfig, MessageRouter, MessageSender};

    thread_local! {
        static ROUTER: RefCell<Option<MessageRouter>> = const { RefCell::new(None) };
    }

    fn router() -> Option<MessageRouter> {
        ROUTER.with(|r| r.borrow().clone())
    }

    fn respond(send_response: &js_sys::Function, reply: &serde_json::Value) {
        let result = to_js(reply).and_then(|value| send_response.call1(&JsValue::NULL, &value));
        if let Err(e) = result {
            log::warn!("Could not deliver reply: {:?}", e);
        }
    }

    /// Initialize background service worker
    /// Called from JavaScript glue via wasm_bindgen
    #[wasm_bindgen]
    pub fn init_background() -> Result<(), JsValue> {
        wasm_logger::init(wasm_logger::Config::default());

        let config =
            DeploymentConfig::embedded().map_err(|e| JsValue::from_str(&format!("{:#}", e)))?;
        let router = MessageRouter::new(
            &config,
            Rc::new(ChromeStorage),
            Rc::new(HttpMonitorApi::new()),
            Rc::new(ChromeBadge),
            Rc::new(SystemClock),
        );
        ROUTER.with(|r| *r.borrow_mut() = Some(router));

        log::info!(
            "Yad2 monitor background initialized (watching {}{})",
            config.target.host,
            config.target.path_prefix
        );
        Ok(())
    }

    /// chrome.runtime.onInstalled
    #[wasm_bindgen]
    pub fn handle_install() {
        log::info!("Extension installed or updated");
        if let Some(router) = router() {
            wasm_bindgen_futures::spawn_local(async move { router.on_installed().await });
        }
    }

    /// chrome.tabs.onRemoved
    #[wasm_bindgen]
    pub fn handle_tab_removed(tab_id: f64) {
        if let Some(router) = router() {
            router.on_tab_removed(tab_id as i64);
        }
    }

    /// chrome.runtime.onMessage
    ///
    /// Returns what the listener must return: `true` when `send_response`
    /// will be called later, `false` when it was already called or never will be.
    #[wasm_bindgen]
    pub fn handle_message(
        message: JsValue,
        sender_tab_id: Option<f64>,
        send_response: js_sys::Function,
    ) -> bool {
        let Some(router) = router() else {
            log::error!("Message received before init_background");
            return false;
        };

        let message = match from_js(&message) {
            Ok(message) => message,
            Err(e) => {
                log::warn!("Unreadable message: {:?}", e);
                return false;
            }
        };
        let sender = MessageSender {
            tab_id: sender_tab_id.map(|id| id as i64),
        };

        let Some(mut reply) = router.handle(message, sender) else {
            return false;
        };

        if let Some(value) = (&mut reply).now_or_never() {
            respond(&send_response, &value);
            return false;
        }

        wasm_bindgen_futures::spawn_local(async move {
            let value = reply.await;
            respond(&send_response, &value);
        });
        true
    }
}
