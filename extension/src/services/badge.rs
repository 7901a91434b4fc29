// Toolbar badge. Purely cosmetic, never awaited, never fails.

use crate::protocol::TabId;

pub const DETECTED_TEXT: &str = "ON";
pub const BADGE_COLOR: &str = "#ff9800";

pub trait Badge {
    /// Mark `tab_id` (or the global badge when absent) as holding a detection.
    fn show_detected(&self, tab_id: Option<TabId>);

    fn set_background_color(&self, color: &str);
}

/// Badge for contexts without a toolbar.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoBadge;

impl Badge for NoBadge {
    fn show_detected(&self, _tab_id: Option<TabId>) {}

    fn set_background_color(&self, _color: &str) {}
}

#[cfg(target_arch = "wasm32")]
pub use chrome::ChromeBadge;

#[cfg(target_arch = "wasm32")]
mod chrome {
    use super::*;
    use wasm_bindgen::prelude::*;

    #[wasm_bindgen]
    extern "C" {
        #[wasm_bindgen(catch, js_namespace = ["chrome", "action"], js_name = setBadgeText)]
        fn set_badge_text(details: JsValue) -> Result<js_sys::Promise, JsValue>;

        #[wasm_bindgen(catch, js_namespace = ["chrome", "action"], js_name = setBadgeBackgroundColor)]
        fn set_badge_background_color(details: JsValue) -> Result<js_sys::Promise, JsValue>;
    }

    fn details(entries: &[(&str, JsValue)]) -> JsValue {
        let obj = js_sys::Object::new();
        for (key, value) in entries {
            let _ = js_sys::Reflect::set(&obj, &(*key).into(), value);
        }
        obj.into()
    }

    /// Fire the call and drop the promise; a rejected badge update only gets logged.
    fn fire(result: Result<js_sys::Promise, JsValue>) {
        match result {
            Ok(promise) => {
                wasm_bindgen_futures::spawn_local(async move {
                    if let Err(e) = wasm_bindgen_futures::JsFuture::from(promise).await {
                        log::debug!("Badge update rejected: {:?}", e);
                    }
                });
            }
            Err(e) => log::debug!("Badge update failed: {:?}", e),
        }
    }

    #[derive(Clone, Copy, Debug, Default)]
    pub struct ChromeBadge;

    impl Badge for ChromeBadge {
        fn show_detected(&self, tab_id: Option<TabId>) {
            let mut entries = vec![("text", JsValue::from_str(DETECTED_TEXT))];
            if let Some(tab_id) = tab_id {
                entries.push(("tabId", JsValue::from_f64(tab_id as f64)));
            }
            fire(set_badge_text(details(&entries)));
        }

        fn set_background_color(&self, color: &str) {
            fire(set_badge_background_color(details(&[(
                "color",
                JsValue::from_str(color),
            )])));
        }
    }
}
