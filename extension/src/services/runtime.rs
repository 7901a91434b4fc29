// chrome.runtime messaging from page and popup contexts

use serde_json::Value;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(catch, js_namespace = ["chrome", "runtime"], js_name = sendMessage)]
    fn runtime_send_message(message: JsValue) -> Result<js_sys::Promise, JsValue>;
}

pub fn to_js(value: &Value) -> Result<JsValue, JsValue> {
    let text = serde_json::to_string(value)
        .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))?;
    js_sys::JSON::parse(&text)
}

pub fn from_js(value: &JsValue) -> Result<Value, JsValue> {
    if value.is_undefined() {
        return Ok(Value::Null);
    }
    let text: String = js_sys::JSON::stringify(value)?.into();
    serde_json::from_str(&text).map_err(|e| JsValue::from_str(&format!("Parse error: {}", e)))
}

/// Start sending a message. The returned promise resolves to the reply
/// (undefined when the background never answers).
pub fn send_message(message: &Value) -> Result<js_sys::Promise, JsValue> {
    runtime_send_message(to_js(message)?)
}

/// Send and wait for the reply.
pub async fn request(message: &Value) -> Result<Option<Value>, JsValue> {
    let reply = JsFuture::from(send_message(message)?).await?;
    match from_js(&reply)? {
        Value::Null => Ok(None),
        value => Ok(Some(value)),
    }
}
