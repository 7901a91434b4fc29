// Cross-context message protocol
// Envelopes are `{type, payload?}`, replies are JSON objects shaped per request type

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Error, Result};
use crate::params::SearchParams;
use crate::services::monitor_api::RegistrationResponse;
use crate::services::registrations::RegistrationRecord;
use crate::services::settings::Settings;

/// Browser tab identifier.
pub type TabId = i64;

/// Sent by the page detector whenever a new relevant URL is seen.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct DetectionEvent {
    pub url: String,
    pub params: SearchParams,
}

/// The one "currently relevant page" held by the background.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DetectionRecord {
    pub url: String,
    pub params: SearchParams,
    pub tab_id: Option<TabId>,
    pub detected_at: i64,
}

/// Where a message came from. Only page contexts carry a tab.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MessageSender {
    pub tab_id: Option<TabId>,
}

impl MessageSender {
    pub fn tab(tab_id: TabId) -> Self {
        Self {
            tab_id: Some(tab_id),
        }
    }

    /// Popup, options page or any other context without a tab.
    pub fn extension() -> Self {
        Self::default()
    }
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Outcome of a credential check. Lives only as long as the popup.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AuthIdentity {
    pub authenticated: bool,
    #[serde(default)]
    pub username: Option<String>,
}

/// Raw registration form input. Everything arrives as text.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(default)]
pub struct RegistrationForm {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telegram_username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_interval_minutes: Option<String>,
}

/// Every message the background understands.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum Request {
    #[serde(rename = "YAD2_URL_DETECTED")]
    DetectionReported(DetectionEvent),
    #[serde(rename = "GET_DETECTION")]
    GetDetection,
    #[serde(rename = "AUTHENTICATE")]
    Authenticate(Credentials),
    #[serde(rename = "REGISTER_USER")]
    RegisterUser(RegistrationForm),
    #[serde(rename = "GET_SETTINGS")]
    GetSettings,
    #[serde(rename = "SET_SETTINGS")]
    SetSettings(Settings),
    #[serde(rename = "GET_REGISTRATIONS")]
    GetRegistrations,
}

/// When the reply to a request becomes available.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplyTiming {
    /// Answered from in-memory state before the handler returns.
    Immediate,
    /// Waits on the network or persistent storage.
    Deferred,
}

impl Request {
    pub const TAGS: [&'static str; 7] = [
        "YAD2_URL_DETECTED",
        "GET_DETECTION",
        "AUTHENTICATE",
        "REGISTER_USER",
        "GET_SETTINGS",
        "SET_SETTINGS",
        "GET_REGISTRATIONS",
    ];

    const PAYLOADLESS: [&'static str; 3] = ["GET_DETECTION", "GET_SETTINGS", "GET_REGISTRATIONS"];

    /// Decode a raw envelope.
    ///
    /// Returns `None` for anything without a known `type` tag; those messages
    /// belong to another extension version and get no reply.
    pub fn parse(mut message: Value) -> Option<Result<Request>> {
        let kind = message.get("type")?.as_str()?.to_string();
        if !Self::TAGS.contains(&kind.as_str()) {
            return None;
        }
        if Self::PAYLOADLESS.contains(&kind.as_str()) {
            Self::drop_ignored_payload(&mut message);
        }
        Some(
            serde_json::from_value(message)
                .map_err(|e| Error::Protocol(format!("malformed {} message: {}", kind, e))),
        )
    }

    /// Senders may attach `{}` or `null` to requests that take no payload.
    fn drop_ignored_payload(message: &mut Value) {
        if let Some(envelope) = message.as_object_mut() {
            if matches!(envelope.get("payload"), Some(Value::Object(_) | Value::Null)) {
                envelope.remove("payload");
            }
        }
    }

    pub fn to_envelope(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn timing(&self) -> ReplyTiming {
        match self {
            Request::DetectionReported(_) | Request::GetDetection => ReplyTiming::Immediate,
            _ => ReplyTiming::Deferred,
        }
    }
}

/// Typed reply, rendered to the wire shape by [`Reply::to_json`].
#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    Ack,
    Detection(Option<DetectionRecord>),
    Authenticated(AuthIdentity),
    Registered(RegistrationResponse),
    Settings(Settings),
    Registrations(BTreeMap<String, RegistrationRecord>),
    Failure(String),
}

impl Reply {
    pub fn failure(error: &Error) -> Self {
        Reply::Failure(error.user_message())
    }

    pub fn to_json(&self) -> Value {
        match self {
            Reply::Ack => json!({ "ok": true }),
            Reply::Detection(detection) => json!({ "detection": detection }),
            Reply::Authenticated(identity) => json!({
                "ok": true,
                "authenticated": identity.authenticated,
                "username": identity.username,
            }),
            Reply::Registered(data) => json!({ "ok": true, "data": data }),
            Reply::Settings(settings) => json!(settings),
            Reply::Registrations(registrations) => {
                json!({ "ok": true, "registrations": registrations })
            }
            Reply::Failure(error) => json!({ "ok": false, "error": error }),
        }
    }
}
