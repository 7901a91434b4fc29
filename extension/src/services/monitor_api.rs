use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::params::SearchParams;
use crate::protocol::{AuthIdentity, Credentials};
use crate::services::registrations::RegisteredIdentity;

const AUTH_ROUTE: &str = "auth";
const REGISTER_ROUTE: &str = "users/register";

/// Identity fields as the monitoring service expects them.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct RegistrantIdentity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram_username: Option<String>,
}

impl From<RegistrantIdentity> for RegisteredIdentity {
    fn from(identity: RegistrantIdentity) -> Self {
        Self {
            username: identity.username,
            email: identity.email,
            display_name: identity.display_name,
            telegram_username: identity.telegram_username,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RegisterRequest {
    #[serde(flatten)]
    pub identity: RegistrantIdentity,
    pub label: Option<String>,
    pub search_url: String,
    pub query_params: SearchParams,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_interval_minutes: Option<u32>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RegistrationResponse {
    pub user_id: String,
    pub preference_id: String,
    #[serde(default)]
    pub telegram_deep_link: Option<String>,
    /// Base64 PNG of the deep link
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram_qr_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Request/response contract of the remote monitoring service.
#[async_trait(?Send)]
pub trait MonitorApi {
    async fn authenticate(&self, base_url: &str, credentials: &Credentials)
        -> Result<AuthIdentity>;

    async fn register(
        &self,
        base_url: &str,
        request: &RegisterRequest,
    ) -> Result<RegistrationResponse>;
}

pub fn endpoint(base_url: &str, route: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), route)
}

/// Pick the human-readable message out of an error body.
pub fn error_message(body: Option<&Value>, fallback: &str) -> String {
    let field = |name: &str| {
        body.and_then(|b| b.get(name))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    field("detail")
        .or_else(|| field("message"))
        .unwrap_or_else(|| fallback.to_string())
}

/// `reqwest`-backed client. One attempt per call, no timeout.
#[derive(Clone, Default)]
pub struct HttpMonitorApi {
    client: reqwest::Client,
}

impl HttpMonitorApi {
    pub fn new() -> Self {
        Self::default()
    }

    async fn post<T: Serialize + ?Sized>(&self, url: &str, body: &T, fallback: &str) -> Result<Value> {
        log::debug!("POST {}", url);

        let resp = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;
        let parsed: Option<Value> = serde_json::from_str(&text).ok();

        if !status.is_success() {
            let message = error_message(parsed.as_ref(), fallback);
            log::warn!("{} returned {}: {}", url, status, message);
            return Err(Error::Remote(message));
        }

        parsed.ok_or_else(|| Error::Protocol(format!("{} returned a non-JSON body", url)))
    }
}

#[async_trait(?Send)]
impl MonitorApi for HttpMonitorApi {
    async fn authenticate(
        &self,
        base_url: &str,
        credentials: &Credentials,
    ) -> Result<AuthIdentity> {
        let body = self
            .post(&endpoint(base_url, AUTH_ROUTE), credentials, "Authentication failed")
            .await?;

        // Success is decided by status; the body only narrows it down.
        let authenticated = body
            .get("authenticated")
            .and_then(Value::as_bool)
            .unwrap_or(true);

        Ok(AuthIdentity {
            authenticated,
            username: authenticated.then(|| credentials.username.clone()),
        })
    }

    async fn register(
        &self,
        base_url: &str,
        request: &RegisterRequest,
    ) -> Result<RegistrationResponse> {
        let body = self
            .post(&endpoint(base_url, REGISTER_ROUTE), request, "Registration failed")
            .await?;

        let response: RegistrationResponse = serde_json::from_value(body)
            .map_err(|e| Error::Protocol(format!("Unexpected registration response: {}", e)))?;

        if response.user_id.is_empty() || response.preference_id.is_empty() {
            return Err(Error::Protocol(
                "registration response is missing user_id or preference_id".into(),
            ));
        }
        Ok(response)
    }
}
