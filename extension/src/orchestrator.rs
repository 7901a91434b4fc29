// Registration orchestration
// detection check -> payload -> single remote call -> merge into the registration store

use std::rc::Rc;

use crate::clock::Clock;
use crate::config::ProtocolVariant;
use crate::detection_store::DetectionStore;
use crate::error::{Error, Result};
use crate::protocol::{AuthIdentity, Credentials, DetectionRecord, RegistrationForm};
use crate::services::monitor_api::{
    MonitorApi, RegisterRequest, RegistrantIdentity, RegistrationResponse,
};
use crate::services::registrations::{RegistrationRecord, RegistrationStore};
use crate::services::settings::SettingsStore;

pub const NO_DETECTION: &str = "No Yad2 search detected yet.";

fn field(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Minutes between checks. Blank means "let the service decide".
fn parse_interval(value: &Option<String>) -> Result<Option<u32>> {
    let Some(raw) = field(value) else {
        return Ok(None);
    };
    match raw.parse::<u32>() {
        Ok(minutes) if minutes > 0 => Ok(Some(minutes)),
        _ => Err(Error::precondition(format!(
            "Check interval must be a whole number of minutes, got {:?}",
            raw
        ))),
    }
}

#[derive(Clone)]
pub struct RegistrationOrchestrator {
    detections: DetectionStore,
    settings: SettingsStore,
    registrations: RegistrationStore,
    api: Rc<dyn MonitorApi>,
    clock: Rc<dyn Clock>,
    variant: ProtocolVariant,
}

impl RegistrationOrchestrator {
    pub fn new(
        detections: DetectionStore,
        settings: SettingsStore,
        registrations: RegistrationStore,
        api: Rc<dyn MonitorApi>,
        clock: Rc<dyn Clock>,
        variant: ProtocolVariant,
    ) -> Self {
        Self {
            detections,
            settings,
            registrations,
            api,
            clock,
            variant,
        }
    }

    /// Stateless credential check. Nothing is stored on success.
    pub async fn authenticate(&self, credentials: Credentials) -> Result<AuthIdentity> {
        if credentials.username.trim().is_empty() || credentials.password.is_empty() {
            return Err(Error::precondition("Username and password are required."));
        }

        let settings = self.settings.get().await?;
        let identity = self
            .api
            .authenticate(&settings.api_base_url, &credentials)
            .await?;

        log::info!(
            "Authentication for {} {}",
            credentials.username,
            if identity.authenticated { "succeeded" } else { "was rejected" }
        );
        Ok(identity)
    }

    /// Register the currently detected search for monitoring.
    ///
    /// Fails before any network traffic when nothing has been detected or the
    /// form is incomplete.
    pub async fn register(&self, form: RegistrationForm) -> Result<RegistrationResponse> {
        let detection = self
            .detections
            .snapshot()
            .ok_or_else(|| Error::precondition(NO_DETECTION))?;

        let request = self.build_request(&form, &detection)?;
        let settings = self.settings.get().await?;

        let response = self
            .api
            .register(&settings.api_base_url, &request)
            .await
            .inspect_err(|e| log::error!("Registration failed: {}", e))?;

        let record = RegistrationRecord {
            user_id: response.user_id.clone(),
            preference_id: response.preference_id.clone(),
            telegram_link: response.telegram_deep_link.clone(),
            identity: request.identity.into(),
            label: request.label,
            registered_at: self.clock.now_millis(),
        };
        self.registrations.record(record).await?;

        log::info!(
            "Registered search {} for user {} (preference {})",
            detection.url,
            response.user_id,
            response.preference_id
        );
        Ok(response)
    }

    pub fn build_request(
        &self,
        form: &RegistrationForm,
        detection: &DetectionRecord,
    ) -> Result<RegisterRequest> {
        let identity = match self.variant {
            ProtocolVariant::Username => RegistrantIdentity {
                username: Some(
                    field(&form.username)
                        .ok_or_else(|| Error::precondition("A username is required to register."))?,
                ),
                ..Default::default()
            },
            ProtocolVariant::Contact => {
                let identity = RegistrantIdentity {
                    email: field(&form.email),
                    display_name: field(&form.display_name),
                    telegram_username: field(&form.telegram_username),
                    ..Default::default()
                };
                if identity == RegistrantIdentity::default() {
                    return Err(Error::precondition(
                        "Provide an email, display name or Telegram username.",
                    ));
                }
                identity
            }
        };

        Ok(RegisterRequest {
            identity,
            label: field(&form.label),
            search_url: detection.url.clone(),
            query_params: detection.params.clone(),
            check_interval_minutes: parse_interval(&form.check_interval_minutes)?,
        })
    }
}
