// Background message router
// Every handler returns a future; in-memory lookups hand back one that is already ready

use futures::future::{self, FutureExt, LocalBoxFuture};
use serde_json::Value;
use std::rc::Rc;

use crate::clock::Clock;
use crate::config::DeploymentConfig;
use crate::detection_store::DetectionStore;
use crate::orchestrator::RegistrationOrchestrator;
use crate::protocol::{DetectionEvent, MessageSender, Reply, Request, TabId};
use crate::services::badge::{Badge, BADGE_COLOR};
use crate::services::monitor_api::MonitorApi;
use crate::services::registrations::RegistrationStore;
use crate::services::settings::SettingsStore;
use crate::services::storage::KeyValueStore;

/// Single entry point for cross-context requests in the background process.
///
/// Cheap to clone; all clones share the same detection slot and stores.
#[derive(Clone)]
pub struct MessageRouter {
    detections: DetectionStore,
    settings: SettingsStore,
    registrations: RegistrationStore,
    orchestrator: RegistrationOrchestrator,
    badge: Rc<dyn Badge>,
    clock: Rc<dyn Clock>,
}

impl MessageRouter {
    pub fn new(
        config: &DeploymentConfig,
        storage: Rc<dyn KeyValueStore>,
        api: Rc<dyn MonitorApi>,
        badge: Rc<dyn Badge>,
        clock: Rc<dyn Clock>,
    ) -> Self {
        let detections = DetectionStore::new();
        let settings = SettingsStore::new(storage.clone(), &config.default_api_base_url);
        let registrations = RegistrationStore::new(storage);
        let orchestrator = RegistrationOrchestrator::new(
            detections.clone(),
            settings.clone(),
            registrations.clone(),
            api,
            clock.clone(),
            config.registration.variant,
        );

        Self {
            detections,
            settings,
            registrations,
            orchestrator,
            badge,
            clock,
        }
    }

    pub fn detections(&self) -> &DetectionStore {
        &self.detections
    }

    /// Decode and dispatch a raw envelope.
    ///
    /// `None` means the message type is unknown and must not be answered.
    pub fn handle(
        &self,
        message: Value,
        sender: MessageSender,
    ) -> Option<LocalBoxFuture<'static, Value>> {
        let request = match Request::parse(message)? {
            Ok(request) => request,
            Err(e) => {
                log::warn!("Rejecting message: {}", e);
                return Some(future::ready(Reply::failure(&e).to_json()).boxed_local());
            }
        };
        Some(self.dispatch(request, sender).map(|reply| reply.to_json()).boxed_local())
    }

    pub fn dispatch(
        &self,
        request: Request,
        sender: MessageSender,
    ) -> LocalBoxFuture<'static, Reply> {
        log::debug!("Dispatching {:?} ({:?})", request, request.timing());

        match request {
            Request::DetectionReported(event) => {
                future::ready(self.record_detection(event, sender)).boxed_local()
            }
            Request::GetDetection => {
                future::ready(Reply::Detection(self.detections.snapshot())).boxed_local()
            }
            Request::Authenticate(credentials) => {
                let orchestrator = self.orchestrator.clone();
                async move {
                    match orchestrator.authenticate(credentials).await {
                        Ok(identity) => Reply::Authenticated(identity),
                        Err(e) => Reply::failure(&e),
                    }
                }
                .boxed_local()
            }
            Request::RegisterUser(form) => {
                let orchestrator = self.orchestrator.clone();
                async move {
                    match orchestrator.register(form).await {
                        Ok(response) => Reply::Registered(response),
                        Err(e) => Reply::failure(&e),
                    }
                }
                .boxed_local()
            }
            Request::GetSettings => {
                let settings = self.settings.clone();
                async move {
                    match settings.get().await {
                        Ok(current) => Reply::Settings(current),
                        Err(e) => {
                            log::warn!("Falling back to default settings: {}", e);
                            Reply::Settings(settings.defaults())
                        }
                    }
                }
                .boxed_local()
            }
            Request::SetSettings(new_settings) => {
                let settings = self.settings.clone();
                async move {
                    match settings.set(new_settings).await {
                        Ok(_) => Reply::Ack,
                        Err(e) => Reply::failure(&e),
                    }
                }
                .boxed_local()
            }
            Request::GetRegistrations => {
                let registrations = self.registrations.clone();
                async move {
                    match registrations.all().await {
                        Ok(all) => Reply::Registrations(all),
                        Err(e) => Reply::failure(&e),
                    }
                }
                .boxed_local()
            }
        }
    }

    fn record_detection(&self, event: DetectionEvent, sender: MessageSender) -> Reply {
        let record = self
            .detections
            .replace(event, sender.tab_id, self.clock.now_millis());
        log::info!("Detected search {} (tab {:?})", record.url, record.tab_id);
        self.badge.show_detected(record.tab_id);
        Reply::Ack
    }

    /// Tab-closed notification from the browser.
    pub fn on_tab_removed(&self, tab_id: TabId) {
        if self.detections.clear_for_tab(tab_id) {
            log::info!("Tab {} closed, detection cleared", tab_id);
        }
    }

    /// Install/update hook: materialise settings and style the badge.
    ///
    /// A URL the user already saved survives updates.
    pub async fn on_installed(&self) {
        self.badge.set_background_color(BADGE_COLOR);
        let result = match self.settings.get().await {
            Ok(current) => self.settings.set(current).await.map(|_| ()),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            log::error!("Failed to initialise settings: {}", e);
        }
    }
}
