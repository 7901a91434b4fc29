// Content script for Yad2 pages
// The JS glue forwards MutationObserver / popstate / hashchange callbacks as navigation triggers

// Dummy main for binary target
fn main() {}

#[cfg(target_arch = "wasm32")]
mod glue {
    use futures::channel::mpsc;
    use std::cell::RefCell;
    use wasm_bindgen::prelude::*;

    use yad2_monitor_extension::services::runtime;
    use yad2_monitor_extension::{
        DeploymentConfig, DetectionEvent, DetectionSink, Error, NavigationTrigger, PageDetector,
        Request, TriggerKind,
    };

    thread_local! {
        static TRIGGERS: RefCell<Option<mpsc::UnboundedSender<NavigationTrigger>>> =
            const { RefCell::new(None) };
    }

    /// Posts detection events to the background without waiting for the ack.
    struct RuntimeSink;

    impl DetectionSink for RuntimeSink {
        fn emit(&self, event: DetectionEvent) -> yad2_monitor_extension::Result<()> {
            let envelope = Request::DetectionReported(event).to_envelope();
            let promise = runtime::send_message(&envelope)
                .map_err(|e| Error::Transport(format!("{:?}", e)))?;
            wasm_bindgen_futures::spawn_local(async move {
                if let Err(e) = wasm_bindgen_futures::JsFuture::from(promise).await {
                    log::debug!("Background did not take the detection: {:?}", e);
                }
            });
            Ok(())
        }
    }

    fn current_href() -> Option<String> {
        web_sys::window()?.location().href().ok()
    }

    /// Start the detector loop and run the startup check.
    #[wasm_bindgen]
    pub fn start_detector() -> Result<(), JsValue> {
        wasm_logger::init(wasm_logger::Config::default());

        let config =
            DeploymentConfig::embedded().map_err(|e| JsValue::from_str(&format!("{:#}", e)))?;
        let (tx, rx) = mpsc::unbounded();
        TRIGGERS.with(|t| *t.borrow_mut() = Some(tx));

        let mut detector = PageDetector::new(config.relevance_filter(), RuntimeSink);
        wasm_bindgen_futures::spawn_local(async move { detector.run(rx).await });

        notify(TriggerKind::Startup);
        Ok(())
    }

    fn notify(kind: TriggerKind) {
        let Some(href) = current_href() else {
            log::warn!("No location available for {:?} trigger", kind);
            return;
        };
        TRIGGERS.with(|t| {
            if let Some(tx) = t.borrow().as_ref() {
                let _ = tx.unbounded_send(NavigationTrigger::new(kind, href));
            }
        });
    }

    /// Called by the glue for every navigation-ish event.
    /// `kind` is one of "mutation", "popstate", "hashchange".
    #[wasm_bindgen]
    pub fn navigation_changed(kind: &str) {
        let kind = match kind {
            "popstate" => TriggerKind::PopState,
            "hashchange" => TriggerKind::HashChange,
            _ => TriggerKind::DomMutation,
        };
        notify(kind);
    }
}
