// Yad2 search monitor extension
// Page detector, background router and popup session logic in Rust; JavaScript is glue to Chrome APIs

pub mod clock;
pub mod config;
pub mod detection_store;
pub mod detector;
pub mod error;
pub mod orchestrator;
pub mod params;
pub mod popup;
pub mod protocol;
pub mod relevance;
pub mod router;
pub mod services;

pub use config::{DeploymentConfig, ProtocolVariant};
pub use detection_store::DetectionStore;
pub use detector::{DetectionSink, NavigationTrigger, PageDetector, TriggerKind};
pub use error::{Error, Result};
pub use protocol::{DetectionEvent, DetectionRecord, MessageSender, Reply, Request, TabId};
pub use router::MessageRouter;

/// Set up console logging for the popup/options bundle.
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen::prelude::wasm_bindgen]
pub fn init_popup() {
    wasm_logger::init(wasm_logger::Config::default());
    log::info!("Yad2 monitor popup starting...");
}
