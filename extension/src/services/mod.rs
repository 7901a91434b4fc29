// Collaborators of the background process: storage, remote service, badge

pub mod badge;
pub mod monitor_api;
pub mod registrations;
#[cfg(target_arch = "wasm32")]
pub mod runtime;
pub mod settings;
pub mod storage;
