// Page-side detector
// Turns navigation triggers into at most one detection event per distinct relevant URL

use futures::{Stream, StreamExt};
use url::Url;

use crate::error::Result;
use crate::params::canonicalize;
use crate::protocol::DetectionEvent;
use crate::relevance::RelevanceFilter;

/// What woke the detector up. All kinds are handled the same way.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerKind {
    Startup,
    DomMutation,
    PopState,
    HashChange,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NavigationTrigger {
    pub kind: TriggerKind,
    /// `window.location.href` at the time of the trigger
    pub href: String,
}

impl NavigationTrigger {
    pub fn new(kind: TriggerKind, href: impl Into<String>) -> Self {
        Self {
            kind,
            href: href.into(),
        }
    }
}

/// Best-effort, fire-and-forget delivery to the background.
pub trait DetectionSink {
    fn emit(&self, event: DetectionEvent) -> Result<()>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Observation {
    /// Not a monitored page; dedup state was reset.
    Irrelevant,
    /// Same URL as the last emitted event.
    Duplicate,
    Emitted,
    /// Parsing or sending failed; logged and swallowed.
    Failed,
}

pub struct PageDetector<S> {
    filter: RelevanceFilter,
    sink: S,
    last_notified_url: Option<String>,
}

impl<S: DetectionSink> PageDetector<S> {
    pub fn new(filter: RelevanceFilter, sink: S) -> Self {
        Self {
            filter,
            sink,
            last_notified_url: None,
        }
    }

    pub fn last_notified_url(&self) -> Option<&str> {
        self.last_notified_url.as_deref()
    }

    /// Process one trigger. Never fails; errors are logged.
    pub fn observe(&mut self, href: &str) -> Observation {
        let url = match Url::parse(href) {
            Ok(url) => url,
            Err(e) => {
                log::warn!("Ignoring unparseable location {:?}: {}", href, e);
                return Observation::Failed;
            }
        };

        if !self.filter.is_relevant(&url) {
            self.last_notified_url = None;
            return Observation::Irrelevant;
        }

        let current = url.to_string();
        if self.last_notified_url.as_deref() == Some(current.as_str()) {
            return Observation::Duplicate;
        }

        let params = canonicalize(&url);
        self.last_notified_url = Some(current.clone());

        match self.sink.emit(DetectionEvent {
            url: current,
            params,
        }) {
            Ok(()) => Observation::Emitted,
            Err(e) => {
                log::warn!("Failed to report detection: {}", e);
                Observation::Failed
            }
        }
    }

    /// Consume triggers until the source ends.
    pub async fn run<T>(&mut self, triggers: T)
    where
        T: Stream<Item = NavigationTrigger>,
    {
        futures::pin_mut!(triggers);
        while let Some(trigger) = triggers.next().await {
            let observation = self.observe(&trigger.href);
            if observation == Observation::Emitted {
                log::debug!("{:?} produced a detection for {}", trigger.kind, trigger.href);
            }
        }
    }
}
