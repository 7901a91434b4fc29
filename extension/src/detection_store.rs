// Single-slot, tab-scoped detection state owned by the background process

use std::cell::RefCell;
use std::rc::Rc;

use crate::protocol::{DetectionEvent, DetectionRecord, TabId};

/// Holds at most one [`DetectionRecord`]: the most recently reported relevant page.
///
/// Clones share the same slot. Only the message router writes to it; readers
/// always get an owned snapshot.
#[derive(Clone, Default)]
pub struct DetectionStore {
    slot: Rc<RefCell<Option<DetectionRecord>>>,
}

impl DetectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace whatever is stored with a record built from `event`.
    pub fn replace(
        &self,
        event: DetectionEvent,
        tab_id: Option<TabId>,
        detected_at: i64,
    ) -> DetectionRecord {
        let record = DetectionRecord {
            url: event.url,
            params: event.params,
            tab_id,
            detected_at,
        };
        *self.slot.borrow_mut() = Some(record.clone());
        record
    }

    pub fn snapshot(&self) -> Option<DetectionRecord> {
        self.slot.borrow().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.slot.borrow().is_none()
    }

    /// Drop the record if it belongs to the closed tab. Returns whether it did.
    pub fn clear_for_tab(&self, tab_id: TabId) -> bool {
        let mut slot = self.slot.borrow_mut();
        if slot.as_ref().and_then(|r| r.tab_id) == Some(tab_id) {
            *slot = None;
            true
        } else {
            false
        }
    }
}
