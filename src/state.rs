use std::collections::VecDeque;
use std::sync::{Arc, Mutex, RwLock};

use crate::api::BackendClient;
use crate::config::Config;
use crate::host::SharedHost;
use crate::render::SharedSurface;
use crate::types::LotId;

#[derive(Debug, Clone)]
pub struct EventEntry {
    pub ts: String,
    pub kind: String,
    pub detail: String,
}

/// Everything the flows share for one app session
pub struct AppState {
    pub config: Config,
    pub api: BackendClient,
    pub host: SharedHost,
    pub surface: SharedSurface,
    /// Lot whose detail view is on screen, if any.
    pub open_lot: RwLock<Option<LotId>>,
    pub events: Mutex<VecDeque<EventEntry>>,
}

const MAX_EVENTS: usize = 200;

impl AppState {
    pub fn new(
        config: Config,
        api: BackendClient,
        host: SharedHost,
        surface: SharedSurface,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            api,
            host,
            surface,
            open_lot: RwLock::new(None),
            events: Mutex::new(VecDeque::with_capacity(MAX_EVENTS)),
        })
    }

    pub fn push_event(&self, kind: &str, detail: &str) {
        let entry = EventEntry {
            ts: chrono::Utc::now().format("%H:%M:%S").to_string(),
            kind: kind.to_string(),
            detail: detail.to_string(),
        };
        let mut events = self.events.lock().unwrap();
        if events.len() >= MAX_EVENTS {
            events.pop_front();
        }
        events.push_back(entry);
    }

    pub fn recent_events(&self) -> Vec<EventEntry> {
        self.events.lock().unwrap().iter().cloned().collect()
    }

    pub fn open_lot(&self) -> Option<LotId> {
        *self.open_lot.read().unwrap()
    }

    pub fn set_open_lot(&self, lot_id: Option<LotId>) {
        *self.open_lot.write().unwrap() = lot_id;
    }

    /// Closes the detail view, but only if it still shows `lot_id`. Late
    /// responses for a lot the user already navigated away from are ignored.
    pub fn close_detail_for(&self, lot_id: LotId) -> bool {
        let mut open = self.open_lot.write().unwrap();
        if *open != Some(lot_id) {
            tracing::debug!(lot_id, open = ?*open, "detail view moved on, leaving it alone");
            return false;
        }
        *open = None;
        drop(open);
        self.surface.close_detail();
        true
    }
}
