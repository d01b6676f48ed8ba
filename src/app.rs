use std::sync::Arc;

use chrono::Utc;

use crate::admin::{AdminFlow, AdminOutcome};
use crate::bid::{BidFlow, BidOutcome};
use crate::render::LotDetail;
use crate::state::AppState;
use crate::store::LotStore;
use crate::types::LotId;

/// The mini app: one store plus the flows that act on it
pub struct App {
    state: Arc<AppState>,
    store: Arc<LotStore>,
    bids: BidFlow,
    admin: AdminFlow,
}

impl App {
    pub fn new(state: Arc<AppState>) -> Self {
        let store = LotStore::new(state.clone());
        Self {
            bids: BidFlow::new(store.clone()),
            admin: AdminFlow::new(store.clone()),
            state,
            store,
        }
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    pub fn store(&self) -> &Arc<LotStore> {
        &self.store
    }

    /// Expand, hold the loading screen, first poll, then the admin entry.
    pub async fn start(&self) {
        let state = &self.state;
        state.host.expand();
        state.host.enable_closing_confirmation();

        state.surface.show_loading(true);
        tokio::time::sleep(state.config.splash_delay()).await;

        let _ = self.store.refresh().await;

        if self.admin.is_available() {
            tracing::info!("admin entry enabled for this user");
            state.surface.show_admin_entry();
        }
    }

    /// Shows the detail view for a lot from the last poll. Returns false for
    /// an unknown id.
    pub fn open_lot(&self, lot_id: LotId) -> bool {
        let lots = self.store.snapshot();
        let detail = if let Some(lot) = lots.active_lot(lot_id) {
            LotDetail::active(lot, Utc::now())
        } else if let Some(lot) = lots.sold_lot(lot_id) {
            LotDetail::sold(lot)
        } else {
            tracing::debug!(lot_id, "open requested for a lot not in the last poll");
            return false;
        };

        self.state.set_open_lot(Some(lot_id));
        self.state.surface.show_detail(&detail);
        true
    }

    pub fn close_detail(&self) {
        if let Some(lot_id) = self.state.open_lot() {
            self.state.close_detail_for(lot_id);
        }
    }

    pub async fn bid(&self, lot_id: LotId) -> BidOutcome {
        self.bids.run(lot_id).await
    }

    /// Outbid on whatever active lot the detail view shows.
    pub async fn bid_on_open_lot(&self) -> Option<BidOutcome> {
        let lot_id = self.state.open_lot()?;
        if self.store.snapshot().active_lot(lot_id).is_none() {
            tracing::debug!(lot_id, "open lot is not active, no bid");
            return None;
        }
        Some(self.bid(lot_id).await)
    }

    pub async fn admin_panel(&self) -> AdminOutcome {
        self.admin.show_panel().await
    }

    pub fn shutdown(&self) {
        self.store.stop();
    }
}
