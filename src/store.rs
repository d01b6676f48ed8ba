use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::api::ApiError;
use crate::render;
use crate::state::AppState;
use crate::timer::{self, ExpiryTracker, Tick};
use crate::types::LotCollection;

pub const ERROR_TITLE: &str = "Error";

/// Owns the last polled lot partition and the timer process that counts it down
pub struct LotStore {
    app: Arc<AppState>,
    lots: RwLock<Arc<LotCollection>>,
    timer: Mutex<Option<CancellationToken>>,
    expiry: Mutex<ExpiryTracker>,
}

impl LotStore {
    pub fn new(app: Arc<AppState>) -> Arc<Self> {
        Arc::new(Self {
            app,
            lots: RwLock::new(Arc::new(LotCollection::default())),
            timer: Mutex::new(None),
            expiry: Mutex::new(ExpiryTracker::default()),
        })
    }

    pub fn app(&self) -> &Arc<AppState> {
        &self.app
    }

    pub fn snapshot(&self) -> Arc<LotCollection> {
        self.lots.read().unwrap().clone()
    }

    /// Polls the backend and swaps in the new partition in one step. On failure
    /// the user is told and the previous lots stay on screen.
    pub async fn refresh(self: &Arc<Self>) -> Result<(), ApiError> {
        let app = &self.app;
        app.surface.show_loading(true);
        let result = app.api.fetch_lots().await;
        app.surface.show_loading(false);

        match result {
            Ok(lots) => {
                let lots = Arc::new(lots);
                *self.lots.write().unwrap() = lots.clone();

                let view = render::render_lots(&lots, Utc::now(), app.config.sold_display_limit);
                app.surface.render_lots(&view);
                self.restart_timer();

                tracing::info!(active = lots.active.len(), sold = lots.sold.len(), "lots refreshed");
                app.push_event(
                    "refresh",
                    &format!("{} active, {} sold", lots.active.len(), lots.sold.len()),
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to load lots");
                app.push_event("error", &format!("refresh failed: {e}"));
                let message = if e.is_transport() {
                    "Connection error"
                } else {
                    "Could not load lots"
                };
                app.host.notify(ERROR_TITLE, message).await;
                Err(e)
            }
        }
    }

    /// Countdown labels for the current active lots as of `now`.
    pub fn tick(&self, now: DateTime<Utc>) -> Tick {
        let lots = self.snapshot();
        self.expiry.lock().unwrap().tick(&lots.active, now)
    }

    /// Cancels the running timer process, if any.
    pub fn stop(&self) {
        if let Some(token) = self.timer.lock().unwrap().take() {
            token.cancel();
            tracing::debug!("lot store stopped");
        }
    }

    pub fn timer_running(&self) -> bool {
        self.timer
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|token| !token.is_cancelled())
    }

    fn restart_timer(self: &Arc<Self>) {
        let config = &self.app.config;
        let mut slot = self.timer.lock().unwrap();
        if let Some(previous) = slot.take() {
            previous.cancel();
        }
        *slot = Some(timer::spawn(
            Arc::downgrade(self),
            config.timer_tick(),
            config.expiry_refresh_delay(),
        ));
    }
}

impl Drop for LotStore {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.timer.lock() {
            if let Some(token) = slot.take() {
                token.cancel();
            }
        }
    }
}
