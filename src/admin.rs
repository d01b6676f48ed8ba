use std::sync::Arc;

use thiserror::Error;

use crate::api::{ApiError, CreateLotRequest};
use crate::config::Config;
use crate::host::{Popup, PopupButton};
use crate::state::AppState;
use crate::store::{LotStore, ERROR_TITLE};
use crate::types::{format_timestamp, LotCollection, UserIdentity};
use crate::render::STAR;

pub const CREATE_LOT_BUTTON: &str = "create_lot";
pub const LIST_LOTS_BUTTON: &str = "list_lots";

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DurationError {
    #[error("duration is not a whole number of minutes")]
    NotANumber,
    #[error("duration must be positive")]
    NotPositive,
    #[error("duration is too large")]
    TooLarge,
}

/// Strict: surrounding whitespace is allowed, trailing garbage is not.
pub fn parse_duration_minutes(raw: &str) -> Result<u32, DurationError> {
    let minutes: i64 = raw.trim().parse().map_err(|_| DurationError::NotANumber)?;
    if minutes <= 0 {
        return Err(DurationError::NotPositive);
    }
    u32::try_from(minutes).map_err(|_| DurationError::TooLarge)
}

/// Client-side gate for the admin entry. The backend re-checks every call.
pub fn is_admin(config: &Config, user: Option<&UserIdentity>) -> bool {
    user.is_some_and(|u| config.is_admin(u.id))
}

/// Text listing of both partitions for the admin popup
pub fn summarize(lots: &LotCollection) -> String {
    let mut message = String::from("Active lots:\n");
    for lot in &lots.active {
        let until = match lot.deadline {
            Some(deadline) => format!("until {}", format_timestamp(deadline)),
            None => "awaiting first bid".to_string(),
        };
        message.push_str(&format!("\n{} - {} {STAR} ({until})", lot.name, lot.current_price));
    }

    message.push_str("\n\nSold lots:\n");
    for lot in &lots.sold {
        let sold_at = lot.sold_at.map(format_timestamp).unwrap_or_else(|| "-".to_string());
        message.push_str(&format!("\n{} - {} {STAR} ({sold_at})", lot.name, lot.current_price));
    }
    message
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminOutcome {
    Created { name: String },
    Listed { summary: String },
    /// Cancelled at some prompt; nothing was sent.
    Aborted,
    InvalidDuration(DurationError),
    Failed(String),
    Forbidden,
}

pub struct AdminFlow {
    store: Arc<LotStore>,
}

impl AdminFlow {
    pub fn new(store: Arc<LotStore>) -> Self {
        Self { store }
    }

    fn app(&self) -> &Arc<AppState> {
        self.store.app()
    }

    pub fn is_available(&self) -> bool {
        let app = self.app();
        is_admin(&app.config, app.host.user().as_ref())
    }

    pub async fn show_panel(&self) -> AdminOutcome {
        if !self.is_available() {
            tracing::warn!("admin panel requested by a non-admin user");
            return AdminOutcome::Forbidden;
        }

        let popup = Popup::choice(
            "Admin panel",
            "Choose an action",
            vec![
                PopupButton::new(CREATE_LOT_BUTTON, "Create lot"),
                PopupButton::new(LIST_LOTS_BUTTON, "List lots"),
                PopupButton::cancel(),
            ],
        );
        let reply = self.app().host.show_popup(popup).await;
        match reply.button_id.as_deref() {
            Some(CREATE_LOT_BUTTON) => self.create_lot().await,
            Some(LIST_LOTS_BUTTON) => self.list_lots().await,
            _ => AdminOutcome::Aborted,
        }
    }

    /// Name → image URL → duration. Cancelling any prompt abandons the lot.
    pub async fn create_lot(&self) -> AdminOutcome {
        let app = self.app();

        let Some(name) = self.ask("Create lot", "Enter the lot name:").await else {
            return AdminOutcome::Aborted;
        };
        let Some(image_url) = self.ask("Lot image", "Send the image URL:").await else {
            return AdminOutcome::Aborted;
        };
        let Some(raw_duration) = self
            .ask("Auction duration", "Enter the duration in minutes:")
            .await
        else {
            return AdminOutcome::Aborted;
        };

        let auction_duration = match parse_duration_minutes(&raw_duration) {
            Ok(minutes) => minutes,
            Err(e) => {
                tracing::info!(input = %raw_duration, error = %e, "rejected lot duration");
                app.host.notify(ERROR_TITLE, "Enter a valid number of minutes").await;
                return AdminOutcome::InvalidDuration(e);
            }
        };

        let request = CreateLotRequest { name: name.clone(), image_url, auction_duration };
        match app.api.admin_create_lot(&app.host.init_data(), &request).await {
            Ok(created) => {
                tracing::info!(lot_id = ?created.lot_id, name = %name, "lot created");
                app.push_event("admin", &format!("created lot \"{name}\""));
                app.host.notify("Success", &format!("Lot \"{name}\" created!")).await;
                let _ = self.store.refresh().await;
                AdminOutcome::Created { name }
            }
            Err(e) => {
                let message = failure_message(&e, "Error creating the lot");
                app.host.notify(ERROR_TITLE, &message).await;
                AdminOutcome::Failed(message)
            }
        }
    }

    pub async fn list_lots(&self) -> AdminOutcome {
        let app = self.app();
        match app.api.admin_list_lots(&app.host.init_data()).await {
            Ok(lots) => {
                let summary = summarize(&lots);
                app.host
                    .show_popup(Popup::notice("Lot list", &summary))
                    .await;
                AdminOutcome::Listed { summary }
            }
            Err(e) => {
                let message = failure_message(&e, "Error loading the lot list");
                app.host.notify(ERROR_TITLE, &message).await;
                AdminOutcome::Failed(message)
            }
        }
    }

    async fn ask(&self, title: &str, message: &str) -> Option<String> {
        let reply = self.app().host.show_popup(Popup::prompt(title, message)).await;
        reply.text().map(str::to_owned)
    }
}

/// Backend messages are shown as-is; transport problems get a generic line.
fn failure_message(e: &ApiError, fallback: &str) -> String {
    tracing::error!(error = %e, "admin request failed");
    match e {
        ApiError::Rejected(msg) => msg.clone(),
        _ => fallback.to_string(),
    }
}
