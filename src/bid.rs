use std::sync::Arc;

use chrono::Utc;

use crate::api::{ApiError, PlaceBidRequest};
use crate::config::Config;
use crate::host::{Invoice, InvoiceStatus, LabeledPrice};
use crate::state::AppState;
use crate::store::{LotStore, ERROR_TITLE};
use crate::types::{Lot, LotId, Stars, UserId, UserIdentity};

const SUCCESS_TITLE: &str = "Success";
const CONFIRM_TITLE: &str = "Purchase confirmation";

/// Everything needed to settle a paid bid
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BidTicket {
    pub lot_id: LotId,
    pub lot_name: String,
    pub amount: Stars,
    pub bidder: UserIdentity,
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BidState {
    Idle { lot_id: LotId },
    ConfirmPending { lot: Lot, bidder: UserIdentity },
    PaymentPending { lot: Lot, bidder: UserIdentity, amount: Stars },
    Settling(BidTicket),
}

impl BidState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle { .. } => "idle",
            Self::ConfirmPending { .. } => "confirm_pending",
            Self::PaymentPending { .. } => "payment_pending",
            Self::Settling(_) => "settling",
        }
    }
}

/// How a bid attempt ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BidOutcome {
    Placed { lot_id: LotId, amount: Stars },
    Declined,
    PaymentCancelled,
    PaymentFailed,
    /// Stars were paid but the backend refused the bid, e.g. someone outbid
    /// first. The payment is not reversed by this client.
    RejectedAfterPayment { reference: String, reason: String },
    /// The flow could not reach the confirmation step.
    Unavailable(String),
}

enum Step {
    Next(BidState),
    Done(BidOutcome),
}

/// `bid_{lot}_{unix millis}_{user}`, unique per invoice attempt.
pub fn transaction_reference(lot_id: LotId, unix_millis: i64, user_id: UserId) -> String {
    format!("bid_{lot_id}_{unix_millis}_{user_id}")
}

/// `None` when the price in minor units does not fit a `u64`.
pub fn build_invoice(
    config: &Config,
    lot: &Lot,
    amount: Stars,
    bidder: &UserIdentity,
) -> Option<Invoice> {
    let minor_units = amount.checked_mul(config.minor_units_per_star)?;
    let payload = serde_json::json!({
        "lot_id": lot.id,
        "bid_amount": amount,
        "user_id": bidder.id,
        "username": bidder.username,
        "first_name": bidder.first_name,
    });
    Some(Invoice {
        title: format!("Bid on {}", lot.name),
        description: format!("Outbid the current price in the auction for \"{}\"", lot.name),
        payload: payload.to_string(),
        currency: config.invoice_currency.clone(),
        prices: vec![LabeledPrice {
            label: format!("Bid of {amount} stars"),
            amount: minor_units,
        }],
    })
}

/// Confirm → pay → settle, one attempt per `run`. The backend is the only
/// arbiter between racing bidders.
pub struct BidFlow {
    store: Arc<LotStore>,
}

impl BidFlow {
    pub fn new(store: Arc<LotStore>) -> Self {
        Self { store }
    }

    fn app(&self) -> &Arc<AppState> {
        self.store.app()
    }

    pub async fn run(&self, lot_id: LotId) -> BidOutcome {
        let mut state = BidState::Idle { lot_id };
        loop {
            tracing::debug!(lot_id, state = state.name(), "bid flow");
            let step = match state {
                BidState::Idle { lot_id } => self.load(lot_id).await,
                BidState::ConfirmPending { lot, bidder } => self.confirm(lot, bidder).await,
                BidState::PaymentPending { lot, bidder, amount } => {
                    self.pay(lot, bidder, amount).await
                }
                BidState::Settling(ticket) => self.settle(ticket).await,
            };
            match step {
                Step::Next(next) => state = next,
                Step::Done(outcome) => {
                    tracing::info!(lot_id, ?outcome, "bid flow finished");
                    return outcome;
                }
            }
        }
    }

    /// Idle → ConfirmPending: re-read the lot so the bid uses current data.
    async fn load(&self, lot_id: LotId) -> Step {
        let app = self.app();
        let Some(bidder) = app.host.user() else {
            tracing::warn!(lot_id, "bid requested without a user identity");
            app.host.notify(ERROR_TITLE, "Could not identify your account").await;
            return Step::Done(BidOutcome::Unavailable("no user identity".to_string()));
        };

        let lot = match app.api.fetch_lot(lot_id).await {
            Ok(lot) => lot,
            Err(e) => {
                tracing::error!(lot_id, error = %e, "could not load lot for bid");
                app.host
                    .notify(ERROR_TITLE, "An error occurred while placing the bid")
                    .await;
                return Step::Done(BidOutcome::Unavailable(e.to_string()));
            }
        };

        if lot.is_ended(Utc::now()) {
            app.host.notify(ERROR_TITLE, "This auction has already ended").await;
            return Step::Done(BidOutcome::Unavailable("auction ended".to_string()));
        }

        Step::Next(BidState::ConfirmPending { lot, bidder })
    }

    /// ConfirmPending → PaymentPending, or back to idle on "no".
    async fn confirm(&self, lot: Lot, bidder: UserIdentity) -> Step {
        let amount = lot.next_bid();
        let message = format!(
            "Do you really want to buy \"{}\" for {amount} stars?",
            lot.name
        );
        if !self.app().host.show_confirm(CONFIRM_TITLE, &message).await {
            tracing::info!(lot_id = lot.id, amount, "bid declined");
            return Step::Done(BidOutcome::Declined);
        }
        Step::Next(BidState::PaymentPending { lot, bidder, amount })
    }

    /// PaymentPending → Settling once the host reports `paid`.
    async fn pay(&self, lot: Lot, bidder: UserIdentity, amount: Stars) -> Step {
        let app = self.app();
        let reference = transaction_reference(lot.id, Utc::now().timestamp_millis(), bidder.id);
        let Some(invoice) = build_invoice(&app.config, &lot, amount, &bidder) else {
            tracing::error!(lot_id = lot.id, amount, "bid amount overflows the invoice price");
            app.host
                .notify(ERROR_TITLE, "The bid amount is too large to pay")
                .await;
            return Step::Done(BidOutcome::Unavailable("bid amount out of range".to_string()));
        };

        tracing::info!(lot_id = lot.id, amount, reference = %reference, "opening invoice");
        let status = app.host.open_invoice(&reference, invoice).outcome().await;
        tracing::info!(lot_id = lot.id, reference = %reference, %status, "invoice closed");

        match status {
            InvoiceStatus::Paid => Step::Next(BidState::Settling(BidTicket {
                lot_id: lot.id,
                lot_name: lot.name,
                amount,
                bidder,
                reference,
            })),
            InvoiceStatus::Failed => {
                app.host.notify(ERROR_TITLE, "Payment could not be completed").await;
                Step::Done(BidOutcome::PaymentFailed)
            }
            InvoiceStatus::Cancelled => Step::Done(BidOutcome::PaymentCancelled),
        }
    }

    async fn settle(&self, ticket: BidTicket) -> Step {
        let app = self.app();
        let request = PlaceBidRequest::new(ticket.lot_id, &ticket.bidder);

        match app.api.place_bid(&request).await {
            Ok(_) => {
                app.close_detail_for(ticket.lot_id);
                app.push_event(
                    "bid",
                    &format!("{} stars on \"{}\" ({})", ticket.amount, ticket.lot_name, ticket.reference),
                );
                // Refresh reports its own failures.
                let _ = self.store.refresh().await;
                app.host.notify(SUCCESS_TITLE, "Bid placed successfully!").await;
                Step::Done(BidOutcome::Placed { lot_id: ticket.lot_id, amount: ticket.amount })
            }
            Err(e) => {
                let reason = match &e {
                    ApiError::Rejected(msg) => msg.clone(),
                    _ => "Error placing the bid after payment".to_string(),
                };
                tracing::error!(
                    lot_id = ticket.lot_id,
                    reference = %ticket.reference,
                    error = %e,
                    "bid placement failed after payment"
                );
                app.push_event(
                    "discrepancy",
                    &format!(
                        "paid {} stars for \"{}\" but the bid failed: {reason} ({})",
                        ticket.amount, ticket.lot_name, ticket.reference
                    ),
                );
                let message = format!(
                    "{reason}\n\nYour payment went through but the bid was not placed. \
                     Contact support with reference {}.",
                    ticket.reference
                );
                app.host.notify(ERROR_TITLE, &message).await;
                Step::Done(BidOutcome::RejectedAfterPayment {
                    reference: ticket.reference,
                    reason,
                })
            }
        }
    }
}
