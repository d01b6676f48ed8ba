use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::types::UserIdentity;

pub const CANCEL_BUTTON: &str = "cancel";
pub const SUBMIT_BUTTON: &str = "submit";
pub const OK_BUTTON: &str = "ok";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonKind {
    Default,
    Ok,
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopupButton {
    pub id: String,
    pub text: String,
    pub kind: ButtonKind,
}

impl PopupButton {
    pub fn new(id: &str, text: &str) -> Self {
        Self { id: id.to_string(), text: text.to_string(), kind: ButtonKind::Default }
    }

    pub fn ok() -> Self {
        Self { id: OK_BUTTON.to_string(), text: "OK".to_string(), kind: ButtonKind::Ok }
    }

    pub fn cancel() -> Self {
        Self { id: CANCEL_BUTTON.to_string(), text: "Cancel".to_string(), kind: ButtonKind::Cancel }
    }
}

/// A modal the host shows on top of the app
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Popup {
    pub title: String,
    pub message: String,
    pub buttons: Vec<PopupButton>,
    pub accepts_input: bool,
}

impl Popup {
    /// Blocking acknowledgment with a single OK button.
    pub fn notice(title: &str, message: &str) -> Self {
        Self {
            title: title.to_string(),
            message: message.to_string(),
            buttons: vec![PopupButton::ok()],
            accepts_input: false,
        }
    }

    /// Free-text question with submit and cancel.
    pub fn prompt(title: &str, message: &str) -> Self {
        Self {
            title: title.to_string(),
            message: message.to_string(),
            buttons: vec![PopupButton::new(SUBMIT_BUTTON, "OK"), PopupButton::cancel()],
            accepts_input: true,
        }
    }

    pub fn choice(title: &str, message: &str, buttons: Vec<PopupButton>) -> Self {
        Self {
            title: title.to_string(),
            message: message.to_string(),
            buttons,
            accepts_input: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PopupReply {
    pub button_id: Option<String>,
    pub input: Option<String>,
}

impl PopupReply {
    pub fn pressed(button_id: &str) -> Self {
        Self { button_id: Some(button_id.to_string()), input: None }
    }

    pub fn submitted(input: &str) -> Self {
        Self { button_id: Some(SUBMIT_BUTTON.to_string()), input: Some(input.to_string()) }
    }

    pub fn dismissed() -> Self {
        Self::default()
    }

    pub fn is_cancel(&self) -> bool {
        matches!(self.button_id.as_deref(), None | Some(CANCEL_BUTTON))
    }

    /// Trimmed input, `None` if the user cancelled or left it empty.
    pub fn text(&self) -> Option<&str> {
        if self.is_cancel() {
            return None;
        }
        self.input.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledPrice {
    pub label: String,
    /// Minor units of `Invoice::currency`.
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoice {
    pub title: String,
    pub description: String,
    pub payload: String,
    pub currency: String,
    pub prices: Vec<LabeledPrice>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvoiceStatus {
    Paid,
    Failed,
    Cancelled,
}

impl InvoiceStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "paid" => Some(Self::Paid),
            "failed" => Some(Self::Failed),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Paid => write!(f, "paid"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Host side of one invoice attempt. Consumed on resolve, so a status is
/// delivered at most once.
#[derive(Debug)]
pub struct PaymentSender(oneshot::Sender<InvoiceStatus>);

impl PaymentSender {
    pub fn resolve(self, status: InvoiceStatus) {
        if self.0.send(status).is_err() {
            tracing::debug!(%status, "payment status arrived after the bid flow went away");
        }
    }
}

/// App side of one invoice attempt
#[derive(Debug)]
pub struct PaymentHandle(oneshot::Receiver<InvoiceStatus>);

impl PaymentHandle {
    pub fn channel() -> (PaymentSender, PaymentHandle) {
        let (tx, rx) = oneshot::channel();
        (PaymentSender(tx), PaymentHandle(rx))
    }

    pub fn resolved(status: InvoiceStatus) -> Self {
        let (tx, handle) = Self::channel();
        tx.resolve(status);
        handle
    }

    /// A sender dropped without a status counts as a failed payment.
    pub async fn outcome(self) -> InvoiceStatus {
        match self.0.await {
            Ok(status) => status,
            Err(_) => {
                tracing::warn!("host dropped the invoice without reporting a status");
                InvoiceStatus::Failed
            }
        }
    }
}

/// What the messaging client offers the mini app
#[async_trait]
pub trait HostPlatform: Send + Sync {
    fn expand(&self);

    fn enable_closing_confirmation(&self);

    fn user(&self) -> Option<UserIdentity>;

    /// Raw signed init data, forwarded to admin endpoints.
    fn init_data(&self) -> String;

    async fn show_popup(&self, popup: Popup) -> PopupReply;

    async fn show_confirm(&self, title: &str, message: &str) -> bool;

    fn open_invoice(&self, reference: &str, invoice: Invoice) -> PaymentHandle;

    async fn notify(&self, title: &str, message: &str) {
        self.show_popup(Popup::notice(title, message)).await;
    }
}

pub type SharedHost = Arc<dyn HostPlatform>;
