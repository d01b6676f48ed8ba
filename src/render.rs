use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::timer::format_time_left;
use crate::types::{format_timestamp, BidRecord, Lot, LotCollection, LotId, SoldLot, Stars};

pub const CARD_PLACEHOLDER: &str = "https://via.placeholder.com/60?text=No+Image";
pub const DETAIL_PLACEHOLDER: &str = "https://via.placeholder.com/300?text=No+Image";
pub const SOLD_BADGE: &str = "SOLD";
pub const STAR: &str = "⭐";

const NO_BIDS: &str = "No bids";
const UNKNOWN_WINNER: &str = "Unknown";
const ANONYMOUS: &str = "Anonymous";

/// Where the rendered lots end up. Implemented by the host's view layer.
pub trait Surface: Send + Sync {
    fn show_loading(&self, loading: bool);

    fn render_lots(&self, view: &LotsView);

    fn update_timers(&self, labels: &[TimerLabel]);

    fn show_detail(&self, detail: &LotDetail);

    fn close_detail(&self);

    fn show_admin_entry(&self);
}

pub type SharedSurface = Arc<dyn Surface>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSource {
    pub url: String,
    pub fallback: &'static str,
}

impl ImageSource {
    fn new(url: &str, fallback: &'static str) -> Self {
        Self { url: url.to_string(), fallback }
    }

    /// The URL to show, switching to the placeholder once loading failed.
    pub fn resolve(&self, load_failed: bool) -> &str {
        if load_failed || self.url.trim().is_empty() {
            self.fallback
        } else {
            &self.url
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Listing<'a> {
    Active(&'a Lot),
    Sold(&'a SoldLot),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LotCard {
    pub lot_id: LotId,
    pub name: String,
    pub image: ImageSource,
    /// Next bid for active lots, final price for sold ones.
    pub price: Stars,
    /// Leader for active lots, winner for sold ones.
    pub bidder: Option<String>,
    pub timer: Option<String>,
    pub sold: bool,
}

impl LotCard {
    pub fn price_label(&self) -> String {
        format!("{} {STAR}", self.price)
    }

    pub fn badge(&self) -> Option<&'static str> {
        self.sold.then_some(SOLD_BADGE)
    }
}

pub fn render_card(listing: Listing<'_>, now: DateTime<Utc>) -> LotCard {
    match listing {
        Listing::Active(lot) => LotCard {
            lot_id: lot.id,
            name: lot.name.clone(),
            image: ImageSource::new(&lot.image_url, CARD_PLACEHOLDER),
            price: lot.next_bid(),
            bidder: Some(lot.leader().unwrap_or(NO_BIDS).to_string()),
            timer: Some(format_time_left(lot.deadline, now)),
            sold: false,
        },
        Listing::Sold(lot) => LotCard {
            lot_id: lot.id,
            name: lot.name.clone(),
            image: ImageSource::new(&lot.image_url, CARD_PLACEHOLDER),
            price: lot.current_price,
            bidder: Some(lot.winner().unwrap_or(UNKNOWN_WINNER).to_string()),
            timer: None,
            sold: true,
        },
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LotsView {
    pub active: Vec<LotCard>,
    pub sold: Vec<LotCard>,
}

impl LotsView {
    pub fn active_placeholder(&self) -> Option<&'static str> {
        self.active.is_empty().then_some("No active auctions")
    }

    pub fn sold_placeholder(&self) -> Option<&'static str> {
        self.sold.is_empty().then_some("No sold lots")
    }
}

/// Sold cards are the first `sold_limit` entries in the order received.
pub fn render_lots(lots: &LotCollection, now: DateTime<Utc>, sold_limit: usize) -> LotsView {
    LotsView {
        active: lots
            .active
            .iter()
            .map(|lot| render_card(Listing::Active(lot), now))
            .collect(),
        sold: lots
            .sold
            .iter()
            .take(sold_limit)
            .map(|lot| render_card(Listing::Sold(lot), now))
            .collect(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerLabel {
    pub lot_id: LotId,
    pub text: String,
}

// ── Detail view ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailStatus {
    Active,
    Ended,
    Sold,
}

impl DetailStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Active => "Auction active",
            Self::Ended => "Auction ended",
            Self::Sold => "Gift purchased",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BidLine {
    pub bidder: String,
    pub amount: Stars,
    pub at: Option<String>,
}

impl std::fmt::Display for BidLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} {STAR}", self.bidder, self.amount)?;
        if let Some(at) = &self.at {
            write!(f, " ({at})")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallToAction {
    pub lot_id: LotId,
    pub amount: Stars,
    pub enabled: bool,
}

impl CallToAction {
    pub fn label(&self) -> String {
        format!("Outbid - {} {STAR}", self.amount)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LotDetail {
    pub lot_id: LotId,
    pub name: String,
    pub image: ImageSource,
    pub status: DetailStatus,
    pub current_price: Stars,
    pub next_bid: Option<Stars>,
    /// Leader while active, winner once sold.
    pub party: String,
    pub time_left: Option<String>,
    pub sold_at: Option<String>,
    /// Most recent first.
    pub history: Vec<BidLine>,
    pub action: Option<CallToAction>,
}

impl LotDetail {
    pub fn active(lot: &Lot, now: DateTime<Utc>) -> Self {
        let ended = lot.is_ended(now);
        Self {
            lot_id: lot.id,
            name: lot.name.clone(),
            image: ImageSource::new(&lot.image_url, DETAIL_PLACEHOLDER),
            status: if ended { DetailStatus::Ended } else { DetailStatus::Active },
            current_price: lot.current_price,
            next_bid: Some(lot.next_bid()),
            party: lot.leader().unwrap_or("None").to_string(),
            time_left: Some(format_time_left(lot.deadline, now)),
            sold_at: None,
            history: history_lines(&lot.bid_history),
            action: Some(CallToAction {
                lot_id: lot.id,
                amount: lot.next_bid(),
                enabled: !ended,
            }),
        }
    }

    pub fn sold(lot: &SoldLot) -> Self {
        Self {
            lot_id: lot.id,
            name: lot.name.clone(),
            image: ImageSource::new(&lot.image_url, DETAIL_PLACEHOLDER),
            status: DetailStatus::Sold,
            current_price: lot.current_price,
            next_bid: None,
            party: lot.winner().unwrap_or(UNKNOWN_WINNER).to_string(),
            time_left: None,
            sold_at: lot.sold_at.map(format_timestamp),
            history: history_lines(&lot.bid_history),
            action: None,
        }
    }

    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![self.name.clone(), self.status.label().to_string()];

        match self.status {
            DetailStatus::Sold => {
                lines.push(format!("Final price: {} {STAR}", self.current_price));
                lines.push(format!("Winner: {}", self.party));
                if let Some(at) = &self.sold_at {
                    lines.push(format!("Sold at: {at}"));
                }
            }
            DetailStatus::Active | DetailStatus::Ended => {
                lines.push(format!("Current bid: {} {STAR}", self.current_price));
                if let Some(next) = self.next_bid {
                    lines.push(format!("Next bid: {next} {STAR}"));
                }
                lines.push(format!("Current leader: {}", self.party));
                if let Some(left) = &self.time_left {
                    lines.push(format!("Time left: {left}"));
                }
            }
        }

        lines.push("Bid history:".to_string());
        if self.history.is_empty() {
            let empty = match self.status {
                DetailStatus::Sold => "There were no bids",
                _ => "No bids yet",
            };
            lines.push(format!("  {empty}"));
        } else {
            lines.extend(self.history.iter().map(|line| format!("  {line}")));
        }

        if let Some(action) = &self.action {
            let suffix = if action.enabled { "" } else { " (disabled)" };
            lines.push(format!("[{}]{suffix}", action.label()));
        }
        lines
    }
}

fn history_lines(history: &[BidRecord]) -> Vec<BidLine> {
    let mut bids: Vec<&BidRecord> = history.iter().collect();
    bids.sort_by(|a, b| (b.timestamp, b.amount).cmp(&(a.timestamp, a.amount)));
    bids.into_iter()
        .map(|bid| BidLine {
            bidder: bid.bidder().unwrap_or(ANONYMOUS).to_string(),
            amount: bid.amount,
            at: bid.timestamp.map(format_timestamp),
        })
        .collect()
}
