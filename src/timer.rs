use std::collections::HashSet;
use std::sync::Weak;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::render::TimerLabel;
use crate::store::LotStore;
use crate::types::{Lot, LotId};

pub const AWAITING_FIRST_BID: &str = "awaiting first bid";
pub const AUCTION_ENDED: &str = "auction ended";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeLeft {
    AwaitingFirstBid,
    Ended,
    /// Strictly positive milliseconds.
    Remaining(i64),
}

impl TimeLeft {
    pub fn compute(deadline: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        match deadline {
            None => Self::AwaitingFirstBid,
            Some(deadline) => {
                let diff = (deadline - now).num_milliseconds();
                if diff <= 0 {
                    Self::Ended
                } else {
                    Self::Remaining(diff)
                }
            }
        }
    }

    pub fn is_ended(self) -> bool {
        self == Self::Ended
    }
}

impl std::fmt::Display for TimeLeft {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::AwaitingFirstBid => f.write_str(AWAITING_FIRST_BID),
            Self::Ended => f.write_str(AUCTION_ENDED),
            Self::Remaining(ms) => {
                let hours = ms / 3_600_000;
                let minutes = (ms % 3_600_000) / 60_000;
                let seconds = (ms % 60_000) / 1000;
                write!(f, "{hours:02}:{minutes:02}:{seconds:02}")
            }
        }
    }
}

pub fn format_time_left(deadline: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    TimeLeft::compute(deadline, now).to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tick {
    pub labels: Vec<TimerLabel>,
    /// At least one lot crossed its deadline since the previous tick.
    pub refresh_due: bool,
}

/// Remembers which lots were already seen as ended, so an expiry asks for one
/// refresh instead of one per tick. Lives in the store, so it outlasts timer
/// restarts; ids leave the set once the lot leaves the active list.
#[derive(Debug, Default)]
pub struct ExpiryTracker {
    expired: HashSet<LotId>,
}

impl ExpiryTracker {
    pub fn tick(&mut self, lots: &[Lot], now: DateTime<Utc>) -> Tick {
        self.expired.retain(|id| lots.iter().any(|lot| lot.id == *id));
        let mut refresh_due = false;
        let labels = lots
            .iter()
            .map(|lot| {
                let left = TimeLeft::compute(lot.deadline, now);
                if left.is_ended() && self.expired.insert(lot.id) {
                    tracing::info!(lot_id = lot.id, name = %lot.name, "auction deadline passed");
                    refresh_due = true;
                }
                TimerLabel { lot_id: lot.id, text: left.to_string() }
            })
            .collect();
        Tick { labels, refresh_due }
    }
}

/// Starts the countdown process for the store's active lots. The returned token
/// stops it; the store cancels it before starting a replacement.
pub fn spawn(store: Weak<LotStore>, period: Duration, refresh_delay: Duration) -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::debug!(period_ms = period.as_millis() as u64, "timer process started");

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::debug!("timer process stopped");
                    break;
                }
                _ = interval.tick() => {
                    let Some(store) = store.upgrade() else {
                        tracing::debug!("lot store dropped, timer process exiting");
                        break;
                    };

                    let tick = store.tick(Utc::now());
                    store.app().surface.update_timers(&tick.labels);

                    if tick.refresh_due {
                        schedule_refresh(store, token.clone(), refresh_delay);
                    }
                }
            }
        }
    });

    cancel
}

fn schedule_refresh(store: std::sync::Arc<LotStore>, token: CancellationToken, delay: Duration) {
    tracing::info!(delay_ms = delay.as_millis() as u64, "scheduling refresh after expiry");
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {
                tracing::debug!("expiry refresh superseded by a newer poll");
            }
            _ = tokio::time::sleep(delay) => {
                if let Err(e) = store.refresh().await {
                    tracing::warn!(error = %e, "refresh after expiry failed");
                }
            }
        }
    });
}
