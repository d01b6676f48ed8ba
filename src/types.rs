use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

pub type LotId = i64;
pub type UserId = i64;

/// Whole stars. The invoice converts to minor units separately.
pub type Stars = u64;

/// Who the host platform says is using the app
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl UserIdentity {
    pub fn display_name(&self) -> Option<&str> {
        display_name(self.username.as_deref(), self.first_name.as_deref())
    }
}

/// Username first, first name second, ignoring empty strings.
pub fn display_name<'a>(username: Option<&'a str>, first_name: Option<&'a str>) -> Option<&'a str> {
    username
        .filter(|s| !s.is_empty())
        .or(first_name.filter(|s| !s.is_empty()))
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BidRecord {
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    pub amount: Stars,
    #[serde(default, deserialize_with = "de_opt_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl BidRecord {
    pub fn bidder(&self) -> Option<&str> {
        display_name(self.username.as_deref(), self.first_name.as_deref())
    }
}

/// A lot that is still open for bids
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Lot {
    pub id: LotId,
    pub name: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub current_price: Stars,
    /// `None` until the first bid starts the clock.
    #[serde(default, deserialize_with = "de_opt_timestamp")]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_bidder_id: Option<UserId>,
    #[serde(default)]
    pub last_bidder_username: Option<String>,
    #[serde(default)]
    pub last_bidder_first_name: Option<String>,
    #[serde(default, deserialize_with = "de_null_as_empty")]
    pub bid_history: Vec<BidRecord>,
    #[serde(default)]
    pub auction_duration: Option<u64>,
}

impl Lot {
    pub fn next_bid(&self) -> Stars {
        self.current_price.saturating_add(1)
    }

    pub fn leader(&self) -> Option<&str> {
        display_name(
            self.last_bidder_username.as_deref(),
            self.last_bidder_first_name.as_deref(),
        )
    }

    /// A lot without a deadline never ends on its own.
    pub fn is_ended(&self, now: DateTime<Utc>) -> bool {
        self.deadline.is_some_and(|deadline| deadline <= now)
    }
}

/// A closed lot. Never changes once the backend reports it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SoldLot {
    pub id: LotId,
    pub name: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub current_price: Stars,
    #[serde(default)]
    pub winner_id: Option<UserId>,
    #[serde(default)]
    pub winner_username: Option<String>,
    #[serde(default)]
    pub winner_first_name: Option<String>,
    #[serde(default, deserialize_with = "de_opt_timestamp")]
    pub sold_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de_null_as_empty")]
    pub bid_history: Vec<BidRecord>,
}

impl SoldLot {
    pub fn winner(&self) -> Option<&str> {
        display_name(self.winner_username.as_deref(), self.winner_first_name.as_deref())
    }
}

/// The active/sold partition as of the last successful poll
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LotCollection {
    #[serde(default, rename = "active_lots", deserialize_with = "de_null_as_empty")]
    pub active: Vec<Lot>,
    #[serde(default, rename = "sold_lots", deserialize_with = "de_null_as_empty")]
    pub sold: Vec<SoldLot>,
}

impl LotCollection {
    pub fn active_lot(&self, lot_id: LotId) -> Option<&Lot> {
        self.active.iter().find(|lot| lot.id == lot_id)
    }

    pub fn sold_lot(&self, lot_id: LotId) -> Option<&SoldLot> {
        self.sold.iter().find(|lot| lot.id == lot_id)
    }
}

/// Accepts RFC 3339 as well as the naive `YYYY-MM-DD HH:MM:SS[.f]` shape
/// (space or `T` separated) the backend writes. Naive values are UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn de_opt_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => parse_timestamp(s)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {s}"))),
    }
}

fn de_null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
