use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::config::Config;
use crate::types::{Lot, LotCollection, LotId, UserIdentity};

pub const INIT_DATA_HEADER: &str = "X-Telegram-Init-Data";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// The backend answered `success: false`.
    #[error("{0}")]
    Rejected(String),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("invalid endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
}

impl ApiError {
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaceBidRequest {
    pub lot_id: LotId,
    pub user_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
}

impl PlaceBidRequest {
    pub fn new(lot_id: LotId, bidder: &UserIdentity) -> Self {
        Self {
            lot_id,
            user_id: bidder.id,
            username: bidder.username.clone(),
            first_name: bidder.first_name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateLotRequest {
    pub name: String,
    pub image_url: String,
    /// Minutes.
    pub auction_duration: u32,
}

#[derive(Debug, Deserialize)]
struct LotEnvelope {
    lot: Lot,
}

#[derive(Debug, Default, Deserialize)]
pub struct PlacedBid {
    #[serde(default)]
    pub lot: Option<Lot>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreatedLot {
    #[serde(default)]
    pub lot_id: Option<LotId>,
}

/// HTTP client for the auction backend
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base: Url,
}

impl BackendClient {
    pub fn new(config: &Config) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Self::with_client(http, &config.backend_url)
    }

    pub fn with_client(http: reqwest::Client, base_url: &str) -> Result<Self, ApiError> {
        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { http, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub(crate) fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.base.join(path.trim_start_matches('/'))?)
    }

    // ── Public endpoints ────────────────────────────────────────────────────

    pub async fn fetch_lots(&self) -> Result<LotCollection, ApiError> {
        let url = self.endpoint("api/lots")?;
        self.send(self.http.get(url), "fetch_lots").await
    }

    /// Current snapshot of one lot, used right before a bid.
    pub async fn fetch_lot(&self, lot_id: LotId) -> Result<Lot, ApiError> {
        let url = self.endpoint(&format!("api/lot/{lot_id}"))?;
        let envelope: LotEnvelope = self.send(self.http.get(url), "fetch_lot").await?;
        Ok(envelope.lot)
    }

    pub async fn place_bid(&self, request: &PlaceBidRequest) -> Result<PlacedBid, ApiError> {
        tracing::info!(lot_id = request.lot_id, user_id = request.user_id, "placing bid");
        let url = self.endpoint("api/place_bid")?;
        self.send(self.http.post(url).json(request), "place_bid").await
    }

    // ── Admin endpoints ─────────────────────────────────────────────────────

    pub async fn admin_create_lot(
        &self,
        init_data: &str,
        request: &CreateLotRequest,
    ) -> Result<CreatedLot, ApiError> {
        tracing::info!(name = %request.name, minutes = request.auction_duration, "creating lot");
        let url = self.endpoint("admin/create_lot")?;
        let req = self
            .http
            .post(url)
            .header(INIT_DATA_HEADER, init_data)
            .json(request);
        self.send(req, "admin_create_lot").await
    }

    pub async fn admin_list_lots(&self, init_data: &str) -> Result<LotCollection, ApiError> {
        let url = self.endpoint("admin/list_lots")?;
        let req = self.http.get(url).header(INIT_DATA_HEADER, init_data);
        self.send(req, "admin_list_lots").await
    }

    /// Every endpoint answers `{success, error?, ...}`. `success: false` maps to
    /// `Rejected`, anything unparseable to `Malformed`.
    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        op: &'static str,
    ) -> Result<T, ApiError> {
        let resp = request.send().await.inspect_err(|e| {
            tracing::warn!(op, error = %e, "backend request failed");
        })?;

        let status = resp.status();
        let body = resp.text().await?;
        tracing::debug!(op, status = %status, bytes = body.len(), "backend response");

        let value: serde_json::Value = match serde_json::from_str(&body) {
            Ok(v) => v,
            Err(_) if !status.is_success() => {
                tracing::warn!(op, status = %status, body, "backend HTTP error");
                return Err(ApiError::Rejected(http_failure(status)));
            }
            Err(e) => return Err(ApiError::Malformed(e.to_string())),
        };

        let success = value
            .get("success")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);
        if !success {
            let message = value
                .get("error")
                .and_then(serde_json::Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .unwrap_or_else(|| {
                    if status.is_success() {
                        "unknown error".to_string()
                    } else {
                        http_failure(status)
                    }
                });
            tracing::warn!(op, status = %status, error = %message, "backend rejected request");
            return Err(ApiError::Rejected(message));
        }

        serde_json::from_value(value).map_err(|e| ApiError::Malformed(e.to_string()))
    }
}

fn http_failure(status: StatusCode) -> String {
    format!("HTTP {status}")
}
