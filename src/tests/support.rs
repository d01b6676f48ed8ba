/// Scripted host, recording surface and an in-process fake backend shared by
/// the flow tests.
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::api::{BackendClient, INIT_DATA_HEADER};
use crate::app::App;
use crate::config::Config;
use crate::host::{HostPlatform, Invoice, InvoiceStatus, PaymentHandle, Popup, PopupReply};
use crate::render::{LotDetail, LotsView, Surface, TimerLabel};
use crate::state::AppState;
use crate::types::{Lot, LotId, UserIdentity};

pub const ADMIN_ID: i64 = 123_456_789;
pub const BIDDER_ID: i64 = 42;
pub const INIT_DATA: &str = "query_id=AAH&user=%7B%22id%22%3A123456789%7D&auth_date=1700000000&hash=abc";

pub fn bidder() -> UserIdentity {
    UserIdentity {
        id: BIDDER_ID,
        first_name: Some("Ada".to_string()),
        last_name: None,
        username: Some("ada".to_string()),
    }
}

pub fn admin() -> UserIdentity {
    UserIdentity {
        id: ADMIN_ID,
        first_name: Some("Root".to_string()),
        last_name: None,
        username: None,
    }
}

pub fn test_config(backend_url: &str) -> Config {
    Config {
        backend_url: backend_url.to_string(),
        admin_ids: vec![ADMIN_ID],
        splash_delay_ms: 0,
        expiry_refresh_delay_ms: 60_000,
        request_timeout_secs: 5,
        ..Config::default()
    }
}

/// Plain active lot for the pure rendering and timer tests.
pub fn lot(id: LotId, price: u64, deadline: Option<DateTime<Utc>>) -> Lot {
    Lot {
        id,
        name: format!("Gift {id}"),
        image_url: format!("https://img.example/{id}.png"),
        current_price: price,
        deadline,
        last_bidder_id: None,
        last_bidder_username: None,
        last_bidder_first_name: None,
        bid_history: Vec::new(),
        auction_duration: Some(60),
    }
}

// ── JSON fixtures ───────────────────────────────────────────────────────────

pub fn lot_json(id: LotId, price: u64, deadline: Option<DateTime<Utc>>) -> Value {
    json!({
        "id": id,
        "name": format!("Gift {id}"),
        "image_url": format!("https://img.example/{id}.png"),
        "auction_duration": 60,
        "current_price": price,
        "status": "active",
        "deadline": deadline.map(|d| d.to_rfc3339()),
        "last_bidder_id": null,
        "last_bidder_username": null,
        "last_bidder_first_name": null,
        "bid_history": [],
    })
}

pub fn sold_json(id: LotId, price: u64, winner: &str) -> Value {
    json!({
        "id": id,
        "name": format!("Gift {id}"),
        "image_url": format!("https://img.example/{id}.png"),
        "current_price": price,
        "status": "sold",
        "deadline": "2024-03-01T10:00:00",
        "winner_id": 7,
        "winner_username": winner,
        "winner_first_name": null,
        "sold_at": "2024-03-01 10:00:05",
        "bid_history": [
            {"user_id": 7, "username": winner, "first_name": null, "amount": price, "timestamp": "2024-03-01 09:55:00"}
        ],
    })
}

pub fn lots_payload(active: Vec<Value>, sold: Vec<Value>) -> Value {
    json!({"success": true, "active_lots": active, "sold_lots": sold})
}

// ── Host ────────────────────────────────────────────────────────────────────

pub struct FakeHost {
    user: Option<UserIdentity>,
    replies: Mutex<VecDeque<PopupReply>>,
    confirms: Mutex<VecDeque<bool>>,
    payments: Mutex<VecDeque<InvoiceStatus>>,
    pub popups: Mutex<Vec<Popup>>,
    pub confirm_prompts: Mutex<Vec<String>>,
    pub invoices: Mutex<Vec<(String, Invoice)>>,
}

impl FakeHost {
    pub fn new(user: Option<UserIdentity>) -> Self {
        Self {
            user,
            replies: Mutex::new(VecDeque::new()),
            confirms: Mutex::new(VecDeque::new()),
            payments: Mutex::new(VecDeque::new()),
            popups: Mutex::new(Vec::new()),
            confirm_prompts: Mutex::new(Vec::new()),
            invoices: Mutex::new(Vec::new()),
        }
    }

    pub fn reply(&self, reply: PopupReply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn answer_confirm(&self, yes: bool) {
        self.confirms.lock().unwrap().push_back(yes);
    }

    pub fn pay(&self, status: InvoiceStatus) {
        self.payments.lock().unwrap().push_back(status);
    }

    pub fn popups(&self) -> Vec<Popup> {
        self.popups.lock().unwrap().clone()
    }

    pub fn invoices(&self) -> Vec<(String, Invoice)> {
        self.invoices.lock().unwrap().clone()
    }
}

#[async_trait]
impl HostPlatform for FakeHost {
    fn expand(&self) {}

    fn enable_closing_confirmation(&self) {}

    fn user(&self) -> Option<UserIdentity> {
        self.user.clone()
    }

    fn init_data(&self) -> String {
        INIT_DATA.to_string()
    }

    async fn show_popup(&self, popup: Popup) -> PopupReply {
        self.popups.lock().unwrap().push(popup);
        self.replies.lock().unwrap().pop_front().unwrap_or_default()
    }

    async fn show_confirm(&self, _title: &str, message: &str) -> bool {
        self.confirm_prompts.lock().unwrap().push(message.to_string());
        self.confirms.lock().unwrap().pop_front().unwrap_or(false)
    }

    fn open_invoice(&self, reference: &str, invoice: Invoice) -> PaymentHandle {
        self.invoices.lock().unwrap().push((reference.to_string(), invoice));
        match self.payments.lock().unwrap().pop_front() {
            Some(status) => PaymentHandle::resolved(status),
            // Sender dropped here: the host never reports back.
            None => PaymentHandle::channel().1,
        }
    }
}

// ── Surface ─────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeSurface {
    pub views: Mutex<Vec<LotsView>>,
    pub details: Mutex<Vec<LotDetail>>,
    pub timers: Mutex<Vec<Vec<TimerLabel>>>,
    pub closed: AtomicUsize,
    pub admin_entry: AtomicUsize,
}

impl FakeSurface {
    pub fn last_view(&self) -> Option<LotsView> {
        self.views.lock().unwrap().last().cloned()
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Surface for FakeSurface {
    fn show_loading(&self, _loading: bool) {}

    fn render_lots(&self, view: &LotsView) {
        self.views.lock().unwrap().push(view.clone());
    }

    fn update_timers(&self, labels: &[TimerLabel]) {
        self.timers.lock().unwrap().push(labels.to_vec());
    }

    fn show_detail(&self, detail: &LotDetail) {
        self.details.lock().unwrap().push(detail.clone());
    }

    fn close_detail(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }

    fn show_admin_entry(&self) {
        self.admin_entry.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Backend ─────────────────────────────────────────────────────────────────

/// In-process stand-in for the auction backend that counts what it was asked.
pub struct FakeBackend {
    lots: Mutex<Value>,
    lot_overrides: Mutex<HashMap<LotId, Value>>,
    place_bid_response: Mutex<Value>,
    create_lot_response: Mutex<Value>,
    pub lots_calls: AtomicUsize,
    pub lot_calls: AtomicUsize,
    pub place_bid_calls: AtomicUsize,
    pub create_lot_calls: AtomicUsize,
    pub list_lots_calls: AtomicUsize,
    pub last_bid: Mutex<Option<Value>>,
    pub last_create: Mutex<Option<Value>>,
    pub last_init_data: Mutex<Option<String>>,
}

type Backend = Arc<FakeBackend>;

impl FakeBackend {
    pub fn new(lots: Value) -> Arc<Self> {
        Arc::new(Self {
            lots: Mutex::new(lots),
            lot_overrides: Mutex::new(HashMap::new()),
            place_bid_response: Mutex::new(json!({"success": true})),
            create_lot_response: Mutex::new(json!({"success": true, "lot_id": 99})),
            lots_calls: AtomicUsize::new(0),
            lot_calls: AtomicUsize::new(0),
            place_bid_calls: AtomicUsize::new(0),
            create_lot_calls: AtomicUsize::new(0),
            list_lots_calls: AtomicUsize::new(0),
            last_bid: Mutex::new(None),
            last_create: Mutex::new(None),
            last_init_data: Mutex::new(None),
        })
    }

    pub fn set_lots(&self, lots: Value) {
        *self.lots.lock().unwrap() = lots;
    }

    /// What `GET /api/lot/{id}` returns instead of the lot from the list.
    pub fn override_lot(&self, lot_id: LotId, response: Value) {
        self.lot_overrides.lock().unwrap().insert(lot_id, response);
    }

    pub fn respond_to_bid(&self, response: Value) {
        *self.place_bid_response.lock().unwrap() = response;
    }

    pub fn respond_to_create(&self, response: Value) {
        *self.create_lot_response.lock().unwrap() = response;
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    /// Binds to an ephemeral port and returns the base URL.
    pub async fn serve(self: &Arc<Self>) -> String {
        let router = Router::new()
            .route("/api/lots", get(get_lots))
            .route("/api/lot/{id}", get(get_lot))
            .route("/api/place_bid", post(post_place_bid))
            .route("/admin/create_lot", post(post_create_lot))
            .route("/admin/list_lots", get(get_list_lots))
            .with_state(self.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }
}

async fn get_lots(State(backend): State<Backend>) -> Json<Value> {
    backend.lots_calls.fetch_add(1, Ordering::SeqCst);
    Json(backend.lots.lock().unwrap().clone())
}

async fn get_lot(State(backend): State<Backend>, Path(id): Path<LotId>) -> Json<Value> {
    backend.lot_calls.fetch_add(1, Ordering::SeqCst);
    if let Some(response) = backend.lot_overrides.lock().unwrap().get(&id) {
        return Json(response.clone());
    }
    let lots = backend.lots.lock().unwrap();
    let found = lots["active_lots"]
        .as_array()
        .and_then(|active| active.iter().find(|lot| lot["id"] == json!(id)))
        .cloned();
    Json(match found {
        Some(lot) => json!({"success": true, "lot": lot}),
        None => json!({"success": false, "error": "Lot not found"}),
    })
}

async fn post_place_bid(State(backend): State<Backend>, Json(body): Json<Value>) -> Json<Value> {
    backend.place_bid_calls.fetch_add(1, Ordering::SeqCst);
    *backend.last_bid.lock().unwrap() = Some(body);
    Json(backend.place_bid_response.lock().unwrap().clone())
}

async fn post_create_lot(
    State(backend): State<Backend>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    backend.create_lot_calls.fetch_add(1, Ordering::SeqCst);
    *backend.last_init_data.lock().unwrap() = headers
        .get(INIT_DATA_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    *backend.last_create.lock().unwrap() = Some(body);
    Json(backend.create_lot_response.lock().unwrap().clone())
}

async fn get_list_lots(State(backend): State<Backend>, headers: HeaderMap) -> Json<Value> {
    backend.list_lots_calls.fetch_add(1, Ordering::SeqCst);
    *backend.last_init_data.lock().unwrap() = headers
        .get(INIT_DATA_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    Json(backend.lots.lock().unwrap().clone())
}

/// A loopback URL nothing listens on.
pub async fn closed_port_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

// ── Harness ─────────────────────────────────────────────────────────────────

pub struct Harness {
    pub app: App,
    pub host: Arc<FakeHost>,
    pub surface: Arc<FakeSurface>,
    pub backend: Arc<FakeBackend>,
}

impl Harness {
    pub async fn new(lots: Value) -> Self {
        Self::with_user(lots, Some(bidder())).await
    }

    pub async fn with_user(lots: Value, user: Option<UserIdentity>) -> Self {
        let backend = FakeBackend::new(lots);
        let base = backend.serve().await;
        Self::connect(&base, backend, user)
    }

    /// Wires the app to `base_url`, which may point nowhere on purpose.
    pub fn connect(base_url: &str, backend: Arc<FakeBackend>, user: Option<UserIdentity>) -> Self {
        Self::build(test_config(base_url), backend, user)
    }

    pub fn build(config: Config, backend: Arc<FakeBackend>, user: Option<UserIdentity>) -> Self {
        let api = BackendClient::new(&config).unwrap();
        let host = Arc::new(FakeHost::new(user));
        let surface = Arc::new(FakeSurface::default());
        let state = AppState::new(config, api, host.clone(), surface.clone());
        Self { app: App::new(state), host, surface, backend }
    }

    pub fn popup_messages(&self) -> Vec<String> {
        self.host.popups().into_iter().map(|p| p.message).collect()
    }
}
