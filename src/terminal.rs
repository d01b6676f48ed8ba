use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, oneshot};

use crate::app::App;
use crate::config::Config;
use crate::host::{
    ButtonKind, HostPlatform, Invoice, InvoiceStatus, PaymentHandle, Popup, PopupReply,
    CANCEL_BUTTON, OK_BUTTON,
};
use crate::init_data;
use crate::render::{LotCard, LotDetail, LotsView, Surface, TimerLabel};
use crate::types::{LotId, UserIdentity};

/// Open prompts waiting for a line, oldest first. `None` once stdin closed.
pub(crate) type Waiters = Arc<Mutex<Option<VecDeque<oneshot::Sender<String>>>>>;

/// Works out who the terminal session acts as, and the init data to send.
/// Raw `TG_INIT_DATA` wins; otherwise the identity from `TG_USER_ID` is
/// signed with the bot token when one is set.
pub fn resolve_identity(config: &Config) -> Result<(Option<UserIdentity>, String)> {
    if let Some(raw) = &config.tg_init_data {
        let data = match &config.bot_token {
            Some(token) => match init_data::verify(raw, token) {
                Ok(data) => data,
                Err(e) => {
                    tracing::warn!(error = %e, "TG_INIT_DATA does not verify against the bot token");
                    init_data::parse(raw)?
                }
            },
            None => init_data::parse(raw)?,
        };
        tracing::info!(
            query_id = data.field("query_id").unwrap_or("-"),
            auth_date = ?data.auth_date,
            "using init data from TG_INIT_DATA"
        );
        return Ok((data.user, raw.clone()));
    }

    let Some(id) = config.tg_user_id else {
        tracing::warn!("no TG_USER_ID or TG_INIT_DATA, running anonymously");
        return Ok((None, String::new()));
    };

    let user = UserIdentity {
        id,
        first_name: config.tg_first_name.clone(),
        last_name: None,
        username: config.tg_username.clone(),
    };
    let auth_date = chrono::Utc::now().timestamp();
    let raw = match &config.bot_token {
        Some(token) => init_data::sign(&user, auth_date, token)?,
        None => init_data::unsigned(&user, auth_date)?,
    };
    Ok((Some(user), raw))
}

/// Host and surface over stdin/stdout
pub struct TerminalHost {
    user: Option<UserIdentity>,
    init_data: String,
    waiters: Waiters,
    view: Mutex<LotsView>,
    timers: Mutex<HashMap<LotId, String>>,
}

impl TerminalHost {
    /// Also returns the channel of lines typed while no prompt was open.
    pub fn new(config: &Config) -> Result<(Arc<Self>, mpsc::Receiver<String>)> {
        let (user, init_data) = resolve_identity(config)?;
        if let Some(user) = &user {
            tracing::info!(
                user_id = user.id,
                name = user.display_name().unwrap_or("-"),
                signed = config.bot_token.is_some(),
                "terminal identity"
            );
        }
        let (tx, commands) = mpsc::channel(16);
        let waiters: Waiters = Arc::new(Mutex::new(Some(VecDeque::new())));
        tokio::spawn(read_stdin(tx, waiters.clone()));

        let host = Arc::new(Self {
            user,
            init_data,
            waiters,
            view: Mutex::new(LotsView::default()),
            timers: Mutex::new(HashMap::new()),
        });
        Ok((host, commands))
    }

    /// The next line typed after this call. Prompts take lines ahead of the
    /// command loop, so a popup raised in the background gets its own answer.
    async fn next_line(&self) -> Option<String> {
        prompt_line(&self.waiters).await
    }

    fn print_lots(&self) {
        let view = self.view.lock().unwrap();
        let timers = self.timers.lock().unwrap();

        println!("── Active ──");
        match view.active_placeholder() {
            Some(empty) => println!("  {empty}"),
            None => {
                for card in &view.active {
                    let timer = timers.get(&card.lot_id).or(card.timer.as_ref());
                    println!("{}", card_line(card, timer.map(String::as_str)));
                }
            }
        }

        println!("── Sold ──");
        match view.sold_placeholder() {
            Some(empty) => println!("  {empty}"),
            None => {
                for card in &view.sold {
                    println!("{}", card_line(card, None));
                }
            }
        }
    }
}

fn card_line(card: &LotCard, timer: Option<&str>) -> String {
    let mut line = format!("  #{:<4} {:<28} {}", card.lot_id, card.name, card.price_label());
    if let Some(bidder) = &card.bidder {
        line.push_str(&format!("  {bidder}"));
    }
    if let Some(timer) = timer {
        line.push_str(&format!("  [{timer}]"));
    }
    if let Some(badge) = card.badge() {
        line.push_str(&format!("  {badge}"));
    }
    line
}

async fn read_stdin(commands: mpsc::Sender<String>, waiters: Waiters) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if let Some(line) = hand_to_prompt(&waiters, line.trim().to_string()) {
                    if commands.send(line).await.is_err() {
                        break;
                    }
                }
            }
            Ok(None) => {
                tracing::info!("stdin closed");
                break;
            }
            Err(e) => {
                tracing::error!(error = %e, "stdin read error");
                break;
            }
        }
    }
    // Pending prompts see `None` from here on.
    waiters.lock().unwrap().take();
}

/// Gives `line` to the oldest open prompt. Returns it if nobody was waiting.
pub(crate) fn hand_to_prompt(waiters: &Waiters, mut line: String) -> Option<String> {
    loop {
        let waiter = waiters.lock().unwrap().as_mut().and_then(VecDeque::pop_front);
        match waiter {
            Some(tx) => match tx.send(line) {
                Ok(()) => return None,
                // That prompt went away; try the next one.
                Err(back) => line = back,
            },
            None => return Some(line),
        }
    }
}

pub(crate) async fn prompt_line(waiters: &Waiters) -> Option<String> {
    let (tx, rx) = oneshot::channel();
    waiters.lock().unwrap().as_mut()?.push_back(tx);
    rx.await.ok()
}

#[async_trait]
impl HostPlatform for TerminalHost {
    fn expand(&self) {
        tracing::debug!("viewport expanded");
    }

    fn enable_closing_confirmation(&self) {
        tracing::debug!("closing confirmation enabled");
    }

    fn user(&self) -> Option<UserIdentity> {
        self.user.clone()
    }

    fn init_data(&self) -> String {
        self.init_data.clone()
    }

    async fn show_popup(&self, popup: Popup) -> PopupReply {
        println!("\n== {} ==\n{}", popup.title, popup.message);

        if popup.accepts_input {
            println!("(empty line or \"cancel\" to abort)");
            return match self.next_line().await {
                Some(line) if !line.is_empty() && line != CANCEL_BUTTON => PopupReply::submitted(&line),
                _ => PopupReply::pressed(CANCEL_BUTTON),
            };
        }

        if popup.buttons.len() <= 1 {
            println!("[enter]");
            let _ = self.next_line().await;
            let id = popup.buttons.first().map(|b| b.id.as_str()).unwrap_or(OK_BUTTON);
            return PopupReply::pressed(id);
        }

        for (i, button) in popup.buttons.iter().enumerate() {
            let hint = match button.kind {
                ButtonKind::Cancel => " (or empty line)",
                _ => "",
            };
            println!("  {}) {}{hint}", i + 1, button.text);
        }
        let Some(line) = self.next_line().await.filter(|l| !l.is_empty()) else {
            return PopupReply::dismissed();
        };
        let chosen = line
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| popup.buttons.get(i))
            .or_else(|| popup.buttons.iter().find(|b| b.id == line));
        match chosen {
            Some(button) => PopupReply::pressed(&button.id),
            None => PopupReply::dismissed(),
        }
    }

    async fn show_confirm(&self, title: &str, message: &str) -> bool {
        println!("\n== {title} ==\n{message} [y/N]");
        matches!(
            self.next_line().await.as_deref().map(str::to_lowercase).as_deref(),
            Some("y" | "yes")
        )
    }

    fn open_invoice(&self, reference: &str, invoice: Invoice) -> PaymentHandle {
        println!("\n== Invoice {reference} ==\n{}\n{}", invoice.title, invoice.description);
        for price in &invoice.prices {
            println!("  {}: {} ({} minor units)", price.label, invoice.currency, price.amount);
        }
        println!("status? paid / failed / cancelled");

        let (tx, handle) = PaymentHandle::channel();
        let waiters = self.waiters.clone();
        tokio::spawn(async move {
            let status = match prompt_line(&waiters).await {
                Some(line) => InvoiceStatus::parse(&line).unwrap_or(InvoiceStatus::Cancelled),
                None => InvoiceStatus::Cancelled,
            };
            tx.resolve(status);
        });
        handle
    }
}

impl Surface for TerminalHost {
    fn show_loading(&self, loading: bool) {
        if loading {
            println!("Loading...");
        }
    }

    fn render_lots(&self, view: &LotsView) {
        *self.view.lock().unwrap() = view.clone();
        self.timers.lock().unwrap().clear();
        self.print_lots();
    }

    fn update_timers(&self, labels: &[TimerLabel]) {
        let mut timers = self.timers.lock().unwrap();
        for label in labels {
            timers.insert(label.lot_id, label.text.clone());
        }
    }

    fn show_detail(&self, detail: &LotDetail) {
        println!("\n#{}", detail.lot_id);
        for line in detail.lines() {
            println!("{line}");
        }
        println!("image: {}", detail.image.resolve(false));
        if let Some(action) = detail.action.as_ref().filter(|a| a.enabled) {
            println!("type `bid` to outbid on #{}", action.lot_id);
        }
    }

    fn close_detail(&self) {
        println!("(detail closed)");
    }

    fn show_admin_entry(&self) {
        println!("Admin panel available: type `admin`");
    }
}

const HELP: &str = "commands: list | open <id> | close | bid | refresh | admin | events | quit";

/// Command loop. Returns on `quit` or when stdin closes.
pub async fn run(app: &App, terminal: &TerminalHost, mut commands: mpsc::Receiver<String>) {
    println!("{HELP}");
    while let Some(line) = commands.recv().await {
        let mut parts = line.split_whitespace();
        let Some(cmd) = parts.next() else { continue };

        match cmd {
            "list" | "ls" => terminal.print_lots(),
            "open" => match parts.next().and_then(|s| s.trim_start_matches('#').parse().ok()) {
                Some(lot_id) => {
                    if !app.open_lot(lot_id) {
                        println!("no lot #{lot_id} in the current list");
                    }
                }
                None => println!("usage: open <id>"),
            },
            "close" => app.close_detail(),
            "bid" => match app.bid_on_open_lot().await {
                Some(outcome) => tracing::debug!(?outcome, "bid finished"),
                None => println!("open an active lot first"),
            },
            "refresh" => {
                // Failures are already shown as a popup.
                let _ = app.store().refresh().await;
            }
            "admin" => {
                let outcome = app.admin_panel().await;
                tracing::debug!(?outcome, "admin action finished");
            }
            "events" => {
                for event in app.state().recent_events() {
                    println!("{} [{}] {}", event.ts, event.kind, event.detail);
                }
            }
            "quit" | "exit" => break,
            "help" => println!("{HELP}"),
            other => println!("unknown command: {other}\n{HELP}"),
        }
    }
}
