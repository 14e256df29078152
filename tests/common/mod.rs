use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use signal_monitor::api::{ApiError, ApiResult, Backend, SignalQuery};
use signal_monitor::config::Config;
use signal_monitor::models::{
    AppConfig, Direction, GenerateOutcome, Signal, SignalPatch, SignalStatus, StatsOverview,
};

pub fn test_config() -> Config {
    Config {
        api_url: "http://localhost:8000/api".to_string(),
        price_poll_secs: 5,
        refresh_secs: 30,
        scan_interval_secs: 300,
        closed_fetch_limit: 100,
        log_level: "INFO".to_string(),
    }
}

pub fn make_signal(
    id: &str,
    asset: &str,
    direction: Direction,
    entry: f64,
    sl: f64,
    tp1: f64,
    tp2: Option<f64>,
    tp3: Option<f64>,
) -> Signal {
    Signal {
        id: id.to_string(),
        asset: asset.to_string(),
        timeframe: "1h".to_string(),
        direction,
        entry_price: entry,
        stop_loss: sl,
        take_profit_1: tp1,
        take_profit_2: tp2,
        take_profit_3: tp3,
        position_size_pct: Some(2.0),
        risk_reward: Some(3.0),
        confidence_score: 72.0,
        status: SignalStatus::Active,
        tp1_hit: false,
        tp2_hit: false,
        tp3_hit: false,
        exit_price: None,
        pnl_pct: None,
        closed_at: None,
        created_at: Utc::now(),
    }
}

/// How the mock answers PATCH calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchMode {
    Ok,
    /// Validation failure — a 422 the monitor must not retry.
    Reject4xx,
    /// Server failure — retried by resubmission on the next tick.
    Fail5xx,
}

/// In-memory backend double: holds the signal table and price map, records
/// every patch body, and can be told to fail specific endpoints.
pub struct MockBackend {
    pub signals: Mutex<Vec<Signal>>,
    pub prices: Mutex<HashMap<String, f64>>,
    pub patch_mode: Mutex<PatchMode>,
    pub patches: Mutex<Vec<(String, serde_json::Value)>>,
    pub fail_prices: AtomicBool,
    pub fail_active: AtomicBool,
    pub fail_generate: AtomicBool,
    pub generate_calls: AtomicUsize,
    /// Signals handed out on the next successful generate call.
    pub generate_yield: Mutex<Vec<Signal>>,
    pub scan_interval: u64,
}

impl MockBackend {
    pub fn new(signals: Vec<Signal>, prices: &[(&str, f64)]) -> Self {
        Self {
            signals: Mutex::new(signals),
            prices: Mutex::new(
                prices
                    .iter()
                    .map(|(s, p)| (s.to_string(), *p))
                    .collect(),
            ),
            patch_mode: Mutex::new(PatchMode::Ok),
            patches: Mutex::new(Vec::new()),
            fail_prices: AtomicBool::new(false),
            fail_active: AtomicBool::new(false),
            fail_generate: AtomicBool::new(false),
            generate_calls: AtomicUsize::new(0),
            generate_yield: Mutex::new(Vec::new()),
            scan_interval: 300,
        }
    }

    pub fn set_patch_mode(&self, mode: PatchMode) {
        *self.patch_mode.lock().unwrap() = mode;
    }

    pub fn set_price(&self, symbol: &str, price: f64) {
        self.prices.lock().unwrap().insert(symbol.to_string(), price);
    }

    pub fn patch_count(&self) -> usize {
        self.patches.lock().unwrap().len()
    }

    pub fn patches_for(&self, id: &str) -> Vec<serde_json::Value> {
        self.patches
            .lock()
            .unwrap()
            .iter()
            .filter(|(pid, _)| pid == id)
            .map(|(_, body)| body.clone())
            .collect()
    }

    pub fn signal(&self, id: &str) -> Option<Signal> {
        self.signals
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.id == id)
            .cloned()
    }

    /// Force a backend-side status, e.g. to simulate a close made in another
    /// session or a stale list.
    pub fn set_status(&self, id: &str, status: SignalStatus) {
        if let Some(sig) = self
            .signals
            .lock()
            .unwrap()
            .iter_mut()
            .find(|s| s.id == id)
        {
            sig.status = status;
        }
    }

    fn server_error() -> ApiError {
        ApiError::Status {
            status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            body: "simulated failure".to_string(),
        }
    }

    fn apply_patch(sig: &mut Signal, body: &serde_json::Value) {
        if let Some(status) = body.get("status").and_then(|v| v.as_str()) {
            sig.status = match status {
                "closed" => SignalStatus::Closed,
                "invalidated" => SignalStatus::Invalidated,
                _ => SignalStatus::Active,
            };
        }
        if let Some(p) = body.get("exit_price").and_then(|v| v.as_f64()) {
            sig.exit_price = Some(p);
        }
        if let Some(p) = body.get("pnl_pct").and_then(|v| v.as_f64()) {
            sig.pnl_pct = Some(p);
        }
        if body.get("tp1_hit").and_then(|v| v.as_bool()) == Some(true) {
            sig.tp1_hit = true;
        }
        if body.get("tp2_hit").and_then(|v| v.as_bool()) == Some(true) {
            sig.tp2_hit = true;
        }
        if body.get("tp3_hit").and_then(|v| v.as_bool()) == Some(true) {
            sig.tp3_hit = true;
        }
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn list_signals(&self, query: &SignalQuery) -> ApiResult<Vec<Signal>> {
        let signals = self.signals.lock().unwrap();
        let mut out: Vec<Signal> = signals
            .iter()
            .filter(|s| {
                query
                    .status
                    .as_deref()
                    .map_or(true, |st| s.status.to_string() == st)
            })
            .filter(|s| query.asset.as_deref().map_or(true, |a| s.asset == a))
            .cloned()
            .collect();
        if let Some(limit) = query.limit {
            out.truncate(limit);
        }
        Ok(out)
    }

    async fn active_signals(&self) -> ApiResult<Vec<Signal>> {
        if self.fail_active.load(Ordering::SeqCst) {
            return Err(MockBackend::server_error());
        }
        let signals = self.signals.lock().unwrap();
        Ok(signals.iter().filter(|s| s.is_active()).cloned().collect())
    }

    async fn closed_signals(&self, limit: usize) -> ApiResult<Vec<Signal>> {
        let signals = self.signals.lock().unwrap();
        let mut out: Vec<Signal> = signals
            .iter()
            .filter(|s| s.status == SignalStatus::Closed)
            .cloned()
            .collect();
        out.truncate(limit);
        Ok(out)
    }

    async fn get_signal(&self, id: &str) -> ApiResult<Signal> {
        self.signal(id).ok_or_else(|| ApiError::NotFound(id.to_string()))
    }

    async fn patch_signal(&self, id: &str, patch: &SignalPatch) -> ApiResult<Signal> {
        let body = serde_json::to_value(patch).expect("patch serializes");
        match *self.patch_mode.lock().unwrap() {
            PatchMode::Reject4xx => {
                return Err(ApiError::Status {
                    status: reqwest::StatusCode::UNPROCESSABLE_ENTITY,
                    body: "validation error".to_string(),
                });
            }
            PatchMode::Fail5xx => return Err(MockBackend::server_error()),
            PatchMode::Ok => {}
        }

        let mut signals = self.signals.lock().unwrap();
        let sig = signals
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| ApiError::NotFound(id.to_string()))?;
        MockBackend::apply_patch(sig, &body);
        let updated = sig.clone();
        drop(signals);

        self.patches.lock().unwrap().push((id.to_string(), body));
        Ok(updated)
    }

    async fn stats_overview(&self) -> ApiResult<StatsOverview> {
        let signals = self.signals.lock().unwrap();
        let closed: Vec<&Signal> = signals
            .iter()
            .filter(|s| s.status == SignalStatus::Closed)
            .collect();
        let wins = closed
            .iter()
            .filter(|s| s.pnl_pct.unwrap_or(0.0) > 0.0)
            .count() as u64;
        let total = closed.len() as u64;
        Ok(StatsOverview {
            total_closed: total,
            wins,
            losses: total - wins,
            win_rate_pct: if total > 0 {
                wins as f64 / total as f64 * 100.0
            } else {
                0.0
            },
            avg_pnl_pct: 0.0,
            total_pnl_pct: closed.iter().filter_map(|s| s.pnl_pct).sum(),
        })
    }

    async fn generate(&self) -> ApiResult<GenerateOutcome> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_generate.load(Ordering::SeqCst) {
            return Err(MockBackend::server_error());
        }
        let fresh: Vec<Signal> = self.generate_yield.lock().unwrap().drain(..).collect();
        let ids: Vec<String> = fresh.iter().map(|s| s.id.clone()).collect();
        self.signals.lock().unwrap().extend(fresh);
        Ok(GenerateOutcome {
            created: ids.len() as u64,
            signal_ids: ids,
            skipped: Vec::new(),
        })
    }

    async fn current_prices(&self, symbols: &[String]) -> HashMap<String, f64> {
        if self.fail_prices.load(Ordering::SeqCst) {
            return HashMap::new();
        }
        let prices = self.prices.lock().unwrap();
        symbols
            .iter()
            .filter_map(|s| prices.get(s).map(|&p| (s.clone(), p)))
            .collect()
    }

    async fn app_config(&self) -> AppConfig {
        AppConfig {
            assets: Default::default(),
            scan_interval: self.scan_interval,
        }
    }
}

/// Boxable handle to a shared [`MockBackend`]; the orphan rule forbids
/// implementing `Backend` for `Arc<MockBackend>` directly in this crate.
pub struct SharedBackend(pub std::sync::Arc<MockBackend>);

#[async_trait]
impl Backend for SharedBackend {
    async fn list_signals(&self, query: &SignalQuery) -> ApiResult<Vec<Signal>> {
        self.0.list_signals(query).await
    }

    async fn active_signals(&self) -> ApiResult<Vec<Signal>> {
        self.0.active_signals().await
    }

    async fn closed_signals(&self, limit: usize) -> ApiResult<Vec<Signal>> {
        self.0.closed_signals(limit).await
    }

    async fn get_signal(&self, id: &str) -> ApiResult<Signal> {
        self.0.get_signal(id).await
    }

    async fn patch_signal(&self, id: &str, patch: &SignalPatch) -> ApiResult<Signal> {
        self.0.patch_signal(id, patch).await
    }

    async fn stats_overview(&self) -> ApiResult<StatsOverview> {
        self.0.stats_overview().await
    }

    async fn generate(&self) -> ApiResult<GenerateOutcome> {
        self.0.generate().await
    }

    async fn current_prices(&self, symbols: &[String]) -> HashMap<String, f64> {
        self.0.current_prices(symbols).await
    }

    async fn app_config(&self) -> AppConfig {
        self.0.app_config().await
    }
}
