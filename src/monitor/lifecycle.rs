use chrono::Utc;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::api::{ApiResult, Backend, SignalQuery};
use crate::config::Config;
use crate::models::{AppConfig, Signal, SignalPatch, TpLevel};
use crate::monitor::evaluator::{evaluate, CloseDecision};
use crate::monitor::scheduler::ScanScheduler;

const STATUS_LOG_INTERVAL: Duration = Duration::from_secs(60);

/// Read-only view for the presentation layer.
#[derive(Debug, Clone)]
pub struct MonitorSnapshot {
    pub signals: Vec<Signal>,
    pub prices: HashMap<String, f64>,
}

/// Owns the tracked active-signal set, the price map and every timer.
/// Signals enter through the periodic list refresh and leave when the
/// backend reports them closed or when our own close patch succeeds.
pub struct LifecycleMonitor {
    backend: Box<dyn Backend>,
    tracked: HashMap<String, Signal>,
    prices: HashMap<String, f64>,
    /// Ids closed this session. A stale active-list fetch arriving after our
    /// close patch must not re-adopt them.
    closed_this_session: HashSet<String>,
    /// Flags set optimistically whose patch has not been confirmed yet.
    /// Re-sent at the start of each evaluation tick.
    pending_hits: HashMap<String, Vec<TpLevel>>,
    scheduler: ScanScheduler,
    decimals: HashMap<String, u32>,

    price_poll_interval: Duration,
    refresh_interval: Duration,
    last_price_poll: Instant,
    last_refresh: Instant,
    last_status: Instant,
}

impl LifecycleMonitor {
    pub fn new(backend: Box<dyn Backend>, cfg: &Config) -> Self {
        let now = Instant::now();
        Self {
            backend,
            tracked: HashMap::new(),
            prices: HashMap::new(),
            closed_this_session: HashSet::new(),
            pending_hits: HashMap::new(),
            scheduler: ScanScheduler::new(Duration::from_secs(cfg.scan_interval_secs)),
            decimals: HashMap::new(),
            price_poll_interval: Duration::from_secs(cfg.price_poll_secs),
            refresh_interval: Duration::from_secs(cfg.refresh_secs),
            last_price_poll: now,
            last_refresh: now,
            last_status: now,
        }
    }

    /// Backend `/config` overrides the scan interval and supplies display
    /// precision per asset.
    pub fn apply_app_config(&mut self, app_cfg: &AppConfig) {
        self.scheduler
            .set_interval(Duration::from_secs(app_cfg.scan_interval));
        self.decimals = app_cfg
            .assets
            .iter()
            .map(|(sym, a)| (sym.clone(), a.decimals))
            .collect();
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        let app_cfg = self.backend.app_config().await;
        self.apply_app_config(&app_cfg);

        info!("{}", "=".repeat(60));
        info!("Signal lifecycle monitor starting up");
        info!(
            "Price poll: {}s | List refresh: {}s | Scan interval: {}s",
            self.price_poll_interval.as_secs(),
            self.refresh_interval.as_secs(),
            self.scheduler.interval().as_secs()
        );
        info!("{}", "=".repeat(60));

        self.refresh_signals().await;
        self.poll_prices().await;
        self.log_status().await;

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutting down...");
                    self.log_status().await;
                    return Ok(());
                }
                _ = self.tick() => {}
            }
        }
    }

    async fn tick(&mut self) {
        if self.last_refresh.elapsed() >= self.refresh_interval {
            self.refresh_signals().await;
            self.last_refresh = Instant::now();
        }

        if self.last_price_poll.elapsed() >= self.price_poll_interval {
            self.poll_prices().await;
            self.evaluate_tick().await;
            self.last_price_poll = Instant::now();
        }

        if self.scheduler.due() {
            self.trigger_scan().await;
        }

        if self.last_status.elapsed() >= STATUS_LOG_INTERVAL {
            self.log_status().await;
            self.last_status = Instant::now();
        }

        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    /// Source-of-truth reconciliation: adopt the backend's active list,
    /// dropping anything it no longer reports active (covers closes made in
    /// another session). A fetch failure keeps the current set.
    pub async fn refresh_signals(&mut self) {
        let list = match self.backend.active_signals().await {
            Ok(list) => list,
            Err(e) => {
                warn!("Signal refresh failed: {}", e);
                return;
            }
        };

        let mut next: HashMap<String, Signal> = HashMap::with_capacity(list.len());
        for mut sig in list {
            if !sig.is_active() || self.closed_this_session.contains(&sig.id) {
                continue;
            }
            // Flags awaiting confirmation stay visible across refreshes.
            if let Some(pending) = self.pending_hits.get(&sig.id) {
                for &level in pending {
                    sig.set_tp_hit(level);
                }
            }
            next.insert(sig.id.clone(), sig);
        }

        let dropped: Vec<&String> = self
            .tracked
            .keys()
            .filter(|id| !next.contains_key(*id))
            .collect();
        if !dropped.is_empty() {
            info!("{} signal(s) left tracking on refresh", dropped.len());
        }

        self.tracked = next;
        let tracked = &self.tracked;
        self.pending_hits.retain(|id, _| tracked.contains_key(id));
    }

    /// Fetch prices for every tracked symbol. The price map is only ever
    /// extended: a failed fetch leaves stale values in place and evaluation
    /// simply skips symbols with no known price.
    pub async fn poll_prices(&mut self) {
        let symbols: Vec<String> = self
            .tracked
            .values()
            .map(|s| s.asset.clone())
            .collect::<BTreeSet<String>>()
            .into_iter()
            .collect();
        if symbols.is_empty() {
            return;
        }

        let fresh = self.backend.current_prices(&symbols).await;
        if fresh.is_empty() {
            debug!("Price poll returned nothing, keeping stale prices");
            return;
        }
        self.prices.extend(fresh);
    }

    /// One pass over every tracked signal with a known price: re-send any
    /// unconfirmed hit patches, then classify and persist new transitions.
    pub async fn evaluate_tick(&mut self) {
        self.flush_pending_hits().await;

        let ids: Vec<String> = self.tracked.keys().cloned().collect();
        for id in ids {
            let (price, eval) = {
                let sig = match self.tracked.get(&id) {
                    Some(s) => s,
                    None => continue,
                };
                let price = match self.prices.get(&sig.asset) {
                    Some(&p) => p,
                    None => continue,
                };
                (price, evaluate(sig, price))
            };

            if eval.is_noop() {
                continue;
            }

            if !eval.newly_hit.is_empty() {
                self.persist_hits(&id, &eval.newly_hit, price).await;
            }

            if let Some(close) = eval.close {
                self.persist_close(&id, close).await;
            }
        }
    }

    /// Persist newly-true flags. The flags are set locally before the call
    /// resolves so a slow response cannot make the next tick re-detect and
    /// re-send the same levels. Rollback policy: a 4xx reverts the optimistic
    /// flags; transport/5xx keeps them and re-sends next tick.
    async fn persist_hits(&mut self, id: &str, levels: &[TpLevel], price: f64) {
        if let Some(sig) = self.tracked.get_mut(id) {
            for &level in levels {
                sig.set_tp_hit(level);
            }
            let hit_names: Vec<String> = levels.iter().map(|l| l.to_string()).collect();
            info!(
                "{} {} {} reached at {}",
                sig.asset,
                sig.direction,
                hit_names.join("+"),
                fmt_price(&self.decimals, &sig.asset, price)
            );
        }

        let result = self.backend.patch_signal(id, &SignalPatch::hits(levels)).await;
        match result {
            Ok(_) => {
                self.remove_pending(id, levels);
            }
            Err(e) if e.is_client_error() => {
                warn!("Hit patch rejected for {}, reverting flags: {}", id, e);
                if let Some(sig) = self.tracked.get_mut(id) {
                    for &level in levels {
                        sig.clear_tp_hit(level);
                    }
                }
                self.remove_pending(id, levels);
            }
            Err(e) => {
                warn!("Hit patch failed for {}, will re-send: {}", id, e);
                let entry = self.pending_hits.entry(id.to_string()).or_default();
                for &level in levels {
                    if !entry.contains(&level) {
                        entry.push(level);
                    }
                }
            }
        }
    }

    async fn flush_pending_hits(&mut self) {
        let pending: Vec<(String, Vec<TpLevel>)> = self
            .pending_hits
            .iter()
            .map(|(id, levels)| (id.clone(), levels.clone()))
            .collect();

        for (id, levels) in pending {
            if !self.tracked.contains_key(&id) {
                self.pending_hits.remove(&id);
                continue;
            }
            let result = self.backend.patch_signal(&id, &SignalPatch::hits(&levels)).await;
            match result {
                Ok(_) => {
                    debug!("Pending hit patch confirmed for {}", id);
                    self.pending_hits.remove(&id);
                }
                Err(e) if e.is_client_error() => {
                    warn!("Pending hit patch rejected for {}, reverting: {}", id, e);
                    if let Some(sig) = self.tracked.get_mut(&id) {
                        for &level in &levels {
                            sig.clear_tp_hit(level);
                        }
                    }
                    self.pending_hits.remove(&id);
                }
                Err(e) => {
                    debug!("Pending hit patch still failing for {}: {}", id, e);
                }
            }
        }
    }

    fn remove_pending(&mut self, id: &str, levels: &[TpLevel]) {
        if let Some(entry) = self.pending_hits.get_mut(id) {
            entry.retain(|l| !levels.contains(l));
            if entry.is_empty() {
                self.pending_hits.remove(id);
            }
        }
    }

    /// Close at the evaluator's computed level. Success removes the signal
    /// from tracking for the rest of the session; failure leaves it tracked
    /// so the next tick re-evaluates and re-submits.
    async fn persist_close(&mut self, id: &str, close: CloseDecision) {
        let (asset, direction, pnl) = match self.tracked.get(id) {
            Some(sig) => (
                sig.asset.clone(),
                sig.direction,
                round2(sig.direction.pnl_pct(sig.entry_price, close.exit_price)),
            ),
            None => return,
        };

        let patch = SignalPatch::close(close.exit_price, pnl, Utc::now());
        let result = self.backend.patch_signal(id, &patch).await;
        match result {
            Ok(_) => {
                info!(
                    "{} {} closed ({}) at {} | PnL {:+.2}%",
                    asset,
                    direction,
                    close.reason,
                    fmt_price(&self.decimals, &asset, close.exit_price),
                    pnl
                );
                self.tracked.remove(id);
                self.pending_hits.remove(id);
                self.closed_this_session.insert(id.to_string());
            }
            Err(e) => {
                warn!("Close failed for {}, retrying next tick: {}", id, e);
            }
        }
    }

    /// User-forced close at a chosen exit price. Works for signals we track
    /// and, through a single fetch, for ones we do not (deep links).
    pub async fn close_manual(&mut self, id: &str, exit_price: f64) -> ApiResult<Signal> {
        let (entry_price, direction) = match self.tracked.get(id) {
            Some(sig) => (sig.entry_price, sig.direction),
            None => {
                let sig = self.backend.get_signal(id).await?;
                (sig.entry_price, sig.direction)
            }
        };

        let pnl = round2(direction.pnl_pct(entry_price, exit_price));
        let patch = SignalPatch::close(exit_price, pnl, Utc::now());
        let updated = self.backend.patch_signal(id, &patch).await?;

        info!("{} closed manually at {} | PnL {:+.2}%", id, exit_price, pnl);
        self.tracked.remove(id);
        self.pending_hits.remove(id);
        self.closed_this_session.insert(id.to_string());
        Ok(updated)
    }

    /// Manual or countdown-driven scan trigger. While a generate call is in
    /// flight further triggers are dropped and only restart the countdown.
    pub async fn trigger_scan(&mut self) {
        if !self.scheduler.try_begin() {
            debug!("Generate already in flight, trigger coalesced");
            self.scheduler.reset();
            return;
        }

        let result = self.backend.generate().await;
        self.scheduler.finish();

        match result {
            Ok(outcome) => {
                info!(
                    "Scan complete: {} new signal(s){}",
                    outcome.created,
                    if outcome.skipped.is_empty() {
                        String::new()
                    } else {
                        format!(" ({} asset(s) skipped)", outcome.skipped.len())
                    }
                );
                if outcome.created > 0 {
                    self.refresh_signals().await;
                }
            }
            Err(e) => {
                warn!("Scan failed: {}", e);
            }
        }
    }

    pub fn scan_in_flight(&self) -> bool {
        self.scheduler.in_flight()
    }

    pub fn scan_remaining(&self) -> Duration {
        self.scheduler.remaining()
    }

    /// Current view for rendering: tracked signals, newest first, plus the
    /// latest known prices.
    pub fn snapshot(&self) -> MonitorSnapshot {
        let mut signals: Vec<Signal> = self.tracked.values().cloned().collect();
        signals.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        MonitorSnapshot {
            signals,
            prices: self.prices.clone(),
        }
    }

    /// Closed-signal history for the dashboard table.
    pub async fn recent_closed(&self, limit: usize) -> ApiResult<Vec<Signal>> {
        self.backend.closed_signals(limit).await
    }

    /// Filtered lookup for the dashboard's signal table.
    pub async fn find_signals(&self, query: &SignalQuery) -> ApiResult<Vec<Signal>> {
        self.backend.list_signals(query).await
    }

    /// Single-signal lookup; a 404 surfaces as `ApiError::NotFound`.
    pub async fn signal_detail(&self, id: &str) -> ApiResult<Signal> {
        self.backend.get_signal(id).await
    }

    async fn log_status(&mut self) {
        info!(
            "Tracking {} signal(s) | {} price(s) known | next scan in {}s",
            self.tracked.len(),
            self.prices.len(),
            self.scan_remaining().as_secs()
        );
        match self.backend.stats_overview().await {
            Ok(stats) => {
                info!(
                    "Closed: {} | W/L: {}/{} | Win rate: {:.1}% | Avg PnL: {:+.2}%",
                    stats.total_closed,
                    stats.wins,
                    stats.losses,
                    stats.win_rate_pct,
                    stats.avg_pnl_pct
                );
            }
            Err(e) => debug!("Stats fetch failed: {}", e),
        }
    }
}

fn fmt_price(decimals: &HashMap<String, u32>, asset: &str, price: f64) -> String {
    let prec = decimals.get(asset).copied().unwrap_or(2) as usize;
    format!("{:.*}", prec, price)
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
