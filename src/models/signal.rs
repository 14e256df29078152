use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalStatus {
    Active,
    Closed,
    Invalidated,
}

impl fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalStatus::Active => write!(f, "active"),
            SignalStatus::Closed => write!(f, "closed"),
            SignalStatus::Invalidated => write!(f, "invalidated"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TpLevel {
    Tp1,
    Tp2,
    Tp3,
}

impl fmt::Display for TpLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TpLevel::Tp1 => write!(f, "TP1"),
            TpLevel::Tp2 => write!(f, "TP2"),
            TpLevel::Tp3 => write!(f, "TP3"),
        }
    }
}

impl TpLevel {
    pub const ALL: [TpLevel; 3] = [TpLevel::Tp1, TpLevel::Tp2, TpLevel::Tp3];
}

/// A trading signal as served by the backend. Static fields are set at
/// creation; the hit flags and status are mutated only through PATCH calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: String,
    pub asset: String,
    pub timeframe: String,
    pub direction: Direction,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit_1: f64,
    #[serde(default)]
    pub take_profit_2: Option<f64>,
    #[serde(default)]
    pub take_profit_3: Option<f64>,
    #[serde(default)]
    pub position_size_pct: Option<f64>,
    #[serde(default)]
    pub risk_reward: Option<f64>,
    pub confidence_score: f64,
    pub status: SignalStatus,
    #[serde(default)]
    pub tp1_hit: bool,
    #[serde(default)]
    pub tp2_hit: bool,
    #[serde(default)]
    pub tp3_hit: bool,
    #[serde(default)]
    pub exit_price: Option<f64>,
    #[serde(default)]
    pub pnl_pct: Option<f64>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Signal {
    pub fn is_active(&self) -> bool {
        self.status == SignalStatus::Active
    }

    pub fn tp_price(&self, level: TpLevel) -> Option<f64> {
        match level {
            TpLevel::Tp1 => Some(self.take_profit_1),
            TpLevel::Tp2 => self.take_profit_2,
            TpLevel::Tp3 => self.take_profit_3,
        }
    }

    pub fn tp_hit(&self, level: TpLevel) -> bool {
        match level {
            TpLevel::Tp1 => self.tp1_hit,
            TpLevel::Tp2 => self.tp2_hit,
            TpLevel::Tp3 => self.tp3_hit,
        }
    }

    pub fn set_tp_hit(&mut self, level: TpLevel) {
        match level {
            TpLevel::Tp1 => self.tp1_hit = true,
            TpLevel::Tp2 => self.tp2_hit = true,
            TpLevel::Tp3 => self.tp3_hit = true,
        }
    }

    /// Rollback path for an optimistic flag the backend rejected.
    pub fn clear_tp_hit(&mut self, level: TpLevel) {
        match level {
            TpLevel::Tp1 => self.tp1_hit = false,
            TpLevel::Tp2 => self.tp2_hit = false,
            TpLevel::Tp3 => self.tp3_hit = false,
        }
    }
}

/// Partial update body for `PATCH /signals/{id}` — the sole mutation verb.
/// Only fields actually present are serialized.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SignalPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<SignalStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pnl_pct: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tp1_hit: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tp2_hit: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tp3_hit: Option<bool>,
}

impl SignalPatch {
    /// Carry exactly the newly-true flags, never flags already set.
    pub fn hits(levels: &[TpLevel]) -> Self {
        let mut patch = SignalPatch::default();
        for level in levels {
            match level {
                TpLevel::Tp1 => patch.tp1_hit = Some(true),
                TpLevel::Tp2 => patch.tp2_hit = Some(true),
                TpLevel::Tp3 => patch.tp3_hit = Some(true),
            }
        }
        patch
    }

    pub fn close(exit_price: f64, pnl_pct: f64, closed_at: DateTime<Utc>) -> Self {
        SignalPatch {
            status: Some(SignalStatus::Closed),
            exit_price: Some(exit_price),
            pnl_pct: Some(pnl_pct),
            closed_at: Some(closed_at),
            ..SignalPatch::default()
        }
    }
}

/// Aggregate P&L overview from `GET /signals/stats/overview`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatsOverview {
    pub total_closed: u64,
    pub wins: u64,
    pub losses: u64,
    pub win_rate_pct: f64,
    pub avg_pnl_pct: f64,
    pub total_pnl_pct: f64,
}

/// Result of `POST /generate`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateOutcome {
    pub created: u64,
    #[serde(default)]
    pub signal_ids: Vec<String>,
    #[serde(default)]
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssetConfig {
    #[serde(default = "default_decimals")]
    pub decimals: u32,
}

fn default_decimals() -> u32 {
    2
}

/// Public backend configuration from `GET /config`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub assets: std::collections::HashMap<String, AssetConfig>,
    #[serde(default = "default_scan_interval")]
    pub scan_interval: u64,
}

fn default_scan_interval() -> u64 {
    300
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            assets: Default::default(),
            scan_interval: default_scan_interval(),
        }
    }
}
