use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "LONG",
            Direction::Short => "SHORT",
        }
    }

    /// Price has reached or passed a profit target for this direction.
    pub fn target_reached(&self, price: f64, level: f64) -> bool {
        match self {
            Direction::Long => price >= level,
            Direction::Short => price <= level,
        }
    }

    /// Price has reached or passed the stop level against the position.
    pub fn stop_breached(&self, price: f64, level: f64) -> bool {
        match self {
            Direction::Long => price <= level,
            Direction::Short => price >= level,
        }
    }

    /// Signed percent P&L for a position entered at `entry` and exited at `exit`.
    pub fn pnl_pct(&self, entry: f64, exit: f64) -> f64 {
        if entry == 0.0 {
            return 0.0;
        }
        match self {
            Direction::Long => (exit - entry) / entry * 100.0,
            Direction::Short => (entry - exit) / entry * 100.0,
        }
    }
}
