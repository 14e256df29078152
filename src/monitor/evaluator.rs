use std::fmt;

use crate::models::{Signal, TpLevel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    StopLoss,
    FinalTarget,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::StopLoss => write!(f, "stop loss"),
            CloseReason::FinalTarget => write!(f, "final target"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CloseDecision {
    pub reason: CloseReason,
    /// Fill is modeled at the crossed level, not the observed market price.
    pub exit_price: f64,
}

/// What a single price observation implies for one signal.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub newly_hit: Vec<TpLevel>,
    pub close: Option<CloseDecision>,
}

impl Evaluation {
    pub fn is_noop(&self) -> bool {
        self.newly_hit.is_empty() && self.close.is_none()
    }
}

/// Classify a (signal, price) pair. Pure: no I/O, no mutation. Flags encode
/// "was ever touched", so already-set flags are never re-reported. A hit and
/// a close can both come from one observation. Stop-loss wins over the final
/// target when bracket levels are inverted by bad backend data.
pub fn evaluate(signal: &Signal, price: f64) -> Evaluation {
    let dir = signal.direction;

    let mut newly_hit = Vec::new();
    for level in TpLevel::ALL {
        if signal.tp_hit(level) {
            continue;
        }
        if let Some(target) = signal.tp_price(level) {
            if dir.target_reached(price, target) {
                newly_hit.push(level);
            }
        }
    }

    let close = if dir.stop_breached(price, signal.stop_loss) {
        Some(CloseDecision {
            reason: CloseReason::StopLoss,
            exit_price: signal.stop_loss,
        })
    } else {
        signal
            .take_profit_3
            .filter(|&tp3| dir.target_reached(price, tp3))
            .map(|tp3| CloseDecision {
                reason: CloseReason::FinalTarget,
                exit_price: tp3,
            })
    };

    Evaluation { newly_hit, close }
}
