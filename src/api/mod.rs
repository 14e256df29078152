pub mod http;

pub use http::HttpBackend;

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

use crate::models::{AppConfig, GenerateOutcome, Signal, SignalPatch, StatsOverview};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("signal not found: {0}")]
    NotFound(String),
    #[error("backend returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl ApiError {
    /// 4xx responses will not succeed on resubmission; everything else may.
    pub fn is_client_error(&self) -> bool {
        match self {
            ApiError::NotFound(_) => true,
            ApiError::Status { status, .. } => status.is_client_error(),
            ApiError::Transport(_) => false,
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Filters for `GET /signals`.
#[derive(Debug, Clone, Default)]
pub struct SignalQuery {
    pub status: Option<String>,
    pub asset: Option<String>,
    pub timeframe: Option<String>,
    pub limit: Option<usize>,
}

/// The monitor's sole seam to the network. Every mutation goes through
/// `patch_signal`; the price and config fetches absorb failures at the
/// boundary so polling never stops.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn list_signals(&self, query: &SignalQuery) -> ApiResult<Vec<Signal>>;

    async fn active_signals(&self) -> ApiResult<Vec<Signal>>;

    async fn closed_signals(&self, limit: usize) -> ApiResult<Vec<Signal>>;

    async fn get_signal(&self, id: &str) -> ApiResult<Signal>;

    async fn patch_signal(&self, id: &str, patch: &SignalPatch) -> ApiResult<Signal>;

    async fn stats_overview(&self) -> ApiResult<StatsOverview>;

    async fn generate(&self) -> ApiResult<GenerateOutcome>;

    /// Current prices for the given symbols. Degrades to an empty map on
    /// failure; stale entries are the caller's concern.
    async fn current_prices(&self, symbols: &[String]) -> HashMap<String, f64>;

    /// Public backend configuration; defaults on failure.
    async fn app_config(&self) -> AppConfig;
}
