use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::api::{ApiError, ApiResult, Backend, SignalQuery};
use crate::models::{AppConfig, GenerateOutcome, Signal, SignalPatch, StatsOverview};

/// HTTP client for the signal backend.
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn decode<T: DeserializeOwned>(resp: Response) -> ApiResult<T> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Status { status, body });
        }
        Ok(resp.json::<T>().await?)
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn list_signals(&self, query: &SignalQuery) -> ApiResult<Vec<Signal>> {
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(ref status) = query.status {
            params.push(("status", status.clone()));
        }
        if let Some(ref asset) = query.asset {
            params.push(("asset", asset.clone()));
        }
        if let Some(ref timeframe) = query.timeframe {
            params.push(("timeframe", timeframe.clone()));
        }
        if let Some(limit) = query.limit {
            params.push(("limit", limit.to_string()));
        }

        let resp = self
            .client
            .get(self.url("/signals"))
            .query(&params)
            .send()
            .await?;
        Self::decode(resp).await
    }

    async fn active_signals(&self) -> ApiResult<Vec<Signal>> {
        let resp = self.client.get(self.url("/signals/active")).send().await?;
        Self::decode(resp).await
    }

    async fn closed_signals(&self, limit: usize) -> ApiResult<Vec<Signal>> {
        let resp = self
            .client
            .get(self.url("/signals/closed"))
            .query(&[("limit", limit.to_string())])
            .send()
            .await?;
        Self::decode(resp).await
    }

    async fn get_signal(&self, id: &str) -> ApiResult<Signal> {
        let resp = self
            .client
            .get(self.url(&format!("/signals/{id}")))
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(id.to_string()));
        }
        Self::decode(resp).await
    }

    async fn patch_signal(&self, id: &str, patch: &SignalPatch) -> ApiResult<Signal> {
        let resp = self
            .client
            .patch(self.url(&format!("/signals/{id}")))
            .json(patch)
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(id.to_string()));
        }
        Self::decode(resp).await
    }

    async fn stats_overview(&self) -> ApiResult<StatsOverview> {
        let resp = self
            .client
            .get(self.url("/signals/stats/overview"))
            .send()
            .await?;
        Self::decode(resp).await
    }

    async fn generate(&self) -> ApiResult<GenerateOutcome> {
        let resp = self.client.post(self.url("/generate")).send().await?;
        Self::decode(resp).await
    }

    async fn current_prices(&self, symbols: &[String]) -> HashMap<String, f64> {
        if symbols.is_empty() {
            return HashMap::new();
        }

        let result: ApiResult<HashMap<String, f64>> = async {
            let resp = self
                .client
                .get(self.url("/prices"))
                .query(&[("symbols", symbols.join(","))])
                .send()
                .await?;
            Self::decode(resp).await
        }
        .await;

        match result {
            Ok(prices) => prices,
            Err(e) => {
                debug!("Price fetch failed: {}", e);
                HashMap::new()
            }
        }
    }

    async fn app_config(&self) -> AppConfig {
        let result: ApiResult<AppConfig> = async {
            let resp = self.client.get(self.url("/config")).send().await?;
            Self::decode(resp).await
        }
        .await;

        match result {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!("Config fetch failed, using defaults: {}", e);
                AppConfig::default()
            }
        }
    }
}
