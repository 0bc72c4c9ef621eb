use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct RateTableResponse {
    rates: HashMap<String, f64>,
}

/// USD 基準の為替レート API クライアント。
///
/// 応答は ISO 通貨コード → 1 USD あたりの現地通貨数のマッピング。
#[derive(Debug, Clone)]
pub struct ExchangeRateClient {
    client: Client,
    url: Url,
}

impl ExchangeRateClient {
    /// # Errors
    /// HTTP クライアントの構築、または URL のパースに失敗した場合はエラーを返す。
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build exchange rate client")?;
        let url = Url::parse(&url.into()).context("invalid exchange rate URL")?;
        Ok(Self { client, url })
    }

    /// # Errors
    /// トランスポート障害、非 2xx 応答、`rates` を欠く本文はエラーを返す。
    pub async fn fetch_usd_rates(&self) -> Result<HashMap<String, f64>> {
        let table: RateTableResponse = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .context("exchange rate request failed")?
            .error_for_status()
            .context("exchange rate source returned an error status")?
            .json()
            .await
            .context("exchange rate source returned a malformed body")?;

        debug!(count = table.rates.len(), "fetched USD rate table");
        Ok(table.rates)
    }
}
