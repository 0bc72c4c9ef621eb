use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::debug;

/// 上流の国ディレクトリが返す 1 国分のオブジェクト。
///
/// `currencies` は順序付きで、先頭のコードだけが採用される。
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SourceCountry {
    pub name: String,
    #[serde(default)]
    pub capital: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub population: i64,
    #[serde(default)]
    pub flag: Option<String>,
    #[serde(default)]
    pub currencies: Vec<SourceCurrency>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SourceCurrency {
    #[serde(default)]
    pub code: Option<String>,
}

impl SourceCountry {
    /// First listed currency code, or `None` when the country lists none.
    #[must_use]
    pub fn first_currency_code(&self) -> Option<&str> {
        self.currencies
            .first()
            .and_then(|currency| currency.code.as_deref())
    }
}

/// 国ディレクトリ API クライアント。
#[derive(Debug, Clone)]
pub struct CountryDirectoryClient {
    client: Client,
    url: Url,
}

impl CountryDirectoryClient {
    /// # Errors
    /// HTTP クライアントの構築、または URL のパースに失敗した場合はエラーを返す。
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build country directory client")?;
        let url = Url::parse(&url.into()).context("invalid country directory URL")?;
        Ok(Self { client, url })
    }

    /// 全件を 1 リクエストで取得する。非 2xx とパース不能な本文はエラー。
    ///
    /// # Errors
    /// トランスポート障害、非 2xx 応答、本文のデコード失敗時はエラーを返す。
    pub async fn fetch_all(&self) -> Result<Vec<SourceCountry>> {
        let countries: Vec<SourceCountry> = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .context("country directory request failed")?
            .error_for_status()
            .context("country directory returned an error status")?
            .json()
            .await
            .context("country directory returned a malformed body")?;

        debug!(count = countries.len(), "fetched country directory");
        Ok(countries)
    }
}
