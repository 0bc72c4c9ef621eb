pub mod merge;
pub mod render;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clients::{CountryDirectoryClient, ExchangeRateClient};
use crate::pipeline::merge::GdpFactorSource;
use crate::pipeline::render::SummaryRenderer;
use crate::store::dao::CountryDao;

/// リフレッシュ 1 サイクルの失敗分類。HTTP 層はこれを 503/500 に写像する。
#[derive(Debug, Error)]
pub enum RefreshError {
    /// Either upstream fetch failed; nothing was written.
    #[error("external data source unavailable")]
    SourceUnavailable(#[source] anyhow::Error),
    /// An upsert or status write failed. Upserts already committed stand;
    /// there is no cross-record rollback.
    #[error("storage operation failed")]
    Storage(#[source] anyhow::Error),
    /// Summary regeneration failed after the database was updated. The
    /// previous image stays in the cache slot until the next refresh.
    #[error("summary image generation failed")]
    Render(#[source] anyhow::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    pub refresh_id: Uuid,
    pub countries: usize,
    pub refreshed_at: DateTime<Utc>,
}

/// Fetch → Merge → Upsert → Status → Render を 1 サイクルとして実行する。
///
/// 同時に複数サイクルが走ることは排他しない。レコード単位の上書きは可換
/// なので壊れないが、ステータスとサマリは後勝ちになる。
pub struct RefreshPipeline {
    countries: CountryDirectoryClient,
    rates: ExchangeRateClient,
    dao: Arc<dyn CountryDao>,
    factor: Arc<dyn GdpFactorSource>,
    renderer: SummaryRenderer,
}

impl RefreshPipeline {
    #[must_use]
    pub fn new(
        countries: CountryDirectoryClient,
        rates: ExchangeRateClient,
        dao: Arc<dyn CountryDao>,
        factor: Arc<dyn GdpFactorSource>,
        renderer: SummaryRenderer,
    ) -> Self {
        Self {
            countries,
            rates,
            dao,
            factor,
            renderer,
        }
    }

    #[must_use]
    pub fn summary_image_path(&self) -> PathBuf {
        self.renderer.image_path()
    }

    /// # Errors
    /// 失敗したステージに応じた [`RefreshError`] を返す。フェッチ段階の
    /// 失敗は書き込み前に中断する。アップサート段階の失敗はコミット済み
    /// レコードを残したまま中断する。
    pub async fn run(&self) -> Result<RefreshReport, RefreshError> {
        let refresh_id = Uuid::new_v4();
        info!(%refresh_id, "starting refresh cycle");

        // Both sources race in parallel; the first failure aborts the cycle
        // before anything is derived or written.
        let (sources, rates) = tokio::try_join!(
            self.countries.fetch_all(),
            self.rates.fetch_usd_rates()
        )
        .map_err(|error| {
            warn!(%refresh_id, error = %error, "source fetch failed");
            RefreshError::SourceUnavailable(error)
        })?;

        let records = merge::merge_all(&sources, &rates, self.factor.as_ref());

        // Per-country upserts are independent, so they are all issued at once
        // with a fail-fast join. No ordering guarantee between records.
        future::try_join_all(
            records
                .iter()
                .map(|record| self.dao.upsert_country(record)),
        )
        .await
        .map_err(RefreshError::Storage)?;

        let refreshed_at = Utc::now();
        self.dao
            .mark_refreshed(refreshed_at)
            .await
            .map_err(RefreshError::Storage)?;

        self.renderer
            .render(self.dao.as_ref())
            .await
            .map_err(RefreshError::Render)?;

        info!(
            %refresh_id,
            countries = records.len(),
            %refreshed_at,
            "refresh cycle complete"
        );
        Ok(RefreshReport {
            refresh_id,
            countries: records.len(),
            refreshed_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::pipeline::merge::SeededFactor;
    use crate::store::dao::{CountryDao, MemoryCountryDao};
    use crate::store::models::CountryFilters;

    fn directory_body() -> serde_json::Value {
        serde_json::json!([
            {
                "name": "Nigeria",
                "capital": "Abuja",
                "region": "Africa",
                "population": 206_139_589_i64,
                "flag": "https://example.com/ng.svg",
                "currencies": [{"code": "NGN"}]
            },
            {
                "name": "United States",
                "capital": "Washington, D.C.",
                "region": "Americas",
                "population": 329_484_123_i64,
                "flag": "https://example.com/us.svg",
                "currencies": [{"code": "USD"}]
            },
            {
                "name": "Antarctica",
                "region": "Polar",
                "population": 1000,
                "currencies": []
            }
        ])
    }

    fn rates_body() -> serde_json::Value {
        serde_json::json!({"rates": {"NGN": 1600.0, "USD": 1.0}})
    }

    async fn mount_sources(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/countries"))
            .respond_with(ResponseTemplate::new(200).set_body_json(directory_body()))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rates"))
            .respond_with(ResponseTemplate::new(200).set_body_json(rates_body()))
            .mount(server)
            .await;
    }

    fn pipeline(
        server: &MockServer,
        dao: Arc<MemoryCountryDao>,
        cache_dir: std::path::PathBuf,
    ) -> RefreshPipeline {
        let timeout = Duration::from_secs(5);
        RefreshPipeline::new(
            CountryDirectoryClient::new(format!("{}/countries", server.uri()), timeout)
                .expect("directory client"),
            ExchangeRateClient::new(format!("{}/rates", server.uri()), timeout)
                .expect("rate client"),
            dao,
            Arc::new(SeededFactor::new(11)),
            SummaryRenderer::new(cache_dir),
        )
    }

    #[tokio::test]
    async fn refresh_populates_records_and_summary() {
        let server = MockServer::start().await;
        mount_sources(&server).await;
        let dao = Arc::new(MemoryCountryDao::new());
        let dir = tempfile::tempdir().expect("tempdir");
        let pipeline = pipeline(&server, Arc::clone(&dao), dir.path().join("cache"));

        let started_at = Utc::now();
        let report = pipeline.run().await.expect("refresh succeeds");

        assert_eq!(report.countries, 3);
        assert!(report.refreshed_at >= started_at);

        let records = dao
            .list_countries(&CountryFilters::default())
            .await
            .expect("list");
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|record| record.invariant_holds()));

        let nigeria = dao
            .find_country("Nigeria")
            .await
            .expect("find")
            .expect("present");
        assert_eq!(nigeria.exchange_rate, Some(1600.0));
        assert!(nigeria.estimated_gdp.is_some());

        let antarctica = dao
            .find_country("Antarctica")
            .await
            .expect("find")
            .expect("present");
        assert_eq!(antarctica.currency_code, None);
        assert_eq!(antarctica.estimated_gdp, None);

        assert!(dao.last_refreshed_at().await.expect("status").is_some());
        let image = std::fs::read(pipeline.summary_image_path()).expect("summary written");
        assert!(!image.is_empty());
    }

    #[tokio::test]
    async fn refresh_is_idempotent_on_record_identity() {
        let server = MockServer::start().await;
        mount_sources(&server).await;
        let dao = Arc::new(MemoryCountryDao::new());
        let dir = tempfile::tempdir().expect("tempdir");
        let pipeline = pipeline(&server, Arc::clone(&dao), dir.path().join("cache"));

        pipeline.run().await.expect("first refresh");
        pipeline.run().await.expect("second refresh");

        assert_eq!(dao.count_countries().await.expect("count"), 3);
    }

    #[tokio::test]
    async fn directory_failure_aborts_before_any_write() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/countries"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rates"))
            .respond_with(ResponseTemplate::new(200).set_body_json(rates_body()))
            .mount(&server)
            .await;

        let dao = Arc::new(MemoryCountryDao::new());
        let dir = tempfile::tempdir().expect("tempdir");
        let pipeline = pipeline(&server, Arc::clone(&dao), dir.path().join("cache"));

        let error = pipeline.run().await.expect_err("refresh must fail");
        assert!(matches!(error, RefreshError::SourceUnavailable(_)));

        assert_eq!(dao.count_countries().await.expect("count"), 0);
        assert_eq!(dao.last_refreshed_at().await.expect("status"), None);
        assert!(!pipeline.summary_image_path().exists());
    }

    #[tokio::test]
    async fn upsert_failure_surfaces_as_storage_error() {
        let server = MockServer::start().await;
        mount_sources(&server).await;
        let dao = Arc::new(MemoryCountryDao::new());
        dao.inject_upsert_failure(true);
        let dir = tempfile::tempdir().expect("tempdir");
        let pipeline = pipeline(&server, Arc::clone(&dao), dir.path().join("cache"));

        let error = pipeline.run().await.expect_err("refresh must fail");
        assert!(matches!(error, RefreshError::Storage(_)));
        assert_eq!(dao.last_refreshed_at().await.expect("status"), None);
    }

    #[tokio::test]
    async fn render_failure_leaves_database_updated() {
        let server = MockServer::start().await;
        mount_sources(&server).await;
        let dao = Arc::new(MemoryCountryDao::new());

        // Point the cache directory at a regular file so create_dir_all fails.
        let blocker = tempfile::NamedTempFile::new().expect("tempfile");
        let pipeline = pipeline(&server, Arc::clone(&dao), blocker.path().to_path_buf());

        let error = pipeline.run().await.expect_err("refresh must fail");
        assert!(matches!(error, RefreshError::Render(_)));

        // Documented tradeoff: records and status are already committed.
        assert_eq!(dao.count_countries().await.expect("count"), 3);
        assert!(dao.last_refreshed_at().await.expect("status").is_some());
    }

    trait CountryRecordExt {
        fn invariant_holds(&self) -> bool;
    }

    impl CountryRecordExt for crate::store::models::CountryRecord {
        fn invariant_holds(&self) -> bool {
            self.derived_fields_consistent()
                && (self.currency_code.is_some() || self.exchange_rate.is_none())
        }
    }
}
