use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use sqlx::postgres::PgPoolOptions;

use crate::{
    api,
    clients::{CountryDirectoryClient, ExchangeRateClient},
    config::Config,
    pipeline::{
        RefreshPipeline,
        merge::{GdpFactorSource, ThreadRngFactor},
        render::SummaryRenderer,
    },
    store::dao::{CountryDao, PgCountryDao},
};

#[derive(Clone)]
pub(crate) struct AppState {
    registry: Arc<ComponentRegistry>,
}

pub struct ComponentRegistry {
    config: Arc<Config>,
    dao: Arc<dyn CountryDao>,
    pipeline: Arc<RefreshPipeline>,
}

impl AppState {
    pub(crate) fn new(registry: ComponentRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub(crate) fn dao(&self) -> Arc<dyn CountryDao> {
        Arc::clone(&self.registry.dao)
    }

    pub(crate) fn pipeline(&self) -> Arc<RefreshPipeline> {
        Arc::clone(&self.registry.pipeline)
    }
}

impl ComponentRegistry {
    /// 構成情報から本番依存（Postgres プールと HTTP クライアント）を
    /// 初期化し、アプリケーションの共有レジストリを構築する。
    ///
    /// # Errors
    /// プール構成、スキーマ初期化、クライアント構築が失敗した場合は
    /// エラーを返す。
    pub async fn build(config: Config) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.country_db_max_connections())
            .min_connections(config.country_db_min_connections())
            .acquire_timeout(config.country_db_acquire_timeout())
            .idle_timeout(Some(config.country_db_idle_timeout()))
            .max_lifetime(Some(config.country_db_max_lifetime()))
            .test_before_acquire(true)
            .connect_lazy(config.country_db_dsn())
            .context("failed to configure country_db connection pool")?;
        let dao = PgCountryDao::new(pool);
        dao.ensure_schema()
            .await
            .context("failed to bootstrap storage schema")?;

        Self::from_parts(config, Arc::new(dao), Arc::new(ThreadRngFactor))
    }

    /// 依存を注入してレジストリを構築する。テストとローカル実行はここから
    /// インメモリ DAO やシード固定の乱数源を差し込む。
    ///
    /// # Errors
    /// 上流クライアントの構築（URL パース等）に失敗した場合はエラーを返す。
    pub fn from_parts(
        config: Config,
        dao: Arc<dyn CountryDao>,
        factor: Arc<dyn GdpFactorSource>,
    ) -> Result<Self> {
        let config = Arc::new(config);
        let countries =
            CountryDirectoryClient::new(config.countries_api_url(), config.source_fetch_timeout())
                .context("failed to build country directory client")?;
        let rates =
            ExchangeRateClient::new(config.exchange_rate_api_url(), config.source_fetch_timeout())
                .context("failed to build exchange rate client")?;
        let renderer = SummaryRenderer::new(config.summary_cache_dir().clone());
        let pipeline = Arc::new(RefreshPipeline::new(
            countries,
            rates,
            Arc::clone(&dao),
            factor,
            renderer,
        ));

        Ok(Self {
            config,
            dao,
            pipeline,
        })
    }

    #[must_use]
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }
}

#[must_use]
pub fn build_router(registry: ComponentRegistry) -> Router {
    let state = AppState::new(registry);
    api::router(state)
}
