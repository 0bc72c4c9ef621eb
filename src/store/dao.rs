pub mod memory;
pub mod pg;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::store::models::{CountryFilters, CountryRecord};

pub use memory::MemoryCountryDao;
pub use pg::PgCountryDao;

/// データアクセス層の抽象化。
///
/// 各操作は独立しており、操作単位でプール接続を取得して必ず返却する。
/// 操作をまたぐトランザクションは張らない。
#[async_trait]
pub trait CountryDao: Send + Sync {
    /// Storage reachability check for the readiness probe.
    async fn ping(&self) -> anyhow::Result<()>;

    /// Insert-or-overwrite by exact name match. All fields are replaced and
    /// `last_refreshed_at` is stamped with the current server time.
    async fn upsert_country(&self, country: &CountryRecord) -> anyhow::Result<()>;

    async fn list_countries(
        &self,
        filters: &CountryFilters,
    ) -> anyhow::Result<Vec<CountryRecord>>;

    async fn find_country(&self, name: &str) -> anyhow::Result<Option<CountryRecord>>;

    /// Returns the number of rows removed; zero is not an error.
    async fn delete_country(&self, name: &str) -> anyhow::Result<u64>;

    async fn count_countries(&self) -> anyhow::Result<i64>;

    /// Top records ordered by `estimated_gdp` descending, nulls last.
    async fn top_countries_by_gdp(&self, limit: i64) -> anyhow::Result<Vec<CountryRecord>>;

    async fn last_refreshed_at(&self) -> anyhow::Result<Option<DateTime<Utc>>>;

    async fn mark_refreshed(&self, refreshed_at: DateTime<Utc>) -> anyhow::Result<()>;
}
