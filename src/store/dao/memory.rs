use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::store::dao::CountryDao;
use crate::store::models::{CountryFilters, CountryRecord, CountrySort};

/// DB 接続なしで動作するインメモリ実装。テストとローカル検証用。
#[derive(Default)]
pub struct MemoryCountryDao {
    countries: Mutex<HashMap<String, CountryRecord>>,
    last_refreshed_at: Mutex<Option<DateTime<Utc>>>,
    fail_upserts: AtomicBool,
}

impl MemoryCountryDao {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// 以降の upsert を強制的に失敗させる（ストレージ障害の注入）。
    pub fn inject_upsert_failure(&self, fail: bool) {
        self.fail_upserts.store(fail, AtomicOrdering::SeqCst);
    }

    fn lock_countries(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, CountryRecord>>> {
        self.countries
            .lock()
            .map_err(|_| anyhow!("country map lock poisoned"))
    }
}

/// Descending by GDP with nulls last, matching `DESC NULLS LAST`.
fn gdp_desc_nulls_last(a: &CountryRecord, b: &CountryRecord) -> Ordering {
    match (a.estimated_gdp, b.estimated_gdp) {
        (Some(left), Some(right)) => right.partial_cmp(&left).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[async_trait]
impl CountryDao for MemoryCountryDao {
    async fn ping(&self) -> Result<()> {
        self.lock_countries().map(|_| ())
    }

    async fn upsert_country(&self, country: &CountryRecord) -> Result<()> {
        if self.fail_upserts.load(AtomicOrdering::SeqCst) {
            bail!("injected upsert failure for {}", country.name);
        }
        let mut stamped = country.clone();
        stamped.last_refreshed_at = Some(Utc::now());
        self.lock_countries()?.insert(stamped.name.clone(), stamped);
        Ok(())
    }

    async fn list_countries(&self, filters: &CountryFilters) -> Result<Vec<CountryRecord>> {
        let mut records: Vec<CountryRecord> = self
            .lock_countries()?
            .values()
            .filter(|record| {
                filters
                    .region
                    .as_ref()
                    .is_none_or(|region| record.region.as_deref() == Some(region.as_str()))
            })
            .filter(|record| {
                filters
                    .currency
                    .as_ref()
                    .is_none_or(|code| record.currency_code.as_deref() == Some(code.as_str()))
            })
            .cloned()
            .collect();

        if matches!(filters.sort, Some(CountrySort::GdpDesc)) {
            records.sort_by(gdp_desc_nulls_last);
        }
        Ok(records)
    }

    async fn find_country(&self, name: &str) -> Result<Option<CountryRecord>> {
        Ok(self.lock_countries()?.get(name).cloned())
    }

    async fn delete_country(&self, name: &str) -> Result<u64> {
        Ok(u64::from(self.lock_countries()?.remove(name).is_some()))
    }

    async fn count_countries(&self) -> Result<i64> {
        Ok(i64::try_from(self.lock_countries()?.len()).unwrap_or(i64::MAX))
    }

    async fn top_countries_by_gdp(&self, limit: i64) -> Result<Vec<CountryRecord>> {
        let mut records: Vec<CountryRecord> = self.lock_countries()?.values().cloned().collect();
        records.sort_by(gdp_desc_nulls_last);
        records.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(records)
    }

    async fn last_refreshed_at(&self) -> Result<Option<DateTime<Utc>>> {
        self.last_refreshed_at
            .lock()
            .map(|guard| *guard)
            .map_err(|_| anyhow!("status lock poisoned"))
    }

    async fn mark_refreshed(&self, refreshed_at: DateTime<Utc>) -> Result<()> {
        self.last_refreshed_at
            .lock()
            .map(|mut guard| *guard = Some(refreshed_at))
            .map_err(|_| anyhow!("status lock poisoned"))
    }
}
