use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Executor, PgPool, Postgres, QueryBuilder, Row};

use crate::store::dao::CountryDao;
use crate::store::models::{CountryFilters, CountryRecord, CountrySort};

const COUNTRY_COLUMNS: &str = "name, capital, region, population, currency_code, \
     exchange_rate, estimated_gdp, flag_url, last_refreshed_at";

/// PostgreSQL 実装。1 操作 = 1 プール接続で、接続はステートメント完了時に返却される。
pub struct PgCountryDao {
    pool: PgPool,
}

impl PgCountryDao {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// テーブルとシングルトン状態行を冪等に用意する。
    ///
    /// # Errors
    /// DDL の実行に失敗した場合はエラーを返す。
    pub async fn ensure_schema(&self) -> Result<()> {
        self.pool
            .execute(
                r"
                CREATE TABLE IF NOT EXISTS countries (
                    id BIGSERIAL PRIMARY KEY,
                    name TEXT NOT NULL UNIQUE,
                    capital TEXT,
                    region TEXT,
                    population BIGINT NOT NULL DEFAULT 0,
                    currency_code TEXT,
                    exchange_rate DOUBLE PRECISION,
                    estimated_gdp DOUBLE PRECISION,
                    flag_url TEXT,
                    last_refreshed_at TIMESTAMPTZ
                );

                CREATE TABLE IF NOT EXISTS app_status (
                    id SMALLINT PRIMARY KEY,
                    last_refreshed_at TIMESTAMPTZ
                );

                INSERT INTO app_status (id, last_refreshed_at)
                VALUES (1, NULL)
                ON CONFLICT (id) DO NOTHING;
                ",
            )
            .await
            .context("failed to bootstrap country-pulse schema")?;
        Ok(())
    }
}

#[async_trait]
impl CountryDao for PgCountryDao {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("storage ping failed")?;
        Ok(())
    }

    async fn upsert_country(&self, country: &CountryRecord) -> Result<()> {
        // Existence-by-name decides insert vs update; records are independent,
        // so concurrent upserts of different names never conflict.
        let existing = sqlx::query("SELECT id FROM countries WHERE name = $1")
            .bind(&country.name)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to look up country {}", country.name))?;

        if let Some(row) = existing {
            let id: i64 = row.try_get("id").context("countries.id column missing")?;
            sqlx::query(
                r"
                UPDATE countries
                SET capital = $1,
                    region = $2,
                    population = $3,
                    currency_code = $4,
                    exchange_rate = $5,
                    estimated_gdp = $6,
                    flag_url = $7,
                    last_refreshed_at = NOW()
                WHERE id = $8
                ",
            )
            .bind(&country.capital)
            .bind(&country.region)
            .bind(country.population)
            .bind(&country.currency_code)
            .bind(country.exchange_rate)
            .bind(country.estimated_gdp)
            .bind(&country.flag_url)
            .bind(id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to update country {}", country.name))?;
        } else {
            sqlx::query(
                r"
                INSERT INTO countries
                    (name, capital, region, population, currency_code,
                     exchange_rate, estimated_gdp, flag_url, last_refreshed_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())
                ",
            )
            .bind(&country.name)
            .bind(&country.capital)
            .bind(&country.region)
            .bind(country.population)
            .bind(&country.currency_code)
            .bind(country.exchange_rate)
            .bind(country.estimated_gdp)
            .bind(&country.flag_url)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to insert country {}", country.name))?;
        }

        Ok(())
    }

    async fn list_countries(&self, filters: &CountryFilters) -> Result<Vec<CountryRecord>> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {COUNTRY_COLUMNS} FROM countries"));

        let mut has_where = false;
        if let Some(region) = &filters.region {
            builder.push(" WHERE region = ");
            builder.push_bind(region);
            has_where = true;
        }
        if let Some(currency) = &filters.currency {
            builder.push(if has_where {
                " AND currency_code = "
            } else {
                " WHERE currency_code = "
            });
            builder.push_bind(currency);
        }
        if matches!(filters.sort, Some(CountrySort::GdpDesc)) {
            builder.push(" ORDER BY estimated_gdp DESC NULLS LAST");
        }

        let records = builder
            .build_query_as::<CountryRecord>()
            .fetch_all(&self.pool)
            .await
            .context("failed to list countries")?;
        Ok(records)
    }

    async fn find_country(&self, name: &str) -> Result<Option<CountryRecord>> {
        let record = sqlx::query_as::<_, CountryRecord>(&format!(
            "SELECT {COUNTRY_COLUMNS} FROM countries WHERE name = $1"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("failed to fetch country {name}"))?;
        Ok(record)
    }

    async fn delete_country(&self, name: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM countries WHERE name = $1")
            .bind(name)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to delete country {name}"))?;
        Ok(result.rows_affected())
    }

    async fn count_countries(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM countries")
            .fetch_one(&self.pool)
            .await
            .context("failed to count countries")?;
        Ok(count)
    }

    async fn top_countries_by_gdp(&self, limit: i64) -> Result<Vec<CountryRecord>> {
        let records = sqlx::query_as::<_, CountryRecord>(&format!(
            "SELECT {COUNTRY_COLUMNS} FROM countries \
             ORDER BY estimated_gdp DESC NULLS LAST LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("failed to fetch top countries")?;
        Ok(records)
    }

    async fn last_refreshed_at(&self) -> Result<Option<DateTime<Utc>>> {
        let value: Option<Option<DateTime<Utc>>> =
            sqlx::query_scalar("SELECT last_refreshed_at FROM app_status WHERE id = 1")
                .fetch_optional(&self.pool)
                .await
                .context("failed to read app status")?;
        Ok(value.flatten())
    }

    async fn mark_refreshed(&self, refreshed_at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE app_status SET last_refreshed_at = $1 WHERE id = 1")
            .bind(refreshed_at)
            .execute(&self.pool)
            .await
            .context("failed to record refresh timestamp")?;
        Ok(())
    }
}
