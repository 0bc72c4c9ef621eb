use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 国ごとの永続化レコード。`name` が一意キー（大文字小文字を区別する完全一致）。
///
/// `estimated_gdp` は `exchange_rate` が存在する場合に限り存在する。
/// `currency_code` が無い国では両方とも null になる。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CountryRecord {
    pub name: String,
    pub capital: Option<String>,
    pub region: Option<String>,
    pub population: i64,
    pub currency_code: Option<String>,
    pub exchange_rate: Option<f64>,
    pub estimated_gdp: Option<f64>,
    pub flag_url: Option<String>,
    /// Server-assigned on every write; never taken from the source payload.
    pub last_refreshed_at: Option<DateTime<Utc>>,
}

impl CountryRecord {
    /// Derived-field invariant: GDP present iff a rate was resolved.
    #[must_use]
    pub fn derived_fields_consistent(&self) -> bool {
        self.estimated_gdp.is_some() == self.exchange_rate.is_some()
    }
}

/// `GET /status` 応答。`total_countries` は保存時ではなく参照時に集計する。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub total_countries: i64,
    pub last_refreshed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountrySort {
    GdpDesc,
}

/// List query filters. Equality filters are ANDed; unknown sort values are
/// ignored upstream and arrive here as `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CountryFilters {
    pub region: Option<String>,
    pub currency: Option<String>,
    pub sort: Option<CountrySort>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_fields_consistency_check() {
        let mut record = CountryRecord {
            name: "Nigeria".to_string(),
            capital: Some("Abuja".to_string()),
            region: Some("Africa".to_string()),
            population: 206_139_589,
            currency_code: Some("NGN".to_string()),
            exchange_rate: Some(1600.0),
            estimated_gdp: Some(1.93e8),
            flag_url: None,
            last_refreshed_at: None,
        };
        assert!(record.derived_fields_consistent());

        record.estimated_gdp = None;
        assert!(!record.derived_fields_consistent());

        record.exchange_rate = None;
        assert!(record.derived_fields_consistent());
    }
}
