use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::clients::SourceCountry;
use crate::store::models::CountryRecord;

/// GDP 推定に使う乱数係数の供給元。
///
/// 1 回のリフレッシュで国ごとに独立に [1000, 2000) から一様に引く。
/// 推定値が再現不能になるのは意図されたプレースホルダ経済学であり、
/// 決定化してはならない。テストではシード固定版で値を固定する。
pub trait GdpFactorSource: Send + Sync {
    fn draw(&self) -> f64;
}

/// 本番用。呼び出しごとにスレッドローカル RNG から引く。
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRngFactor;

impl GdpFactorSource for ThreadRngFactor {
    fn draw(&self) -> f64 {
        rand::rng().random_range(1000.0..2000.0)
    }
}

/// シード固定の再現可能な供給元。
pub struct SeededFactor {
    rng: Mutex<StdRng>,
}

impl SeededFactor {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl GdpFactorSource for SeededFactor {
    fn draw(&self) -> f64 {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        rng.random_range(1000.0..2000.0)
    }
}

/// 1 国分のソースオブジェクトをレートと突き合わせ、永続化レコードに変換する。
///
/// `currency_code` は通貨リストの先頭。コードが無い、またはレート表に
/// 載っていない場合は `exchange_rate` と `estimated_gdp` の両方が null になる。
#[must_use]
pub fn merge_country(
    source: &SourceCountry,
    rates: &HashMap<String, f64>,
    factor: &dyn GdpFactorSource,
) -> CountryRecord {
    let currency_code = source.first_currency_code().map(ToString::to_string);
    let exchange_rate = currency_code
        .as_deref()
        .and_then(|code| rates.get(code).copied())
        // A zero rate cannot anchor a conversion; treat it as absent.
        .filter(|rate| *rate != 0.0);

    #[allow(clippy::cast_precision_loss)]
    let estimated_gdp = exchange_rate.map(|rate| (source.population as f64 * factor.draw()) / rate);

    CountryRecord {
        name: source.name.clone(),
        capital: source.capital.clone(),
        region: source.region.clone(),
        population: source.population,
        currency_code,
        exchange_rate,
        estimated_gdp,
        flag_url: source.flag.clone(),
        last_refreshed_at: None,
    }
}

#[must_use]
pub fn merge_all(
    sources: &[SourceCountry],
    rates: &HashMap<String, f64>,
    factor: &dyn GdpFactorSource,
) -> Vec<CountryRecord> {
    sources
        .iter()
        .map(|source| merge_country(source, rates, factor))
        .collect()
}
