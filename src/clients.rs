pub mod exchange_rates;
pub mod restcountries;

pub use exchange_rates::ExchangeRateClient;
pub use restcountries::{CountryDirectoryClient, SourceCountry, SourceCurrency};
