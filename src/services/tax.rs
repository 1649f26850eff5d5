use crate::{config::TaxConfig, errors::ServiceError};
use async_trait::async_trait;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;
use validator::Validate;

/// Shipping destination a tax rate is resolved for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate, ToSchema)]
pub struct Destination {
    /// ISO 3166-1 alpha-2 country code, e.g. "CA"
    #[validate(length(min = 2, max = 2, message = "Country must be a 2-letter code"))]
    pub country: String,
    /// State or province code, e.g. "ON"
    pub state: Option<String>,
}

impl Destination {
    pub fn new(country: impl Into<String>, state: Option<String>) -> Self {
        Self {
            country: country.into(),
            state,
        }
    }
}

/// Source of sales tax rates.
///
/// Implementations return a fraction in `[0, 1]`. Callers treat a lookup
/// failure as rate zero so that a tax outage never blocks a checkout.
#[async_trait]
pub trait TaxRateSource: Send + Sync {
    async fn rate_for(&self, destination: &Destination) -> Result<Decimal, ServiceError>;
}

/// In-process rate table loaded from configuration.
///
/// Keys are either a bare country code (`CA`) or country and region
/// (`CA-ON`). Lookups try the region entry first, then the country entry,
/// then fall back to the default rate.
#[derive(Debug, Clone)]
pub struct RegionTaxTable {
    default_rate: Decimal,
    rates: HashMap<String, Decimal>,
}

impl RegionTaxTable {
    pub fn new(default_rate: Decimal) -> Self {
        Self {
            default_rate,
            rates: HashMap::new(),
        }
    }

    /// Adds or replaces a rate entry. Keys are stored uppercase.
    pub fn with_rate(mut self, key: impl Into<String>, rate: Decimal) -> Self {
        self.rates.insert(key.into().to_uppercase(), rate);
        self
    }
}

impl From<&TaxConfig> for RegionTaxTable {
    fn from(config: &TaxConfig) -> Self {
        // from_f64 strips the binary noise; a configured 0.13 must become
        // exactly 0.13, not 0.1299999...
        let rates = config
            .rates
            .iter()
            .map(|(key, rate)| {
                (
                    key.to_uppercase(),
                    Decimal::from_f64(*rate).unwrap_or(Decimal::ZERO),
                )
            })
            .collect();

        Self {
            default_rate: Decimal::from_f64(config.default_rate).unwrap_or(Decimal::ZERO),
            rates,
        }
    }
}

#[async_trait]
impl TaxRateSource for RegionTaxTable {
    async fn rate_for(&self, destination: &Destination) -> Result<Decimal, ServiceError> {
        let country = destination.country.trim().to_uppercase();
        if country.is_empty() {
            return Err(ServiceError::InvalidInput(
                "Destination has no country code".to_string(),
            ));
        }

        if let Some(state) = destination.state.as_deref() {
            let state = state.trim().to_uppercase();
            if !state.is_empty() {
                if let Some(rate) = self.rates.get(&format!("{}-{}", country, state)) {
                    return Ok(*rate);
                }
            }
        }

        Ok(self.rates.get(&country).copied().unwrap_or(self.default_rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn table() -> RegionTaxTable {
        RegionTaxTable::new(dec!(0.05))
            .with_rate("CA", dec!(0.05))
            .with_rate("CA-ON", dec!(0.13))
            .with_rate("CA-QC", dec!(0.14975))
    }

    #[tokio::test]
    async fn region_entry_beats_country_entry() {
        let rate = table()
            .rate_for(&Destination::new("CA", Some("ON".into())))
            .await
            .unwrap();
        assert_eq!(rate, dec!(0.13));
    }

    #[tokio::test]
    async fn falls_back_to_country_when_region_unknown() {
        let rate = table()
            .rate_for(&Destination::new("CA", Some("YT".into())))
            .await
            .unwrap();
        assert_eq!(rate, dec!(0.05));
    }

    #[tokio::test]
    async fn falls_back_to_default_for_unknown_country() {
        let rate = table()
            .rate_for(&Destination::new("DE", None))
            .await
            .unwrap();
        assert_eq!(rate, dec!(0.05));
    }

    #[tokio::test]
    async fn lookup_is_case_insensitive() {
        let rate = table()
            .rate_for(&Destination::new("ca", Some("on".into())))
            .await
            .unwrap();
        assert_eq!(rate, dec!(0.13));
    }

    #[tokio::test]
    async fn blank_country_is_an_error() {
        let err = table()
            .rate_for(&Destination::new("  ", None))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[test]
    fn config_rates_convert_to_decimals() {
        let mut config = TaxConfig::default();
        config.default_rate = 0.0;
        config.rates.insert("ca-bc".to_string(), 0.12);

        let table = RegionTaxTable::from(&config);
        assert_eq!(table.rates.get("CA-BC"), Some(&dec!(0.12)));
        assert_eq!(table.default_rate, Decimal::ZERO);
    }
}
