use serde::Serialize;

use crate::{QuoteSource, Symbol, UtcDateTime, ValidationError};

/// Optional price levels attached to a quote. Each one, when present, must be positive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceLevels {
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub previous_close: Option<f64>,
}

impl PriceLevels {
    fn validate(&self) -> Result<(), ValidationError> {
        validate_optional_positive("bid", self.bid)?;
        validate_optional_positive("ask", self.ask)?;
        validate_optional_positive("open", self.open)?;
        validate_optional_positive("high", self.high)?;
        validate_optional_positive("low", self.low)?;
        validate_optional_positive("previousClose", self.previous_close)
    }
}

/// One validated market observation. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    symbol: Symbol,
    price: f64,
    volume: u64,
    observed_at: UtcDateTime,
    source: QuoteSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    bid: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ask: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    open: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    high: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    low: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    previous_close: Option<f64>,
}

impl Quote {
    pub fn new(
        symbol: Symbol,
        price: f64,
        volume: u64,
        observed_at: UtcDateTime,
        source: QuoteSource,
        levels: PriceLevels,
    ) -> Result<Self, ValidationError> {
        validate_positive("price", price)?;
        levels.validate()?;

        Ok(Self {
            symbol,
            price,
            volume,
            observed_at,
            source,
            bid: levels.bid,
            ask: levels.ask,
            open: levels.open,
            high: levels.high,
            low: levels.low,
            previous_close: levels.previous_close,
        })
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn price(&self) -> f64 {
        self.price
    }

    pub fn volume(&self) -> u64 {
        self.volume
    }

    pub fn observed_at(&self) -> UtcDateTime {
        self.observed_at
    }

    pub fn source(&self) -> QuoteSource {
        self.source
    }

    pub fn levels(&self) -> PriceLevels {
        PriceLevels {
            bid: self.bid,
            ask: self.ask,
            open: self.open,
            high: self.high,
            low: self.low,
            previous_close: self.previous_close,
        }
    }
}

pub fn validate_positive(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue { field });
    }
    if value <= 0.0 {
        return Err(ValidationError::NonPositiveValue { field });
    }
    Ok(())
}

fn validate_optional_positive(field: &'static str, value: Option<f64>) -> Result<(), ValidationError> {
    match value {
        Some(value) => validate_positive(field, value),
        None => Ok(()),
    }
}

/// Converts a provider-reported volume into a whole, non-negative share count.
pub fn validate_volume(value: f64) -> Result<u64, ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue { field: "volume" });
    }
    if value < 0.0 {
        return Err(ValidationError::NegativeValue { field: "volume" });
    }
    if value.fract() != 0.0 {
        return Err(ValidationError::FractionalValue { field: "volume" });
    }
    Ok(value as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observed_at() -> UtcDateTime {
        UtcDateTime::parse("2024-03-01T14:30:00Z").expect("valid timestamp")
    }

    #[test]
    fn rejects_non_positive_price() {
        let symbol = Symbol::parse("AAPL").expect("valid");
        let err = Quote::new(
            symbol,
            0.0,
            10,
            observed_at(),
            QuoteSource::Yfinance,
            PriceLevels::default(),
        )
        .expect_err("zero price must fail");
        assert_eq!(err, ValidationError::NonPositiveValue { field: "price" });
    }

    #[test]
    fn rejects_non_positive_optional_level() {
        let symbol = Symbol::parse("AAPL").expect("valid");
        let levels = PriceLevels {
            low: Some(-1.0),
            ..PriceLevels::default()
        };
        let err = Quote::new(symbol, 10.0, 10, observed_at(), QuoteSource::Fmp, levels)
            .expect_err("negative low must fail");
        assert_eq!(err, ValidationError::NonPositiveValue { field: "low" });
    }

    #[test]
    fn serializes_camel_case_and_omits_absent_levels() {
        let symbol = Symbol::parse("aapl").expect("valid");
        let levels = PriceLevels {
            previous_close: Some(181.5),
            ..PriceLevels::default()
        };
        let quote = Quote::new(symbol, 182.25, 1_200, observed_at(), QuoteSource::Yfinance, levels)
            .expect("valid quote");

        let json = serde_json::to_value(&quote).expect("serializes");
        assert_eq!(json["symbol"], "AAPL");
        assert_eq!(json["observedAt"], "2024-03-01T14:30:00Z");
        assert_eq!(json["source"], "yfinance");
        assert_eq!(json["previousClose"], 181.5);
        assert!(json.get("bid").is_none());
    }

    #[test]
    fn volume_must_be_whole_and_non_negative() {
        assert_eq!(validate_volume(1500.0), Ok(1500));
        assert_eq!(validate_volume(0.0), Ok(0));
        assert!(validate_volume(-1.0).is_err());
        assert!(validate_volume(1.5).is_err());
        assert!(validate_volume(f64::NAN).is_err());
    }
}
