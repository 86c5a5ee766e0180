use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Origin tag carried by every quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuoteSource {
    Yfinance,
    Fmp,
    Manual,
}

impl QuoteSource {
    pub const ALL: [Self; 3] = [Self::Yfinance, Self::Fmp, Self::Manual];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Yfinance => "yfinance",
            Self::Fmp => "fmp",
            Self::Manual => "manual",
        }
    }
}

impl Display for QuoteSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuoteSource {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "yfinance" => Ok(Self::Yfinance),
            "fmp" => Ok(Self::Fmp),
            "manual" => Ok(Self::Manual),
            other => Err(ValidationError::InvalidSource {
                value: other.to_owned(),
            }),
        }
    }
}
