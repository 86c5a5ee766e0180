//! # Domain Models
//!
//! Validated value types for streamed market observations.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Quote`] | One immutable observation with price, volume, and optional levels |
//! | [`PriceLevels`] | Optional bid/ask/open/high/low/previous close |
//! | [`QuoteSource`] | Origin tag (`yfinance`, `fmp`, `manual`) |
//! | [`Symbol`] | 1 to 5 letter uppercase ticker |
//! | [`UtcDateTime`] | UTC-only timestamp |
//!
//! Construction enforces every invariant, so a `Quote` that exists is publishable.

mod quote;
mod source;
mod symbol;
mod timestamp;

pub use quote::{validate_positive, validate_volume, PriceLevels, Quote};
pub use source::QuoteSource;
pub use symbol::Symbol;
pub use timestamp::UtcDateTime;
