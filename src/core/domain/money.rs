//! Monetary types for price and size representation.
//!
//! All price/size arithmetic uses [`Decimal`]; floats are reserved for
//! statistics (spreads in bps, signal strengths).

use rust_decimal::Decimal;

/// Price represented as a Decimal for precision. Outcome-share prices
/// live in `[0, 1]`.
pub type Price = Decimal;

/// Size in USD (notional) represented as a Decimal for precision.
pub type Usd = Decimal;

/// Share quantity represented as a Decimal for precision.
pub type Quantity = Decimal;

/// Clamp a statistic to the `[0, 1]` interval.
#[must_use]
pub fn clamp01(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn decimal_price_math_is_exact() {
        let price: Price = dec!(0.45);
        let qty: Quantity = dec!(100);
        assert_eq!(price * qty, dec!(45.00));
    }

    #[test]
    fn clamp01_bounds() {
        assert_eq!(clamp01(1.5), 1.0);
        assert_eq!(clamp01(-0.2), 0.0);
        assert_eq!(clamp01(0.37), 0.37);
    }
}
