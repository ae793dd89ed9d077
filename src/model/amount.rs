//! Canonical fixed-precision amount and basis-point probability types.
//!
//! Design note (SPEC_FULL.md §9 / spec.md §9): "Float probability / ROI ->
//! integer-in-bps where persisted." Amounts are 18-decimal integers ("wei-like")
//! so adapters never round-trip through a float at ingress.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of decimals canonical amounts are scaled to.
pub const CANONICAL_DECIMALS: u32 = 18;

/// A canonical 18-decimal fixed-point amount, stored as an integer to avoid
/// float drift. `Serialize`/`Deserialize` as a decimal string so large values
/// survive JSON round-trips exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Amount(pub i128);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    /// Build a canonical amount from a venue-native value with `decimals`
    /// decimal places, using integer math only (no float round-trip).
    pub fn from_native_scaled(native_units: i128, decimals: u32) -> Amount {
        if decimals >= CANONICAL_DECIMALS {
            let shift = decimals - CANONICAL_DECIMALS;
            Amount(native_units / 10i128.pow(shift))
        } else {
            let shift = CANONICAL_DECIMALS - decimals;
            Amount(native_units * 10i128.pow(shift))
        }
    }

    /// Render as a native floating-point value (display/derivation only,
    /// never for persistence or equality tests).
    pub fn as_native_f64(self) -> f64 {
        self.0 as f64 / 10f64.powi(CANONICAL_DECIMALS as i32)
    }

    pub fn from_native_f64(native: f64) -> Amount {
        Amount((native * 10f64.powi(CANONICAL_DECIMALS as i32)).round() as i128)
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}", self.as_native_f64())
    }
}

impl Serialize for Amount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse::<i128>()
            .map(Amount)
            .map_err(|e| serde::de::Error::custom(format!("invalid Amount '{s}': {e}")))
    }
}

/// A probability or ROI stored as parts-per-10000 (basis points) to keep
/// equality tests exact; converted to `f64` only for derivation/display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Bps(pub i32);

impl Bps {
    pub const ZERO: Bps = Bps(0);
    pub const ONE: Bps = Bps(10_000);

    pub fn from_probability(p: f64) -> Bps {
        Bps((p * 10_000.0).round() as i32)
    }

    pub fn as_probability(self) -> f64 {
        self.0 as f64 / 10_000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_six_decimal_scales_up() {
        // 0.1 USDC at 6 decimals = 100_000 native units.
        let a = Amount::from_native_scaled(100_000, 6);
        assert_eq!(a.as_native_f64(), 0.1);
    }

    #[test]
    fn native_eighteen_decimal_passes_through() {
        let native = 100_000_000_000_000_000i128; // 0.1 at 18 decimals
        let a = Amount::from_native_scaled(native, 18);
        assert_eq!(a.0, native);
    }

    #[test]
    fn amount_round_trips_through_json() {
        let a = Amount::from_native_f64(0.1);
        let json = serde_json::to_string(&a).unwrap();
        let back: Amount = serde_json::from_str(&json).unwrap();
        assert_eq!(a, back);
    }

    #[test]
    fn bps_round_trips_probability() {
        let p = 0.705;
        let bps = Bps::from_probability(p);
        assert_eq!(bps.0, 7050);
        assert!((bps.as_probability() - p).abs() < 1e-9);
    }
}
