//! The closed set of venues the engine ingests from.

use serde::{Deserialize, Serialize};

/// Category used for score-formula selection (§4.2) and topic clustering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Crypto,
    Sports,
    Events,
    Forecasting,
}

/// Which `TruthScore` formula a venue uses (spec.md §4.2 Open Question,
/// resolved per-venue here — see DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreFormula {
    /// Binary-market venues: Wilson lower bound damping + sample-size ramp.
    BinaryMarket,
    /// Odds-market venues: ROI/trade-count weighting with a recency bonus.
    OddsMarket,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    PancakeSwapPrediction,
    AuroraPredict,
    Azuro,
    Polymarket,
    Kalshi,
    Manifold,
    Metaculus,
    Drift,
    Zeitgeist,
    Thales,
    Hedgehog,
    Overtime,
}

/// Static per-venue metadata. Every adapter is parameterized by one of
/// these rather than hand-writing a bespoke client per venue.
#[derive(Debug, Clone, Copy)]
pub struct PlatformInfo {
    pub platform: Platform,
    pub chain: &'static str,
    pub currency: &'static str,
    /// Fee taken by the venue, in basis points.
    pub fee_bps: u32,
    pub category: Category,
    pub formula: ScoreFormula,
}

pub const PLATFORMS: &[PlatformInfo] = &[
    PlatformInfo {
        platform: Platform::PancakeSwapPrediction,
        chain: "bsc",
        currency: "BNB",
        fee_bps: 300,
        category: Category::Crypto,
        formula: ScoreFormula::BinaryMarket,
    },
    PlatformInfo {
        platform: Platform::AuroraPredict,
        chain: "bsc",
        currency: "BNB",
        fee_bps: 300,
        category: Category::Crypto,
        formula: ScoreFormula::BinaryMarket,
    },
    PlatformInfo {
        platform: Platform::Azuro,
        chain: "polygon",
        currency: "USDC",
        fee_bps: 200,
        category: Category::Sports,
        formula: ScoreFormula::OddsMarket,
    },
    PlatformInfo {
        platform: Platform::Polymarket,
        chain: "polygon",
        currency: "USDC",
        fee_bps: 0,
        category: Category::Events,
        formula: ScoreFormula::OddsMarket,
    },
    PlatformInfo {
        platform: Platform::Kalshi,
        chain: "off-chain",
        currency: "USD",
        fee_bps: 100,
        category: Category::Events,
        formula: ScoreFormula::OddsMarket,
    },
    PlatformInfo {
        platform: Platform::Manifold,
        chain: "off-chain",
        currency: "MANA",
        fee_bps: 0,
        category: Category::Forecasting,
        formula: ScoreFormula::OddsMarket,
    },
    PlatformInfo {
        platform: Platform::Metaculus,
        chain: "off-chain",
        currency: "POINTS",
        fee_bps: 0,
        category: Category::Forecasting,
        formula: ScoreFormula::OddsMarket,
    },
    PlatformInfo {
        platform: Platform::Drift,
        chain: "solana",
        currency: "USDC",
        fee_bps: 50,
        category: Category::Crypto,
        formula: ScoreFormula::OddsMarket,
    },
    PlatformInfo {
        platform: Platform::Zeitgeist,
        chain: "polkadot",
        currency: "ZTG",
        fee_bps: 100,
        category: Category::Forecasting,
        formula: ScoreFormula::OddsMarket,
    },
    PlatformInfo {
        platform: Platform::Thales,
        chain: "optimism",
        currency: "USDC",
        fee_bps: 200,
        category: Category::Sports,
        formula: ScoreFormula::BinaryMarket,
    },
    PlatformInfo {
        platform: Platform::Hedgehog,
        chain: "bsc",
        currency: "BNB",
        fee_bps: 300,
        category: Category::Crypto,
        formula: ScoreFormula::BinaryMarket,
    },
    PlatformInfo {
        platform: Platform::Overtime,
        chain: "optimism",
        currency: "USDC",
        fee_bps: 200,
        category: Category::Sports,
        formula: ScoreFormula::BinaryMarket,
    },
];

impl Platform {
    pub fn info(self) -> &'static PlatformInfo {
        PLATFORMS
            .iter()
            .find(|p| p.platform == self)
            .expect("every Platform variant has a PLATFORMS entry")
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Platform::PancakeSwapPrediction => "pancakeswap_prediction",
            Platform::AuroraPredict => "aurora_predict",
            Platform::Azuro => "azuro",
            Platform::Polymarket => "polymarket",
            Platform::Kalshi => "kalshi",
            Platform::Manifold => "manifold",
            Platform::Metaculus => "metaculus",
            Platform::Drift => "drift",
            Platform::Zeitgeist => "zeitgeist",
            Platform::Thales => "thales",
            Platform::Hedgehog => "hedgehog",
            Platform::Overtime => "overtime",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Platform> {
        PLATFORMS
            .iter()
            .map(|p| p.platform)
            .find(|p| p.as_str() == s)
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Platform {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Platform {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Platform::from_str_opt(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown platform '{s}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_platform_has_info() {
        for info in PLATFORMS {
            assert_eq!(info.platform.info().platform, info.platform);
        }
    }

    #[test]
    fn round_trips_through_str() {
        for info in PLATFORMS {
            let s = info.platform.as_str();
            assert_eq!(Platform::from_str_opt(s), Some(info.platform));
        }
    }
}
