use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// All monetary values. Wraps Decimal to prevent accidental f64 usage.
pub type Money = Decimal;

/// Rates expressed as decimals (0.03 = 3%). Never as percentages.
pub type Rate = Decimal;

/// Weights in kilograms.
pub type Weight = Decimal;

/// Assay and purchase percentages on a 0-100 scale (40 = 40%).
pub type Percentage = Decimal;

pub type LotId = String;
pub type SupplierId = String;
pub type AdvanceId = String;
pub type PaymentId = String;

/// Currency code
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    #[default]
    USD,
    RWF,
    EUR,
    Other(String),
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Currency::USD => write!(f, "USD"),
            Currency::RWF => write!(f, "RWF"),
            Currency::EUR => write!(f, "EUR"),
            Currency::Other(code) => write!(f, "{code}"),
        }
    }
}

/// The three mineral categories a lot can belong to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum MineralCategory {
    /// Tantalum ore, assayed for Ta2O5 (and Nb2O5).
    Coltan,
    /// Tin ore, assayed for Sn.
    Cassiterite,
    /// Tungsten ore, assayed for WO3.
    Wolframite,
}

impl MineralCategory {
    pub const ALL: [MineralCategory; 3] = [
        MineralCategory::Coltan,
        MineralCategory::Cassiterite,
        MineralCategory::Wolframite,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MineralCategory::Coltan => "coltan",
            MineralCategory::Cassiterite => "cassiterite",
            MineralCategory::Wolframite => "wolframite",
        }
    }
}

impl fmt::Display for MineralCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Helper to wrap computation results with metadata
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "rust_decimal_128bit".to_string(),
        },
    }
}
