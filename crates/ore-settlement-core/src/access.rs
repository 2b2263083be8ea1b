use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::{OreSettlementError, OreSettlementResult};

/// A permission the caller has been granted by the surrounding
/// authentication layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Weighing and warehouse fields.
    Stock,
    /// Assay results.
    Lab,
    /// Pricing inputs and fee overrides.
    Financial,
    /// Previewing and committing supplier payments.
    Payments,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::Stock => "stock",
            Capability::Lab => "lab",
            Capability::Financial => "financial",
            Capability::Payments => "payments",
        };
        f.write_str(name)
    }
}

impl FromStr for Capability {
    type Err = OreSettlementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stock" => Ok(Capability::Stock),
            "lab" => Ok(Capability::Lab),
            "financial" => Ok(Capability::Financial),
            "payments" => Ok(Capability::Payments),
            other => Err(OreSettlementError::validation(
                "capability",
                format!("Unknown capability '{other}'"),
            )),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet(BTreeSet<Capability>);

impl CapabilitySet {
    pub fn new(granted: impl IntoIterator<Item = Capability>) -> Self {
        CapabilitySet(granted.into_iter().collect())
    }

    /// Every capability; used by trusted local tooling.
    pub fn all() -> Self {
        Self::new([
            Capability::Stock,
            Capability::Lab,
            Capability::Financial,
            Capability::Payments,
        ])
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    pub fn require(&self, capability: Capability) -> OreSettlementResult<()> {
        if self.has(capability) {
            Ok(())
        } else {
            Err(OreSettlementError::Unauthorized {
                capability: capability.to_string(),
            })
        }
    }
}
