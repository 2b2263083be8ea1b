//! Fee schedule configuration.
//!
//! A config file lists the current global schedule of each category:
//!
//! ```toml
//! [[schedules]]
//! category = "coltan"
//! version = 4
//! rra_rate = "0.03"
//! rma_per_ton = "125"
//! inkomane_per_kg = "40"
//! price_per_percentage_rate = "5"
//! effective_from = "2024-01-01"
//! ```
//!
//! YAML files use the same keys. The path comes from `--config`, else from
//! the `ORES_CONFIG` environment variable; with neither, no schedules are
//! configured.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use ore_settlement_core::fees::{validate_schedule, FeeSchedule};
use ore_settlement_core::store::FeeScheduleRepository;
use ore_settlement_core::MineralCategory;

pub const CONFIG_ENV: &str = "ORES_CONFIG";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeeConfig {
    #[serde(default)]
    pub schedules: Vec<FeeSchedule>,
}

impl FeeScheduleRepository for FeeConfig {
    fn current_schedule(&self, category: MineralCategory) -> Option<FeeSchedule> {
        self.schedules.iter().find(|s| s.category == category).cloned()
    }
}

impl FeeConfig {
    fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        let mut seen: BTreeMap<MineralCategory, u32> = BTreeMap::new();
        for schedule in &self.schedules {
            validate_schedule(schedule)?;
            if let Some(version) = seen.insert(schedule.category, schedule.version) {
                return Err(format!(
                    "Config lists {} twice (versions {} and {}); keep only the current schedule",
                    schedule.category, version, schedule.version
                )
                .into());
            }
        }
        Ok(())
    }
}

fn parse(path: &Path, contents: &str) -> Result<FeeConfig, Box<dyn std::error::Error>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    let config = match ext.as_deref() {
        Some("toml") => toml::from_str(contents)
            .map_err(|e| format!("Failed to parse '{}': {}", path.display(), e))?,
        Some("yaml") | Some("yml") => serde_yaml::from_str(contents)
            .map_err(|e| format!("Failed to parse '{}': {}", path.display(), e))?,
        _ => {
            return Err(format!(
                "Unsupported config format '{}': use .toml, .yaml or .yml",
                path.display()
            )
            .into())
        }
    };
    Ok(config)
}

/// Load fee schedules from `path`, or from `$ORES_CONFIG` when no path is
/// given.
pub fn load(path: Option<&str>) -> Result<FeeConfig, Box<dyn std::error::Error>> {
    let path = match path {
        Some(p) => p.to_string(),
        None => match std::env::var(CONFIG_ENV) {
            Ok(p) if !p.trim().is_empty() => p,
            _ => {
                tracing::debug!("no fee configuration supplied");
                return Ok(FeeConfig::default());
            }
        },
    };

    let path = Path::new(&path);
    let contents = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;
    let config = parse(path, &contents)?;
    config.validate()?;
    tracing::info!(
        path = %path.display(),
        schedules = config.schedules.len(),
        "loaded fee configuration"
    );
    Ok(config)
}
