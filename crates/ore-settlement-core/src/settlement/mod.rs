pub mod calculator;
pub mod recompute;

pub use calculator::{
    calculate_settlement, evaluate, missing_inputs, refresh_settlement, resettle_lot, settle,
    SettlementInput, SettlementOutcome, SettlementResult,
};
pub use recompute::LiveSettlement;
