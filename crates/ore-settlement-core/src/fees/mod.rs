pub mod resolver;

pub use resolver::{resolve, validate_schedule, EffectiveFees, FeeSchedule, FeeSource};
