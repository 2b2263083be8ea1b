pub mod edit;
pub mod lot;

pub use edit::LotEdit;
pub use lot::*;
