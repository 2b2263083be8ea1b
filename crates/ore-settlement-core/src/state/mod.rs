//! Serializable in-memory ledger and the reducer that moves it between
//! states.
//!
//! Every change goes through [`reduce`], which works on a copy and returns
//! the next state only if the whole action succeeds. A failed action leaves
//! the previous state untouched, which is what makes payment commits atomic.

pub mod ledger;
pub mod reducer;

pub use ledger::LedgerState;
pub use reducer::{reduce, LedgerAction};
