pub mod payments;
pub mod settle;
