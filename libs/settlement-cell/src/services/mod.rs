pub mod balance;
pub mod ledger;
pub mod payment;
pub mod settlement;
pub mod withdrawal;
