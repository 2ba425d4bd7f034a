//! Tracking of chain transactions from submission to confirmation.

pub mod transaction;
