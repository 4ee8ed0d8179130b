//! # tessera-core
//! Foundation types and traits for the Tessera ledger.

pub mod account;
pub mod action;
pub mod error;
pub mod genesis;
pub mod ledger;
pub mod message;
pub mod pool;
pub mod traits;
pub mod types;

#[cfg(test)]
pub(crate) mod testutil;
