//! Commission Reconciliation - matches carrier commission statements against
//! the policy transaction ledger and derives payment entries.

pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;
pub mod startup;
