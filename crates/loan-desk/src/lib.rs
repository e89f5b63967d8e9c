//! Loan application lifecycle engine.
//!
//! The [`lending`] module owns the application state machine, officer balancing, EMI schedules,
//! payments and the background sweeps. [`config`], [`telemetry`] and [`error`] carry the process
//! plumbing shared with the `loan-desk-api` service.

pub mod config;
pub mod error;
pub mod lending;
pub mod telemetry;
