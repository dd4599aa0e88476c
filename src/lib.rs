//! Debounced cache purge coordination with a release update checker.

pub mod application;
pub mod config;
pub mod infra;
pub mod purge;
pub mod updater;
