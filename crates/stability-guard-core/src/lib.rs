//! # Stability Guard Core
//!
//! Pure duplicate-prevention logic for Stability Guard: entity models,
//! similarity scoring, the authoritative registry, the search catalog,
//! mock-data detection, shallow declaration scanning, and the creation
//! gateway that composes them into a single decision.
//!
//! This crate contains no tokio, database, network or filesystem I/O.
//! Callers hand it source text and metadata; it hands back records,
//! reports and decisions.

pub mod catalog;
pub mod detector;
pub mod gateway;
pub mod models;
pub mod registry;
pub mod scanner;
pub mod similarity;
