//! # Stability Guard
//!
//! A duplicate-prevention gate for application source trees.
//!
//! Stability Guard keeps a registry of the components, services, hooks and
//! types a codebase already has, a searchable catalog of the same entries,
//! and a mock-data detector. Proposed artifacts are checked against all
//! three before they are written, and every decision can be recorded to an
//! audit sink.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────────┐   ┌──────────────┐
//! │ Source tree │──▶│ Registry + Catalog   │──▶│ Audit sink   │
//! │ (scan)      │   │ Detector + Gateway   │   │ SQLite/HTTP  │
//! └─────────────┘   └──────────┬───────────┘   └──────────────┘
//!                              │
//!                   ┌──────────┴──────────┐
//!                   ▼                     ▼
//!              ┌──────────┐         ┌──────────┐
//!              │   CLI    │         │   HTTP   │
//!              │ (sguard) │         │  tools   │
//!              └──────────┘         └──────────┘
//! ```
//!
//! The domain logic lives in the `stability-guard-core` crate and has no
//! I/O. This crate adds configuration, filesystem scanning, persistence and
//! the tool surface.
//!
//! ## Quick Start
//!
//! ```bash
//! sguard init                         # write ./config/sguard.toml
//! sguard scan ./src                   # exit 1 on duplicates or mock data
//! sguard check --kind component --name UserCard --scan
//! sguard search "user profile" --scan
//! sguard serve --scan                 # HTTP tool server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`guard`] | Shared registry, catalog and gateway state |
//! | [`scan`] | Filesystem scan of a source tree |
//! | [`audit`] | Decision audit sinks |
//! | [`tools`] | Tool trait and the built-in analysis tools |
//! | [`server`] | HTTP tool server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod audit;
pub mod config;
pub mod db;
pub mod guard;
pub mod migrate;
pub mod scan;
pub mod server;
pub mod tools;

pub use stability_guard_core as core;
