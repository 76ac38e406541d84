//! # hostflow
//!
//! Run declarative configuration-management workflows across a host inventory.
//!
//! ## Usage
//!
//! ```bash
//! hostflow run site.yml --inventory hosts.yml [-v]
//! ```
//!
//! ## Modules
//!
//! - `app` - Application configuration and logging setup
//! - `config` - YAML workflow and inventory documents
//! - `expression` - Values, expressions and templates evaluated against host scopes
//! - `inventory` - Hosts, groups and per-run host state
//! - `module` - The module contract, input specifications and built-in modules
//! - `transport` - Command execution on hosts, privilege escalation and cancellation
//! - `workflow` - Processes, steps and the per-host executor
pub mod app;
pub mod config;
pub mod error;
pub mod expression;
pub mod inventory;
pub mod module;
pub mod transport;
pub mod workflow;

pub use error::{Error, Result};
