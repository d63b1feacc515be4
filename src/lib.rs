//! fwsync - cloud firewall rule synchronizer
//!
//! Keeps a local desired-state mirror of every managed cloud firewall and
//! pushes it to the provider whenever it changes.
//!
//! # Architecture
//!
//! - [`core`] - Rule store, mutation semantics, provider gateway and reconciliation workers
//! - [`server`] - HTTP control surface
//! - [`validators`] - Input validation for control requests
//! - [`config`] - Startup configuration files
//! - [`audit`] - JSON-lines audit trail of provider-facing operations
//!
//! # Reconciliation
//!
//! - One worker task per tracked firewall, polling its dirty flag
//! - The dirty flag is cleared before the snapshot is taken, so no change is lost
//! - Failed pushes re-raise the flag and are retried on the next tick
//! - Untracking a firewall is the only way a worker stops

// Allow pedantic clippy warnings that are not worth fixing for this codebase
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod audit;
pub mod config;
pub mod core;
pub mod server;
pub mod validators;

// Re-export commonly used types
pub use crate::core::error::{Error, Result};
pub use crate::core::firewall::{Category, FirewallId, FirewallRuleSet, Outcome};
pub use crate::core::mutator::RuleMutator;
pub use crate::core::store::RuleStore;
pub use crate::core::sync::SyncOrchestrator;
