//! Core reconciliation functionality
//!
//! This module holds the local mirror of every tracked firewall and the
//! machinery that keeps the provider in step with it:
//!
//! - [`firewall`]: Rule sets, categories and mutation outcomes
//! - [`document`]: Conversion between rule sets and the provider's rule documents
//! - [`store`]: Concurrent map of tracked firewalls
//! - [`mutator`]: Add/remove operations with idempotent outcomes
//! - [`credentials`]: Rotating pool of provider tokens
//! - [`gateway`]: Provider REST client behind the [`gateway::FirewallProvider`] trait
//! - [`worker`]: Per-firewall push loop
//! - [`sync`]: Tracking, untracking and worker lifecycle
//! - [`error`]: Error types for provider and configuration failures

pub mod credentials;
pub mod document;
pub mod error;
pub mod firewall;
pub mod gateway;
pub mod mutator;
pub mod store;
pub mod sync;
pub mod worker;

#[cfg(test)]
pub mod test_helpers;
