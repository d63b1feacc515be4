//! Shared test utilities for core module tests
//!
//! Provides common test helpers to avoid duplication across test suites.
//! This module is only compiled in test mode.

use crate::core::document::SystemAllowList;
use crate::core::error::{Error, Result};
use crate::core::firewall::{FirewallId, FirewallRuleSet};
use crate::core::gateway::FirewallProvider;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Builds a rule set from literal TCP addresses, UDP addresses and temp ports.
pub fn rules_with(tcp: &[&str], udp: &[&str], temp: &[u16]) -> FirewallRuleSet {
    FirewallRuleSet {
        tcp_addresses: tcp.iter().map(|a| (*a).to_string()).collect(),
        udp_addresses: udp.iter().map(|a| (*a).to_string()).collect(),
        temp_ports: temp.iter().copied().collect(),
    }
}

/// Allow-list used by codec tests
pub fn system_allow_list() -> SystemAllowList {
    SystemAllowList::new(["198.51.100.10", "198.51.100.11"]).unwrap()
}

/// In-memory provider that records pushes and can be told to fail.
#[derive(Debug, Default)]
pub struct MemoryProvider {
    firewalls: Mutex<BTreeMap<FirewallId, FirewallRuleSet>>,
    pushes: Mutex<Vec<(FirewallId, FirewallRuleSet)>>,
    failing: AtomicBool,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a firewall to the provider-side inventory
    pub fn insert(&self, id: FirewallId, rules: FirewallRuleSet) {
        self.firewalls.lock().unwrap().insert(id, rules);
    }

    /// Makes every call fail with a 503 until switched back
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn pushes(&self) -> Vec<(FirewallId, FirewallRuleSet)> {
        self.pushes.lock().unwrap().clone()
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(Error::Provider {
                status: 503,
                body: "unavailable".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl FirewallProvider for MemoryProvider {
    async fn fetch_all(&self) -> Result<Vec<(FirewallId, FirewallRuleSet)>> {
        self.check()?;
        Ok(self
            .firewalls
            .lock()
            .unwrap()
            .iter()
            .map(|(id, rules)| (*id, rules.clone()))
            .collect())
    }

    async fn fetch_one(&self, id: FirewallId) -> Result<FirewallRuleSet> {
        self.check()?;
        self.firewalls
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(Error::Provider {
                status: 404,
                body: "Not found".to_string(),
            })
    }

    async fn push(&self, id: FirewallId, rules: &FirewallRuleSet) -> Result<()> {
        self.check()?;
        self.firewalls.lock().unwrap().insert(id, rules.clone());
        self.pushes.lock().unwrap().push((id, rules.clone()));
        Ok(())
    }
}
