//! Desired-state data structures for tracked firewalls
//!
//! A tracked firewall is described by a [`FirewallRuleSet`]: the addresses
//! allowed over TCP, the addresses allowed over UDP, and the temporary ports
//! opened to everyone. The store wraps each rule set in a [`TrackedFirewall`]
//! that also carries the dirty flag and the last-change timestamp.
//!
//! # Addresses
//!
//! Entries are IPv4 hosts (`203.0.113.5`) or IPv4 networks (`10.0.0.0/8`).
//! Hosts are stored without a prefix; the provider codec appends `/32` when
//! encoding and strips it when decoding.
//!
//! # Example
//!
//! ```
//! use fwsync::core::firewall::{Category, FirewallRuleSet};
//!
//! let mut rules = FirewallRuleSet::new();
//! rules.tcp_addresses.insert("203.0.113.5".to_string());
//! rules.temp_ports.insert(8080);
//!
//! assert_eq!("both".parse::<Category>().unwrap(), Category::Both);
//! assert!(!rules.is_empty());
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Provider identifier of one managed firewall
pub type FirewallId = u64;

/// Identifies one tracking lifetime of a firewall id.
///
/// Assigned when an id is first tracked and kept across refreshes. A new
/// value is handed out if the id is untracked and tracked again, which lets
/// a stale worker notice that it no longer owns the id.
pub type Generation = u64;

/// Rule class targeted by a mutation
///
/// `Both` is a compound operation over the TCP and UDP address sets, it is
/// never stored. `Temp` rules are keyed by port instead of address.
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    #[strum(serialize = "tcp")]
    Tcp,
    #[strum(serialize = "udp")]
    Udp,
    /// TCP and UDP at once, best effort on each side
    #[strum(serialize = "both")]
    Both,
    /// Port opened to 0.0.0.0/0 until removed
    #[strum(serialize = "temp")]
    Temp,
}

impl Category {
    pub const fn as_str(self) -> &'static str {
        match self {
            Category::Tcp => "tcp",
            Category::Udp => "udp",
            Category::Both => "both",
            Category::Temp => "temp",
        }
    }

    /// Whether the category is keyed by port rather than address
    pub const fn is_port_keyed(self) -> bool {
        matches!(self, Category::Temp)
    }
}

/// Result of a rule mutation
///
/// These are ordinary domain answers, not failures. The control surface
/// maps each of them to a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr)]
pub enum Outcome {
    /// State changed and the firewall is now dirty
    #[strum(serialize = "success")]
    Success,
    #[strum(serialize = "present_in_fw")]
    AlreadyPresent,
    #[strum(serialize = "not_present_in_fw")]
    NotPresent,
    #[strum(serialize = "unknown_category")]
    UnknownCategory,
    #[strum(serialize = "fw_not_found")]
    FirewallNotFound,
    /// The address (or port, for `temp`) the category needs was not given.
    /// The control surface validates this before calling in, so it only
    /// shows up for library callers.
    #[strum(serialize = "missing_parameter")]
    MissingParameter,
}

impl Outcome {
    pub const fn is_success(self) -> bool {
        matches!(self, Outcome::Success)
    }
}

/// Desired inbound rules of one firewall
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FirewallRuleSet {
    /// Addresses admitted on the system TCP port range
    #[serde(default)]
    pub tcp_addresses: BTreeSet<String>,
    /// Addresses admitted on the system UDP port range
    #[serde(default)]
    pub udp_addresses: BTreeSet<String>,
    /// Ports temporarily opened to everyone over TCP
    #[serde(default)]
    pub temp_ports: BTreeSet<u16>,
}

impl FirewallRuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.tcp_addresses.is_empty() && self.udp_addresses.is_empty() && self.temp_ports.is_empty()
    }

    /// Total number of entries across the three sets
    pub fn len(&self) -> usize {
        self.tcp_addresses.len() + self.udp_addresses.len() + self.temp_ports.len()
    }
}

/// Store entry for one tracked firewall
///
/// Always handed out as a whole (cloned under the store lock), so readers
/// never see the rule sets and the dirty flag from different moments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedFirewall {
    pub rules: FirewallRuleSet,
    /// Local state changed since the last push attempt
    pub dirty: bool,
    pub last_changed_at: DateTime<Utc>,
    pub generation: Generation,
}

impl TrackedFirewall {
    pub fn new(rules: FirewallRuleSet, generation: Generation) -> Self {
        Self {
            rules,
            dirty: false,
            last_changed_at: Utc::now(),
            generation,
        }
    }

    /// Refreshes `last_changed_at` without ever moving it backwards
    pub fn touch(&mut self) {
        let now = Utc::now();
        if now > self.last_changed_at {
            self.last_changed_at = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_category_parse_roundtrip() {
        for category in Category::iter() {
            let parsed: Category = category.as_str().parse().unwrap();
            assert_eq!(parsed, category);
            assert_eq!(category.to_string(), category.as_str());
        }
    }

    #[test]
    fn test_category_rejects_unknown() {
        assert!("icmp".parse::<Category>().is_err());
        assert!("TCP".parse::<Category>().is_err());
        assert!("".parse::<Category>().is_err());
    }

    #[test]
    fn test_only_temp_is_port_keyed() {
        assert!(Category::Temp.is_port_keyed());
        assert!(!Category::Tcp.is_port_keyed());
        assert!(!Category::Both.is_port_keyed());
    }

    #[test]
    fn test_outcome_wire_names() {
        assert_eq!(Outcome::Success.as_ref(), "success");
        assert_eq!(Outcome::AlreadyPresent.as_ref(), "present_in_fw");
        assert_eq!(Outcome::NotPresent.as_ref(), "not_present_in_fw");
    }

    #[test]
    fn test_touch_is_monotonic() {
        let mut entry = TrackedFirewall::new(FirewallRuleSet::new(), 1);
        let future = Utc::now() + chrono::Duration::hours(1);
        entry.last_changed_at = future;
        entry.touch();
        assert_eq!(entry.last_changed_at, future);
    }

    #[test]
    fn test_rule_set_len_counts_all_sets() {
        let mut rules = FirewallRuleSet::new();
        assert!(rules.is_empty());
        rules.tcp_addresses.insert("198.51.100.1".into());
        rules.udp_addresses.insert("198.51.100.1".into());
        rules.temp_ports.insert(25565);
        assert_eq!(rules.len(), 3);
    }
}
