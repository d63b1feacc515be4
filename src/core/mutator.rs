//! Add/remove semantics per rule category
//!
//! Every mutation runs inside one [`RuleStore::update`] call, so the
//! membership test, the set change, the dirty flag and the timestamp commit
//! together.

use crate::core::firewall::{Category, FirewallId, Outcome, TrackedFirewall};
use crate::core::store::RuleStore;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Add,
    Remove,
}

impl Op {
    /// Applies the operation to one set. Returns whether the set changed.
    fn apply<T: Ord>(self, set: &mut BTreeSet<T>, value: T) -> bool {
        match self {
            Op::Add => set.insert(value),
            Op::Remove => set.remove(&value),
        }
    }

    /// Outcome reported when nothing changed
    const fn unchanged(self) -> Outcome {
        match self {
            Op::Add => Outcome::AlreadyPresent,
            Op::Remove => Outcome::NotPresent,
        }
    }

    const fn as_str(self) -> &'static str {
        match self {
            Op::Add => "add",
            Op::Remove => "remove",
        }
    }
}

/// Mutates desired rules in a [`RuleStore`]
///
/// The port passed for `temp` is expected to be validated by the caller.
#[derive(Debug, Clone)]
pub struct RuleMutator {
    store: Arc<RuleStore>,
}

impl RuleMutator {
    pub fn new(store: Arc<RuleStore>) -> Self {
        Self { store }
    }

    /// Adds an entry. A second identical call answers
    /// [`Outcome::AlreadyPresent`].
    pub fn add_rule(
        &self,
        id: FirewallId,
        category: &str,
        address: Option<&str>,
        port: Option<u16>,
    ) -> Outcome {
        self.mutate(Op::Add, id, category, address, port)
    }

    /// Removes an entry. Removing an absent entry answers
    /// [`Outcome::NotPresent`].
    pub fn remove_rule(
        &self,
        id: FirewallId,
        category: &str,
        address: Option<&str>,
        port: Option<u16>,
    ) -> Outcome {
        self.mutate(Op::Remove, id, category, address, port)
    }

    fn mutate(
        &self,
        op: Op,
        id: FirewallId,
        category: &str,
        address: Option<&str>,
        port: Option<u16>,
    ) -> Outcome {
        let Ok(category) = category.parse::<Category>() else {
            debug!(firewall = id, category, "Unknown rule category");
            return Outcome::UnknownCategory;
        };

        let outcome = self
            .store
            .update(id, |entry| apply(entry, op, category, address, port))
            .unwrap_or(Outcome::FirewallNotFound);

        match outcome {
            Outcome::Success => info!(
                firewall = id,
                op = op.as_str(),
                category = category.as_str(),
                address,
                port,
                "Rule changed"
            ),
            other => debug!(
                firewall = id,
                op = op.as_str(),
                category = category.as_str(),
                outcome = other.as_ref(),
                "Rule unchanged"
            ),
        }
        outcome
    }
}

fn apply(
    entry: &mut TrackedFirewall,
    op: Op,
    category: Category,
    address: Option<&str>,
    port: Option<u16>,
) -> Outcome {
    let changed = match category {
        Category::Tcp => {
            let Some(address) = address else {
                return Outcome::MissingParameter;
            };
            op.apply(&mut entry.rules.tcp_addresses, address.to_string())
        }
        Category::Udp => {
            let Some(address) = address else {
                return Outcome::MissingParameter;
            };
            op.apply(&mut entry.rules.udp_addresses, address.to_string())
        }
        Category::Both => {
            let Some(address) = address else {
                return Outcome::MissingParameter;
            };
            // Each side on its own; no short-circuit
            let tcp = op.apply(&mut entry.rules.tcp_addresses, address.to_string());
            let udp = op.apply(&mut entry.rules.udp_addresses, address.to_string());
            tcp || udp
        }
        Category::Temp => {
            let Some(port) = port else {
                return Outcome::MissingParameter;
            };
            op.apply(&mut entry.rules.temp_ports, port)
        }
    };

    if changed {
        entry.dirty = true;
        entry.touch();
        Outcome::Success
    } else {
        op.unchanged()
    }
}
