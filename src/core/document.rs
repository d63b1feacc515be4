//! Translation between [`FirewallRuleSet`] and the provider's rule document
//!
//! The pushed document always has this shape:
//!
//! 1. `TCP` rule on [`MAIN_PORT_RANGE`] for the TCP address set
//! 2. `UDP` rule on [`MAIN_PORT_RANGE`] for the UDP address set
//! 3. `SYSTEM` TCP rule on [`SYSTEM_PORT_RANGE`] for the operator allow-list
//! 4. one `TEMP` TCP rule per temporary port, open to `0.0.0.0/0`
//!
//! Inbound policy is `DROP`, outbound policy is `ACCEPT`. The provider
//! refuses empty address lists, so an empty TCP or UDP set is encoded as
//! [`PLACEHOLDER_ADDRESS`].

use crate::core::error::{Error, Result};
use crate::core::firewall::{FirewallId, FirewallRuleSet};
use ipnetwork::Ipv4Network;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, warn};

/// Port range covered by the main TCP and UDP rules
pub const MAIN_PORT_RANGE: &str = "0-2000";

/// Port range covered by the SYSTEM rule
pub const SYSTEM_PORT_RANGE: &str = "1-65535";

/// Stand-in for an empty address list. The unspecified address never
/// appears as a packet source, so the rule admits nothing.
pub const PLACEHOLDER_ADDRESS: &str = "0.0.0.0/32";

/// Scope of temporary rules
pub const ANY_ADDRESS: &str = "0.0.0.0/0";

pub const TCP_LABEL: &str = "TCP";
pub const UDP_LABEL: &str = "UDP";
pub const SYSTEM_LABEL: &str = "SYSTEM";
pub const TEMP_LABEL: &str = "TEMP";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Policy {
    Accept,
    Drop,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TransportProtocol {
    #[serde(rename = "TCP")]
    Tcp,
    #[serde(rename = "UDP")]
    Udp,
    /// ICMP, IPENCAP and anything else the provider adds later
    #[serde(other, rename = "OTHER")]
    Other,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Addresses {
    #[serde(default, deserialize_with = "null_as_default")]
    pub ipv4: Vec<String>,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub ipv6: Vec<String>,
}

/// One inbound rule as the provider stores it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InboundRule {
    pub protocol: TransportProtocol,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ports: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub addresses: Addresses,
    pub action: Policy,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl InboundRule {
    fn accept(
        protocol: TransportProtocol,
        ports: &str,
        ipv4: Vec<String>,
        label: &str,
        description: &str,
    ) -> Self {
        Self {
            protocol,
            ports: Some(ports.to_string()),
            addresses: Addresses {
                ipv4,
                ipv6: Vec::new(),
            },
            action: Policy::Accept,
            label: Some(label.to_string()),
            description: Some(description.to_string()),
        }
    }
}

/// Body of the replace-all-rules call, also embedded in fetched firewalls
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RulesDocument {
    #[serde(default = "default_inbound_policy")]
    pub inbound_policy: Policy,
    #[serde(default, deserialize_with = "null_as_default")]
    pub inbound: Vec<InboundRule>,
    #[serde(default = "default_outbound_policy")]
    pub outbound_policy: Policy,
}

fn default_inbound_policy() -> Policy {
    Policy::Drop
}

fn default_outbound_policy() -> Policy {
    Policy::Accept
}

/// A firewall as returned by the provider's read endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderFirewall {
    pub id: FirewallId,
    #[serde(default)]
    pub label: Option<String>,
    pub rules: RulesDocument,
}

/// One page of the firewall listing
#[derive(Debug, Clone, Deserialize)]
pub struct FirewallPage {
    #[serde(default)]
    pub data: Vec<ProviderFirewall>,
    #[serde(default = "first_page")]
    pub page: u32,
    #[serde(default = "first_page")]
    pub pages: u32,
}

fn first_page() -> u32 {
    1
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Operator-controlled addresses admitted on every port by the SYSTEM rule
///
/// Loaded once at startup; never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemAllowList {
    networks: Vec<String>,
}

impl SystemAllowList {
    /// Builds the allow-list, normalizing each entry to CIDR notation.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the list is empty or an entry is not an IPv4
    /// address or network.
    pub fn new<I, S>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let networks = entries
            .into_iter()
            .map(|entry| {
                let entry = entry.as_ref().trim();
                entry
                    .parse::<Ipv4Network>()
                    .map(|network| format!("{}/{}", network.network(), network.prefix()))
                    .map_err(|e| Error::Config(format!("invalid system address '{entry}': {e}")))
            })
            .collect::<Result<Vec<_>>>()?;

        if networks.is_empty() {
            return Err(Error::Config("system address allow-list is empty".to_string()));
        }
        Ok(Self { networks })
    }

    pub fn as_slice(&self) -> &[String] {
        &self.networks
    }
}

/// Wire form of a stored address: hosts get `/32`, networks are kept
pub fn to_wire_address(address: &str) -> String {
    if address.contains('/') {
        address.to_string()
    } else {
        format!("{address}/32")
    }
}

/// Stored form of a wire address: `/32` is stripped
pub fn from_wire_address(address: &str) -> String {
    address.strip_suffix("/32").unwrap_or(address).to_string()
}

fn wire_addresses<'a>(addresses: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut wire: Vec<String> = addresses.map(|a| to_wire_address(a)).collect();
    if wire.is_empty() {
        wire.push(PLACEHOLDER_ADDRESS.to_string());
    }
    wire
}

/// Encodes desired rules into the document pushed to the provider.
pub fn encode(rules: &FirewallRuleSet, system: &SystemAllowList) -> RulesDocument {
    let mut inbound = Vec::with_capacity(3 + rules.temp_ports.len());

    inbound.push(InboundRule::accept(
        TransportProtocol::Tcp,
        MAIN_PORT_RANGE,
        wire_addresses(rules.tcp_addresses.iter()),
        TCP_LABEL,
        "Main TCP",
    ));
    inbound.push(InboundRule::accept(
        TransportProtocol::Udp,
        MAIN_PORT_RANGE,
        wire_addresses(rules.udp_addresses.iter()),
        UDP_LABEL,
        "Main UDP",
    ));
    inbound.push(InboundRule::accept(
        TransportProtocol::Tcp,
        SYSTEM_PORT_RANGE,
        system.as_slice().to_vec(),
        SYSTEM_LABEL,
        "System TCP",
    ));

    // Temp rules are open to the world on purpose; the label marks them as
    // transient so they can be told apart in the provider console.
    for port in &rules.temp_ports {
        inbound.push(InboundRule::accept(
            TransportProtocol::Tcp,
            &port.to_string(),
            vec![ANY_ADDRESS.to_string()],
            TEMP_LABEL,
            "Temp TCP",
        ));
    }

    RulesDocument {
        inbound_policy: Policy::Drop,
        inbound,
        outbound_policy: Policy::Accept,
    }
}

/// Decodes a provider rule document into desired rules.
///
/// Rules are classified by label. Unknown labels (including `SYSTEM`) are
/// ignored, as are placeholder addresses.
pub fn decode(document: &RulesDocument) -> FirewallRuleSet {
    let mut rules = FirewallRuleSet::new();

    for rule in &document.inbound {
        match rule.label.as_deref() {
            Some(TCP_LABEL) => rules
                .tcp_addresses
                .extend(decoded_addresses(&rule.addresses.ipv4)),
            Some(UDP_LABEL) => rules
                .udp_addresses
                .extend(decoded_addresses(&rule.addresses.ipv4)),
            Some(TEMP_LABEL) => match rule.ports.as_deref().map(str::trim).map(str::parse::<u16>) {
                Some(Ok(port)) => {
                    rules.temp_ports.insert(port);
                }
                _ => warn!(ports = ?rule.ports, "Skipping TEMP rule without a single port"),
            },
            other => debug!(label = ?other, "Ignoring inbound rule"),
        }
    }

    rules
}

fn decoded_addresses(addresses: &[String]) -> impl Iterator<Item = String> + '_ {
    addresses
        .iter()
        .filter(|a| a.as_str() != PLACEHOLDER_ADDRESS)
        .map(|a| from_wire_address(a))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_helpers::{rules_with, system_allow_list};
    use serde_json::json;

    #[test]
    fn test_empty_rule_set_document() {
        let doc = encode(&FirewallRuleSet::new(), &system_allow_list());
        let value = serde_json::to_value(&doc).unwrap();

        assert_eq!(value["inbound_policy"], "DROP");
        assert_eq!(value["outbound_policy"], "ACCEPT");

        let inbound = value["inbound"].as_array().unwrap();
        assert_eq!(inbound.len(), 3);
        assert_eq!(inbound[0]["label"], "TCP");
        assert_eq!(inbound[0]["addresses"]["ipv4"], json!([PLACEHOLDER_ADDRESS]));
        assert_eq!(inbound[1]["label"], "UDP");
        assert_eq!(inbound[1]["protocol"], "UDP");
        assert_eq!(inbound[1]["addresses"]["ipv4"], json!([PLACEHOLDER_ADDRESS]));
        assert_eq!(inbound[2]["label"], "SYSTEM");
        assert_eq!(inbound[2]["ports"], SYSTEM_PORT_RANGE);
    }

    #[test]
    fn test_rule_object_shape() {
        let doc = encode(&rules_with(&["203.0.113.5"], &[], &[]), &system_allow_list());
        let value = serde_json::to_value(&doc).unwrap();

        assert_eq!(
            value["inbound"][0],
            json!({
                "protocol": "TCP",
                "ports": "0-2000",
                "addresses": { "ipv4": ["203.0.113.5/32"] },
                "action": "ACCEPT",
                "label": "TCP",
                "description": "Main TCP"
            })
        );
    }

    #[test]
    fn test_temp_rules_follow_system_rule() {
        let doc = encode(&rules_with(&[], &[], &[8080, 25565]), &system_allow_list());
        assert_eq!(doc.inbound.len(), 5);

        let temp = &doc.inbound[3];
        assert_eq!(temp.protocol, TransportProtocol::Tcp);
        assert_eq!(temp.ports.as_deref(), Some("8080"));
        assert_eq!(temp.addresses.ipv4, vec![ANY_ADDRESS.to_string()]);
        assert_eq!(temp.label.as_deref(), Some(TEMP_LABEL));
        assert_eq!(doc.inbound[4].ports.as_deref(), Some("25565"));
    }

    #[test]
    fn test_networks_keep_prefix() {
        assert_eq!(to_wire_address("10.0.0.0/8"), "10.0.0.0/8");
        assert_eq!(to_wire_address("192.0.2.4"), "192.0.2.4/32");
        assert_eq!(from_wire_address("192.0.2.4/32"), "192.0.2.4");
        assert_eq!(from_wire_address("10.0.0.0/8"), "10.0.0.0/8");
    }

    #[test]
    fn test_decode_provider_firewall() {
        let body = json!({
            "id": 42,
            "label": "game-01",
            "status": "enabled",
            "rules": {
                "inbound_policy": "DROP",
                "outbound_policy": "ACCEPT",
                "inbound": [
                    { "protocol": "TCP", "ports": "0-2000", "action": "ACCEPT", "label": "TCP",
                      "addresses": { "ipv4": ["203.0.113.5/32", "10.0.0.0/8"] } },
                    { "protocol": "UDP", "ports": "0-2000", "action": "ACCEPT", "label": "UDP",
                      "addresses": { "ipv4": ["0.0.0.0/32"] } },
                    { "protocol": "TCP", "ports": "1-65535", "action": "ACCEPT", "label": "SYSTEM",
                      "addresses": { "ipv4": ["198.51.100.10/32"] } },
                    { "protocol": "TCP", "ports": "8080", "action": "ACCEPT", "label": "TEMP",
                      "addresses": { "ipv4": ["0.0.0.0/0"] } },
                    { "protocol": "ICMP", "action": "ACCEPT", "label": null,
                      "addresses": { "ipv4": ["0.0.0.0/0"], "ipv6": null } }
                ],
                "outbound": []
            }
        });

        let firewall: ProviderFirewall = serde_json::from_value(body).unwrap();
        assert_eq!(firewall.id, 42);

        let rules = decode(&firewall.rules);
        assert_eq!(rules, rules_with(&["203.0.113.5", "10.0.0.0/8"], &[], &[8080]));
    }

    #[test]
    fn test_public_host_survives_roundtrip() {
        let rules = rules_with(&["1.1.1.1"], &["1.1.1.1"], &[]);
        let doc = encode(&rules, &system_allow_list());
        assert_eq!(doc.inbound[0].addresses.ipv4, ["1.1.1.1/32"]);
        assert_eq!(decode(&doc), rules);
    }

    #[test]
    fn test_placeholder_is_unspecified_host() {
        let network: Ipv4Network = PLACEHOLDER_ADDRESS.parse().unwrap();
        assert!(network.ip().is_unspecified());
        assert_eq!(network.prefix(), 32);
    }

    #[test]
    fn test_decode_skips_temp_range() {
        let doc = RulesDocument {
            inbound_policy: Policy::Drop,
            inbound: vec![InboundRule::accept(
                TransportProtocol::Tcp,
                "80-90",
                vec![ANY_ADDRESS.to_string()],
                TEMP_LABEL,
                "Temp TCP",
            )],
            outbound_policy: Policy::Accept,
        };
        assert!(decode(&doc).temp_ports.is_empty());
    }

    #[test]
    fn test_decode_tolerates_missing_fields() {
        let doc: RulesDocument = serde_json::from_value(json!({ "inbound": null })).unwrap();
        assert_eq!(doc.inbound_policy, Policy::Drop);
        assert!(decode(&doc).is_empty());
    }

    #[test]
    fn test_system_allow_list_normalizes() {
        let list = SystemAllowList::new(["198.51.100.10", "10.1.0.0/16", "10.2.3.4/16"]).unwrap();
        assert_eq!(list.as_slice(), ["198.51.100.10/32", "10.1.0.0/16", "10.2.0.0/16"]);
    }

    #[test]
    fn test_system_allow_list_rejects_empty_and_garbage() {
        assert!(SystemAllowList::new(Vec::<String>::new()).is_err());
        assert!(SystemAllowList::new(["not-an-ip"]).is_err());
        assert!(SystemAllowList::new(["2001:db8::1"]).is_err());
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use crate::core::test_helpers::system_allow_list;
    use proptest::prelude::*;

    prop_compose! {
        fn arb_host()(a in 1u8..=223, b in any::<u8>(), c in any::<u8>(), d in 1u8..=254) -> String {
            format!("{a}.{b}.{c}.{d}")
        }
    }

    prop_compose! {
        fn arb_rule_set()(
            tcp in prop::collection::btree_set(arb_host(), 0..8),
            udp in prop::collection::btree_set(arb_host(), 0..8),
            temp in prop::collection::btree_set(any::<u16>(), 0..5),
        ) -> FirewallRuleSet {
            FirewallRuleSet { tcp_addresses: tcp, udp_addresses: udp, temp_ports: temp }
        }
    }

    proptest! {
        #[test]
        fn test_encode_decode_roundtrip(rules in arb_rule_set()) {
            let doc = encode(&rules, &system_allow_list());
            let json = serde_json::to_string(&doc).unwrap();
            let parsed: RulesDocument = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(decode(&parsed), rules);
        }

        #[test]
        fn test_encoded_lists_never_empty(rules in arb_rule_set()) {
            let doc = encode(&rules, &system_allow_list());
            prop_assert_eq!(doc.inbound.len(), 3 + rules.temp_ports.len());
            for rule in &doc.inbound {
                prop_assert!(!rule.addresses.ipv4.is_empty());
            }
        }
    }
}
