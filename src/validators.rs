//! Input validation for the control surface
//!
//! Everything a control request carries is checked here before it reaches
//! the rule mutator. The mutator itself assumes well-formed input.

use crate::core::document::{PLACEHOLDER_ADDRESS, to_wire_address};
use crate::core::firewall::{Category, FirewallId};
use ipnetwork::Ipv4Network;

/// Longest client-supplied value echoed into logs
const LOG_VALUE_LIMIT: usize = 64;

/// Validated parameters of a rule mutation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleParams {
    pub category: Category,
    pub address: Option<String>,
    pub port: Option<u16>,
}

/// Sanitizes a client-supplied value for safe inclusion in log lines.
///
/// Keeps printable ASCII only and truncates to 64 characters.
///
/// # Examples
///
/// ```
/// use fwsync::validators::sanitize_for_log;
///
/// assert_eq!(sanitize_for_log("tcp"), "tcp");
/// assert!(!sanitize_for_log("tcp\r\nINJECTED").contains('\n'));
/// ```
pub fn sanitize_for_log(input: &str) -> String {
    input
        .chars()
        // SECURITY: ASCII-only so forged log lines cannot be smuggled in
        .filter(|c| c.is_ascii_graphic() || *c == ' ')
        .take(LOG_VALUE_LIMIT)
        .collect()
}

/// Parses the firewall id path segment.
///
/// # Errors
///
/// Returns `Err` if the segment is not a non-negative integer.
pub fn parse_firewall_id(input: &str) -> Result<FirewallId, String> {
    input
        .trim()
        .parse::<FirewallId>()
        .map_err(|_| format!("Invalid firewall id '{}'", sanitize_for_log(input)))
}

/// Parses a rule category (`tcp`, `udp`, `both`, `temp`).
///
/// # Errors
///
/// Returns `Err` for any other value.
pub fn parse_category(input: &str) -> Result<Category, String> {
    input
        .parse::<Category>()
        .map_err(|_| format!("Unknown category '{}'", sanitize_for_log(input)))
}

/// Validates a port number given as text.
///
/// Accepts the full range 0 to 65535.
///
/// # Errors
///
/// Returns `Err` if the value is not an integer in range.
pub fn validate_port(input: &str) -> Result<u16, String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err("Port is empty".to_string());
    }

    match trimmed.parse::<i64>() {
        Ok(port) => u16::try_from(port).map_err(|_| "Port must be between 0 and 65535".to_string()),
        Err(_) => Err(format!("Port '{}' is not a number", sanitize_for_log(input))),
    }
}

/// Normalizes an IPv4 address or network to its stored form.
///
/// Hosts (`/32` or no prefix) are stored bare. Networks are stored as
/// their base address and prefix, so `10.0.0.5/8` becomes `10.0.0.0/8`.
/// The empty-list placeholder is refused.
///
/// # Examples
///
/// ```
/// use fwsync::validators::normalize_address;
///
/// assert_eq!(normalize_address("203.0.113.5").unwrap(), "203.0.113.5");
/// assert_eq!(normalize_address("203.0.113.5/32").unwrap(), "203.0.113.5");
/// assert_eq!(normalize_address("10.0.0.5/8").unwrap(), "10.0.0.0/8");
/// ```
///
/// # Errors
///
/// Returns `Err` if the input is not an IPv4 address or network, or is
/// the placeholder host.
pub fn normalize_address(input: &str) -> Result<String, String> {
    let network = input
        .trim()
        .parse::<Ipv4Network>()
        .map_err(|_| format!("Invalid IPv4 address '{}'", sanitize_for_log(input)))?;

    let stored = if network.prefix() == 32 {
        network.ip().to_string()
    } else {
        format!("{}/{}", network.network(), network.prefix())
    };

    // Placeholder entries are dropped on decode
    if to_wire_address(&stored) == PLACEHOLDER_ADDRESS {
        return Err(format!("Address '{stored}' is reserved"));
    }
    Ok(stored)
}

/// Validates the parameters of a rule mutation.
///
/// `temp` needs a port and ignores `ip`; every other category needs an
/// address and ignores `port`.
///
/// # Errors
///
/// Returns `Err` if the category is unknown, a required parameter is
/// missing, or a parameter does not parse.
pub fn validate_rule_params(
    category: &str,
    ip: Option<&str>,
    port: Option<&str>,
) -> Result<RuleParams, String> {
    let category = parse_category(category)?;

    if category.is_port_keyed() {
        let port = port.ok_or_else(|| "Parameter 'port' is required for temp rules".to_string())?;
        Ok(RuleParams {
            category,
            address: None,
            port: Some(validate_port(port)?),
        })
    } else {
        let ip = ip.ok_or_else(|| format!("Parameter 'ip' is required for {category} rules"))?;
        Ok(RuleParams {
            category,
            address: Some(normalize_address(ip)?),
            port: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_boundaries() {
        assert_eq!(validate_port("0").unwrap(), 0);
        assert_eq!(validate_port("65535").unwrap(), 65535);
        assert!(validate_port("-1").is_err());
        assert!(validate_port("65536").is_err());
    }

    #[test]
    fn test_port_rejects_garbage() {
        assert!(validate_port("").is_err());
        assert!(validate_port("80a").is_err());
        assert!(validate_port("80-90").is_err());
        assert!(validate_port("99999999999999999999999").is_err());
    }

    #[test]
    fn test_port_trims_whitespace() {
        assert_eq!(validate_port(" 8080 ").unwrap(), 8080);
    }

    #[test]
    fn test_parse_category() {
        assert_eq!(parse_category("tcp").unwrap(), Category::Tcp);
        assert_eq!(parse_category("both").unwrap(), Category::Both);
        assert!(parse_category("icmp").is_err());
        assert!(parse_category("").is_err());
    }

    #[test]
    fn test_parse_firewall_id() {
        assert_eq!(parse_firewall_id("42").unwrap(), 42);
        assert!(parse_firewall_id("abc").is_err());
        assert!(parse_firewall_id("-1").is_err());
    }

    #[test]
    fn test_normalize_address() {
        assert_eq!(normalize_address(" 192.0.2.1 ").unwrap(), "192.0.2.1");
        assert_eq!(normalize_address("192.0.2.0/24").unwrap(), "192.0.2.0/24");
        assert!(normalize_address("192.0.2.256").is_err());
        assert!(normalize_address("2001:db8::1").is_err());
        assert!(normalize_address("example.com").is_err());
        assert!(normalize_address("192.0.2.0/33").is_err());
    }

    #[test]
    fn test_normalize_address_clears_host_bits() {
        assert_eq!(normalize_address("10.0.0.5/8").unwrap(), "10.0.0.0/8");
        assert_eq!(
            normalize_address("10.0.0.5/8").unwrap(),
            normalize_address("10.0.0.0/8").unwrap()
        );
        assert_eq!(normalize_address("192.0.2.77/24").unwrap(), "192.0.2.0/24");
    }

    #[test]
    fn test_normalize_address_rejects_placeholder() {
        assert!(normalize_address("0.0.0.0").is_err());
        assert!(normalize_address("0.0.0.0/32").is_err());
        assert_eq!(normalize_address("0.0.0.0/0").unwrap(), "0.0.0.0/0");
        assert_eq!(normalize_address("1.1.1.1").unwrap(), "1.1.1.1");
    }

    #[test]
    fn test_rule_params_temp_needs_port() {
        let params = validate_rule_params("temp", None, Some("8080")).unwrap();
        assert_eq!(params.category, Category::Temp);
        assert_eq!(params.port, Some(8080));
        assert_eq!(params.address, None);

        assert!(validate_rule_params("temp", Some("192.0.2.1"), None).is_err());
        assert!(validate_rule_params("temp", None, Some("65536")).is_err());
    }

    #[test]
    fn test_rule_params_address_categories_need_ip() {
        for category in ["tcp", "udp", "both"] {
            let params = validate_rule_params(category, Some("203.0.113.5/32"), None).unwrap();
            assert_eq!(params.address.as_deref(), Some("203.0.113.5"));
            assert!(validate_rule_params(category, None, Some("80")).is_err());
        }
    }

    #[test]
    fn test_rule_params_unknown_category() {
        assert!(validate_rule_params("icmp", Some("192.0.2.1"), Some("80")).is_err());
    }

    #[test]
    fn test_sanitize_for_log() {
        assert_eq!(sanitize_for_log("tcp\n\r\t"), "tcp");
        assert_eq!(sanitize_for_log(&"a".repeat(100)).len(), 64);
        assert_eq!(sanitize_for_log("tëst"), "tst");
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;
        use std::net::Ipv4Addr;

        proptest! {
            #[test]
            fn every_u16_is_a_valid_port(port: u16) {
                prop_assert_eq!(validate_port(&port.to_string()).unwrap(), port);
            }

            #[test]
            fn out_of_range_ports_are_rejected(port in 65536i64..10_000_000) {
                prop_assert!(validate_port(&port.to_string()).is_err());
            }

            #[test]
            fn negative_ports_are_rejected(port in i64::MIN..0) {
                prop_assert!(validate_port(&port.to_string()).is_err());
            }

            #[test]
            fn host_and_host32_normalize_alike(octets in any::<[u8; 4]>().prop_filter("placeholder", |o| *o != [0; 4])) {
                let ip = Ipv4Addr::from(octets).to_string();
                let bare = normalize_address(&ip).unwrap();
                let prefixed = normalize_address(&format!("{ip}/32")).unwrap();
                prop_assert_eq!(&bare, &ip);
                prop_assert_eq!(bare, prefixed);
            }

            #[test]
            fn sanitized_values_have_no_control_chars(input in ".*") {
                let sanitized = sanitize_for_log(&input);
                prop_assert!(sanitized.chars().all(|c| !c.is_control()));
                prop_assert!(sanitized.len() <= LOG_VALUE_LIMIT);
            }
        }
    }
}
