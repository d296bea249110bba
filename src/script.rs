//! RouterOS address-list script generation.
//!
//! Output depends only on the provider and the cache record: the header
//! carries the record's `last_updated`, not the current time, so an
//! unchanged cache renders byte-identical scripts.

use ipnet::IpNet;
use tracing::warn;

use crate::cache::CacheRecord;
use crate::config::ProviderConfig;
use crate::store::format_timestamp;

/// Validate that an address string is safe for script inclusion.
/// Stored ranges come from the store, which other processes can write.
fn is_safe_address_element(s: &str) -> bool {
    s.chars()
        .all(|c| c.is_ascii_digit() || c == '.' || c == ':' || c == '/' || ('a'..='f').contains(&c))
        && s.parse::<IpNet>().is_ok()
}

/// RouterOS list name for a provider
pub fn address_list_name(provider_id: &str) -> String {
    let name: String = provider_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if name.is_empty() {
        "prefixcache".to_string()
    } else {
        name
    }
}

/// Quote-safe text for a RouterOS `comment="..."` value
fn escape_comment(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars().filter(|c| !c.is_control()) {
        match c {
            '"' | '\\' | '$' => {
                escaped.push('\\');
                escaped.push(c);
            }
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Render the RouterOS script for a provider's cached ranges.
pub fn render(provider: &ProviderConfig, record: &CacheRecord) -> String {
    let list = address_list_name(&provider.id);
    let comment = escape_comment(&provider.label);
    let label = provider.label.replace(['\r', '\n'], " ");

    let mut script = String::new();

    // === Header ===
    script.push_str(&format!("# {} IP address list for RouterOS\n", label));
    script.push_str(&format!("# Source: announced prefixes of AS{}\n", provider.asn));
    let updated = record
        .last_updated
        .map(format_timestamp)
        .unwrap_or_else(|| "never".to_string());
    script.push_str(&format!("# Last updated: {}\n", updated));
    script.push_str(&format!(
        "# Contains {} IPv4 ranges and {} IPv6 ranges\n",
        record.v4_ranges.len(),
        record.v6_ranges.len()
    ));
    script.push_str("#\n");
    script.push_str(&format!("# Import with: /import file-name={}.rsc\n", list));
    script.push_str(&format!(
        "# Existing entries in list \"{}\" are removed before new entries are added\n\n",
        list
    ));

    // === Remove existing entries ===
    script.push_str(&format!(
        "/ip firewall address-list remove [/ip firewall address-list find list={}]\n",
        list
    ));
    script.push_str(&format!(
        "/ipv6 firewall address-list remove [/ipv6 firewall address-list find list={}]\n",
        list
    ));

    // === Entries ===
    script.push_str(&render_family("IPv4", "/ip", &record.v4_ranges, &list, &comment));
    script.push_str(&render_family("IPv6", "/ipv6", &record.v6_ranges, &list, &comment));

    script
}

fn render_family(family: &str, menu: &str, ranges: &[String], list: &str, comment: &str) -> String {
    let mut section = format!("\n# {} Ranges\n", family);

    let mut rendered = 0;
    for range in ranges {
        if !is_safe_address_element(range) {
            warn!("Skipping unsafe {} script element: {:?}", family, range);
            continue;
        }
        section.push_str(&format!(
            "{} firewall address-list add list={} address={} comment=\"{}\"\n",
            menu, list, range, comment
        ));
        rendered += 1;
    }

    if rendered == 0 {
        section.push_str(&format!("# No {} ranges\n", family));
    }

    section
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record() -> CacheRecord {
        CacheRecord {
            v4_ranges: vec!["10.0.0.0/24".to_string(), "10.0.2.0/24".to_string()],
            v6_ranges: vec!["2001:db8::/32".to_string()],
            last_updated: Some(Utc.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).unwrap()),
            ..CacheRecord::default()
        }
    }

    #[test]
    fn test_render_rules_in_order() {
        let script = render(&ProviderConfig::default(), &record());
        let rules: Vec<&str> = script.lines().filter(|l| l.contains(" add ")).collect();
        assert_eq!(
            rules,
            vec![
                "/ip firewall address-list add list=putio address=10.0.0.0/24 comment=\"put.io\"",
                "/ip firewall address-list add list=putio address=10.0.2.0/24 comment=\"put.io\"",
                "/ipv6 firewall address-list add list=putio address=2001:db8::/32 comment=\"put.io\"",
            ]
        );
    }

    #[test]
    fn test_render_header() {
        let script = render(&ProviderConfig::default(), &record());
        assert!(script.starts_with("# put.io IP address list for RouterOS\n"));
        assert!(script.contains("# Source: announced prefixes of AS9009\n"));
        assert!(script.contains("# Last updated: 2026-10-18T09:00:00.000Z\n"));
        assert!(script.contains("# Contains 2 IPv4 ranges and 1 IPv6 ranges\n"));
        assert!(script.contains(
            "/ip firewall address-list remove [/ip firewall address-list find list=putio]\n"
        ));
    }

    #[test]
    fn test_render_is_deterministic() {
        let provider = ProviderConfig::default();
        assert_eq!(render(&provider, &record()), render(&provider, &record()));
    }

    #[test]
    fn test_render_empty_record() {
        let script = render(&ProviderConfig::default(), &CacheRecord::default());
        assert!(script.contains("# Last updated: never\n"));
        assert!(script.contains("# No IPv4 ranges\n"));
        assert!(script.contains("# No IPv6 ranges\n"));
        assert!(!script.contains(" add "));
    }

    #[test]
    fn test_render_skips_unsafe_elements() {
        let mut record = record();
        record.v4_ranges.push("1.2.3.4/32 comment=x; /system reset".to_string());
        record.v4_ranges.push("999.0.0.0/8".to_string());
        let script = render(&ProviderConfig::default(), &record);
        assert!(!script.contains("/system reset"));
        assert!(!script.contains("999.0.0.0"));
        assert_eq!(script.lines().filter(|l| l.contains(" add ")).count(), 3);
    }

    #[test]
    fn test_comment_escaping() {
        let provider = ProviderConfig {
            label: "evil\" $x\nname".to_string(),
            ..ProviderConfig::default()
        };
        let script = render(&provider, &record());
        assert!(script.contains("comment=\"evil\\\" \\$xname\""));
        assert!(script.starts_with("# evil\" $x name IP address list"));
    }

    #[test]
    fn test_address_list_name() {
        assert_eq!(address_list_name("putio"), "putio");
        assert_eq!(address_list_name("Put IO!"), "putio");
        assert_eq!(address_list_name(""), "prefixcache");
    }

    #[test]
    fn test_is_safe_address_element() {
        assert!(is_safe_address_element("10.0.0.0/24"));
        assert!(is_safe_address_element("2001:db8::/32"));
        assert!(!is_safe_address_element("2001:DB8::/32"));
        assert!(!is_safe_address_element("10.0.0.0/24;"));
        assert!(!is_safe_address_element("abc"));
    }
}
