//! CIDR merging for provider range lists.
//!
//! The sweep is written once and parametrised by an [`AddressFamily`]
//! strategy. [`V4`] and [`V6`] supply the per-family capabilities, so
//! `merge::<V4>(..)` and `merge::<V6>(..)` run the same algorithm.
//!
//! For example: `["10.0.0.0/25", "10.0.0.128/25"]` -> `["10.0.0.0/24"]`.
//!
//! Only power-of-two aligned siblings are folded into a supernet. Adjacent
//! blocks of different sizes (e.g. a /25 followed by a /26) stay separate.

use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use std::fmt::Display;
use std::net::{Ipv4Addr, Ipv6Addr};
use thiserror::Error;
use tracing::{debug, warn};

/// Internal sweep failure. Never escapes [`merge`].
#[derive(Error, Debug)]
pub enum MergeError {
    #[error("{family} input out of order at {net}")]
    Unordered { family: &'static str, net: String },
}

/// Capability set the merge sweep needs from one address family.
///
/// Addresses are exposed as `u128` so both families share the same
/// numeric comparisons.
pub trait AddressFamily {
    type Net: Copy + PartialEq + Display;

    const NAME: &'static str;

    /// Parse a CIDR (or bare address) and clear its host bits.
    fn parse(s: &str) -> Option<Self::Net>;
    fn start(net: &Self::Net) -> u128;
    fn end(net: &Self::Net) -> u128;
    fn is_subset_of(net: &Self::Net, other: &Self::Net) -> bool;
    fn prefix_len(net: &Self::Net) -> u8;
    /// The network of length `prefix_len` containing `net`.
    fn supernet(net: &Self::Net, prefix_len: u8) -> Option<Self::Net>;
}

/// IPv4 strategy.
pub struct V4;

/// IPv6 strategy.
pub struct V6;

impl AddressFamily for V4 {
    type Net = Ipv4Net;

    const NAME: &'static str = "IPv4";

    fn parse(s: &str) -> Option<Ipv4Net> {
        let trimmed = s.trim();
        if trimmed.contains('/') {
            trimmed.parse::<Ipv4Net>().ok().map(|n| n.trunc())
        } else {
            let addr = trimmed.parse::<Ipv4Addr>().ok()?;
            Ipv4Net::new(addr, 32).ok()
        }
    }

    fn start(net: &Ipv4Net) -> u128 {
        u128::from(u32::from(net.network()))
    }

    fn end(net: &Ipv4Net) -> u128 {
        u128::from(u32::from(net.broadcast()))
    }

    fn is_subset_of(net: &Ipv4Net, other: &Ipv4Net) -> bool {
        other.contains(net)
    }

    fn prefix_len(net: &Ipv4Net) -> u8 {
        net.prefix_len()
    }

    fn supernet(net: &Ipv4Net, prefix_len: u8) -> Option<Ipv4Net> {
        Ipv4Net::new(net.network(), prefix_len).ok().map(|n| n.trunc())
    }
}

impl AddressFamily for V6 {
    type Net = Ipv6Net;

    const NAME: &'static str = "IPv6";

    fn parse(s: &str) -> Option<Ipv6Net> {
        let trimmed = s.trim();
        if trimmed.contains('/') {
            trimmed.parse::<Ipv6Net>().ok().map(|n| n.trunc())
        } else {
            let addr = trimmed.parse::<Ipv6Addr>().ok()?;
            Ipv6Net::new(addr, 128).ok()
        }
    }

    fn start(net: &Ipv6Net) -> u128 {
        u128::from(net.network())
    }

    fn end(net: &Ipv6Net) -> u128 {
        u128::from(net.broadcast())
    }

    fn is_subset_of(net: &Ipv6Net, other: &Ipv6Net) -> bool {
        other.contains(net)
    }

    fn prefix_len(net: &Ipv6Net) -> u8 {
        net.prefix_len()
    }

    fn supernet(net: &Ipv6Net, prefix_len: u8) -> Option<Ipv6Net> {
        Ipv6Net::new(net.network(), prefix_len).ok().map(|n| n.trunc())
    }
}

/// Merge a list of ranges of one family into a canonical range set.
///
/// Entries that fail to parse as `F` are dropped. The result is sorted by
/// numeric start address, has no overlaps, and has no aligned adjacent
/// siblings left to fold. If the sweep trips over its own invariants the
/// sorted, deduplicated input is returned unmerged instead.
pub fn merge<F: AddressFamily, S: AsRef<str>>(ranges: &[S]) -> Vec<String> {
    let mut nets: Vec<F::Net> = ranges.iter().filter_map(|r| F::parse(r.as_ref())).collect();

    let dropped = ranges.len() - nets.len();
    if dropped > 0 {
        debug!("Dropped {} unparseable {} entries", dropped, F::NAME);
    }

    nets.sort_by(|a, b| {
        F::start(a)
            .cmp(&F::start(b))
            .then(F::prefix_len(a).cmp(&F::prefix_len(b)))
    });
    nets.dedup();

    let merged = match sweep::<F>(&nets) {
        Ok(merged) => merged,
        Err(e) => {
            warn!("{} merge failed, keeping unmerged ranges: {}", F::NAME, e);
            nets
        }
    };

    merged.iter().map(ToString::to_string).collect()
}

/// Single pass over start-sorted networks.
fn sweep<F: AddressFamily>(sorted: &[F::Net]) -> Result<Vec<F::Net>, MergeError> {
    let mut merged: Vec<F::Net> = Vec::with_capacity(sorted.len());

    for &candidate in sorted {
        let Some(&last) = merged.last() else {
            merged.push(candidate);
            continue;
        };

        if F::start(&candidate) < F::start(&last) {
            return Err(MergeError::Unordered {
                family: F::NAME,
                net: candidate.to_string(),
            });
        }

        if F::is_subset_of(&candidate, &last) {
            continue;
        }

        if F::is_subset_of(&last, &candidate) {
            merged.pop();
        }

        push_coalesced::<F>(&mut merged, candidate);
    }

    Ok(merged)
}

/// Push `net`, folding it into the top of the stack while the pair forms an
/// exact supernet. Folding can cascade downwards.
fn push_coalesced<F: AddressFamily>(merged: &mut Vec<F::Net>, mut net: F::Net) {
    while let Some(&last) = merged.last() {
        match coalesce::<F>(&last, &net) {
            Some(supernet) => {
                merged.pop();
                net = supernet;
            }
            None => break,
        }
    }
    merged.push(net);
}

/// The supernet one bit wider than the pair, if it covers exactly `low ∪ high`.
fn coalesce<F: AddressFamily>(low: &F::Net, high: &F::Net) -> Option<F::Net> {
    if F::end(low).checked_add(1)? != F::start(high) {
        return None;
    }

    let prefix_len = F::prefix_len(low).min(F::prefix_len(high)).checked_sub(1)?;
    let supernet = F::supernet(low, prefix_len)?;

    (F::start(&supernet) == F::start(low) && F::end(&supernet) == F::end(high))
        .then_some(supernet)
}

/// Partition raw prefix strings by family (anything with a colon is IPv6).
///
/// Validation happens later in [`merge`].
pub fn split_families<S: AsRef<str>>(raw: &[S]) -> (Vec<String>, Vec<String>) {
    let mut v4 = Vec::new();
    let mut v6 = Vec::new();
    for prefix in raw {
        let prefix = prefix.as_ref().trim();
        if prefix.is_empty() {
            continue;
        }
        if prefix.contains(':') {
            v6.push(prefix.to_string());
        } else {
            v4.push(prefix.to_string());
        }
    }
    (v4, v6)
}

/// Total number of addresses covered by a list of canonical ranges.
///
/// Saturates instead of overflowing on very short IPv6 prefixes.
pub fn count_addresses<S: AsRef<str>>(ranges: &[S]) -> u128 {
    ranges
        .iter()
        .filter_map(|r| r.as_ref().parse::<IpNet>().ok())
        .map(|net| {
            let shift = u32::from(net.max_prefix_len() - net.prefix_len());
            if shift >= 128 {
                u128::MAX
            } else {
                1u128 << shift
            }
        })
        .fold(0u128, |acc, count| acc.saturating_add(count))
}
