// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// CIDR longest-prefix-match index (§3.6, §4.8). A binary trie keyed by the
// address's bits, MSB first. IPv4 and IPv6 get separate trie roots rather
// than one tree over a shared 128-bit representation — a `/0` IPv4 route
// placed at a shared root would otherwise match every IPv6 lookup too,
// since it consumes zero bits before resolving. `NO_VALUE` is represented
// as `Option::None` on a node rather than a sentinel pointer, since there
// is no NULL-vs-absent ambiguity to preserve in safe Rust.

use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::fast_hash::RollingFingerprint;
use crate::pool::Pool;

/// Injected hostname resolver (§6 "Hostname resolver" collaborator).
pub trait Resolver {
    fn resolve(&self, name: &str) -> Vec<IpAddr>;
}

#[derive(Clone, Copy)]
struct PoolSpan {
    ptr: *const u8,
    len: usize,
}

unsafe impl Send for PoolSpan {}
unsafe impl Sync for PoolSpan {}

impl PoolSpan {
    unsafe fn as_bytes(&self) -> &[u8] {
        std::slice::from_raw_parts(self.ptr, self.len)
    }
}

pub struct Record {
    value: PoolSpan,
    hits: AtomicU64,
}

impl Record {
    pub fn value(&self) -> &[u8] {
        unsafe { self.value.as_bytes() }
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }
}

#[derive(Default)]
struct Node {
    children: [Option<Box<Node>>; 2],
    record: Option<Record>,
}

fn bit_at(value: u128, width: u32, i: u32) -> usize {
    ((value >> (width - 1 - i)) & 1) as usize
}

fn parse_cidr(token: &str) -> Option<(IpAddr, u8)> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    match token.split_once('/') {
        Some((addr, plen)) => {
            let addr: IpAddr = addr.parse().ok()?;
            let plen: u8 = plen.parse().ok()?;
            let max = if addr.is_ipv4() { 32 } else { 128 };
            if plen > max {
                return None;
            }
            Some((addr, plen))
        }
        None => {
            let addr: IpAddr = token.parse().ok()?;
            let max = if addr.is_ipv4() { 32 } else { 128 };
            Some((addr, max))
        }
    }
}

fn addr_bits(addr: IpAddr) -> (u128, u32) {
    match addr {
        IpAddr::V4(v4) => (u32::from(v4) as u128, 32),
        IpAddr::V6(v6) => (u128::from(v6), 128),
    }
}

/// CIDR-list index with longest-prefix-match lookup.
pub struct RadixMapIndex {
    pool: Pool,
    root_v4: Node,
    root_v6: Node,
    keys: std::collections::HashSet<String>,
    fingerprint: RollingFingerprint,
}

impl Default for RadixMapIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl RadixMapIndex {
    pub fn new() -> Self {
        Self {
            pool: Pool::with_default_config(),
            root_v4: Node::default(),
            root_v6: Node::default(),
            keys: std::collections::HashSet::new(),
            fingerprint: RollingFingerprint::new(),
        }
    }

    /// Insert a comma-separated list of CIDRs (or bare addresses, treated
    /// as host routes) under `value`. Malformed tokens are logged and
    /// skipped; the rest of the list still gets inserted.
    pub fn insert(&mut self, key: &str, value: &[u8]) {
        self.keys.insert(key.to_string());
        self.fingerprint.update(key.as_bytes());
        for token in key.split(',') {
            match parse_cidr(token) {
                Some((addr, plen)) => self.insert_route(addr, plen, value),
                None => log::warn!("radix map: skipping malformed CIDR token '{token}'"),
            }
        }
    }

    /// Like [`insert`](Self::insert), but any token that doesn't parse as
    /// an address/CIDR is resolved as a hostname through `resolver`, and
    /// every address it resolves to is inserted as a host route.
    pub fn insert_resolve(&mut self, key: &str, value: &[u8], resolver: &dyn Resolver) {
        self.keys.insert(key.to_string());
        self.fingerprint.update(key.as_bytes());
        for token in key.split(',') {
            if let Some((addr, plen)) = parse_cidr(token) {
                self.insert_route(addr, plen, value);
                continue;
            }
            let name = token.trim();
            if name.is_empty() {
                continue;
            }
            for addr in resolver.resolve(name) {
                let plen = if addr.is_ipv4() { 32 } else { 128 };
                self.insert_route(addr, plen, value);
            }
        }
    }

    fn insert_route(&mut self, addr: IpAddr, prefix_len: u8, value: &[u8]) {
        let (bits, width) = addr_bits(addr);
        let root = if addr.is_ipv4() { &mut self.root_v4 } else { &mut self.root_v6 };

        let mut node = root;
        for i in 0..prefix_len as u32 {
            let b = bit_at(bits, width, i);
            node = node.children[b].get_or_insert_with(|| Box::new(Node::default()));
        }

        let value_ptr = self.pool.strdup_bytes(value);
        node.record = Some(Record {
            value: PoolSpan { ptr: value_ptr, len: value.len() },
            hits: AtomicU64::new(0),
        });
    }

    /// Longest-prefix-match lookup for `addr`.
    pub fn find(&self, addr: IpAddr) -> Option<&[u8]> {
        let (bits, width) = addr_bits(addr);
        let root = if addr.is_ipv4() { &self.root_v4 } else { &self.root_v6 };

        let mut node = root;
        let mut best: Option<&Record> = node.record.as_ref();
        for i in 0..width {
            let b = bit_at(bits, width, i);
            match &node.children[b] {
                Some(child) => {
                    node = child;
                    if let Some(rec) = node.record.as_ref() {
                        best = Some(rec);
                    }
                }
                None => break,
            }
        }

        best.map(|rec| {
            rec.hits.fetch_add(1, Ordering::Relaxed);
            rec.value()
        })
    }

    /// Lookup from a raw 4- or 16-byte network-order address.
    pub fn find_bytes(&self, bytes: &[u8]) -> Option<&[u8]> {
        let addr = match bytes.len() {
            4 => IpAddr::from(<[u8; 4]>::try_from(bytes).ok()?),
            16 => IpAddr::from(<[u8; 16]>::try_from(bytes).ok()?),
            _ => return None,
        };
        self.find(addr)
    }

    pub fn contains_key_text(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn fingerprint(&self) -> u64 {
        self.fingerprint.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn exact_host_match() {
        let mut idx = RadixMapIndex::new();
        idx.insert("10.0.0.1", b"host");
        assert_eq!(idx.find(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))), Some(b"host".as_slice()));
        assert_eq!(idx.find(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2))), None);
    }

    #[test]
    fn longest_prefix_wins() {
        let mut idx = RadixMapIndex::new();
        idx.insert("10.0.0.0/8", b"broad");
        idx.insert("10.1.0.0/16", b"narrow");
        assert_eq!(
            idx.find(IpAddr::V4(Ipv4Addr::new(10, 1, 2, 3))),
            Some(b"narrow".as_slice())
        );
        assert_eq!(
            idx.find(IpAddr::V4(Ipv4Addr::new(10, 2, 2, 3))),
            Some(b"broad".as_slice())
        );
    }

    #[test]
    fn comma_separated_list() {
        let mut idx = RadixMapIndex::new();
        idx.insert("10.0.0.0/8,192.168.0.0/16", b"v");
        assert!(idx.find(IpAddr::V4(Ipv4Addr::new(10, 5, 5, 5))).is_some());
        assert!(idx.find(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1))).is_some());
        assert!(idx.find(IpAddr::V4(Ipv4Addr::new(172, 16, 0, 1))).is_none());
    }

    #[test]
    fn malformed_token_is_skipped_not_fatal() {
        let mut idx = RadixMapIndex::new();
        idx.insert("not-an-addr,10.0.0.0/8", b"v");
        assert!(idx.find(IpAddr::V4(Ipv4Addr::new(10, 1, 1, 1))).is_some());
    }

    #[test]
    fn insert_resolve_uses_resolver_for_hostnames() {
        struct FakeResolver;
        impl Resolver for FakeResolver {
            fn resolve(&self, name: &str) -> Vec<IpAddr> {
                assert_eq!(name, "example.com");
                vec![IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34))]
            }
        }
        let mut idx = RadixMapIndex::new();
        idx.insert_resolve("example.com", b"v", &FakeResolver);
        assert_eq!(
            idx.find(IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34))),
            Some(b"v".as_slice())
        );
    }

    #[test]
    fn ipv4_and_ipv6_routes_do_not_cross_match() {
        let mut idx = RadixMapIndex::new();
        idx.insert("0.0.0.0/0", b"v4-any");
        assert!(idx.find("::1".parse().unwrap()).is_none());
    }
}
