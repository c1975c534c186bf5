//! Composite key encodings.
//!
//! Namespaces never contain NUL (enforced by `Namespace::new`), so
//! `0x00` separates variable-length components. Timestamps are
//! big-endian so range scans iterate in chronological order.

use aifs_types::id::{AssetId, Namespace};

/// Encodes a u64 big-endian, suitable for ordered key scans.
#[inline]
pub fn be64(x: u64) -> [u8; 8] {
    x.to_be_bytes()
}

/// `ns || 0x00 || name`: branch and tag pointer keys.
pub fn k_named(ns: &Namespace, name: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(ns.as_str().len() + 1 + name.len());
    key.extend_from_slice(ns.as_ref());
    key.push(0);
    key.extend_from_slice(name.as_bytes());
    key
}

/// `ns || 0x00 || name || 0x00 || seq_be`: branch history rows.
pub fn k_history(ns: &Namespace, name: &str, seq: u64) -> Vec<u8> {
    let mut key = k_named(ns, name);
    key.push(0);
    key.extend_from_slice(&be64(seq));
    key
}

/// Prefix covering every history row of one branch.
pub fn k_history_prefix(ns: &Namespace, name: &str) -> Vec<u8> {
    let mut key = k_named(ns, name);
    key.push(0);
    key
}

/// `ns || 0x00 || created_at_be || asset_id`: namespace/time index.
pub fn k_ns_index(ns: &Namespace, created_at: u64, id: &AssetId) -> Vec<u8> {
    let mut key = Vec::with_capacity(ns.as_str().len() + 1 + 8 + 32);
    key.extend_from_slice(ns.as_ref());
    key.push(0);
    key.extend_from_slice(&be64(created_at));
    key.extend_from_slice(&id.0);
    key
}

/// Prefix covering a namespace's whole index range.
pub fn k_ns_prefix(ns: &Namespace) -> Vec<u8> {
    let mut key = Vec::with_capacity(ns.as_str().len() + 1);
    key.extend_from_slice(ns.as_ref());
    key.push(0);
    key
}

/// `kind_byte || created_at_be || asset_id`: kind/time index.
pub fn k_kind_index(kind: u8, created_at: u64, id: &AssetId) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + 8 + 32);
    key.push(kind);
    key.extend_from_slice(&be64(created_at));
    key.extend_from_slice(&id.0);
    key
}

/// `a || b`: lineage edge keys in either orientation.
pub fn k_edge(a: &AssetId, b: &AssetId) -> Vec<u8> {
    let mut key = Vec::with_capacity(64);
    key.extend_from_slice(&a.0);
    key.extend_from_slice(&b.0);
    key
}

/// The exclusive upper bound for a prefix range scan, if one exists.
pub fn prefix_end(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.last_mut() {
        if *last < u8::MAX {
            *last += 1;
            return Some(end);
        }
        end.pop();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_end_increments_last_byte() {
        assert_eq!(prefix_end(b"ns\x00"), Some(b"ns\x01".to_vec()));
        assert_eq!(prefix_end(&[0xff, 0xff]), None);
        assert_eq!(prefix_end(&[0x01, 0xff]), Some(vec![0x02]));
    }

    #[test]
    fn history_keys_sort_by_sequence() {
        let ns = Namespace::new("prod").unwrap();
        let a = k_history(&ns, "main", 1);
        let b = k_history(&ns, "main", 2);
        assert!(a < b);
        assert!(a.starts_with(&k_history_prefix(&ns, "main")));
    }

    #[test]
    fn ns_index_sorts_by_time_within_namespace() {
        let ns = Namespace::new("prod").unwrap();
        let early = k_ns_index(&ns, 100, &AssetId([0xff; 32]));
        let late = k_ns_index(&ns, 200, &AssetId([0x00; 32]));
        assert!(early < late);
    }
}
