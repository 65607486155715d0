//! Legacy block addressing
//!
//! Before stable ids existed, annotations pointed at blocks through an
//! address derived from where the block sat and what it contained. The
//! derivation is versioned so stored references can be matched against
//! the exact function that produced them.

use serde_json::{Map, Value};

use crate::block::{BlockInstance, STABLE_ID_ATTR};
use crate::store::{compute_checksum_parts, LegacyAddress};

/// A versioned legacy address function.
pub trait LegacyAddressing: Send + Sync {
    fn version(&self) -> u32;

    /// Address of `block` as parsed from pre-migration content.
    fn address(&self, block: &BlockInstance) -> LegacyAddress;
}

/// Version 1: `p{position}-hash{crc32}`.
///
/// `position` is the pre-order index of the block among all blocks of
/// the document. The hash is the lowercase, unpadded hex CRC-32 of the
/// qualified block name, a newline, and the attribute map with `stableId`
/// removed, serialized with sorted keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct PositionFingerprintV1;

impl LegacyAddressing for PositionFingerprintV1 {
    fn version(&self) -> u32 {
        1
    }

    fn address(&self, block: &BlockInstance) -> LegacyAddress {
        let fingerprint = compute_checksum_parts(&[
            block.name.as_bytes(),
            b"\n",
            canonical_attributes(&block.attrs).as_bytes(),
        ]);
        LegacyAddress::new(format!("p{}-hash{:x}", block.position, fingerprint))
    }
}

/// Look up the addressing function for a configured version.
pub fn legacy_addressing(version: u32) -> Option<Box<dyn LegacyAddressing>> {
    match version {
        1 => Some(Box::new(PositionFingerprintV1)),
        _ => None,
    }
}

/// Versions `legacy_addressing` knows about.
pub const SUPPORTED_VERSIONS: &[u32] = &[1];

fn canonical_attributes(attrs: &Map<String, Value>) -> String {
    let mut stripped = attrs.clone();
    stripped.remove(STABLE_ID_ATTR);
    canonicalize(&Value::Object(stripped)).to_string()
}

/// Rebuild a value with object keys in sorted order at every depth.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::with_capacity(map.len());
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::parse;

    fn addresses(content: &str) -> Vec<String> {
        let parsed = parse(content).unwrap();
        parsed
            .blocks
            .iter()
            .map(|b| PositionFingerprintV1.address(b).as_str().to_string())
            .collect()
    }

    #[test]
    fn test_address_shape() {
        let addrs = addresses("<!-- wp:paragraph --><p>x</p><!-- /wp:paragraph -->");
        assert_eq!(addrs.len(), 1);
        let addr = &addrs[0];
        assert!(addr.starts_with("p0-hash"));
        let hex = &addr["p0-hash".len()..];
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert!(hex.len() <= 8);
    }

    #[test]
    fn test_key_order_and_stable_id_do_not_matter() {
        let a = addresses(r#"<!-- wp:acme/task {"a":1,"b":2} /-->"#);
        let b = addresses(r#"<!-- wp:acme/task {"b":2,"stableId":"abc123","a":1} /-->"#);
        assert_eq!(a, b);
    }

    #[test]
    fn test_position_counts_nested_blocks_in_preorder() {
        let addrs = addresses(concat!(
            "<!-- wp:group --><!-- wp:paragraph /--><!-- /wp:group -->",
            "<!-- wp:paragraph /-->"
        ));
        assert!(addrs[0].starts_with("p0-"));
        assert!(addrs[1].starts_with("p1-"));
        assert!(addrs[2].starts_with("p2-"));
        // Same name and attributes, different position.
        assert_ne!(addrs[1], addrs[2]);
        assert_eq!(addrs[1][3..], addrs[2][3..]);
    }

    #[test]
    fn test_name_and_attributes_change_the_hash() {
        let base = addresses(r#"<!-- wp:paragraph {"x":1} /-->"#);
        let other_name = addresses(r#"<!-- wp:heading {"x":1} /-->"#);
        let other_attrs = addresses(r#"<!-- wp:paragraph {"x":2} /-->"#);
        assert_ne!(base, other_name);
        assert_ne!(base, other_attrs);
    }

    #[test]
    fn test_version_lookup() {
        assert_eq!(legacy_addressing(1).unwrap().version(), 1);
        assert!(legacy_addressing(2).is_none());
        assert_eq!(SUPPORTED_VERSIONS, &[1]);
    }
}
