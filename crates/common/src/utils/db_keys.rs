use crate::types::Address;

const DISTRIBUTION_PREFIX: &[u8] = b"dist#";

/// Prefix shared by every distribution entry of `address`.
pub fn distribution_prefix(address: &Address) -> Vec<u8> {
    let mut key = Vec::with_capacity(DISTRIBUTION_PREFIX.len() + address.0.len());
    key.extend_from_slice(DISTRIBUTION_PREFIX);
    key.extend_from_slice(&address.0);
    key
}

/// Key of one distribution entry. The timestamp and sequence are big-endian so
/// a prefix scan yields the entries of one address in chronological order.
pub fn distribution_key(address: &Address, timestamp: i64, seq: u32) -> Vec<u8> {
    let mut key = distribution_prefix(address);
    key.extend_from_slice(&timestamp.to_be_bytes());
    key.extend_from_slice(&seq.to_be_bytes());
    key
}
