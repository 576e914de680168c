//! Identity Deriver.
//!
//! Pure, deterministic address derivation. A holder of a root address can
//! regenerate every context address from the index alone:
//!
//! ```text
//! root_address    = H(DOMAIN_ROOT, owner_hi, owner_lo)
//! context_address = H(DOMAIN_CONTEXT, root_address, index)
//! ```

use alloy_primitives::{B256, U256};

use super::poseidon::{poseidon3, DOMAIN_CONTEXT, DOMAIN_ROOT};
use crate::domain::identity::OwnerKey;

/// Split a 32-byte value into big-endian `(hi, lo)` 128-bit limbs, each left-padded
/// to a field element. Keeps distinct owners distinct after field reduction.
fn split_hi_lo(value: B256) -> (B256, B256) {
    let bytes = value.as_slice();
    (
        B256::left_padding_from(&bytes[..16]),
        B256::left_padding_from(&bytes[16..]),
    )
}

/// Derive the root identity address for an owner key.
pub fn root_address(owner: &OwnerKey) -> B256 {
    let (hi, lo) = split_hi_lo(owner.0);
    poseidon3(DOMAIN_ROOT, hi, lo)
}

/// Derive the address of the context identity at `index` under `root`.
pub fn context_address(root: B256, index: u64) -> B256 {
    poseidon3(DOMAIN_CONTEXT, root, B256::from(U256::from(index)))
}

/// Regenerate the first `count` context addresses under `root`, index-ordered.
pub fn context_addresses(root: B256, count: u64) -> impl Iterator<Item = B256> {
    (0..count).map(move |index| context_address(root, index))
}
