use alloy_primitives::{B256, U256};
use ark_bn254::Fr;
use ark_ff::{BigInteger, PrimeField};
use light_poseidon::{Poseidon, PoseidonHasher};

/// Domain tag for root identity addresses.
pub const DOMAIN_ROOT: B256 = domain_tag_const(b"prism.root");
/// Domain tag for context identity addresses.
pub const DOMAIN_CONTEXT: B256 = domain_tag_const(b"prism.context");
/// Domain tag for value commitments.
pub const DOMAIN_COMMITMENT: B256 = domain_tag_const(b"prism.commitment");

const fn domain_tag_const(tag: &[u8]) -> B256 {
    let mut padded = [0u8; 32];
    let offset = 32 - tag.len();
    let mut i = 0;
    while i < tag.len() {
        padded[offset + i] = tag[i];
        i += 1;
    }
    B256::new(padded)
}

/// Convert B256 to BN254 field element.
pub fn b256_to_fr(value: B256) -> Fr {
    Fr::from_be_bytes_mod_order(value.as_ref())
}

/// Convert BN254 field element to B256.
pub fn fr_to_b256(value: Fr) -> B256 {
    let big_int = value.into_bigint();
    let bytes = big_int.to_bytes_be();
    B256::from_slice(&bytes)
}

/// The BN254 scalar field modulus. Circuit values must be strictly below it.
pub fn field_modulus() -> U256 {
    U256::from_limbs(Fr::MODULUS.0)
}

/// Whether `value` is a canonical field element (no wrap-around when hashed or proven).
pub fn fits_field(value: U256) -> bool {
    value < field_modulus()
}

fn poseidon(inputs: &[B256]) -> B256 {
    let mut hasher =
        Poseidon::<Fr>::new_circom(inputs.len()).expect("Failed to create Poseidon hasher");
    let inputs: Vec<Fr> = inputs.iter().copied().map(b256_to_fr).collect();
    let result = hasher
        .hash(&inputs)
        .expect("Failed to compute Poseidon hash");
    fr_to_b256(result)
}

/// Poseidon hash with 3 inputs (address derivation: domain + two fields).
pub fn poseidon3(a: B256, b: B256, c: B256) -> B256 {
    poseidon(&[a, b, c])
}

/// Poseidon hash with 4 inputs (commitment: domain + value + address + nonce).
pub fn poseidon4(a: B256, b: B256, c: B256, d: B256) -> B256 {
    poseidon(&[a, b, c, d])
}
