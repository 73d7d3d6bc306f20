//! SHA256 double-hashing and digest display helpers.

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// A 32-byte digest in internal byte order.
pub type Hash256 = [u8; 32];

/// Bitcoin's double SHA256: SHA256(SHA256(data)).
///
/// This is used for header hashing, transaction IDs, merkle nodes and
/// signature digests.
#[inline]
pub fn double_sha256(data: &[u8]) -> Hash256 {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    let mut result = [0u8; 32];
    result.copy_from_slice(&second);
    result
}

/// Single SHA256 hash.
#[inline]
pub fn sha256(data: &[u8]) -> Hash256 {
    let hash = Sha256::digest(data);
    let mut result = [0u8; 32];
    result.copy_from_slice(&hash);
    result
}

/// RIPEMD160(SHA256(data)), the public key hash used by P2PKH scripts.
pub fn hash160(data: &[u8]) -> [u8; 20] {
    let hash = Ripemd160::digest(sha256(data));
    let mut result = [0u8; 20];
    result.copy_from_slice(&hash);
    result
}

/// Hash the concatenation of two digests. One merkle combination step.
#[inline]
pub fn hash_pair(left: &Hash256, right: &Hash256) -> Hash256 {
    let mut combined = [0u8; 64];
    combined[..32].copy_from_slice(left);
    combined[32..].copy_from_slice(right);
    double_sha256(&combined)
}

/// Reverse the byte order of a 32-byte array.
///
/// Transaction ids are conventionally displayed in reverse byte order.
#[inline]
pub fn reverse_bytes(bytes: &Hash256) -> Hash256 {
    let mut reversed = *bytes;
    reversed.reverse();
    reversed
}

/// Convert a txid to its display format (reversed hex).
pub fn txid_to_display_hex(txid: &Hash256) -> String {
    hex::encode(reverse_bytes(txid))
}

/// Parse a display-order txid (64 hex digits) into internal byte order.
pub fn txid_from_display_hex(s: &str) -> Result<Hash256, hex::FromHexError> {
    let mut bytes = [0u8; 32];
    hex::decode_to_slice(s, &mut bytes)?;
    bytes.reverse();
    Ok(bytes)
}

/// Count leading zero bits of a digest read as a big-endian number.
pub fn count_leading_zeros(hash: &Hash256) -> u32 {
    let mut zeros = 0u32;
    for byte in hash.iter() {
        if *byte == 0 {
            zeros += 8;
        } else {
            zeros += byte.leading_zeros();
            break;
        }
    }
    zeros
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_double_sha256() {
        // Test vector: SHA256d("hello")
        let hash = double_sha256(b"hello");

        let expected = hex::decode(
            "9595c9df90075148eb06860365df33584b75bff782a510c6cd4883a419833d50"
        ).unwrap();

        assert_eq!(hash.as_slice(), expected.as_slice());
    }

    #[test]
    fn test_hash160_known_vector() {
        // HASH160 of the compressed generator point public key
        let pubkey = hex::decode(
            "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798"
        ).unwrap();

        assert_eq!(
            hex::encode(hash160(&pubkey)),
            "751e76e8199196d454941c45d1b3a323f1433bd6"
        );
    }

    #[test]
    fn test_hash_pair_is_order_sensitive() {
        let a = [0x11u8; 32];
        let b = [0x22u8; 32];
        assert_ne!(hash_pair(&a, &b), hash_pair(&b, &a));
    }

    #[test]
    fn test_txid_display_roundtrip() {
        let mut txid = [0u8; 32];
        txid[0] = 0xAB;
        txid[31] = 0x01;

        let display = txid_to_display_hex(&txid);
        assert!(display.starts_with("01"));
        assert!(display.ends_with("ab"));
        assert_eq!(txid_from_display_hex(&display).unwrap(), txid);
    }

    #[test]
    fn test_txid_from_display_hex_rejects_short_input() {
        assert!(txid_from_display_hex("abcd").is_err());
    }

    #[test]
    fn test_count_leading_zeros() {
        assert_eq!(count_leading_zeros(&[0x00; 32]), 256);

        let mut hash = [0xFF; 32];
        hash[0] = 0x00;
        hash[1] = 0x00;
        hash[2] = 0x0F;
        assert_eq!(count_leading_zeros(&hash), 20); // 8 + 8 + 4
    }
}
