//! Canonical byte serialization.
//!
//! Every digest in the crate (txids, merkle leaves, header hashes and
//! signature digests) is computed over bytes produced here, so the layout is
//! defined once:
//!
//! - integers are little-endian and fixed width
//! - byte strings and sequences are prefixed with a [`write_varint`] length
//! - hashes are written in internal byte order

use crate::hash::{double_sha256, Hash256};

/// Version tag of the canonical layout below. Bump when it changes.
pub const ENCODING_VERSION: u32 = 1;

/// Types with a canonical byte layout.
pub trait Encodable {
    /// Append the canonical bytes of `self` to `out`.
    fn encode_to(&self, out: &mut Vec<u8>);

    /// Canonical bytes of `self`.
    fn encoded(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(256);
        self.encode_to(&mut out);
        out
    }

    /// Double SHA256 of the canonical bytes.
    fn encoded_hash(&self) -> Hash256 {
        double_sha256(&self.encoded())
    }
}

/// Encode a variable-length integer (Bitcoin varint).
pub fn write_varint(value: u64, out: &mut Vec<u8>) {
    if value < 0xfd {
        out.push(value as u8);
    } else if value <= 0xffff {
        out.push(0xfd);
        out.extend_from_slice(&(value as u16).to_le_bytes());
    } else if value <= 0xffffffff {
        out.push(0xfe);
        out.extend_from_slice(&(value as u32).to_le_bytes());
    } else {
        out.push(0xff);
        out.extend_from_slice(&value.to_le_bytes());
    }
}

/// Write a length-prefixed byte string.
pub fn write_bytes(bytes: &[u8], out: &mut Vec<u8>) {
    write_varint(bytes.len() as u64, out);
    out.extend_from_slice(bytes);
}

/// Write a length-prefixed sequence of encodable items.
pub fn write_list<T: Encodable>(items: &[T], out: &mut Vec<u8>) {
    write_varint(items.len() as u64, out);
    for item in items {
        item.encode_to(out);
    }
}

/// Build a script push of `data`.
///
/// Pushes up to 75 bytes use the direct length opcode, longer ones
/// OP_PUSHDATA1/2.
pub fn push_data(data: &[u8], script: &mut Vec<u8>) {
    let len = data.len();
    if len < 0x4c {
        script.push(len as u8);
    } else if len <= 0xff {
        script.push(0x4c);
        script.push(len as u8);
    } else {
        script.push(0x4d);
        script.extend_from_slice(&(len as u16).to_le_bytes());
    }
    script.extend_from_slice(data);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_varint() {
        let mut output = Vec::new();

        // Small value (< 0xfd)
        write_varint(100, &mut output);
        assert_eq!(output, vec![100]);

        // Medium value (0xfd - 0xffff)
        output.clear();
        write_varint(0x1234, &mut output);
        assert_eq!(output, vec![0xfd, 0x34, 0x12]);

        output.clear();
        write_varint(0x0001_0000, &mut output);
        assert_eq!(output, vec![0xfe, 0x00, 0x00, 0x01, 0x00]);

        output.clear();
        write_varint(0x1_0000_0000, &mut output);
        assert_eq!(output.len(), 9);
        assert_eq!(output[0], 0xff);
    }

    #[test]
    fn test_write_bytes_prefixes_length() {
        let mut out = Vec::new();
        write_bytes(&[0xAA, 0xBB], &mut out);
        assert_eq!(out, vec![0x02, 0xAA, 0xBB]);
    }

    #[test]
    fn test_push_data_opcodes() {
        let mut script = Vec::new();
        push_data(&[0x01; 33], &mut script);
        assert_eq!(script[0], 33);
        assert_eq!(script.len(), 34);

        script.clear();
        push_data(&[0x01; 80], &mut script);
        assert_eq!(&script[..2], &[0x4c, 80]);
    }
}
