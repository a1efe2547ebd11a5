//! The [POLYVAL] universal hash with the AES-GCM-SIV padding scheme: the
//! message is zero-padded to a whole number of blocks, then followed by a
//! length block of a 64-bit little-endian count of authenticated data bits
//! (here always zero, as there is no separate authenticated data channel) and
//! a 64-bit little-endian count of message bits.
//!
//! Keys are strictly one-time. Reusing a key for two messages invalidates all
//! security claims.
//!
//! [POLYVAL]: https://tools.ietf.org/html/rfc8452

use polyval::universal_hash::{KeyInit, UniversalHash};
use polyval::Polyval;

/// Calculates the 16-byte POLYVAL authenticator of the given message with the
/// given one-time key.
pub(crate) fn authenticate(key: &[u8; 16], message: &[u8]) -> [u8; 16] {
    let mut polyval = Polyval::new(key.into());

    // Hash all full blocks, plus the final partial block padded with zeros. An
    // empty message contributes no blocks.
    polyval.update_padded(message);

    // Hash a final block with the message length in bits.
    let mut length = [0u8; 16];
    length[8..].copy_from_slice(&(message.len() as u64 * 8).to_le_bytes());
    polyval.update(&[length.into()]);

    polyval.finalize().into()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_message_separation() {
        let key = [0xAA; 16];

        let a = authenticate(&key, b"one message");
        let b = authenticate(&key, b"another message");
        assert_ne!(a, b);
    }

    #[test]
    fn test_key_separation() {
        let a = authenticate(&[0xAA; 16], b"the same message");
        let b = authenticate(&[0xBB; 16], b"the same message");
        assert_ne!(a, b);
    }

    // The length block separates messages which pad to the same blocks.
    #[test]
    fn test_length_separation() {
        let key = [0xAA; 16];

        let empty = authenticate(&key, &[]);
        let fifteen = authenticate(&key, &[0; 15]);
        let sixteen = authenticate(&key, &[0; 16]);

        assert_ne!(empty, fifteen);
        assert_ne!(empty, sixteen);
        assert_ne!(fifteen, sixteen);
    }
}
