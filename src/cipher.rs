//! AES-128 in counter mode.

use aes::cipher::{KeyIvInit, StreamCipher};
use aes::Aes128;

type Aes128Ctr = ctr::Ctr128BE<Aes128>;

/// XORs `data` in place with the AES-128-CTR keystream for the given key. The
/// counter starts at `iv`, treated as a 128-bit big-endian integer, and
/// increments once per block.
pub(crate) fn apply_keystream(key: &[u8; 16], iv: &[u8; 16], data: &mut [u8]) {
    let mut ctr = Aes128Ctr::new(key.into(), iv.into());
    ctr.apply_keystream(data);
}
