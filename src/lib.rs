//! Lockstitch is an incremental, stateful cryptographic primitive for
//! symmetric-key cryptographic operations (e.g. hashing, encryption, message
//! authentication codes, and authenticated encryption) in complex protocols.
//! Inspired by TupleHash, STROBE, Noise Protocol's stateful objects, Merlin
//! transcripts, and Xoodyak's Cyclist mode, Lockstitch uses cSHAKE128,
//! AES-128, and POLYVAL to provide a 128-bit security level.
//!
//! A [`Protocol`] accumulates a transcript of labeled operations. [`mix`][Protocol::mix]
//! adds input to the transcript; [`derive`][Protocol::derive],
//! [`encrypt`][Protocol::encrypt]/[`decrypt`][Protocol::decrypt], and
//! [`seal`][Protocol::seal]/[`open`][Protocol::open] produce output keyed by
//! everything mixed so far, each ratcheting the state afterwards for forward
//! secrecy.
#![cfg_attr(not(test), no_std)]
#![forbid(unsafe_code)]

extern crate alloc;

mod cipher;
mod encoding;
mod mac;
mod protocol;
mod transcript;
// For much heavier tests.
#[cfg(test)]
mod test;

pub use crate::protocol::{InvalidCiphertext, MixWriter, Protocol, TAG_LEN};
pub use crate::transcript::InvalidState;
