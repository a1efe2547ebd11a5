//! The protocol transcript: a cSHAKE128 engine which absorbs an unambiguous
//! encoding of every operation, plus the log of records absorbed since the
//! last ratchet, which doubles as the serialized form of the state.

use alloc::vec::Vec;

use sha3::digest::{ExtendableOutput, Update, XofReader};
use sha3::{CShake128, CShake128Core};
use thiserror::Error;
use zeroize::{Zeroize, Zeroizing};

use crate::encoding::{left_encode, right_encode};

// Operation codes, one per record type in the transcript encoding.
pub(crate) const OP_MIX: u8 = 0x01;
pub(crate) const OP_DERIVE: u8 = 0x02;
pub(crate) const OP_CRYPT: u8 = 0x03;
pub(crate) const OP_AUTH_CRYPT: u8 = 0x04;
const OP_EXPAND: u8 = 0x05;
const OP_RATCHET: u8 = 0x06;

/// The prefix of every transcript's customization string.
const CUSTOMIZATION_PREFIX: &[u8] = b"lockstitch:";

/// The length of a ratchet key in bytes.
const RATCHET_KEY_LEN: usize = 32;

/// The error returned when deserializing bytes which do not encode a valid
/// transcript state.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
#[error("lockstitch: invalid protocol state")]
pub struct InvalidState;

/// A transcript of labeled protocol operations.
///
/// Every absorbed byte goes to both the cSHAKE128 engine and the record log,
/// so the engine state is always the hash of the customization string and the
/// log, and the log alone reconstructs the engine.
#[derive(Clone)]
pub(crate) struct Transcript {
    engine: CShake128,
    customization: Vec<u8>,
    log: Vec<u8>,
}

impl Transcript {
    /// Creates an empty transcript with the customization string
    /// `"lockstitch:" || domain`.
    pub fn new(domain: &[u8]) -> Transcript {
        let mut customization = Vec::with_capacity(CUSTOMIZATION_PREFIX.len() + domain.len());
        customization.extend_from_slice(CUSTOMIZATION_PREFIX);
        customization.extend_from_slice(domain);
        Transcript {
            engine: CShake128::from_core(CShake128Core::new(&customization)),
            customization,
            log: Vec::new(),
        }
    }

    /// Reconstructs a transcript for the given domain from a serialized record
    /// log.
    ///
    /// Only logs which can be observed between operations are accepted: empty,
    /// or an optional ratchet seed followed by any number of Mix records.
    pub fn from_log(domain: &[u8], log: &[u8]) -> Result<Transcript, InvalidState> {
        validate_log(log)?;
        let mut transcript = Transcript::new(domain);
        transcript.absorb(log);
        Ok(transcript)
    }

    /// Returns the record log as of the last ratchet.
    pub fn log(&self) -> &[u8] {
        &self.log
    }

    /// Begins an operation record: the operation code, then the
    /// length-prefixed label.
    pub fn begin_op(&mut self, op: u8, label: &[u8]) {
        self.absorb(&[op]);
        self.absorb(left_encode(label.len() as u64 * 8).as_ref());
        self.absorb(label);
    }

    /// Absorbs an input framed with a `left_encode` prefix of its length in
    /// bits.
    pub fn absorb_framed(&mut self, input: &[u8]) {
        self.absorb(left_encode(input.len() as u64 * 8).as_ref());
        self.absorb(input);
    }

    /// Fills `out` with output bound to the transcript's current state and the
    /// given label, leaving the transcript unchanged.
    ///
    /// The output is squeezed from a clone of the engine which has absorbed an
    /// Expand record: the label with a `left_encode` length prefix and the
    /// output length in bits as a `right_encode` suffix, paralleling cSHAKE's
    /// domain separation idiom. Distinct (label, length) pairs yield distinct
    /// output streams.
    pub fn expand(&self, label: &[u8], out: &mut [u8]) {
        let mut engine = self.engine.clone();
        engine.update(&[OP_EXPAND]);
        engine.update(left_encode(label.len() as u64 * 8).as_ref());
        engine.update(label);
        engine.update(right_encode(out.len() as u64 * 8).as_ref());
        engine.finalize_xof().read(out);
    }

    /// Expands a ratchet key from the current state, then resets the
    /// transcript and reseeds it with the ratchet key alone. The post-ratchet
    /// state is a one-way function of the prior state.
    pub fn ratchet(&mut self) {
        let mut ratchet_key = Zeroizing::new([0u8; RATCHET_KEY_LEN]);
        self.expand(b"ratchet key", ratchet_key.as_mut_slice());

        self.engine = CShake128::from_core(CShake128Core::new(&self.customization));
        self.log.zeroize();

        self.absorb(&[OP_RATCHET]);
        self.absorb_framed(&ratchet_key[..]);
    }

    fn absorb(&mut self, data: &[u8]) {
        self.engine.update(data);
        self.log.extend_from_slice(data);
    }
}

impl Drop for Transcript {
    fn drop(&mut self) {
        self.log.zeroize();
    }
}

/// Checks that `log` is a well-formed record log: empty, or an optional
/// ratchet seed record followed by zero or more Mix records, with every length
/// prefix canonical and a multiple of eight bits.
fn validate_log(log: &[u8]) -> Result<(), InvalidState> {
    let mut rest = log;

    if let Some((&OP_RATCHET, tail)) = rest.split_first() {
        let (bits, tail) = split_left_encode(tail)?;
        if bits != RATCHET_KEY_LEN as u64 * 8 {
            return Err(InvalidState);
        }
        rest = tail.get(RATCHET_KEY_LEN..).ok_or(InvalidState)?;
    }

    while let Some((&op, tail)) = rest.split_first() {
        if op != OP_MIX {
            return Err(InvalidState);
        }
        let tail = split_field(tail)?;
        rest = split_field(tail)?;
    }

    Ok(())
}

/// Splits a canonical `left_encode` prefix off `data`, returning the encoded
/// value and the remainder.
fn split_left_encode(data: &[u8]) -> Result<(u64, &[u8]), InvalidState> {
    let (&n, rest) = data.split_first().ok_or(InvalidState)?;
    let n = usize::from(n);
    if n == 0 || n > 8 {
        return Err(InvalidState);
    }

    let bytes = rest.get(..n).ok_or(InvalidState)?;
    if n > 1 && bytes[0] == 0 {
        return Err(InvalidState);
    }

    let mut value = 0u64;
    for &b in bytes {
        value = (value << 8) | u64::from(b);
    }
    Ok((value, &rest[n..]))
}

/// Splits a length-prefixed field (a bit count and that many bits of data) off
/// `data`, returning the remainder.
fn split_field(data: &[u8]) -> Result<&[u8], InvalidState> {
    let (bits, rest) = split_left_encode(data)?;
    if bits % 8 != 0 {
        return Err(InvalidState);
    }
    let len = usize::try_from(bits / 8).map_err(|_| InvalidState)?;
    rest.get(len..).ok_or(InvalidState)
}
