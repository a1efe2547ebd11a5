use alloc::string::String;
use alloc::vec::Vec;
use core::mem;

use subtle::ConstantTimeEq;
use thiserror::Error;
use zeroize::{Zeroize, Zeroizing};

use crate::cipher;
use crate::encoding::left_encode;
use crate::mac;
use crate::transcript::{InvalidState, Transcript, OP_AUTH_CRYPT, OP_CRYPT, OP_DERIVE, OP_MIX};

/// The number of bytes added to the plaintext by the [`Protocol::seal`]
/// operation.
pub const TAG_LEN: usize = 16;

/// The error returned when a ciphertext is invalid or has been decrypted with
/// the wrong state.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
#[error("lockstitch: invalid ciphertext")]
pub struct InvalidCiphertext;

// Labels for the per-operation keys expanded from the transcript.
const PRF_LABEL: &[u8] = b"prf output";
const DEK_LABEL: &[u8] = b"data encryption key";
const DAK_LABEL: &[u8] = b"data authentication key";
const TAG_LABEL: &[u8] = b"authentication tag";

/// A stateful object providing fine-grained symmetric-key cryptographic
/// services like hashing, message authentication codes, pseudo-random
/// functions, and authenticated encryption.
///
/// A protocol accumulates a transcript of labeled operations and, at any
/// point, can derive output, encrypt, or authenticate using its current state
/// as key material. Two protocols diverge irreversibly on the first byte on
/// which their domains, labels, or inputs differ.
///
/// ```
/// use lockstitch::{Protocol, TAG_LEN};
///
/// let mut sender = Protocol::new("com.example.doc");
/// sender.mix("key", b"a secret key");
/// sender.mix("nonce", b"a unique nonce");
/// let mut sealed = b"an example message".to_vec();
/// sealed.resize(sealed.len() + TAG_LEN, 0);
/// sender.seal("message", &mut sealed);
///
/// let mut receiver = Protocol::new("com.example.doc");
/// receiver.mix("key", b"a secret key");
/// receiver.mix("nonce", b"a unique nonce");
/// let plaintext = receiver.open("message", &mut sealed).expect("should be authentic");
/// assert_eq!(plaintext, b"an example message");
/// ```
#[derive(Clone)]
pub struct Protocol {
    transcript: Transcript,
}

impl Protocol {
    /// Creates a new protocol with the given domain separation string.
    pub fn new(domain: &str) -> Protocol {
        Protocol {
            transcript: Transcript::new(domain.as_bytes()),
        }
    }

    /// Extends the protocol's transcript with the given label and input:
    ///
    /// ```text
    /// transcript' = transcript || 0x01 || left_encode(|label|) || label || left_encode(|input|) || input
    /// ```
    pub fn mix(&mut self, label: &str, input: &[u8]) {
        self.transcript.begin_op(OP_MIX, label.as_bytes());
        self.transcript.absorb_framed(input);
    }

    /// Begins a Mix operation whose input arrives in chunks. The returned
    /// writer buffers the chunks and commits the operation on
    /// [`MixWriter::finish`]; dropping it without finishing leaves the
    /// protocol untouched.
    pub fn mix_writer(&mut self, label: &str) -> MixWriter<'_> {
        MixWriter {
            protocol: self,
            label: label.into(),
            input: Vec::new(),
        }
    }

    /// Fills `out` with pseudorandom output derived from the protocol's
    /// current state, the label, and the output length, then ratchets the
    /// protocol's state.
    ///
    /// The output is a pure function of the state, the label, and the length;
    /// whatever `out` held beforehand is overwritten.
    pub fn derive(&mut self, label: &str, out: &mut [u8]) {
        self.transcript.begin_op(OP_DERIVE, label.as_bytes());
        self.transcript
            .absorb_framed(left_encode(out.len() as u64 * 8).as_ref());
        self.transcript.expand(PRF_LABEL, out);
        self.transcript.ratchet();
    }

    /// Derives an `N`-byte array; a convenience for [`Protocol::derive`].
    pub fn derive_array<const N: usize>(&mut self, label: &str) -> [u8; N] {
        let mut out = [0u8; N];
        self.derive(label, &mut out);
        out
    }

    /// Encrypts the given slice in place using the protocol's current state as
    /// the key, then ratchets the protocol's state.
    ///
    /// The slice must either be the whole buffer or fully disjoint from any
    /// copy of the plaintext; the operation is strictly in place.
    ///
    /// Unauthenticated: an attacker can modify the ciphertext undetected. Use
    /// [`Protocol::seal`] for authenticated encryption.
    pub fn encrypt(&mut self, label: &str, in_out: &mut [u8]) {
        let (dek, dak) = self.begin_crypt(OP_CRYPT, label, in_out.len());

        // Authenticate the plaintext, then encrypt it with a zero IV.
        let auth = mac::authenticate(&dak, in_out);
        self.transcript.absorb_framed(&auth);
        cipher::apply_keystream(&dek, &[0u8; 16], in_out);

        self.transcript.ratchet();
    }

    /// Decrypts the given slice in place using the protocol's current state as
    /// the key, then ratchets the protocol's state.
    ///
    /// Decrypting a ciphertext leaves the protocol in the same state as
    /// encrypting the corresponding plaintext.
    pub fn decrypt(&mut self, label: &str, in_out: &mut [u8]) {
        let (dek, dak) = self.begin_crypt(OP_CRYPT, label, in_out.len());

        // Decrypt the ciphertext, then authenticate the recovered plaintext.
        cipher::apply_keystream(&dek, &[0u8; 16], in_out);
        let auth = mac::authenticate(&dak, in_out);
        self.transcript.absorb_framed(&auth);

        self.transcript.ratchet();
    }

    /// Encrypts all but the final [`TAG_LEN`] bytes of the given slice in
    /// place, writing an authentication tag over the plaintext to the final
    /// [`TAG_LEN`] bytes, then ratchets the protocol's state.
    ///
    /// # Panics
    ///
    /// Panics if `in_out` is shorter than [`TAG_LEN`] bytes.
    pub fn seal(&mut self, label: &str, in_out: &mut [u8]) {
        assert!(in_out.len() >= TAG_LEN, "no room for an authentication tag");
        let (message, tag_out) = in_out.split_at_mut(in_out.len() - TAG_LEN);

        let (dek, dak) = self.begin_crypt(OP_AUTH_CRYPT, label, message.len());

        // Authenticate the plaintext and absorb the authenticator.
        let auth = mac::authenticate(&dak, message);
        self.transcript.absorb_framed(&auth);

        // Expand a tag bound to the plaintext, then use it as the IV.
        let mut tag = [0u8; TAG_LEN];
        self.transcript.expand(TAG_LABEL, &mut tag);
        cipher::apply_keystream(&dek, &tag, message);
        tag_out.copy_from_slice(&tag);

        self.transcript.ratchet();
    }

    /// Decrypts all but the final [`TAG_LEN`] bytes of the given slice in
    /// place, verifying the final [`TAG_LEN`] bytes as an authentication tag,
    /// then ratchets the protocol's state.
    ///
    /// Returns the decrypted plaintext if the ciphertext is authentic. On
    /// failure the decrypted bytes are zeroed out and never returned, but the
    /// protocol's state advances exactly as on success, so further use of the
    /// protocol is well-defined.
    ///
    /// # Panics
    ///
    /// Panics if `in_out` is shorter than [`TAG_LEN`] bytes.
    pub fn open<'a>(
        &mut self,
        label: &str,
        in_out: &'a mut [u8],
    ) -> Result<&'a [u8], InvalidCiphertext> {
        assert!(in_out.len() >= TAG_LEN, "no authentication tag");
        let split = in_out.len() - TAG_LEN;
        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&in_out[split..]);
        let message = &mut in_out[..split];

        let (dek, dak) = self.begin_crypt(OP_AUTH_CRYPT, label, message.len());

        // Decrypt with the tag as the IV, then authenticate the recovered
        // plaintext and absorb the authenticator.
        cipher::apply_keystream(&dek, &tag, message);
        let auth = mac::authenticate(&dak, message);
        self.transcript.absorb_framed(&auth);

        // Re-expand the expected tag and compare in constant time.
        let mut expected = [0u8; TAG_LEN];
        self.transcript.expand(TAG_LABEL, &mut expected);
        let valid = expected.ct_eq(&tag);

        // The ratchet runs whether or not the tag verified, so the state
        // transition leaks nothing about the comparison.
        self.transcript.ratchet();

        if bool::from(valid) {
            Ok(message)
        } else {
            message.zeroize();
            Err(InvalidCiphertext)
        }
    }

    /// Serializes the protocol's state. The domain is not part of the
    /// serialized form; [`Protocol::unmarshal`] takes it separately.
    pub fn marshal(&self) -> Vec<u8> {
        self.transcript.log().to_vec()
    }

    /// Restores a protocol from a serialized state and a domain separation
    /// string. A protocol restored with the marshaling protocol's domain
    /// behaves identically to it.
    pub fn unmarshal(domain: &str, state: &[u8]) -> Result<Protocol, InvalidState> {
        Ok(Protocol {
            transcript: Transcript::from_log(domain.as_bytes(), state)?,
        })
    }

    /// Begins a Crypt or AuthCrypt operation: absorbs the metadata record for
    /// the label and message length, then expands the data encryption key and
    /// data authentication key:
    ///
    /// ```text
    /// n = left_encode(|message|)
    /// transcript' = transcript || op || left_encode(|label|) || label || left_encode(|n|) || n
    /// ```
    fn begin_crypt(
        &mut self,
        op: u8,
        label: &str,
        message_len: usize,
    ) -> (Zeroizing<[u8; 16]>, Zeroizing<[u8; 16]>) {
        self.transcript.begin_op(op, label.as_bytes());
        self.transcript
            .absorb_framed(left_encode(message_len as u64 * 8).as_ref());

        let mut dek = Zeroizing::new([0u8; 16]);
        self.transcript.expand(DEK_LABEL, dek.as_mut_slice());
        let mut dak = Zeroizing::new([0u8; 16]);
        self.transcript.expand(DAK_LABEL, dak.as_mut_slice());
        (dek, dak)
    }
}

/// An in-progress Mix operation, created with [`Protocol::mix_writer`].
///
/// Because the transcript encoding places the input's length before the input,
/// the writer buffers everything written to it; a finished writer leaves the
/// protocol byte-identical to a single [`Protocol::mix`] call with the
/// concatenated chunks.
pub struct MixWriter<'a> {
    protocol: &'a mut Protocol,
    label: String,
    input: Vec<u8>,
}

impl MixWriter<'_> {
    /// Appends a chunk of input to the operation.
    pub fn write(&mut self, chunk: &[u8]) {
        self.input.extend_from_slice(chunk);
    }

    /// Completes the Mix operation, updating the protocol's state.
    pub fn finish(mut self) {
        let label = mem::take(&mut self.label);
        let input = Zeroizing::new(mem::take(&mut self.input));
        self.protocol.mix(&label, &input);
    }
}

impl Drop for MixWriter<'_> {
    fn drop(&mut self) {
        self.input.zeroize();
    }
}
