// The basic idea of this module is to perform a kind of fuzz testing of our implementation.
// This testing works by generating a random sequence of operations, and then
// simulating a protocol execution between a sender and a receiver.
// This allows us to exercise some basic properties, like that ciphertexts
// round-trip and that the two parties' states stay synchronized, but also more
// complicated things, like it being impossible for two different operation
// histories to converge to the same state.
use proptest::{collection::vec, prelude::*};

use crate::encoding::{left_encode, right_encode};
use crate::{Protocol, TAG_LEN};

/// Represents a single operation in a protocol.
#[derive(Clone, Debug, PartialEq)]
enum Command {
    /// Add labeled input into the state.
    Mix(String, Vec<u8>),
    /// Generate some bytes of pseudorandom output.
    Derive(String, usize),
    /// Send an encrypted message to the other party.
    Crypt(String, Vec<u8>),
    /// Send a sealed message to the other party.
    AuthCrypt(String, Vec<u8>),
}

/// Represents a full protocol session.
#[derive(Clone, Debug, PartialEq)]
struct Session {
    /// The domain separation string.
    domain: String,
    /// A list of operations.
    commands: Vec<Command>,
}

/// Simulate a protocol execution, given a session of commands.
///
/// We do this by setting up a sender and a receiver protocol, with each
/// command updating both. The simulation verifies that everything the sender
/// encrypts or seals the receiver recovers, and that the two states stay
/// synchronized, then returns all output generated throughout the protocol
/// plus a final state digest, so that any divergence in session histories is
/// observable in the output.
fn run_and_assert_commands(session: &Session) -> Vec<u8> {
    let mut out = Vec::new();

    let mut sender = Protocol::new(&session.domain);
    let mut receiver = Protocol::new(&session.domain);

    for command in &session.commands {
        match command {
            Command::Mix(label, data) => {
                sender.mix(label, data);
                receiver.mix(label, data);
            }
            Command::Derive(label, n) => {
                let mut a = vec![0u8; *n];
                sender.derive(label, &mut a);
                let mut b = vec![0u8; *n];
                receiver.derive(label, &mut b);
                assert_eq!(a, b);
                out.extend_from_slice(&a);
            }
            Command::Crypt(label, plaintext) => {
                let mut message = plaintext.clone();
                sender.encrypt(label, &mut message);
                out.extend_from_slice(&message);
                receiver.decrypt(label, &mut message);
                assert_eq!(&message, plaintext);
            }
            Command::AuthCrypt(label, plaintext) => {
                let mut message = plaintext.clone();
                message.resize(plaintext.len() + TAG_LEN, 0);
                sender.seal(label, &mut message);
                out.extend_from_slice(&message);
                let opened = receiver.open(label, &mut message).expect("should be authentic");
                assert_eq!(opened, plaintext);
            }
        }
    }

    let digest = sender.derive_array::<32>("final digest");
    assert_eq!(digest, receiver.derive_array::<32>("final digest"));
    out.extend_from_slice(&digest);

    out
}

fn arb_label() -> impl Strategy<Value = String> {
    "[a-z]{0,12}"
}

fn arb_data() -> impl Strategy<Value = Vec<u8>> {
    vec(any::<u8>(), 0..200)
}

fn arb_command() -> impl Strategy<Value = Command> {
    use Command::*;

    prop_oneof![
        (arb_label(), arb_data()).prop_map(|(l, d)| Mix(l, d)),
        (arb_label(), 0..64usize).prop_map(|(l, n)| Derive(l, n)),
        (arb_label(), arb_data()).prop_map(|(l, d)| Crypt(l, d)),
        (arb_label(), arb_data()).prop_map(|(l, d)| AuthCrypt(l, d)),
    ]
}

prop_compose! {
    fn arb_session()(domain in "[a-z.]{1,16}", commands in vec(arb_command(), 0..16)) -> Session {
        Session { domain, commands }
    }
}

/// Build a protocol keyed with the given key and nonce.
fn keyed(domain: &str, key: &[u8], nonce: &[u8]) -> Protocol {
    let mut protocol = Protocol::new(domain);
    protocol.mix("key", key);
    protocol.mix("nonce", nonce);
    protocol
}

proptest! {
    #[test]
    fn test_commands(s0 in arb_session(), s1 in arb_session()) {
        let out0 = run_and_assert_commands(&s0);
        let out1 = run_and_assert_commands(&s1);
        // Either the sessions should be the same, and then the output matches,
        // or they should be different, and the output should differ too.
        if s0 == s1 {
            prop_assert_eq!(out0, out1);
        } else {
            prop_assert_ne!(out0, out1);
        }
    }

    #[test]
    fn test_clone_equivalence(s in arb_session(), key in arb_data()) {
        let mut p0 = Protocol::new(&s.domain);
        p0.mix("key", &key);
        let mut p1 = p0.clone();

        for command in &s.commands {
            if let Command::Mix(label, data) = command {
                p0.mix(label, data);
                p1.mix(label, data);
            }
        }

        prop_assert_eq!(p0.derive_array::<32>("check"), p1.derive_array::<32>("check"));
    }

    #[test]
    fn test_encrypt_round_trip(key in arb_data(), nonce in arb_data(), plaintext in arb_data()) {
        let mut message = plaintext.clone();
        keyed("stream", &key, &nonce).encrypt("message", &mut message);
        keyed("stream", &key, &nonce).decrypt("message", &mut message);
        prop_assert_eq!(message, plaintext);
    }

    #[test]
    fn test_seal_round_trip(key in arb_data(), nonce in arb_data(), plaintext in arb_data()) {
        let mut message = plaintext.clone();
        message.resize(plaintext.len() + TAG_LEN, 0);
        keyed("aead", &key, &nonce).seal("message", &mut message);

        let opened = keyed("aead", &key, &nonce)
            .open("message", &mut message)
            .expect("should be authentic");
        prop_assert_eq!(opened, &plaintext[..]);
    }

    #[test]
    fn test_open_rejects_bit_flips(
        key in arb_data(),
        nonce in arb_data(),
        plaintext in arb_data(),
        index in any::<prop::sample::Index>(),
        mask in 1u8..,
    ) {
        let mut message = plaintext.clone();
        message.resize(plaintext.len() + TAG_LEN, 0);
        keyed("aead", &key, &nonce).seal("message", &mut message);

        let index = index.index(message.len());
        message[index] ^= mask;

        prop_assert!(keyed("aead", &key, &nonce).open("message", &mut message).is_err());
    }

    #[test]
    fn test_domain_separation(key in arb_data()) {
        let mut p0 = Protocol::new("one");
        p0.mix("key", &key);
        let mut p1 = Protocol::new("two");
        p1.mix("key", &key);
        prop_assert_ne!(p0.derive_array::<32>("check"), p1.derive_array::<32>("check"));
    }

    #[test]
    fn test_label_separation(key in arb_data()) {
        let mut p0 = Protocol::new("test");
        p0.mix("key a", &key);
        let mut p1 = Protocol::new("test");
        p1.mix("key b", &key);
        prop_assert_ne!(p0.derive_array::<32>("check"), p1.derive_array::<32>("check"));
    }

    #[test]
    fn test_streaming_mix_equivalence(data in arb_data(), split in any::<prop::sample::Index>()) {
        let mut p0 = Protocol::new("test");
        p0.mix("data", &data);

        let split = split.index(data.len() + 1);
        let mut p1 = Protocol::new("test");
        let mut w = p1.mix_writer("data");
        w.write(&data[..split]);
        w.write(&data[split..]);
        w.finish();

        prop_assert_eq!(p0.derive_array::<32>("check"), p1.derive_array::<32>("check"));
    }

    #[test]
    fn test_marshal_round_trip(s in arb_session()) {
        let mut p0 = Protocol::new(&s.domain);
        for command in &s.commands {
            match command {
                Command::Mix(label, data) => p0.mix(label, data),
                Command::Derive(label, n) => {
                    let mut out = vec![0u8; *n];
                    p0.derive(label, &mut out);
                }
                Command::Crypt(label, plaintext) => {
                    let mut message = plaintext.clone();
                    p0.encrypt(label, &mut message);
                }
                Command::AuthCrypt(label, plaintext) => {
                    let mut message = plaintext.clone();
                    message.resize(plaintext.len() + TAG_LEN, 0);
                    p0.seal(label, &mut message);
                }
            }
        }

        let mut p1 = Protocol::unmarshal(&s.domain, &p0.marshal()).expect("state should parse");
        prop_assert_eq!(p0.derive_array::<32>("check"), p1.derive_array::<32>("check"));
    }

    #[test]
    fn test_left_encode_injective(a in any::<u64>(), b in any::<u64>()) {
        prop_assert_eq!(a == b, left_encode(a).as_ref() == left_encode(b).as_ref());
    }

    #[test]
    fn test_right_encode_injective(a in any::<u64>(), b in any::<u64>()) {
        prop_assert_eq!(a == b, right_encode(a).as_ref() == right_encode(b).as_ref());
    }
}
