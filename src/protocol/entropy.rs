//! Hardware RNG collaborator: `get_random_256(out) -> bool`, returning
//! failure if the RNG self-test is failing.
//!
//! The real entropy source and its pool-health checks are external to this
//! crate; `EntropySource` is the trait `Protocol` is generic
//! over, matching the `ByteIo`/`UserInterface` collaborator-trait pattern in
//! `protocol::io`/`protocol::ui`.

pub trait EntropySource {
    /// Fills `out` with random bytes, returning `false` if the underlying
    /// RNG's self-test is currently failing.
    fn random_bytes(&mut self, out: &mut [u8]) -> bool;
}

/// An `EntropySource` backed by the OS CSPRNG, used by `wallet-sim` and
/// tests that need real randomness rather than a scripted sequence.
#[derive(Debug, Default)]
pub struct OsEntropySource;

impl EntropySource for OsEntropySource {
    fn random_bytes(&mut self, out: &mut [u8]) -> bool {
        use rand::RngCore;
        rand::rngs::OsRng.fill_bytes(out);
        true
    }
}

/// A scripted `EntropySource` for tests: replays fixed bytes (cycling if the
/// caller asks for more than was scripted) and can be told to simulate a
/// failing RNG self-test.
pub struct FixedEntropySource {
    bytes: Vec<u8>,
    pos: usize,
    healthy: bool,
}

impl FixedEntropySource {
    pub fn new(bytes: Vec<u8>) -> Self {
        assert!(!bytes.is_empty(), "scripted entropy source needs at least one byte");
        FixedEntropySource { bytes, pos: 0, healthy: true }
    }

    pub fn failing() -> Self {
        FixedEntropySource { bytes: vec![0], pos: 0, healthy: false }
    }
}

impl EntropySource for FixedEntropySource {
    fn random_bytes(&mut self, out: &mut [u8]) -> bool {
        if !self.healthy {
            return false;
        }
        for b in out.iter_mut() {
            *b = self.bytes[self.pos];
            self.pos = (self.pos + 1) % self.bytes.len();
        }
        true
    }
}
