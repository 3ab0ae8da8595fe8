//! Thin streaming wrappers over the hash/HMAC primitives: SHA-256,
//! RIPEMD-160, HMAC-SHA-512, treated as black boxes with known interfaces
//! rather than implemented from scratch.
//!
//! These use a begin/write-byte/finish contract so the transaction parser
//! can absorb bytes one at a time without buffering. `Sha256Ctx` exposes
//! that shape directly; the others are used in bulk (key derivation,
//! checksums) and so only need `update`/`finalize`.

use hmac::{Hmac, Mac};
use ripemd::Ripemd160;
use sha2::{Digest, Sha256, Sha512};

/// Incremental SHA-256 context, matching the begin/write-byte/finish
/// contract used throughout this crate's collaborator hash primitives.
/// `TxParser` runs two of these concurrently over one byte stream.
#[derive(Clone, Default)]
pub struct Sha256Ctx {
    inner: Sha256,
}

impl Sha256Ctx {
    pub fn begin() -> Self {
        Self { inner: Sha256::new() }
    }

    pub fn write_byte(&mut self, byte: u8) {
        self.inner.update([byte]);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.inner.update(bytes);
    }

    pub fn finish(self) -> [u8; 32] {
        self.inner.finalize().into()
    }
}

/// Single-shot SHA-256.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Bitcoin's "double SHA-256": `SHA256(SHA256(data))`.
pub fn sha256d(data: &[u8]) -> [u8; 32] {
    sha256(&sha256(data))
}

/// RIPEMD-160 of arbitrary bytes.
pub fn ripemd160(data: &[u8]) -> [u8; 20] {
    Ripemd160::digest(data).into()
}

/// `hash160`: `RIPEMD160(SHA256(data))`, Bitcoin's public-key-hash
/// construction: `address = RIPEMD-160(SHA-256(uncompressed public-key
/// bytes))`.
pub fn hash160(data: &[u8]) -> [u8; 20] {
    ripemd160(&sha256(data))
}

/// HMAC-SHA-512, used by BIP32 for `seed_to_master` and child
/// derivation, and by RFC 6979 (§4.3) for the DRBG's underlying HMAC.
pub fn hmac_sha512(key: &[u8], data: &[u8]) -> [u8; 64] {
    let mut mac = Hmac::<Sha512>::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// HMAC-SHA-256, the primitive underlying the RFC 6979 HMAC-DRBG.
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_of_empty_matches_known_vector() {
        let digest = sha256(b"");
        assert_eq!(
            hex::encode(digest),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b85"
        );
    }

    #[test]
    fn incremental_matches_one_shot() {
        let mut ctx = Sha256Ctx::begin();
        for b in b"hello world" {
            ctx.write_byte(*b);
        }
        assert_eq!(ctx.finish(), sha256(b"hello world"));
    }

    #[test]
    fn hash160_known_vector() {
        // hash160("") = ripemd160(sha256("")), a well-known constant used by
        // several Bitcoin test suites.
        let got = hash160(b"");
        assert_eq!(hex::encode(got), "b472a266d0bd89c13706a4132ccfb16f7c3b9fcb");
    }
}
