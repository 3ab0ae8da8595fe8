//! Tweakable per-block encryption.
//!
//! For a 16-byte block at byte offset `o` within a record, the ciphertext is
//! `E_k1(P XOR T) XOR T` where `T = E_k2(o_as_block)`. An all-zero key
//! short-circuits to plaintext identity: a wallet with an all-zero
//! encryption key is semantically unencrypted but uses the identical
//! on-disk format.

use aes::cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit};
use aes::Aes128;
use zeroize::{Zeroize, ZeroizeOnDrop};

pub const BLOCK_LEN: usize = 16;

const ZERO_KEY: [u8; 16] = [0u8; 16];

/// The pair of keys installed process-wide by `Wallet`. The two keys are
/// independent and are installed and cleared together. This crate carries
/// that state as an explicit value owned by the `Wallet`, rather than a true
/// process-wide global.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct XexKeys {
    k1: [u8; 16],
    k2: [u8; 16],
}

impl XexKeys {
    pub fn new(k1: [u8; 16], k2: [u8; 16]) -> Self {
        XexKeys { k1, k2 }
    }

    /// The "unencrypted" marker key: both halves all-zero.
    pub fn unencrypted() -> Self {
        XexKeys::new(ZERO_KEY, ZERO_KEY)
    }

    pub fn is_unencrypted(&self) -> bool {
        self.k1 == ZERO_KEY && self.k2 == ZERO_KEY
    }

    /// Encrypts one 16-byte block at logical block index `block_index`
    /// (i.e. `offset / 16` within the record).
    pub fn encrypt_block(&self, block_index: u32, plaintext: &[u8; 16]) -> [u8; 16] {
        if self.is_unencrypted() {
            return *plaintext;
        }
        let tweak = self.tweak(block_index);
        let mut block = xor16(plaintext, &tweak);
        let cipher = Aes128::new(GenericArray::from_slice(&self.k1));
        let mut ga = GenericArray::clone_from_slice(&block);
        cipher.encrypt_block(&mut ga);
        block.copy_from_slice(&ga);
        xor16(&block, &tweak)
    }

    /// XEX decryption of `encrypt_block`. AES-128 is not used in its
    /// decrypting direction here because XEX's algebra makes the forward
    /// cipher suffice for the tweak, but the ciphertext itself must be run
    /// through the *inverse* cipher under `k1` — `cipher::BlockDecrypt`.
    pub fn decrypt_block(&self, block_index: u32, ciphertext: &[u8; 16]) -> [u8; 16] {
        if self.is_unencrypted() {
            return *ciphertext;
        }
        use aes::cipher::BlockDecrypt;
        let tweak = self.tweak(block_index);
        let mut block = xor16(ciphertext, &tweak);
        let cipher = Aes128::new(GenericArray::from_slice(&self.k1));
        let mut ga = GenericArray::clone_from_slice(&block);
        cipher.decrypt_block(&mut ga);
        block.copy_from_slice(&ga);
        xor16(&block, &tweak)
    }

    /// `T = E_k2(block_index_as_block)`.
    fn tweak(&self, block_index: u32) -> [u8; 16] {
        let mut block = [0u8; 16];
        block[..4].copy_from_slice(&block_index.to_le_bytes());
        let cipher = Aes128::new(GenericArray::from_slice(&self.k2));
        let mut ga = GenericArray::clone_from_slice(&block);
        cipher.encrypt_block(&mut ga);
        ga.into()
    }

    /// Encrypts a buffer whose length is a multiple of [`BLOCK_LEN`],
    /// starting at logical block index `first_block`.
    pub fn encrypt(&self, first_block: u32, data: &[u8]) -> Vec<u8> {
        assert_eq!(data.len() % BLOCK_LEN, 0, "XEX operates on whole 16-byte blocks");
        let mut out = Vec::with_capacity(data.len());
        for (i, chunk) in data.chunks(BLOCK_LEN).enumerate() {
            let mut block = [0u8; 16];
            block.copy_from_slice(chunk);
            out.extend_from_slice(&self.encrypt_block(first_block + i as u32, &block));
        }
        out
    }

    pub fn decrypt(&self, first_block: u32, data: &[u8]) -> Vec<u8> {
        assert_eq!(data.len() % BLOCK_LEN, 0, "XEX operates on whole 16-byte blocks");
        let mut out = Vec::with_capacity(data.len());
        for (i, chunk) in data.chunks(BLOCK_LEN).enumerate() {
            let mut block = [0u8; 16];
            block.copy_from_slice(chunk);
            out.extend_from_slice(&self.decrypt_block(first_block + i as u32, &block));
        }
        out
    }
}

fn xor16(a: &[u8; 16], b: &[u8; 16]) -> [u8; 16] {
    let mut out = [0u8; 16];
    for i in 0..16 {
        out[i] = a[i] ^ b[i];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unencrypted_key_is_plaintext_identity() {
        let keys = XexKeys::unencrypted();
        let plaintext = *b"0123456789abcdef";
        assert_eq!(keys.encrypt_block(0, &plaintext), plaintext);
    }

    #[test]
    fn round_trips() {
        let keys = XexKeys::new([0x11; 16], [0x22; 16]);
        let plaintext = *b"supersecretdata!";
        let ct = keys.encrypt_block(3, &plaintext);
        assert_ne!(ct, plaintext);
        let pt = keys.decrypt_block(3, &ct);
        assert_eq!(pt, plaintext);
    }

    #[test]
    fn same_plaintext_different_offsets_differ() {
        let keys = XexKeys::new([0x33; 16], [0x44; 16]);
        let plaintext = [0x00u8; 16];
        let ct0 = keys.encrypt_block(0, &plaintext);
        let ct1 = keys.encrypt_block(1, &plaintext);
        assert_ne!(ct0, ct1);
    }

    #[test]
    fn multi_block_round_trip() {
        let keys = XexKeys::new([0xAB; 16], [0xCD; 16]);
        let data = vec![0x5Au8; 48];
        let ct = keys.encrypt(0, &data);
        let pt = keys.decrypt(0, &ct);
        assert_eq!(pt, data);
    }
}
