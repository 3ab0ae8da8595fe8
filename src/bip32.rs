//! BIP32 hierarchical deterministic key derivation.

use zeroize::Zeroizing;

use crate::curve::{scalar_base_mul, AffinePoint};
use crate::field::{BigInt256, Field};
use crate::hash::hmac_sha512;

/// A derivation path step. The high bit of the wrapped index marks
/// "hardened" derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildIndex(pub u32);

const HARDENED_BIT: u32 = 0x8000_0000;

impl ChildIndex {
    pub fn normal(index: u32) -> Self {
        assert!(index & HARDENED_BIT == 0, "index already has the hardened bit set");
        ChildIndex(index)
    }

    pub fn hardened(index: u32) -> Self {
        assert!(index & HARDENED_BIT == 0, "index must be < 2^31");
        ChildIndex(index | HARDENED_BIT)
    }

    pub fn is_hardened(self) -> bool {
        self.0 & HARDENED_BIT != 0
    }
}

/// A BIP32 node: a private key plus the chain code needed to derive its
/// children.
pub struct ExtendedKey {
    pub private_key: BigInt256,
    pub chain_code: Zeroizing<[u8; 32]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Bip32Error {
    /// `I_L >= n`, or `(I_L + k_par) mod n == 0`. The probability is
    /// astronomically low; failure is a permanent error for that path.
    #[error("derived key material is invalid for this index; try the next index")]
    InvalidChildKey,
}

impl ExtendedKey {
    /// `seed_to_master(seed)`: HMAC-SHA-512 with key `"Bitcoin seed"` over
    /// the seed bytes; left 32 bytes are the master private key, right 32
    /// are the chain code.
    pub fn master(seed: &[u8]) -> Self {
        let i = hmac_sha512(b"Bitcoin seed", seed);
        let mut private_key_bytes = [0u8; 32];
        private_key_bytes.copy_from_slice(&i[..32]);
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&i[32..]);

        ExtendedKey {
            private_key: BigInt256::from_bytes_be(&private_key_bytes),
            chain_code: Zeroizing::new(chain_code),
        }
    }

    pub fn public_key(&self) -> AffinePoint {
        scalar_base_mul(&self.private_key).to_affine()
    }

    /// Serialises this node as a master extended private key
    /// (`version=0x0488ADE4, depth=0, parent fingerprint=0, child
    /// number=0`), base58check-encoded. Only ever called on the result of
    /// `ExtendedKey::master`; non-root nodes would need the caller to track
    /// depth/parent-fingerprint/child-number themselves, which this crate's
    /// protocol surface has no use for beyond the master key.
    pub fn to_master_xprv(&self) -> String {
        const VERSION_MAINNET_PRIVATE: [u8; 4] = [0x04, 0x88, 0xAD, 0xE4];
        let mut payload = Vec::with_capacity(78 + 4);
        payload.extend_from_slice(&VERSION_MAINNET_PRIVATE);
        payload.push(0); // depth
        payload.extend_from_slice(&[0u8; 4]); // parent fingerprint
        payload.extend_from_slice(&[0u8; 4]); // child number
        payload.extend_from_slice(&*self.chain_code);
        payload.push(0);
        payload.extend_from_slice(&self.private_key.to_bytes_be());

        let checksum = crate::hash::sha256d(&payload);
        payload.extend_from_slice(&checksum[..4]);
        bs58::encode(payload).into_string()
    }

    /// Derives one child:
    ///
    /// - hardened: `data = 0x00 || privkey || be(index)`;
    /// - non-hardened: `data = serialise_compressed(privkey * G) || be(index)`;
    /// - `I = HMAC-SHA-512(chain_code, data)`; `I_L` becomes the child's key
    ///   offset, `I_R` its chain code.
    pub fn derive_child(&self, index: ChildIndex) -> Result<ExtendedKey, Bip32Error> {
        let mut data = Vec::with_capacity(37);
        if index.is_hardened() {
            data.push(0x00);
            data.extend_from_slice(&self.private_key.to_bytes_be());
        } else {
            data.extend_from_slice(&self.public_key().serialize(true));
        }
        data.extend_from_slice(&index.0.to_be_bytes());

        let i = hmac_sha512(&*self.chain_code, &data);
        let mut il_bytes = [0u8; 32];
        il_bytes.copy_from_slice(&i[..32]);
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&i[32..]);

        let il = BigInt256::from_bytes_be(&il_bytes);
        let n = Field::N.modulus();
        if il.compare(&n) != std::cmp::Ordering::Less {
            return Err(Bip32Error::InvalidChildKey);
        }

        let child_key = il.add_mod(&self.private_key, Field::N);
        if bool::from(child_key.is_zero()) {
            return Err(Bip32Error::InvalidChildKey);
        }

        Ok(ExtendedKey {
            private_key: child_key,
            chain_code: Zeroizing::new(chain_code),
        })
    }

    /// Walks an entire derivation path one index at a time, failing
    /// permanently if any step's child key is invalid.
    pub fn derive_path(&self, path: &[ChildIndex]) -> Result<ExtendedKey, Bip32Error> {
        let mut node = ExtendedKey {
            private_key: self.private_key,
            chain_code: Zeroizing::new(*self.chain_code),
        };
        for &index in path {
            node = node.derive_child(index)?;
        }
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn master_from_seed_is_deterministic() {
        let seed: Vec<u8> = (0u8..=0x0f).collect();
        let a = ExtendedKey::master(&seed);
        let b = ExtendedKey::master(&seed);
        assert_eq!(a.private_key, b.private_key);
        assert_eq!(*a.chain_code, *b.chain_code);
    }

    #[test]
    fn hardened_and_normal_children_differ() {
        let seed: Vec<u8> = (0u8..=0x0f).collect();
        let master = ExtendedKey::master(&seed);
        let normal = master.derive_child(ChildIndex::normal(0)).unwrap();
        let hardened = master.derive_child(ChildIndex::hardened(0)).unwrap();
        assert_ne!(normal.private_key, hardened.private_key);
    }

    #[test]
    fn path_of_length_zero_is_identity() {
        let seed: Vec<u8> = (0u8..=0x0f).collect();
        let master = ExtendedKey::master(&seed);
        let same = master.derive_path(&[]).unwrap();
        assert_eq!(master.private_key, same.private_key);
    }

    #[test]
    fn child_index_hardened_bit() {
        assert!(ChildIndex::hardened(5).is_hardened());
        assert!(!ChildIndex::normal(5).is_hardened());
        assert_eq!(ChildIndex::hardened(5).0, 0x8000_0005);
    }

    #[test]
    fn master_xprv_matches_reference_vector() {
        let seed: Vec<u8> = (0u8..=0x0f).collect();
        let master = ExtendedKey::master(&seed);
        assert_eq!(
            master.to_master_xprv(),
            "xprv9s21ZrQH143K3QTDL4LXw2F7HEK3wJUD2nW2nRk4stbPy6cq3jPPqjiChkVvvNKmPGJxWUtg6LnF5kejMRNNU3TGtRBeJgk33yuGBxrMPHi"
        );
    }
}
