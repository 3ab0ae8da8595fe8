//! On-disk `WalletRecord` layout.
//!
//! ```text
//! offset  bytes  field                          encrypted?
//! 0       4      version tag                     no
//! 4       4      reserved                        no
//! 8       40     wallet name (space-padded)       no
//! 48      4      number of addresses (LE)         yes
//! 52      8      unique random nonce              yes
//! 60      4      reserved                         yes
//! 64      64     deterministic-generator seed      yes
//! 128     32     SHA-256 checksum of all other bytes (excl. offset 48..52
//!                 and the checksum field itself)    yes
//! ```

pub const WALLET_RECORD_LEN: usize = 160;

const VERSION_OFFSET: usize = 0;
const RESERVED_4_OFFSET: usize = 4;
const NAME_OFFSET: usize = 8;
const NAME_LEN: usize = 40;
const NUM_ADDRESSES_OFFSET: usize = 48;
const NONCE_OFFSET: usize = 52;
const RESERVED_60_OFFSET: usize = 60;
const SEED_OFFSET: usize = 64;
const SEED_LEN: usize = 64;
const CHECKSUM_OFFSET: usize = 128;
const CHECKSUM_LEN: usize = 32;

/// The unencrypted boundary: bytes `[0, ENCRYPTION_BOUNDARY)` are plaintext,
/// `[ENCRYPTION_BOUNDARY, WALLET_RECORD_LEN)` are XEX-encrypted 16-byte
/// blocks. The boundary sits exactly at offset 48.
pub const ENCRYPTION_BOUNDARY: usize = 48;

/// `version` field tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionTag {
    NothingThere,
    Unencrypted,
    Encrypted,
    Unknown(u32),
}

impl VersionTag {
    const NOTHING_THERE: u32 = 0;
    const UNENCRYPTED: u32 = 1;
    const ENCRYPTED: u32 = 2;

    pub fn to_u32(self) -> u32 {
        match self {
            VersionTag::NothingThere => Self::NOTHING_THERE,
            VersionTag::Unencrypted => Self::UNENCRYPTED,
            VersionTag::Encrypted => Self::ENCRYPTED,
            VersionTag::Unknown(v) => v,
        }
    }

    pub fn from_u32(v: u32) -> Self {
        match v {
            Self::NOTHING_THERE => VersionTag::NothingThere,
            Self::UNENCRYPTED => VersionTag::Unencrypted,
            Self::ENCRYPTED => VersionTag::Encrypted,
            other => VersionTag::Unknown(other),
        }
    }

    pub fn is_valid_wallet(self) -> bool {
        matches!(self, VersionTag::Unencrypted | VersionTag::Encrypted)
    }
}

/// A decoded `WalletRecord`, used as the in-memory staging area before
/// writing bytes back through `Storage`+XEX. Never persisted as a Rust
/// struct — only the byte layout above is on disk.
pub struct WalletRecord {
    pub version: VersionTag,
    /// Reserved bytes at offset 4 (plaintext). Always zero today, but
    /// `compute_checksum` hashes whatever is actually here rather than
    /// assuming zero, so a future use of this field doesn't silently widen
    /// what the checksum covers.
    pub reserved_4: [u8; 4],
    pub name: [u8; NAME_LEN],
    pub num_addresses: u32,
    pub nonce: [u8; 8],
    /// Reserved bytes at offset 60 (encrypted). See `reserved_4`.
    pub reserved_60: [u8; 4],
    pub seed: [u8; SEED_LEN],
    pub checksum: [u8; CHECKSUM_LEN],
}

impl WalletRecord {
    pub fn name_str(&self) -> String {
        String::from_utf8_lossy(&self.name).trim_end().to_string()
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = [b' '; NAME_LEN];
        let bytes = name.as_bytes();
        let len = bytes.len().min(NAME_LEN);
        self.name[..len].copy_from_slice(&bytes[..len]);
    }

    /// Computes the checksum over every byte of the record except the
    /// number-of-addresses field and the checksum field itself. This lets
    /// `make_new_address` append by rewriting only the counter, without
    /// recomputing the checksum.
    pub fn compute_checksum(&self) -> [u8; 32] {
        let mut buf = Vec::with_capacity(WALLET_RECORD_LEN - 4 - CHECKSUM_LEN);
        buf.extend_from_slice(&self.version.to_u32().to_le_bytes());
        buf.extend_from_slice(&self.reserved_4);
        buf.extend_from_slice(&self.name);
        buf.extend_from_slice(&self.nonce);
        buf.extend_from_slice(&self.reserved_60);
        buf.extend_from_slice(&self.seed);
        crate::hash::sha256(&buf)
    }

    /// Serialises to the exact 160-byte on-disk layout (plaintext; the
    /// caller is responsible for XEX-encrypting bytes `[48, 160)` before
    /// writing to `Storage`).
    pub fn to_plaintext_bytes(&self) -> [u8; WALLET_RECORD_LEN] {
        let mut out = [0u8; WALLET_RECORD_LEN];
        out[VERSION_OFFSET..VERSION_OFFSET + 4].copy_from_slice(&self.version.to_u32().to_le_bytes());
        out[RESERVED_4_OFFSET..RESERVED_4_OFFSET + 4].copy_from_slice(&self.reserved_4);
        out[NAME_OFFSET..NAME_OFFSET + NAME_LEN].copy_from_slice(&self.name);
        out[NUM_ADDRESSES_OFFSET..NUM_ADDRESSES_OFFSET + 4]
            .copy_from_slice(&self.num_addresses.to_le_bytes());
        out[NONCE_OFFSET..NONCE_OFFSET + 8].copy_from_slice(&self.nonce);
        out[RESERVED_60_OFFSET..RESERVED_60_OFFSET + 4].copy_from_slice(&self.reserved_60);
        out[SEED_OFFSET..SEED_OFFSET + SEED_LEN].copy_from_slice(&self.seed);
        out[CHECKSUM_OFFSET..CHECKSUM_OFFSET + CHECKSUM_LEN].copy_from_slice(&self.checksum);
        out
    }

    pub fn from_plaintext_bytes(bytes: &[u8; WALLET_RECORD_LEN]) -> Self {
        let mut version_bytes = [0u8; 4];
        version_bytes.copy_from_slice(&bytes[VERSION_OFFSET..VERSION_OFFSET + 4]);
        let version = VersionTag::from_u32(u32::from_le_bytes(version_bytes));

        let mut reserved_4 = [0u8; 4];
        reserved_4.copy_from_slice(&bytes[RESERVED_4_OFFSET..RESERVED_4_OFFSET + 4]);

        let mut name = [0u8; NAME_LEN];
        name.copy_from_slice(&bytes[NAME_OFFSET..NAME_OFFSET + NAME_LEN]);

        let mut num_addresses_bytes = [0u8; 4];
        num_addresses_bytes.copy_from_slice(&bytes[NUM_ADDRESSES_OFFSET..NUM_ADDRESSES_OFFSET + 4]);
        let num_addresses = u32::from_le_bytes(num_addresses_bytes);

        let mut nonce = [0u8; 8];
        nonce.copy_from_slice(&bytes[NONCE_OFFSET..NONCE_OFFSET + 8]);

        let mut reserved_60 = [0u8; 4];
        reserved_60.copy_from_slice(&bytes[RESERVED_60_OFFSET..RESERVED_60_OFFSET + 4]);

        let mut seed = [0u8; SEED_LEN];
        seed.copy_from_slice(&bytes[SEED_OFFSET..SEED_OFFSET + SEED_LEN]);

        let mut checksum = [0u8; CHECKSUM_LEN];
        checksum.copy_from_slice(&bytes[CHECKSUM_OFFSET..CHECKSUM_OFFSET + CHECKSUM_LEN]);

        WalletRecord {
            version,
            reserved_4,
            name,
            num_addresses,
            nonce,
            reserved_60,
            seed,
            checksum,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_is_stable_under_address_count_change() {
        let mut record = WalletRecord {
            version: VersionTag::Unencrypted,
            reserved_4: [0u8; 4],
            name: [b' '; NAME_LEN],
            num_addresses: 0,
            nonce: [7u8; 8],
            reserved_60: [0u8; 4],
            seed: [9u8; SEED_LEN],
            checksum: [0u8; CHECKSUM_LEN],
        };
        record.set_name("test");
        let checksum_before = record.compute_checksum();
        record.num_addresses += 1;
        let checksum_after = record.compute_checksum();
        assert_eq!(checksum_before, checksum_after);
    }

    #[test]
    fn round_trip_plaintext_bytes() {
        let mut record = WalletRecord {
            version: VersionTag::Encrypted,
            reserved_4: [0u8; 4],
            name: [b' '; NAME_LEN],
            num_addresses: 3,
            nonce: [1u8; 8],
            reserved_60: [0u8; 4],
            seed: [2u8; SEED_LEN],
            checksum: [0u8; CHECKSUM_LEN],
        };
        record.set_name("wallet-a");
        record.checksum = record.compute_checksum();
        let bytes = record.to_plaintext_bytes();
        let parsed = WalletRecord::from_plaintext_bytes(&bytes);
        assert_eq!(parsed.name_str(), "wallet-a");
        assert_eq!(parsed.num_addresses, 3);
        assert_eq!(parsed.checksum, record.checksum);
    }

    #[test]
    fn version_tag_round_trips() {
        assert!(VersionTag::Unencrypted.is_valid_wallet());
        assert!(VersionTag::Encrypted.is_valid_wallet());
        assert!(!VersionTag::NothingThere.is_valid_wallet());
        assert_eq!(VersionTag::from_u32(0), VersionTag::NothingThere);
    }
}
