//! Wallet lifecycle, handle→key mapping, and password-derived encryption.
//!
//! Errors use a flat enum rather than nested error types, and the
//! generate/address/balance lifecycle mirrors a typical wallet-file CLI,
//! here exposed through `bin/wallet_sim.rs` instead of owning its own
//! binary entry point.

pub mod record;

use thiserror::Error;
use zeroize::Zeroizing;

use crate::bip32::{ChildIndex, ExtendedKey};
use crate::config::DeviceConfig;
use crate::curve::AffinePoint;
use crate::field::BigInt256;
use crate::hash::hash160;
use crate::storage::{Partition, Storage, StorageError};
use crate::xex::{XexKeys, BLOCK_LEN};
use record::{WalletRecord, ENCRYPTION_BOUNDARY};
pub use record::VersionTag;

/// Re-exported so `config`/`storage` can size themselves off one constant.
pub const WALLET_RECORD_LEN: usize = record::WALLET_RECORD_LEN;

/// An address handle: a 32-bit integer in `[1, num_addresses]`. `0` and the
/// top two values are reserved "bad handle" sentinels.
pub type AddressHandle = u32;

pub const BAD_HANDLE_ZERO: AddressHandle = 0;
pub const BAD_HANDLE_MAX: AddressHandle = 0xFFFF_FFFF;
pub const BAD_HANDLE_MAX_MINUS_ONE: AddressHandle = 0xFFFF_FFFE;

fn is_reserved_handle(handle: AddressHandle) -> bool {
    handle == BAD_HANDLE_ZERO || handle == BAD_HANDLE_MAX || handle == BAD_HANDLE_MAX_MINUS_ONE
}

/// Failure taxonomy for wallet operations. `Ok` is
/// represented by `Result::Ok` rather than a variant here, following this
/// crate's idiomatic-Rust error style throughout.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum WalletError {
    #[error("wallet slot is at its address limit")]
    Full,
    #[error("no wallet is loaded")]
    Empty,
    #[error("storage read failed")]
    ReadError,
    #[error("storage write failed")]
    WriteError,
    #[error("slot holds no valid wallet (wrong password, or corrupted/absent record)")]
    NotThere,
    #[error("operation requires a loaded wallet")]
    NotLoaded,
    #[error("address handle is out of range or reserved")]
    InvalidHandle,
    #[error("backup operation failed")]
    BackupError,
    #[error("hardware RNG self-test is failing")]
    RngFailure,
    #[error("wallet slot index is out of range")]
    InvalidWalletNum,
    #[error("operation is not valid in the wallet's current state")]
    InvalidOperation,
    #[error("a wallet already exists in this slot")]
    AlreadyExists,
    #[error("derived address/public key is structurally invalid")]
    BadAddress,
}

impl From<StorageError> for WalletError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::InvalidAddress => WalletError::ReadError,
            StorageError::IoError => WalletError::ReadError,
        }
    }
}

/// An address/public-key pair, as returned by `get_address_and_public_key`.
pub struct AddressInfo {
    pub handle: AddressHandle,
    pub public_key: AffinePoint,
    /// `hash160(uncompressed pubkey)`; callers (the `address` module) apply
    /// base58check + version byte to produce the display string.
    pub pubkey_hash: [u8; 20],
}

enum WalletState {
    Unloaded,
    Loaded { num_addresses: u32 },
}

/// A wallet bound to one slot of a `Storage` backend. `new_wallet`/
/// `init_wallet` move the wallet from `Unloaded` to `Loaded`; `uninit_wallet`
/// (and every error path that would otherwise leave key material installed)
/// moves it back, zeroising keys on every release path.
pub struct Wallet<S: Storage> {
    storage: S,
    config: DeviceConfig,
    slot: u32,
    state: WalletState,
    keys: Option<XexKeys>,
}

impl<S: Storage> Wallet<S> {
    pub fn new(storage: S, config: DeviceConfig, slot: u32) -> Result<Self, WalletError> {
        if slot >= config.num_wallet_slots {
            return Err(WalletError::InvalidWalletNum);
        }
        Ok(Wallet {
            storage,
            config,
            slot,
            state: WalletState::Unloaded,
            keys: None,
        })
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state, WalletState::Loaded { .. })
    }

    pub fn slot(&self) -> u32 {
        self.slot
    }

    /// Rebinds this `Wallet` to a different slot of the same storage
    /// backend, releasing any wallet currently loaded. Used by the protocol
    /// dispatch layer, which holds one storage backend shared across every
    /// `LoadWallet slot=...` request rather than one `Wallet` per slot.
    pub fn switch_slot(&mut self, slot: u32) -> Result<(), WalletError> {
        if slot >= self.config.num_wallet_slots {
            return Err(WalletError::InvalidWalletNum);
        }
        self.uninit_wallet();
        self.slot = slot;
        Ok(())
    }

    fn offset(&self) -> u32 {
        self.slot * WALLET_RECORD_LEN as u32
    }

    fn read_record_plaintext(&mut self) -> Result<[u8; WALLET_RECORD_LEN], WalletError> {
        let mut buf = [0u8; WALLET_RECORD_LEN];
        self.storage
            .read(Partition::Accounts, self.offset(), &mut buf)
            .map_err(|_| WalletError::ReadError)?;
        Ok(buf)
    }

    /// Decrypts the encrypted portion (`[48, 160)`) of a raw record buffer
    /// in place, under `keys`.
    fn decrypt_tail(keys: &XexKeys, raw: &[u8; WALLET_RECORD_LEN]) -> [u8; WALLET_RECORD_LEN] {
        let mut out = *raw;
        let tail = &raw[ENCRYPTION_BOUNDARY..];
        let first_block = (ENCRYPTION_BOUNDARY / BLOCK_LEN) as u32;
        let plain_tail = keys.decrypt(first_block, tail);
        out[ENCRYPTION_BOUNDARY..].copy_from_slice(&plain_tail);
        out
    }

    fn encrypt_tail(keys: &XexKeys, plaintext: &[u8; WALLET_RECORD_LEN]) -> [u8; WALLET_RECORD_LEN] {
        let mut out = *plaintext;
        let tail = &plaintext[ENCRYPTION_BOUNDARY..];
        let first_block = (ENCRYPTION_BOUNDARY / BLOCK_LEN) as u32;
        let cipher_tail = keys.encrypt(first_block, tail);
        out[ENCRYPTION_BOUNDARY..].copy_from_slice(&cipher_tail);
        out
    }

    /// Derives the XEX key pair from a password, salted with the slot index
    /// and the (plaintext, readable-without-decryption) wallet name. Uses
    /// `scrypt` as the deterministic, deliberately slow KDF (see
    /// `DESIGN.md`).
    fn derive_keys(&self, password: &[u8], name: &[u8; 40]) -> XexKeys {
        let mut salt = Vec::with_capacity(4 + 40);
        salt.extend_from_slice(&self.slot.to_le_bytes());
        salt.extend_from_slice(name);

        let params = scrypt::Params::new(self.config.scrypt_log_n, self.config.scrypt_r, self.config.scrypt_p, 32)
            .expect("device config carries valid scrypt parameters");
        let mut output = Zeroizing::new([0u8; 32]);
        scrypt::scrypt(password, &salt, &params, &mut *output)
            .expect("scrypt output length matches the requested 32 bytes");

        let mut k1 = [0u8; 16];
        let mut k2 = [0u8; 16];
        k1.copy_from_slice(&output[..16]);
        k2.copy_from_slice(&output[16..]);
        XexKeys::new(k1, k2)
    }

    /// Creates a new wallet in this slot.
    /// `from_seed` is `Some(seed)` to restore a wallet from a known 64-byte
    /// seed, or `None` to have the caller's `rng` supply a fresh one.
    pub fn new_wallet(
        &mut self,
        name: &str,
        password: &[u8],
        from_seed: Option<[u8; 64]>,
        mut rng: impl FnMut(&mut [u8]) -> bool,
    ) -> Result<(), WalletError> {
        self.storage
            .sanitize(Partition::Accounts, self.offset(), WALLET_RECORD_LEN as u32, &mut rng)
            .map_err(|_| WalletError::WriteError)?;

        let mut padded_name = [b' '; 40];
        let bytes = name.as_bytes();
        let len = bytes.len().min(40);
        padded_name[..len].copy_from_slice(&bytes[..len]);

        let seed = match from_seed {
            Some(s) => s,
            None => {
                let mut s = [0u8; 64];
                if !rng(&mut s) {
                    return Err(WalletError::RngFailure);
                }
                s
            }
        };

        let mut nonce = [0u8; 8];
        if !rng(&mut nonce) {
            return Err(WalletError::RngFailure);
        }

        let keys = self.derive_keys(password, &padded_name);
        let version = if keys.is_unencrypted() {
            VersionTag::Unencrypted
        } else {
            VersionTag::Encrypted
        };

        let mut record = WalletRecord {
            version,
            reserved_4: [0u8; 4],
            name: padded_name,
            num_addresses: 0,
            nonce,
            reserved_60: [0u8; 4],
            seed,
            checksum: [0u8; 32],
        };
        record.checksum = record.compute_checksum();

        let plaintext = record.to_plaintext_bytes();
        let on_disk = Self::encrypt_tail(&keys, &plaintext);

        self.storage
            .write(Partition::Accounts, self.offset(), &on_disk)
            .map_err(|_| WalletError::WriteError)?;
        self.storage.flush().map_err(|_| WalletError::WriteError)?;

        self.keys = Some(keys);
        self.state = WalletState::Loaded { num_addresses: 0 };
        Ok(())
    }

    /// Loads an existing wallet from this slot.
    pub fn init_wallet(&mut self, password: &[u8]) -> Result<(), WalletError> {
        let raw = self.read_record_plaintext()?;

        let mut version_bytes = [0u8; 4];
        version_bytes.copy_from_slice(&raw[0..4]);
        let version = VersionTag::from_u32(u32::from_le_bytes(version_bytes));
        if !version.is_valid_wallet() {
            return Err(WalletError::NotThere);
        }

        let mut name = [0u8; 40];
        name.copy_from_slice(&raw[8..48]);

        let keys = self.derive_keys(password, &name);
        let plaintext = Self::decrypt_tail(&keys, &raw);
        let record = WalletRecord::from_plaintext_bytes(&plaintext);

        if record.compute_checksum() != record.checksum {
            return Err(WalletError::NotThere);
        }

        self.keys = Some(keys);
        self.state = WalletState::Loaded {
            num_addresses: record.num_addresses,
        };
        Ok(())
    }

    /// Releases the loaded wallet, zeroising installed keys on every path.
    /// Keys are acquired by `init_wallet`/`new_wallet` and released by
    /// `uninit_wallet`, with guaranteed key-zeroisation on every release
    /// path.
    pub fn uninit_wallet(&mut self) {
        self.keys = None;
        self.state = WalletState::Unloaded;
    }

    fn require_loaded(&self) -> Result<(u32, &XexKeys), WalletError> {
        match (&self.state, &self.keys) {
            (WalletState::Loaded { num_addresses }, Some(keys)) => Ok((*num_addresses, keys)),
            _ => Err(WalletError::NotLoaded),
        }
    }

    /// Appends a new address, incrementing `num_addresses` and writing only
    /// the block holding the counter field back through (its
    /// checksum-invariance property means this does not need to recompute
    /// the checksum). The counter lives inside the encrypted region, so the
    /// containing block must be decrypted, patched, and re-encrypted rather
    /// than overwritten with a plaintext counter.
    pub fn make_new_address(&mut self) -> Result<AddressHandle, WalletError> {
        let (num_addresses, keys) = self.require_loaded()?;
        if num_addresses >= self.config.max_testing_addresses {
            return Err(WalletError::Full);
        }
        let keys = keys.clone();

        let new_count = num_addresses + 1;
        let block_offset = self.offset() + ENCRYPTION_BOUNDARY as u32;
        let first_block = (ENCRYPTION_BOUNDARY / BLOCK_LEN) as u32;

        let mut ciphertext = [0u8; BLOCK_LEN];
        self.storage
            .read(Partition::Accounts, block_offset, &mut ciphertext)
            .map_err(|_| WalletError::ReadError)?;
        let mut plaintext = keys.decrypt_block(first_block, &ciphertext);
        plaintext[..4].copy_from_slice(&new_count.to_le_bytes());
        let new_ciphertext = keys.encrypt_block(first_block, &plaintext);

        self.storage
            .write(Partition::Accounts, block_offset, &new_ciphertext)
            .map_err(|_| WalletError::WriteError)?;
        self.storage.flush().map_err(|_| WalletError::WriteError)?;

        self.state = WalletState::Loaded {
            num_addresses: new_count,
        };
        Ok(new_count)
    }

    pub fn get_num_addresses(&self) -> Result<u32, WalletError> {
        self.require_loaded().map(|(n, _)| n)
    }

    fn private_key_for_handle(&mut self, handle: AddressHandle) -> Result<BigInt256, WalletError> {
        let (num_addresses, keys) = self.require_loaded()?;
        if is_reserved_handle(handle) || handle == 0 || handle > num_addresses {
            return Err(WalletError::InvalidHandle);
        }

        let raw = self.read_record_plaintext()?;
        let plaintext = Self::decrypt_tail(keys, &raw);
        let record = WalletRecord::from_plaintext_bytes(&plaintext);

        let master = ExtendedKey::master(&record.seed);
        let node = master
            .derive_child(ChildIndex::hardened(handle))
            .map_err(|_| WalletError::BadAddress)?;
        Ok(node.private_key)
    }

    /// Derives the public key and address-hash for `handle`.
    pub fn get_address_and_public_key(&mut self, handle: AddressHandle) -> Result<AddressInfo, WalletError> {
        let private_key = self.private_key_for_handle(handle)?;
        let public_key = crate::curve::scalar_base_mul(&private_key).to_affine();
        let uncompressed = public_key.serialize(false);
        let pubkey_hash = hash160(&uncompressed);
        Ok(AddressInfo {
            handle,
            public_key,
            pubkey_hash,
        })
    }

    /// Derives the private key for `handle`. Key-revealing: callers at the
    /// protocol layer must have obtained consent (button + OTP) before
    /// calling this.
    pub fn get_private_key(&mut self, handle: AddressHandle) -> Result<BigInt256, WalletError> {
        self.private_key_for_handle(handle)
    }

    /// Returns the wallet's 64-byte generator seed, for a host-side backup.
    /// Key-revealing: callers must have obtained consent before calling this.
    pub fn get_seed(&mut self) -> Result<[u8; 64], WalletError> {
        let (_num_addresses, keys) = self.require_loaded()?;
        let raw = self.read_record_plaintext()?;
        let plaintext = Self::decrypt_tail(keys, &raw);
        let record = WalletRecord::from_plaintext_bytes(&plaintext);
        Ok(record.seed)
    }

    /// Re-encrypts the record's encrypted portion under a new password,
    /// updating the version tag between `Unencrypted`/`Encrypted` as
    /// appropriate, and rewrites the checksum.
    pub fn change_encryption_key(&mut self, new_password: &[u8]) -> Result<(), WalletError> {
        let (_num_addresses, keys) = self.require_loaded()?;
        let keys = keys.clone();
        let raw = self.read_record_plaintext()?;
        let mut plaintext = Self::decrypt_tail(&keys, &raw);
        let mut record = WalletRecord::from_plaintext_bytes(&plaintext);
        if record.compute_checksum() != record.checksum {
            return Err(WalletError::NotThere);
        }

        let name = record.name;
        let new_keys = self.derive_keys(new_password, &name);
        record.version = if new_keys.is_unencrypted() {
            VersionTag::Unencrypted
        } else {
            VersionTag::Encrypted
        };
        record.checksum = record.compute_checksum();
        plaintext = record.to_plaintext_bytes();

        let on_disk = Self::encrypt_tail(&new_keys, &plaintext);
        self.storage
            .write(Partition::Accounts, self.offset(), &on_disk)
            .map_err(|_| WalletError::WriteError)?;
        self.storage.flush().map_err(|_| WalletError::WriteError)?;

        self.keys = Some(new_keys);
        Ok(())
    }

    /// Rewrites the (unencrypted) name field and the checksum.
    pub fn change_wallet_name(&mut self, new_name: &str) -> Result<(), WalletError> {
        let (_num_addresses, keys) = self.require_loaded()?;
        let keys = keys.clone();
        let raw = self.read_record_plaintext()?;
        let plaintext = Self::decrypt_tail(&keys, &raw);
        let mut record = WalletRecord::from_plaintext_bytes(&plaintext);
        record.set_name(new_name);
        record.checksum = record.compute_checksum();

        let new_plaintext = record.to_plaintext_bytes();
        let on_disk = Self::encrypt_tail(&keys, &new_plaintext);
        self.storage
            .write(Partition::Accounts, self.offset(), &on_disk)
            .map_err(|_| WalletError::WriteError)?;
        self.storage.flush().map_err(|_| WalletError::WriteError)?;
        Ok(())
    }

    /// Reads `buf.len()` bytes from the `Global` partition (device UUID,
    /// entropy-pool state). `Wallet` is the sole holder of the `Storage`
    /// backend, so the protocol dispatch layer goes through it for the
    /// handful of non-wallet reads/writes it needs, rather than holding a
    /// second handle to the same backend.
    pub fn read_global(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), WalletError> {
        self.storage
            .read(Partition::Global, offset, buf)
            .map_err(Into::into)
    }

    pub fn write_global(&mut self, offset: u32, buf: &[u8]) -> Result<(), WalletError> {
        self.storage
            .write(Partition::Global, offset, buf)
            .map_err(Into::into)
    }

    pub fn flush_storage(&mut self) -> Result<(), WalletError> {
        self.storage.flush().map_err(Into::into)
    }

    /// Direct access to the backing `Storage`, for callers (the `wallet-sim`
    /// binary) that need backend-specific operations `Wallet` itself has no
    /// reason to expose, such as dumping/loading a `MemoryFlash` image.
    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    /// Lists every slot's unencrypted header (version tag + name), for
    /// its `ListWallets` message. Does not disturb this
    /// wallet's loaded/unloaded state.
    pub fn list_slots(&mut self) -> Result<Vec<(u32, VersionTag, String)>, WalletError> {
        let mut out = Vec::with_capacity(self.config.num_wallet_slots as usize);
        for slot in 0..self.config.num_wallet_slots {
            let mut header = [0u8; 48];
            self.storage
                .read(Partition::Accounts, slot * WALLET_RECORD_LEN as u32, &mut header)
                .map_err(|_| WalletError::ReadError)?;
            let mut version_bytes = [0u8; 4];
            version_bytes.copy_from_slice(&header[0..4]);
            let version = VersionTag::from_u32(u32::from_le_bytes(version_bytes));
            let mut name = [0u8; 40];
            name.copy_from_slice(&header[8..48]);
            let name = String::from_utf8_lossy(&name).trim_end().to_string();
            out.push((slot, version, name));
        }
        Ok(out)
    }

    /// Sanitises the slot, destroying the wallet.
    pub fn delete_wallet(&mut self, mut rng: impl FnMut(&mut [u8]) -> bool) -> Result<(), WalletError> {
        self.storage
            .sanitize(Partition::Accounts, self.offset(), WALLET_RECORD_LEN as u32, &mut rng)
            .map_err(|_| WalletError::WriteError)?;
        // Stamp the version field NothingThere so `list_wallets` cannot
        // misinterpret leftover random bytes as a valid wallet version.
        self.storage
            .write(
                Partition::Accounts,
                self.offset(),
                &VersionTag::NothingThere.to_u32().to_le_bytes(),
            )
            .map_err(|_| WalletError::WriteError)?;
        self.storage.flush().map_err(|_| WalletError::WriteError)?;
        self.uninit_wallet();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryFlash;

    fn fixed_rng(seed_byte: u8) -> impl FnMut(&mut [u8]) -> bool {
        move |buf: &mut [u8]| {
            for (i, b) in buf.iter_mut().enumerate() {
                *b = seed_byte.wrapping_add(i as u8);
            }
            true
        }
    }

    fn open_wallet() -> Wallet<MemoryFlash> {
        let config = DeviceConfig::default();
        let flash = MemoryFlash::for_device(config.num_wallet_slots);
        Wallet::new(flash, config, 0).unwrap()
    }

    #[test]
    fn lifecycle_seven_addresses_then_full() {
        let mut wallet = open_wallet();
        wallet
            .new_wallet("test", &[0u8; 0], Some([0u8; 64]), fixed_rng(1))
            .unwrap();

        let mut handles = Vec::new();
        let mut addresses = Vec::new();
        let mut pubkeys = Vec::new();
        for _ in 0..7 {
            let h = wallet.make_new_address().unwrap();
            handles.push(h);
            let info = wallet.get_address_and_public_key(h).unwrap();
            addresses.push(info.pubkey_hash);
            pubkeys.push(info.public_key.serialize(true));
        }

        assert_eq!(wallet.get_num_addresses().unwrap(), 7);

        let mut unique_addresses = addresses.clone();
        unique_addresses.sort();
        unique_addresses.dedup();
        assert_eq!(unique_addresses.len(), 7, "addresses must be pairwise distinct");

        let mut unique_pubkeys = pubkeys.clone();
        unique_pubkeys.sort();
        unique_pubkeys.dedup();
        assert_eq!(unique_pubkeys.len(), 7, "public keys must be pairwise distinct");

        let err = wallet.make_new_address().unwrap_err();
        assert_eq!(err, WalletError::Full);
    }

    #[test]
    fn wrong_password_reports_not_there() {
        let mut wallet = open_wallet();
        wallet
            .new_wallet("secret", b"correct horse", Some([3u8; 64]), fixed_rng(5))
            .unwrap();
        wallet.uninit_wallet();

        let err = wallet.init_wallet(b"wrong password").unwrap_err();
        assert_eq!(err, WalletError::NotThere);
    }

    #[test]
    fn init_wallet_round_trips_with_correct_password() {
        let mut wallet = open_wallet();
        wallet
            .new_wallet("secret", b"hunter2", Some([9u8; 64]), fixed_rng(2))
            .unwrap();
        wallet.make_new_address().unwrap();
        wallet.uninit_wallet();

        wallet.init_wallet(b"hunter2").unwrap();
        assert_eq!(wallet.get_num_addresses().unwrap(), 1);
    }

    #[test]
    fn invalid_handle_rejected() {
        let mut wallet = open_wallet();
        wallet
            .new_wallet("test", &[], Some([0u8; 64]), fixed_rng(1))
            .unwrap();
        wallet.make_new_address().unwrap();

        assert_eq!(
            wallet.get_private_key(BAD_HANDLE_ZERO).unwrap_err(),
            WalletError::InvalidHandle
        );
        assert_eq!(
            wallet.get_private_key(BAD_HANDLE_MAX).unwrap_err(),
            WalletError::InvalidHandle
        );
        assert_eq!(
            wallet.get_private_key(2).unwrap_err(),
            WalletError::InvalidHandle
        );
    }

    #[test]
    fn delete_wallet_then_init_fails() {
        let mut wallet = open_wallet();
        wallet
            .new_wallet("test", &[], Some([0u8; 64]), fixed_rng(1))
            .unwrap();
        wallet.delete_wallet(fixed_rng(9)).unwrap();

        let err = wallet.init_wallet(&[]).unwrap_err();
        assert_eq!(err, WalletError::NotThere);
    }

    #[test]
    fn change_wallet_name_preserves_addresses() {
        let mut wallet = open_wallet();
        wallet
            .new_wallet("old-name", &[], Some([4u8; 64]), fixed_rng(3))
            .unwrap();
        wallet.make_new_address().unwrap();
        wallet.change_wallet_name("new-name").unwrap();
        assert_eq!(wallet.get_num_addresses().unwrap(), 1);
    }

    #[test]
    fn switch_slot_unloads_current_wallet() {
        let mut wallet = open_wallet();
        wallet
            .new_wallet("test", &[], Some([0u8; 64]), fixed_rng(1))
            .unwrap();
        assert!(wallet.is_loaded());
        wallet.switch_slot(1).unwrap();
        assert!(!wallet.is_loaded());
        assert_eq!(wallet.slot(), 1);
    }

    #[test]
    fn get_seed_returns_original_seed() {
        let mut wallet = open_wallet();
        let seed = [0x5Au8; 64];
        wallet
            .new_wallet("test", &[], Some(seed), fixed_rng(1))
            .unwrap();
        assert_eq!(wallet.get_seed().unwrap(), seed);
    }

    #[test]
    fn change_encryption_key_then_old_password_fails() {
        let mut wallet = open_wallet();
        wallet
            .new_wallet("test", b"old-pw", Some([6u8; 64]), fixed_rng(4))
            .unwrap();
        wallet.make_new_address().unwrap();
        wallet.change_encryption_key(b"new-pw").unwrap();
        wallet.uninit_wallet();

        assert_eq!(wallet.init_wallet(b"old-pw").unwrap_err(), WalletError::NotThere);
        wallet.init_wallet(b"new-pw").unwrap();
        assert_eq!(wallet.get_num_addresses().unwrap(), 1);
    }
}
