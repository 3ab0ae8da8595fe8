//! In-memory flash emulator, used for tests and the `wallet-sim` binary.
//! A plain `Vec<u8>`-backed double implementing `Storage`, standing in for
//! real flash the same way an in-memory store stands in for a database in
//! integration tests.

use std::collections::HashMap;

use super::{Partition, Storage, StorageError};

/// A fixed-size in-memory byte array per partition. Real flash has a much
/// larger address space; this backend sizes each partition generously
/// enough for the `Accounts` partition to hold `DeviceConfig::num_wallet_slots`
/// wallet records plus the `Global` partition's UUID/entropy-state fields.
#[derive(Debug)]
pub struct MemoryFlash {
    partitions: HashMap<Partition, Vec<u8>>,
}

impl MemoryFlash {
    /// `global_size`/`accounts_size` in bytes.
    pub fn new(global_size: usize, accounts_size: usize) -> Self {
        let mut partitions = HashMap::new();
        partitions.insert(Partition::Global, vec![0u8; global_size]);
        partitions.insert(Partition::Accounts, vec![0u8; accounts_size]);
        MemoryFlash { partitions }
    }

    /// Convenience constructor sized for `num_wallet_slots` 160-byte wallet
    /// records plus a small `Global` partition.
    pub fn for_device(num_wallet_slots: u32) -> Self {
        Self::new(256, num_wallet_slots as usize * crate::wallet::WALLET_RECORD_LEN)
    }

    /// Raw contents of one partition, for `wallet-sim`'s file-backed
    /// persistence between process invocations (the real device's flash
    /// is of course already durable across resets).
    pub fn partition_bytes(&self, partition: Partition) -> &[u8] {
        &self.partitions[&partition]
    }

    /// Overwrites the leading `bytes.len().min(partition size)` bytes of
    /// `partition`, used to restore a `wallet-sim` session from disk.
    pub fn load_partition(&mut self, partition: Partition, bytes: &[u8]) {
        if let Some(buf) = self.partitions.get_mut(&partition) {
            let n = buf.len().min(bytes.len());
            buf[..n].copy_from_slice(&bytes[..n]);
        }
    }
}

impl Storage for MemoryFlash {
    fn read(&mut self, partition: Partition, offset: u32, buf: &mut [u8]) -> Result<(), StorageError> {
        let backing = self.partitions.get(&partition).ok_or(StorageError::IoError)?;
        let start = offset as usize;
        let end = start.checked_add(buf.len()).ok_or(StorageError::InvalidAddress)?;
        if end > backing.len() {
            return Err(StorageError::InvalidAddress);
        }
        buf.copy_from_slice(&backing[start..end]);
        Ok(())
    }

    fn write(&mut self, partition: Partition, offset: u32, buf: &[u8]) -> Result<(), StorageError> {
        let backing = self.partitions.get_mut(&partition).ok_or(StorageError::IoError)?;
        let start = offset as usize;
        let end = start.checked_add(buf.len()).ok_or(StorageError::InvalidAddress)?;
        if end > backing.len() {
            return Err(StorageError::InvalidAddress);
        }
        backing[start..end].copy_from_slice(buf);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), StorageError> {
        // In-memory backend has no write buffering to drain.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let mut flash = MemoryFlash::new(64, 320);
        flash.write(Partition::Accounts, 0, &[1, 2, 3, 4]).unwrap();
        let mut buf = [0u8; 4];
        flash.read(Partition::Accounts, 0, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);
    }

    #[test]
    fn out_of_bounds_is_invalid_address() {
        let mut flash = MemoryFlash::new(64, 320);
        let mut buf = [0u8; 8];
        let err = flash.read(Partition::Accounts, 316, &mut buf).unwrap_err();
        assert_eq!(err, StorageError::InvalidAddress);
    }

    #[test]
    fn sanitize_leaves_zeroed_region_after_last_pass_kind() {
        let mut flash = MemoryFlash::new(64, 320);
        flash.write(Partition::Accounts, 0, &[0xAA; 16]).unwrap();
        let mut counter = 0u8;
        flash
            .sanitize(Partition::Accounts, 0, 16, |buf| {
                for b in buf.iter_mut() {
                    *b = counter;
                }
                counter = counter.wrapping_add(1);
                true
            })
            .unwrap();
        let mut buf = [0u8; 16];
        flash.read(Partition::Accounts, 0, &mut buf).unwrap();
        assert_eq!(buf, [1u8; 16]);
    }

    #[test]
    fn sanitize_propagates_rng_failure() {
        let mut flash = MemoryFlash::new(64, 320);
        let err = flash
            .sanitize(Partition::Accounts, 0, 16, |_| false)
            .unwrap_err();
        assert_eq!(err, StorageError::IoError);
    }
}
