//! Non-volatile storage abstraction.
//!
//! The real flash driver is an external collaborator; this
//! module defines the `Storage` trait that `Wallet` is generic over, as a
//! trait object callers can swap between real flash and an in-memory
//! double, generalised to raw partitioned byte access rather than any one
//! record type.

pub mod memory;

use thiserror::Error;

/// The two storage partitions this crate needs: `Global` (device
/// UUID, entropy-pool state) and `Accounts` (wallet records, one per slot).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    Global,
    Accounts,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    #[error("read or write address is outside the partition's bounds")]
    InvalidAddress,
    #[error("underlying I/O failure")]
    IoError,
}

/// Non-volatile storage contract: `read`/`write` against a
/// partition at a byte offset, plus an explicit `flush` that callers must
/// invoke before any operation whose correctness depends on durability
/// (version update, checksum update, address-count update).
pub trait Storage: std::fmt::Debug {
    fn read(&mut self, partition: Partition, offset: u32, buf: &mut [u8]) -> Result<(), StorageError>;
    fn write(&mut self, partition: Partition, offset: u32, buf: &[u8]) -> Result<(), StorageError>;
    fn flush(&mut self) -> Result<(), StorageError>;

    /// Sanitises `len` bytes at `offset` within `partition` via four passes
    /// (zero, all-ones, random, random). `rng` supplies the random passes;
    /// a hardware RNG failure is surfaced by `rng` returning `false` and
    /// this call failing with `IoError`, matching `get_random_256`'s
    /// self-test failure contract.
    fn sanitize(
        &mut self,
        partition: Partition,
        offset: u32,
        len: u32,
        mut rng: impl FnMut(&mut [u8]) -> bool,
    ) -> Result<(), StorageError> {
        let len_usize = len as usize;
        let zero = vec![0x00u8; len_usize];
        self.write(partition, offset, &zero)?;
        self.flush()?;

        let ones = vec![0xFFu8; len_usize];
        self.write(partition, offset, &ones)?;
        self.flush()?;

        for _ in 0..2 {
            let mut random = vec![0u8; len_usize];
            if !rng(&mut random) {
                return Err(StorageError::IoError);
            }
            self.write(partition, offset, &random)?;
            self.flush()?;
        }

        Ok(())
    }
}
