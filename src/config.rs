//! Device configuration: implementation-defined limits and logging setup.
//!
//! Several limits are intentionally implementation-defined rather than fixed
//! by the protocol (the maximum number of addresses a wallet can hold,
//! `MAX_INPUTS`/`MAX_OUTPUTS` for the transaction parser,
//! `MAX_TRANSACTION_SIZE`). `DeviceConfig` pins concrete values for those,
//! with a `Config`/`Default`/`from_file`/`to_file` shape matching how other
//! device-wide tunables get loaded and persisted.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// secp256k1/BIP62 network version bytes for P2PKH/P2SH address encoding.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
}

impl Network {
    pub fn pubkey_hash_version(self) -> u8 {
        match self {
            Network::Mainnet => 0x00,
            Network::Testnet => 0x6f,
        }
    }

    pub fn script_hash_version(self) -> u8 {
        match self {
            Network::Mainnet => 0x05,
            Network::Testnet => 0xc4,
        }
    }
}

/// Implementation-defined device limits referenced throughout this crate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Network whose version bytes `address` encoding uses.
    pub network: Network,

    /// Hard ceiling on addresses held by a single wallet slot during testing:
    /// seven successful `new_wallet` calls, with an eighth returning `Full`.
    /// Production firmware would use a larger number; this crate's default
    /// models the documented test fixture.
    pub max_testing_addresses: u32,

    /// Absolute maximum addresses any wallet slot may ever hold, independent
    /// of the (smaller) testing limit above. The number of addresses never
    /// exceeds this implementation-defined maximum.
    pub max_addresses: u32,

    /// Number of wallet slots in the `Accounts` partition.
    pub num_wallet_slots: u32,

    /// `TxParser` input/output count ceilings.
    pub max_inputs: u32,
    pub max_outputs: u32,

    /// Hard ceiling on a transaction's total declared byte length. Two
    /// conflicting historical values exist (200,000 and 400,000); this
    /// crate uses the stricter one.
    pub max_transaction_size: u64,

    /// `scrypt` password-hashing cost parameter (`N = 2^scrypt_log_n`).
    pub scrypt_log_n: u8,
    pub scrypt_r: u32,
    pub scrypt_p: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            network: Network::Mainnet,
            max_testing_addresses: 7,
            max_addresses: 65_535,
            num_wallet_slots: 4,
            max_inputs: 16,
            max_outputs: 16,
            max_transaction_size: 200_000,
            scrypt_log_n: 14,
            scrypt_r: 8,
            scrypt_p: 1,
        }
    }
}

impl DeviceConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::Io(e.to_string()))
    }

    /// Offset of wallet slot `slot` within the `Accounts` partition: records
    /// sit at `slot * 160`.
    pub fn slot_offset(&self, slot: u32) -> u32 {
        slot * crate::wallet::WALLET_RECORD_LEN as u32
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error reading/writing config: {0}")]
    Io(String),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("failed to serialize config: {0}")]
    Serialize(String),
}

/// Logging setup via `env_logger`. Device firmware has no stdout; the
/// simulator binary (`bin/wallet_sim.rs`) is the only consumer of this in
/// practice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub enable_console: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            enable_console: true,
        }
    }
}

impl LoggingConfig {
    /// Installs `env_logger` at this configuration's level. Safe to call
    /// more than once; later calls are no-ops once a logger is installed.
    pub fn init(&self) {
        let _ = env_logger::Builder::new()
            .parse_filters(&self.level)
            .is_test(!self.enable_console)
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_seed_scenario() {
        let cfg = DeviceConfig::default();
        assert_eq!(cfg.max_testing_addresses, 7);
        assert_eq!(cfg.max_transaction_size, 200_000);
    }

    #[test]
    fn network_version_bytes() {
        assert_eq!(Network::Mainnet.pubkey_hash_version(), 0x00);
        assert_eq!(Network::Testnet.pubkey_hash_version(), 0x6f);
        assert_eq!(Network::Mainnet.script_hash_version(), 0x05);
        assert_eq!(Network::Testnet.script_hash_version(), 0xc4);
    }

    #[test]
    fn slot_offset_matches_record_len() {
        let cfg = DeviceConfig::default();
        assert_eq!(cfg.slot_offset(0), 0);
        assert_eq!(cfg.slot_offset(1), 160);
    }

    #[test]
    fn round_trip_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device.toml");
        let cfg = DeviceConfig::default();
        cfg.to_file(&path).unwrap();
        let loaded = DeviceConfig::from_file(&path).unwrap();
        assert_eq!(cfg, loaded);
    }
}
