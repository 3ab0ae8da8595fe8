//! Core of a hardware Bitcoin wallet.
//!
//! This crate implements the device-side logic of a hardware wallet: the
//! constant-time secp256k1 field/group arithmetic, deterministic ECDSA
//! signing, BIP32 derivation, an encrypted non-volatile wallet record format,
//! a streaming Bitcoin transaction parser, and the packet-level host
//! protocol that mediates every sensitive action through a physical-consent
//! dialogue. The LCD/button driver, byte transport, hash/HMAC primitives'
//! hardware acceleration, flash driver and hardware RNG health checks are
//! external collaborators (see `storage::Storage`, `protocol::io`,
//! `protocol::ui`).

pub mod address;
pub mod bip32;
pub mod config;
pub mod curve;
pub mod ecdsa;
pub mod error;
pub mod field;
pub mod hash;
pub mod protocol;
pub mod storage;
pub mod txparser;
pub mod wallet;
pub mod xex;

pub use error::CoreError;
