//! Crate-wide error taxonomy.
//!
//! Three disjoint error taxonomies are surfaced to the host: miscellaneous/
//! protocol, wallet, and transaction errors. `CoreError` is the internal
//! unification of those three (plus storage errors) used by the library's
//! own `Result` returns; `protocol::ErrorCode` is the narrower wire-level
//! `(set, code)` tag pair produced at the dispatch boundary by mapping a
//! `CoreError` onto that taxonomy.

use thiserror::Error;

use crate::storage::StorageError;
use crate::txparser::TxError;
use crate::wallet::WalletError;

/// Transport/protocol-level errors that are not specific to any one
/// subsystem.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MiscError {
    #[error("packet is malformed or has an unrecognised framing")]
    InvalidPacket,
    #[error("message id is not valid for the current session state")]
    UnexpectedPacket,
    #[error("the user denied the action on the device")]
    PermissionDeniedUser,
    #[error("the host cancelled the consent interjection")]
    PermissionDeniedHost,
    #[error("the one-time password supplied by the host did not match")]
    OtpMismatch,
    #[error("a parameter exceeded an implementation-defined size limit")]
    ParameterTooLarge,
}

/// Unified crate error. Every fallible public operation in this crate
/// returns a `Result<_, CoreError>` (or a subsystem-specific error that
/// converts into one via `#[from]`).
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("protocol error: {0}")]
    Misc(#[from] MiscError),

    #[error("wallet error: {0}")]
    Wallet(#[from] WalletError),

    #[error("transaction parse error: {0}")]
    Tx(#[from] TxError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("fatal error: {0}")]
    Fatal(String),
}

impl CoreError {
    /// A corrupted-invariant condition (e.g. a point serialisation that came
    /// back a length other than the one requested). The caller is expected
    /// to treat this as unrecoverable: display a stream-error message and
    /// halt until reset.
    pub fn fatal(message: impl Into<String>) -> Self {
        CoreError::Fatal(message.into())
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, CoreError::Fatal(_))
    }
}
