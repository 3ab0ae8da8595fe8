//! Packet-level host dialogue: framing, message dispatch,
//! and the consent-interjection protocol that mediates every
//! security-relevant action through a physical button press, a loaded
//! wallet's password, or a one-time password.
//!
//! Uses a fixed header/length framing and a flat protocol-error enum, the
//! same shape as other framed wire protocols in this codebase, adapted to
//! this crate's `##`-prefixed framing and `MiscError`; the session state is
//! one owned struct threaded through the dispatch loop rather than scattered
//! across global statics.

pub mod codec;
pub mod entropy;
pub mod io;
pub mod ui;

use codec::{read_header, write_header, ErrorCode, MessageId, PayloadReader, PayloadWriter};
use entropy::EntropySource;
use io::{ByteIo, ByteIoSource};
use ui::UserInterface;

use crate::address;
use crate::bip32::ExtendedKey;
use crate::config::DeviceConfig;
use crate::ecdsa::Signature;
use crate::error::MiscError;
use crate::storage::Storage;
use crate::txparser::{ParsedOutput, TxParser};
use crate::wallet::{VersionTag, Wallet, WalletError};

const UUID_GLOBAL_OFFSET: u32 = 0;
const UUID_LEN: usize = 16;

/// Per-session state: reset on every `Initialize`. The
/// session id lets the host detect an unexpected device reset; the
/// previously-approved transaction-identity hash lets a multi-input
/// signing dialogue bypass consent on later inputs of the same logical
/// transaction.
#[derive(Debug, Default)]
pub struct SessionState {
    pub session_id: u32,
    pub approved_tx_hash: Option<[u8; 32]>,
}

impl SessionState {
    fn reset(&mut self, session_id: u32) {
        self.session_id = session_id;
        self.approved_tx_hash = None;
    }
}

/// The outer per-request dispatch loop. Generic over
/// the three external collaborators this layer mediates between: the byte
/// transport (`ByteIo`), the LCD/button/OTP driver (`UserInterface`), and
/// the hardware RNG (`EntropySource`). `Storage` is threaded through
/// `Wallet`.
pub struct Protocol<S: Storage, UI: UserInterface, E: EntropySource> {
    wallet: Wallet<S>,
    config: DeviceConfig,
    ui: UI,
    entropy: E,
    uuid: [u8; UUID_LEN],
    session: SessionState,
}

impl<S: Storage, UI: UserInterface, E: EntropySource> Protocol<S, UI, E> {
    /// Builds a fresh dispatch loop over `storage`. Reads the device UUID
    /// from the `Global` partition, generating and persisting one if the
    /// slot is all-zero (first boot).
    pub fn new(storage: S, config: DeviceConfig, ui: UI, mut entropy: E) -> Result<Self, WalletError> {
        let mut wallet = Wallet::new(storage, config.clone(), 0)?;

        let mut uuid = [0u8; UUID_LEN];
        wallet.read_global(UUID_GLOBAL_OFFSET, &mut uuid)?;
        if uuid == [0u8; UUID_LEN] {
            if !entropy.random_bytes(&mut uuid) {
                return Err(WalletError::RngFailure);
            }
            wallet.write_global(UUID_GLOBAL_OFFSET, &uuid)?;
            wallet.flush_storage()?;
        }

        Ok(Protocol {
            wallet,
            config,
            ui,
            entropy,
            uuid,
            session: SessionState::default(),
        })
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// Direct access to the underlying `Wallet`, for callers (the
    /// `wallet-sim` binary) that need backend-specific persistence `Wallet`
    /// itself has no reason to expose.
    pub fn wallet_mut(&mut self) -> &mut Wallet<S> {
        &mut self.wallet
    }

    fn random_session_id(&mut self) -> u32 {
        let mut bytes = [0u8; 4];
        let _ = self.entropy.random_bytes(&mut bytes);
        u32::from_be_bytes(bytes)
    }

    // ---- consent interjections -----------------------

    /// Level 1: button interjection. Sends `ButtonRequest`, reads the
    /// host's `ButtonAck`/`ButtonCancel`, then (on `ButtonAck`) blocks on
    /// the physical user via `UserInterface::user_denied`.
    fn request_button(&mut self, io: &mut impl ByteIo, cmd: &str) -> Result<(), MiscError> {
        let mut payload = PayloadWriter::new();
        payload.string(cmd);
        let bytes = payload.into_bytes();
        write_header(io, MessageId::ButtonRequest as u16, bytes.len() as u32)?;
        io.write_bytes(&bytes)?;

        let header = read_header(io)?;
        let body = io.read_bytes(header.length as usize)?;
        match MessageId::from_u16(header.id) {
            Some(MessageId::ButtonAck) => {
                let _ = body;
                if self.ui.user_denied(cmd) {
                    Err(MiscError::PermissionDeniedUser)
                } else {
                    Ok(())
                }
            }
            Some(MessageId::ButtonCancel) => Err(MiscError::PermissionDeniedHost),
            _ => Err(MiscError::UnexpectedPacket),
        }
    }

    /// Level 2: password interjection, used only by `LoadWallet`. Sends
    /// `PinRequest`, reads `PinAck` carrying the password or `PinCancel`.
    fn request_password(&mut self, io: &mut impl ByteIo) -> Result<Vec<u8>, MiscError> {
        write_header(io, MessageId::PinRequest as u16, 0)?;

        let header = read_header(io)?;
        let body = io.read_bytes(header.length as usize)?;
        match MessageId::from_u16(header.id) {
            Some(MessageId::PinAck) => {
                let mut reader = PayloadReader::new(&body);
                let password = reader.string()?;
                Ok(password.into_bytes())
            }
            Some(MessageId::PinCancel) => Err(MiscError::PermissionDeniedHost),
            _ => Err(MiscError::UnexpectedPacket),
        }
    }

    /// Level 3: one-time-password interjection for destructive or
    /// key-revealing actions. The OTP is generated and
    /// displayed on-device (never sent over the wire); the host must echo
    /// back what the physical user read off the screen.
    fn request_otp(&mut self, io: &mut impl ByteIo, cmd: &str) -> Result<(), MiscError> {
        let mut otp_bytes = [0u8; 4];
        if !self.entropy.random_bytes(&mut otp_bytes) {
            return Err(MiscError::ParameterTooLarge);
        }
        let otp_value = u32::from_be_bytes(otp_bytes) % 1_000_000;
        let otp_text = format!("{otp_value:06}");
        self.ui.display_otp(cmd, &otp_text);

        let mut payload = PayloadWriter::new();
        payload.string(cmd);
        let bytes = payload.into_bytes();
        write_header(io, MessageId::OtpRequest as u16, bytes.len() as u32)?;
        io.write_bytes(&bytes)?;

        let header = read_header(io)?;
        let body = io.read_bytes(header.length as usize)?;
        let result = match MessageId::from_u16(header.id) {
            Some(MessageId::OtpAck) => {
                let mut reader = PayloadReader::new(&body);
                let supplied = reader.string()?;
                if supplied == otp_text {
                    Ok(())
                } else {
                    Err(MiscError::OtpMismatch)
                }
            }
            Some(MessageId::OtpCancel) => Err(MiscError::PermissionDeniedHost),
            _ => Err(MiscError::UnexpectedPacket),
        };
        self.ui.clear_otp();
        result
    }

    // ---- response helpers ----------------------------------------------

    fn write_success(&self, io: &mut impl ByteIo, payload: Vec<u8>) -> Result<(), MiscError> {
        write_header(io, MessageId::Success as u16, payload.len() as u32)?;
        io.write_bytes(&payload)
    }

    fn write_failure(&self, io: &mut impl ByteIo, code: ErrorCode, message: &str) -> Result<(), MiscError> {
        let mut payload = PayloadWriter::new();
        payload.u16(code.set as u16).u16(code.code).string(message);
        let bytes = payload.into_bytes();
        write_header(io, MessageId::Failure as u16, bytes.len() as u32)?;
        io.write_bytes(&bytes)
    }

    fn write_wallet_failure(&self, io: &mut impl ByteIo, e: WalletError) -> Result<(), MiscError> {
        self.write_failure(io, ErrorCode::wallet(e), &e.to_string())
    }

    fn write_misc_failure(&self, io: &mut impl ByteIo, e: MiscError) -> Result<(), MiscError> {
        self.write_failure(io, ErrorCode::misc(e), &e.to_string())
    }

    /// Serves exactly one request/response round trip: reads one packet,
    /// fully consumes its payload before any response or interjection is
    /// emitted, dispatches, and writes exactly one outer response packet
    /// (not counting interjection sub-dialogues).
    pub fn serve_one(&mut self, io: &mut impl ByteIo) -> Result<(), MiscError> {
        let header = read_header(io)?;

        // `SignTransaction`'s transaction bytes are parsed directly off the
        // stream and must never be buffered; every other message id is
        // small enough to buffer in full.
        if MessageId::from_u16(header.id) == Some(MessageId::SignTransaction) {
            return self.dispatch_sign_transaction(io, header.length);
        }

        let payload = io.read_bytes(header.length as usize)?;
        self.dispatch_buffered(io, header.id, &payload)
    }

    fn dispatch_buffered(&mut self, io: &mut impl ByteIo, id: u16, payload: &[u8]) -> Result<(), MiscError> {
        let msg = match MessageId::from_u16(id) {
            Some(m) => m,
            None => return self.write_misc_failure(io, MiscError::InvalidPacket),
        };

        match msg {
            MessageId::Initialize => self.handle_initialize(io, payload),
            MessageId::Ping => self.handle_ping(io, payload),
            MessageId::ListWallets => self.handle_list_wallets(io),
            MessageId::CreateWallet => self.handle_create_wallet(io, payload),
            MessageId::RestoreWallet => self.handle_restore_wallet(io, payload),
            MessageId::DeleteWallet => self.handle_delete_wallet(io, payload),
            MessageId::LoadWallet => self.handle_load_wallet(io, payload),
            MessageId::BackupWallet => self.handle_backup_wallet(io, payload),
            MessageId::ChangeWalletName => self.handle_change_wallet_name(io, payload),
            MessageId::ChangeEncryptionKey => self.handle_change_encryption_key(io, payload),
            MessageId::FormatDevice => self.handle_format_device(io, payload),
            MessageId::NewAddress => self.handle_new_address(io),
            MessageId::GetNumAddresses => self.handle_get_num_addresses(io),
            MessageId::GetAddressAndPublicKey => self.handle_get_address_and_public_key(io, payload),
            MessageId::GetPrivateKey => self.handle_get_private_key(io, payload),
            MessageId::GetDeviceUuid => self.handle_get_device_uuid(io),
            MessageId::GetEntropy => self.handle_get_entropy(io, payload),
            MessageId::GetMasterKey => self.handle_get_master_key(io),
            // These ids only ever appear as the *response* half of an
            // interjection sub-dialogue; seeing one as a top-level request
            // is a protocol violation, since a response is never emitted
            // before its matching request.
            MessageId::ButtonAck
            | MessageId::ButtonCancel
            | MessageId::PinAck
            | MessageId::PinCancel
            | MessageId::OtpAck
            | MessageId::OtpCancel
            | MessageId::ButtonRequest
            | MessageId::PinRequest
            | MessageId::OtpRequest
            | MessageId::Success
            | MessageId::Failure
            | MessageId::Features
            | MessageId::SignTransaction => self.write_misc_failure(io, MiscError::UnexpectedPacket),
        }
    }

    fn handle_initialize(&mut self, io: &mut impl ByteIo, _payload: &[u8]) -> Result<(), MiscError> {
        let session_id = self.random_session_id();
        self.session.reset(session_id);

        let mut resp = PayloadWriter::new();
        resp.u32(session_id).fixed_bytes(&self.uuid).u32(self.config.num_wallet_slots);
        let bytes = resp.into_bytes();
        write_header(io, MessageId::Features as u16, bytes.len() as u32)?;
        io.write_bytes(&bytes)
    }

    fn handle_ping(&mut self, io: &mut impl ByteIo, payload: &[u8]) -> Result<(), MiscError> {
        self.write_success(io, payload.to_vec())
    }

    fn handle_list_wallets(&mut self, io: &mut impl ByteIo) -> Result<(), MiscError> {
        match self.wallet.list_slots() {
            Ok(slots) => {
                let mut resp = PayloadWriter::new();
                resp.u32(slots.len() as u32);
                for (slot, version, name) in slots {
                    let present = matches!(version, VersionTag::Unencrypted | VersionTag::Encrypted);
                    resp.u32(slot).u8(present as u8).string(&name);
                }
                self.write_success(io, resp.into_bytes())
            }
            Err(e) => self.write_wallet_failure(io, e),
        }
    }

    fn handle_create_wallet(&mut self, io: &mut impl ByteIo, payload: &[u8]) -> Result<(), MiscError> {
        let mut reader = PayloadReader::new(payload);
        let slot = reader.u32()?;
        let name = reader.string()?;
        let password = reader.bytes()?;

        if let Err(e) = self.request_button(io, "create wallet") {
            return self.write_misc_failure(io, e);
        }

        if let Err(e) = self.wallet.switch_slot(slot) {
            return self.write_wallet_failure(io, e);
        }
        let entropy = &mut self.entropy;
        let result = self
            .wallet
            .new_wallet(&name, &password, None, |buf: &mut [u8]| entropy.random_bytes(buf));
        match result {
            Ok(()) => self.write_success(io, Vec::new()),
            Err(e) => self.write_wallet_failure(io, e),
        }
    }

    fn handle_restore_wallet(&mut self, io: &mut impl ByteIo, payload: &[u8]) -> Result<(), MiscError> {
        let mut reader = PayloadReader::new(payload);
        let slot = reader.u32()?;
        let name = reader.string()?;
        let password = reader.bytes()?;
        let seed_bytes = reader.bytes()?;
        let seed: [u8; 64] = match seed_bytes.try_into() {
            Ok(s) => s,
            Err(_) => return self.write_misc_failure(io, MiscError::InvalidPacket),
        };

        if let Err(e) = self.request_button(io, "restore wallet") {
            return self.write_misc_failure(io, e);
        }

        if let Err(e) = self.wallet.switch_slot(slot) {
            return self.write_wallet_failure(io, e);
        }
        let entropy = &mut self.entropy;
        let result = self
            .wallet
            .new_wallet(&name, &password, Some(seed), |buf: &mut [u8]| entropy.random_bytes(buf));
        match result {
            Ok(()) => self.write_success(io, Vec::new()),
            Err(e) => self.write_wallet_failure(io, e),
        }
    }

    fn handle_delete_wallet(&mut self, io: &mut impl ByteIo, payload: &[u8]) -> Result<(), MiscError> {
        let mut reader = PayloadReader::new(payload);
        let slot = reader.u32()?;

        if let Err(e) = self.request_button(io, "delete wallet") {
            return self.write_misc_failure(io, e);
        }
        if let Err(e) = self.request_otp(io, "delete wallet") {
            return self.write_misc_failure(io, e);
        }

        if let Err(e) = self.wallet.switch_slot(slot) {
            return self.write_wallet_failure(io, e);
        }
        let entropy = &mut self.entropy;
        let result = self.wallet.delete_wallet(|buf: &mut [u8]| entropy.random_bytes(buf));
        match result {
            Ok(()) => self.write_success(io, Vec::new()),
            Err(e) => self.write_wallet_failure(io, e),
        }
    }

    fn handle_load_wallet(&mut self, io: &mut impl ByteIo, payload: &[u8]) -> Result<(), MiscError> {
        let mut reader = PayloadReader::new(payload);
        let slot = reader.u32()?;

        let password = match self.request_password(io) {
            Ok(p) => p,
            Err(e) => return self.write_misc_failure(io, e),
        };

        if let Err(e) = self.wallet.switch_slot(slot) {
            return self.write_wallet_failure(io, e);
        }
        match self.wallet.init_wallet(&password) {
            Ok(()) => {
                let num = self.wallet.get_num_addresses().unwrap_or(0);
                let mut resp = PayloadWriter::new();
                resp.u32(num);
                self.write_success(io, resp.into_bytes())
            }
            Err(e) => self.write_wallet_failure(io, e),
        }
    }

    fn handle_backup_wallet(&mut self, io: &mut impl ByteIo, _payload: &[u8]) -> Result<(), MiscError> {
        if let Err(e) = self.request_button(io, "back up wallet") {
            return self.write_misc_failure(io, e);
        }
        if let Err(e) = self.request_otp(io, "back up wallet") {
            return self.write_misc_failure(io, e);
        }

        match self.wallet.get_seed() {
            Ok(seed) => {
                let mut resp = PayloadWriter::new();
                resp.bytes(&seed);
                self.write_success(io, resp.into_bytes())
            }
            Err(e) => self.write_wallet_failure(io, e),
        }
    }

    fn handle_change_wallet_name(&mut self, io: &mut impl ByteIo, payload: &[u8]) -> Result<(), MiscError> {
        let mut reader = PayloadReader::new(payload);
        let new_name = match reader.string() {
            Ok(s) => s,
            Err(e) => return self.write_misc_failure(io, e),
        };

        if let Err(e) = self.request_button(io, "rename wallet") {
            return self.write_misc_failure(io, e);
        }

        match self.wallet.change_wallet_name(&new_name) {
            Ok(()) => self.write_success(io, Vec::new()),
            Err(e) => self.write_wallet_failure(io, e),
        }
    }

    fn handle_change_encryption_key(&mut self, io: &mut impl ByteIo, _payload: &[u8]) -> Result<(), MiscError> {
        if let Err(e) = self.request_button(io, "change wallet password") {
            return self.write_misc_failure(io, e);
        }
        let new_password = match self.request_password(io) {
            Ok(p) => p,
            Err(e) => return self.write_misc_failure(io, e),
        };
        if let Err(e) = self.request_otp(io, "change wallet password") {
            return self.write_misc_failure(io, e);
        }

        match self.wallet.change_encryption_key(&new_password) {
            Ok(()) => self.write_success(io, Vec::new()),
            Err(e) => self.write_wallet_failure(io, e),
        }
    }

    fn handle_format_device(&mut self, io: &mut impl ByteIo, _payload: &[u8]) -> Result<(), MiscError> {
        if let Err(e) = self.request_button(io, "format device") {
            return self.write_misc_failure(io, e);
        }
        if let Err(e) = self.request_otp(io, "format device") {
            return self.write_misc_failure(io, e);
        }

        for slot in 0..self.config.num_wallet_slots {
            if self.wallet.switch_slot(slot).is_ok() {
                let entropy = &mut self.entropy;
                let _ = self.wallet.delete_wallet(|buf: &mut [u8]| entropy.random_bytes(buf));
            }
        }
        self.write_success(io, Vec::new())
    }

    fn handle_new_address(&mut self, io: &mut impl ByteIo) -> Result<(), MiscError> {
        if let Err(e) = self.request_button(io, "create new address") {
            return self.write_misc_failure(io, e);
        }

        match self.wallet.make_new_address() {
            Ok(handle) => {
                let mut resp = PayloadWriter::new();
                resp.u32(handle);
                self.write_success(io, resp.into_bytes())
            }
            Err(e) => self.write_wallet_failure(io, e),
        }
    }

    fn handle_get_num_addresses(&mut self, io: &mut impl ByteIo) -> Result<(), MiscError> {
        match self.wallet.get_num_addresses() {
            Ok(num) => {
                let mut resp = PayloadWriter::new();
                resp.u32(num);
                self.write_success(io, resp.into_bytes())
            }
            Err(e) => self.write_wallet_failure(io, e),
        }
    }

    fn handle_get_address_and_public_key(&mut self, io: &mut impl ByteIo, payload: &[u8]) -> Result<(), MiscError> {
        let mut reader = PayloadReader::new(payload);
        let handle = match reader.u32() {
            Ok(h) => h,
            Err(e) => return self.write_misc_failure(io, e),
        };

        if let Err(e) = self.request_button(io, "show address") {
            return self.write_misc_failure(io, e);
        }

        match self.wallet.get_address_and_public_key(handle) {
            Ok(info) => {
                let address_text = address::encode_p2pkh(self.config.network, &info.pubkey_hash);
                let mut resp = PayloadWriter::new();
                resp.string(&address_text).bytes(&info.public_key.serialize(true));
                self.write_success(io, resp.into_bytes())
            }
            Err(e) => self.write_wallet_failure(io, e),
        }
    }

    fn handle_get_private_key(&mut self, io: &mut impl ByteIo, payload: &[u8]) -> Result<(), MiscError> {
        let mut reader = PayloadReader::new(payload);
        let handle = match reader.u32() {
            Ok(h) => h,
            Err(e) => return self.write_misc_failure(io, e),
        };

        if let Err(e) = self.request_button(io, "reveal private key") {
            return self.write_misc_failure(io, e);
        }
        if let Err(e) = self.request_otp(io, "reveal private key") {
            return self.write_misc_failure(io, e);
        }

        match self.wallet.get_private_key(handle) {
            Ok(key) => {
                let mut resp = PayloadWriter::new();
                resp.bytes(&key.to_bytes_be());
                self.write_success(io, resp.into_bytes())
            }
            Err(e) => self.write_wallet_failure(io, e),
        }
    }

    fn handle_get_device_uuid(&mut self, io: &mut impl ByteIo) -> Result<(), MiscError> {
        let mut resp = PayloadWriter::new();
        resp.fixed_bytes(&self.uuid);
        self.write_success(io, resp.into_bytes())
    }

    fn handle_get_entropy(&mut self, io: &mut impl ByteIo, payload: &[u8]) -> Result<(), MiscError> {
        let mut reader = PayloadReader::new(payload);
        let requested = match reader.u32() {
            Ok(n) => n,
            Err(e) => return self.write_misc_failure(io, e),
        };
        const MAX_ENTROPY_BYTES: u32 = 1024;
        if requested > MAX_ENTROPY_BYTES {
            return self.write_misc_failure(io, MiscError::ParameterTooLarge);
        }

        if let Err(e) = self.request_button(io, "send entropy") {
            return self.write_misc_failure(io, e);
        }

        let mut buf = vec![0u8; requested as usize];
        if !self.entropy.random_bytes(&mut buf) {
            return self.write_wallet_failure(io, WalletError::RngFailure);
        }
        let mut resp = PayloadWriter::new();
        resp.bytes(&buf);
        self.write_success(io, resp.into_bytes())
    }

    fn handle_get_master_key(&mut self, io: &mut impl ByteIo) -> Result<(), MiscError> {
        if let Err(e) = self.request_button(io, "reveal master key") {
            return self.write_misc_failure(io, e);
        }
        if let Err(e) = self.request_otp(io, "reveal master key") {
            return self.write_misc_failure(io, e);
        }

        let seed = match self.wallet.get_seed() {
            Ok(s) => s,
            Err(e) => return self.write_wallet_failure(io, e),
        };
        let master = ExtendedKey::master(&seed);
        let mut resp = PayloadWriter::new();
        resp.bytes(&master.private_key.to_bytes_be());
        resp.fixed_bytes(&*master.chain_code);
        self.write_success(io, resp.into_bytes())
    }

    /// Transaction-signing flow: the parser runs directly
    /// against the transport so the transaction body is never buffered.
    /// `new_output_seen` callbacks fire in output order, before consent is
    /// requested; a repeat of the most recently approved transaction-
    /// identity hash bypasses the button interjection entirely, enabling a
    /// single approval to cover every input of one multi-input transaction.
    fn dispatch_sign_transaction(&mut self, io: &mut impl ByteIo, length: u32) -> Result<(), MiscError> {
        // `AddressHandle` (4 bytes) precedes the transaction body; the
        // remaining `length - 4` bytes are streamed straight into the
        // parser.
        let handle_bytes = io.read_bytes(4)?;
        let handle = u32::from_be_bytes([
            handle_bytes[0],
            handle_bytes[1],
            handle_bytes[2],
            handle_bytes[3],
        ]);
        let tx_length = (length as u64).saturating_sub(4);

        let config = self.config.clone();
        let outputs_text: std::cell::RefCell<Vec<(String, String)>> = std::cell::RefCell::new(Vec::new());
        let network = config.network;
        let parse_result = {
            let mut source = ByteIoSource::new(&mut *io);
            let mut parser = TxParser::new(&config, |out: &ParsedOutput| {
                let amount_text = address::format_amount(out.amount_satoshis);
                let address_text = address::encode_p2pkh(network, &out.pubkey_hash);
                outputs_text.borrow_mut().push((amount_text, address_text));
            });
            parser.parse(&mut source, tx_length)
        };

        let parsed = match parse_result {
            Ok(p) => p,
            Err(e) => return self.write_failure(io, ErrorCode::transaction(e), &e.to_string()),
        };

        for (amount_text, address_text) in outputs_text.into_inner() {
            self.ui.show_output(&amount_text, &address_text);
        }

        let already_approved = self.session.approved_tx_hash == Some(parsed.tx_hash);
        if !already_approved {
            if let Err(e) = self.request_button(io, "sign transaction") {
                return self.write_misc_failure(io, e);
            }
            self.session.approved_tx_hash = Some(parsed.tx_hash);
        }

        let private_key = match self.wallet.get_private_key(handle) {
            Ok(k) => k,
            Err(e) => return self.write_wallet_failure(io, e),
        };

        let signature = Signature::sign(&parsed.sig_hash, &private_key);
        let der = signature.to_der();
        let mut resp = PayloadWriter::new();
        resp.bytes(&der);
        self.write_success(io, resp.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryFlash;
    use entropy::FixedEntropySource;
    use io::ChannelIo;
    use ui::ScriptedUi;

    fn new_protocol(denials: Vec<bool>) -> Protocol<MemoryFlash, ScriptedUi, FixedEntropySource> {
        let config = DeviceConfig::default();
        let flash = MemoryFlash::for_device(config.num_wallet_slots);
        let ui = ScriptedUi::new(denials);
        let entropy = FixedEntropySource::new(vec![0x42, 0x11, 0x77, 0x5a, 0x90, 0x01]);
        Protocol::new(flash, config, ui, entropy).unwrap()
    }

    /// Feeds a request packet into `io`'s inbox, as the host would send it
    /// over the wire (`ChannelIo::feed`, not `write_header`/`write_bytes`,
    /// which target the device's outbound side).
    fn send(io: &mut ChannelIo, id: MessageId, payload: &[u8]) {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"##");
        bytes.extend_from_slice(&(id as u16).to_be_bytes());
        bytes.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        bytes.extend_from_slice(payload);
        io.feed(&bytes);
    }

    fn read_response(io: &mut ChannelIo) -> (MessageId, Vec<u8>) {
        let bytes = io.take_output();
        let mut reader = ChannelIo::new(bytes);
        let header = read_header(&mut reader).unwrap();
        let body = reader.read_bytes(header.length as usize).unwrap();
        (MessageId::from_u16(header.id).unwrap(), body)
    }

    fn create_wallet_payload(slot: u32, name: &str, password: &[u8]) -> Vec<u8> {
        let mut w = PayloadWriter::new();
        w.u32(slot).string(name).bytes(password);
        w.into_bytes()
    }

    #[test]
    fn initialize_resets_session_and_returns_features() {
        let mut protocol = new_protocol(vec![]);
        let mut io = ChannelIo::new(vec![]);
        send(&mut io, MessageId::Initialize, &[]);
        protocol.serve_one(&mut io).unwrap();
        let (id, _body) = read_response(&mut io);
        assert_eq!(id, MessageId::Features);
        assert_ne!(protocol.session().session_id, 0);
    }

    #[test]
    fn create_wallet_with_button_approval_then_list_shows_it() {
        let mut protocol = new_protocol(vec![false]);
        let mut io = ChannelIo::new(vec![]);

        send(&mut io, MessageId::CreateWallet, &create_wallet_payload(0, "main", b""));
        // The device will pause mid-dispatch to send ButtonRequest; feed
        // the host's ButtonAck before calling serve_one.
        io.feed(&{
            let mut header = Vec::new();
            header.extend_from_slice(b"##");
            header.extend_from_slice(&(MessageId::ButtonAck as u16).to_be_bytes());
            header.extend_from_slice(&0u32.to_be_bytes());
            header
        });
        protocol.serve_one(&mut io).unwrap();
        let (id, _) = read_response(&mut io);
        assert_eq!(id, MessageId::Success);

        send(&mut io, MessageId::ListWallets, &[]);
        protocol.serve_one(&mut io).unwrap();
        let (id, body) = read_response(&mut io);
        assert_eq!(id, MessageId::Success);
        let mut reader = PayloadReader::new(&body);
        let count = reader.u32().unwrap();
        assert_eq!(count, protocol.config.num_wallet_slots);
        let (slot0, present0, name0) = (reader.u32().unwrap(), reader.u8().unwrap(), reader.string().unwrap());
        assert_eq!(slot0, 0);
        assert_eq!(present0, 1);
        assert_eq!(name0, "main");
    }

    #[test]
    fn button_cancel_denies_delete_and_wallet_survives() {
        let mut protocol = new_protocol(vec![]);
        let mut io = ChannelIo::new(vec![]);
        send(&mut io, MessageId::CreateWallet, &create_wallet_payload(0, "keepme", b""));
        io.feed(&button_ack_bytes());
        protocol.serve_one(&mut io).unwrap();
        read_response(&mut io);

        let mut delete_payload = PayloadWriter::new();
        delete_payload.u32(0);
        send(&mut io, MessageId::DeleteWallet, &delete_payload.into_bytes());
        io.feed(&button_cancel_bytes());
        protocol.serve_one(&mut io).unwrap();
        let (id, body) = read_response(&mut io);
        assert_eq!(id, MessageId::Failure);
        let mut reader = PayloadReader::new(&body);
        let set = reader.u16().unwrap();
        let code = reader.u16().unwrap();
        assert_eq!(set, ErrorCode::misc(MiscError::PermissionDeniedHost).set as u16);
        assert_eq!(code, ErrorCode::misc(MiscError::PermissionDeniedHost).code);

        send(&mut io, MessageId::ListWallets, &[]);
        protocol.serve_one(&mut io).unwrap();
        let (_, body) = read_response(&mut io);
        let mut reader = PayloadReader::new(&body);
        let _count = reader.u32().unwrap();
        let (_, present0, name0) = (reader.u32().unwrap(), reader.u8().unwrap(), reader.string().unwrap());
        assert_eq!(present0, 1);
        assert_eq!(name0, "keepme");
    }

    fn button_ack_bytes() -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"##");
        out.extend_from_slice(&(MessageId::ButtonAck as u16).to_be_bytes());
        out.extend_from_slice(&0u32.to_be_bytes());
        out
    }

    fn button_cancel_bytes() -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"##");
        out.extend_from_slice(&(MessageId::ButtonCancel as u16).to_be_bytes());
        out.extend_from_slice(&0u32.to_be_bytes());
        out
    }

    #[test]
    fn get_device_uuid_is_stable_across_calls() {
        let mut protocol = new_protocol(vec![]);
        let mut io = ChannelIo::new(vec![]);
        send(&mut io, MessageId::GetDeviceUuid, &[]);
        protocol.serve_one(&mut io).unwrap();
        let (_, body1) = read_response(&mut io);

        send(&mut io, MessageId::GetDeviceUuid, &[]);
        protocol.serve_one(&mut io).unwrap();
        let (_, body2) = read_response(&mut io);
        assert_eq!(body1, body2);
    }
}
