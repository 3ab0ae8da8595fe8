//! `wallet-sim`: a stdio-free CLI that drives the full `Protocol` dispatch
//! loop against an in-memory flash image persisted to a file between
//! invocations, for manual/integration testing of the request/response and
//! consent-interjection dialogue end to end.
//!
//! Grounded on `bin/btpc_wallet_dilithium.rs`'s `clap` `Parser`/`Subcommand`
//! CLI shape (generate/address/balance-style commands over a wallet file).
//! Each invocation is one process: it loads the flash image, serves exactly
//! one request, and writes the image back out, since there is no long-lived
//! device process to hold state across commands.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;

use clap::{Parser, Subcommand};

use btpc_wallet_core::config::DeviceConfig;
use btpc_wallet_core::error::MiscError;
use btpc_wallet_core::protocol::codec::{MessageId, PayloadReader, PayloadWriter};
use btpc_wallet_core::protocol::entropy::OsEntropySource;
use btpc_wallet_core::protocol::io::ByteIo;
use btpc_wallet_core::protocol::ui::UserInterface;
use btpc_wallet_core::protocol::Protocol;
use btpc_wallet_core::storage::memory::MemoryFlash;
use btpc_wallet_core::storage::Partition;

#[derive(Parser)]
#[command(name = "wallet-sim", about = "Drives the hardware wallet core's host protocol against a simulated device")]
struct Cli {
    /// File holding the simulated flash image, persisted across invocations.
    #[arg(long, default_value = "wallet_sim.flash")]
    flash_file: PathBuf,

    /// Simulates the host cancelling every button/PIN/OTP interjection
    /// instead of approving it.
    #[arg(long)]
    deny: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resets session state and prints the device's feature/session info.
    Initialize,
    /// Round-trips an arbitrary payload through `Ping`.
    Ping { text: String },
    ListWallets,
    CreateWallet {
        slot: u32,
        name: String,
        #[arg(long, default_value = "")]
        password: String,
    },
    RestoreWallet {
        slot: u32,
        name: String,
        /// 64-byte seed, hex-encoded (128 hex characters).
        seed_hex: String,
        #[arg(long, default_value = "")]
        password: String,
    },
    LoadWallet {
        slot: u32,
        #[arg(long, default_value = "")]
        password: String,
    },
    DeleteWallet { slot: u32 },
    BackupWallet,
    ChangeWalletName { new_name: String },
    ChangeEncryptionKey {
        #[arg(long, default_value = "")]
        new_password: String,
    },
    FormatDevice,
    NewAddress,
    GetNumAddresses,
    GetAddressAndPublicKey { handle: u32 },
    GetPrivateKey { handle: u32 },
    /// Signs a transaction (hex-encoded wire bytes) with the given address
    /// handle's private key.
    SignTransaction { handle: u32, tx_hex: String },
    GetDeviceUuid,
    GetEntropy { bytes: u32 },
    GetMasterKey,
}

/// Captures what the device would show on its LCD: consent prompts, the
/// currently-displayed OTP (read back by `AutoHostIo` to auto-approve), and
/// the accumulated transaction-output list.
struct SimUi {
    otp: Rc<RefCell<Option<String>>>,
}

impl UserInterface for SimUi {
    fn user_denied(&mut self, cmd: &str) -> bool {
        eprintln!("[device] button press requested for: {cmd}");
        false
    }

    fn display_otp(&mut self, cmd: &str, otp_text: &str) {
        eprintln!("[device] OTP for '{cmd}': {otp_text}");
        *self.otp.borrow_mut() = Some(otp_text.to_string());
    }

    fn clear_otp(&mut self) {
        *self.otp.borrow_mut() = None;
    }

    fn get_string(&self, _set: u16, _code: u16) -> String {
        String::new()
    }

    fn show_output(&mut self, amount_text: &str, address_text: &str) {
        println!("  output: {amount_text} BTC -> {address_text}");
    }
}

/// A `ByteIo` that plays both transport ends: it holds the single request
/// packet the CLI wants to send, and auto-synthesizes the host's reply to
/// every interjection sub-dialogue the device initiates (`ButtonRequest`/
/// `PinRequest`/`OtpRequest`), using `--password`/`--deny`/the OTP just
/// displayed via `SimUi`.
struct AutoHostIo {
    inbox: VecDeque<u8>,
    pending_out: Vec<u8>,
    deny: bool,
    password: String,
    otp: Rc<RefCell<Option<String>>>,
}

impl AutoHostIo {
    fn new(deny: bool, password: String, otp: Rc<RefCell<Option<String>>>) -> Self {
        AutoHostIo {
            inbox: VecDeque::new(),
            pending_out: Vec::new(),
            deny,
            password,
            otp,
        }
    }

    fn queue_packet(&mut self, id: MessageId, payload: &[u8]) {
        self.inbox.extend([b'#', b'#']);
        self.inbox.extend((id as u16).to_be_bytes());
        self.inbox.extend((payload.len() as u32).to_be_bytes());
        self.inbox.extend(payload.iter().copied());
    }

    /// Feeds the one top-level request this CLI invocation is making.
    fn feed_request(&mut self, id: MessageId, payload: &[u8]) {
        self.queue_packet(id, payload);
    }

    fn synthesize_reply(&mut self) -> Result<(), MiscError> {
        if self.pending_out.len() < 8 {
            return Err(MiscError::InvalidPacket);
        }
        let id = u16::from_be_bytes([self.pending_out[2], self.pending_out[3]]);
        let len = u32::from_be_bytes([
            self.pending_out[4],
            self.pending_out[5],
            self.pending_out[6],
            self.pending_out[7],
        ]) as usize;
        if self.pending_out.len() < 8 + len {
            return Err(MiscError::InvalidPacket);
        }
        self.pending_out.clear();

        match MessageId::from_u16(id) {
            Some(MessageId::ButtonRequest) => {
                let reply = if self.deny { MessageId::ButtonCancel } else { MessageId::ButtonAck };
                self.queue_packet(reply, &[]);
            }
            Some(MessageId::PinRequest) => {
                if self.deny {
                    self.queue_packet(MessageId::PinCancel, &[]);
                } else {
                    let mut w = PayloadWriter::new();
                    w.string(&self.password);
                    self.queue_packet(MessageId::PinAck, &w.into_bytes());
                }
            }
            Some(MessageId::OtpRequest) => {
                if self.deny {
                    self.queue_packet(MessageId::OtpCancel, &[]);
                } else {
                    let otp = self.otp.borrow().clone().unwrap_or_default();
                    let mut w = PayloadWriter::new();
                    w.string(&otp);
                    self.queue_packet(MessageId::OtpAck, &w.into_bytes());
                }
            }
            _ => return Err(MiscError::UnexpectedPacket),
        }
        Ok(())
    }

    /// Called once `Protocol::serve_one` has returned: the device's final
    /// response packet (`Success`/`Failure`/`Features`) is sitting in
    /// `pending_out`, unread because the dispatch loop never reads after
    /// emitting its outer response.
    fn take_response(&mut self) -> (u16, Vec<u8>) {
        let id = u16::from_be_bytes([self.pending_out[2], self.pending_out[3]]);
        let len = u32::from_be_bytes([
            self.pending_out[4],
            self.pending_out[5],
            self.pending_out[6],
            self.pending_out[7],
        ]) as usize;
        let body = self.pending_out[8..8 + len].to_vec();
        self.pending_out.clear();
        (id, body)
    }
}

impl ByteIo for AutoHostIo {
    fn read_byte(&mut self) -> Result<u8, MiscError> {
        if let Some(b) = self.inbox.pop_front() {
            return Ok(b);
        }
        self.synthesize_reply()?;
        self.inbox.pop_front().ok_or(MiscError::InvalidPacket)
    }

    fn write_byte(&mut self, byte: u8) -> Result<(), MiscError> {
        self.pending_out.push(byte);
        Ok(())
    }
}

fn load_flash(path: &PathBuf, config: &DeviceConfig) -> MemoryFlash {
    let mut flash = MemoryFlash::for_device(config.num_wallet_slots);
    if let Ok(bytes) = fs::read(path) {
        let global_len = flash.partition_bytes(Partition::Global).len();
        if bytes.len() >= global_len {
            flash.load_partition(Partition::Global, &bytes[..global_len]);
            flash.load_partition(Partition::Accounts, &bytes[global_len..]);
        }
    }
    flash
}

fn save_flash(path: &PathBuf, flash: &MemoryFlash) -> std::io::Result<()> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(flash.partition_bytes(Partition::Global));
    bytes.extend_from_slice(flash.partition_bytes(Partition::Accounts));
    fs::write(path, bytes)
}

fn print_failure(body: &[u8]) {
    let mut reader = PayloadReader::new(body);
    let set = reader.u16().unwrap_or(0);
    let code = reader.u16().unwrap_or(0);
    let message = reader.string().unwrap_or_default();
    eprintln!("Failure: set={set} code={code} message={message}");
}

fn main() {
    btpc_wallet_core::config::LoggingConfig::default().init();
    let cli = Cli::parse();
    let config = DeviceConfig::default();

    let flash = load_flash(&cli.flash_file, &config);
    let otp = Rc::new(RefCell::new(None));
    let ui = SimUi { otp: otp.clone() };
    let entropy = OsEntropySource;
    let mut protocol = Protocol::new(flash, config, ui, entropy).expect("device bring-up failed");

    let password = match &cli.command {
        Command::LoadWallet { password, .. } => password.clone(),
        Command::ChangeEncryptionKey { new_password } => new_password.clone(),
        _ => String::new(),
    };
    let mut io = AutoHostIo::new(cli.deny, password, otp);

    let (id, payload) = build_request(&cli.command);
    io.feed_request(id, &payload);

    if let Err(e) = protocol.serve_one(&mut io) {
        eprintln!("protocol error: {e}");
        std::process::exit(1);
    }

    let (resp_id, body) = io.take_response();
    match MessageId::from_u16(resp_id) {
        Some(MessageId::Failure) => print_failure(&body),
        _ => print_response(&cli.command, resp_id, &body),
    }

    if let Err(e) = save_flash(&cli.flash_file, protocol.wallet_mut().storage_mut()) {
        eprintln!("warning: failed to persist flash image: {e}");
    }
}

fn build_request(command: &Command) -> (MessageId, Vec<u8>) {
    match command {
        Command::Initialize => (MessageId::Initialize, Vec::new()),
        Command::Ping { text } => {
            let mut w = PayloadWriter::new();
            w.string(text);
            (MessageId::Ping, w.into_bytes())
        }
        Command::ListWallets => (MessageId::ListWallets, Vec::new()),
        Command::CreateWallet { slot, name, password } => {
            let mut w = PayloadWriter::new();
            w.u32(*slot).string(name).bytes(password.as_bytes());
            (MessageId::CreateWallet, w.into_bytes())
        }
        Command::RestoreWallet { slot, name, seed_hex, password } => {
            let seed = hex::decode(seed_hex).expect("seed_hex must be valid hex");
            let mut w = PayloadWriter::new();
            w.u32(*slot).string(name).bytes(password.as_bytes()).bytes(&seed);
            (MessageId::RestoreWallet, w.into_bytes())
        }
        Command::LoadWallet { slot, .. } => {
            let mut w = PayloadWriter::new();
            w.u32(*slot);
            (MessageId::LoadWallet, w.into_bytes())
        }
        Command::DeleteWallet { slot } => {
            let mut w = PayloadWriter::new();
            w.u32(*slot);
            (MessageId::DeleteWallet, w.into_bytes())
        }
        Command::BackupWallet => (MessageId::BackupWallet, Vec::new()),
        Command::ChangeWalletName { new_name } => {
            let mut w = PayloadWriter::new();
            w.string(new_name);
            (MessageId::ChangeWalletName, w.into_bytes())
        }
        Command::ChangeEncryptionKey { .. } => (MessageId::ChangeEncryptionKey, Vec::new()),
        Command::FormatDevice => (MessageId::FormatDevice, Vec::new()),
        Command::NewAddress => (MessageId::NewAddress, Vec::new()),
        Command::GetNumAddresses => (MessageId::GetNumAddresses, Vec::new()),
        Command::GetAddressAndPublicKey { handle } => {
            let mut w = PayloadWriter::new();
            w.u32(*handle);
            (MessageId::GetAddressAndPublicKey, w.into_bytes())
        }
        Command::GetPrivateKey { handle } => {
            let mut w = PayloadWriter::new();
            w.u32(*handle);
            (MessageId::GetPrivateKey, w.into_bytes())
        }
        Command::SignTransaction { handle, tx_hex } => {
            let tx_bytes = hex::decode(tx_hex).expect("tx_hex must be valid hex");
            let mut payload = handle.to_be_bytes().to_vec();
            payload.extend_from_slice(&tx_bytes);
            (MessageId::SignTransaction, payload)
        }
        Command::GetDeviceUuid => (MessageId::GetDeviceUuid, Vec::new()),
        Command::GetEntropy { bytes } => {
            let mut w = PayloadWriter::new();
            w.u32(*bytes);
            (MessageId::GetEntropy, w.into_bytes())
        }
        Command::GetMasterKey => (MessageId::GetMasterKey, Vec::new()),
    }
}

fn print_response(command: &Command, resp_id: u16, body: &[u8]) {
    let mut reader = PayloadReader::new(body);
    match command {
        Command::Initialize => {
            let session_id = reader.u32().unwrap_or(0);
            let uuid = reader.fixed_bytes(16).unwrap_or_default();
            let slots = reader.u32().unwrap_or(0);
            println!("session_id={session_id:08x} uuid={} slots={slots}", hex::encode(uuid));
        }
        Command::Ping { .. } => println!("pong: {}", String::from_utf8_lossy(body)),
        Command::ListWallets => {
            let count = reader.u32().unwrap_or(0);
            for _ in 0..count {
                let slot = reader.u32().unwrap_or(0);
                let present = reader.u8().unwrap_or(0) != 0;
                let name = reader.string().unwrap_or_default();
                println!("slot {slot}: {} {name}", if present { "wallet" } else { "empty" });
            }
        }
        Command::LoadWallet { .. } => {
            let num = reader.u32().unwrap_or(0);
            println!("loaded, {num} addresses");
        }
        Command::BackupWallet => {
            let seed = reader.bytes().unwrap_or_default();
            println!("seed: {}", hex::encode(seed));
        }
        Command::NewAddress => {
            let handle = reader.u32().unwrap_or(0);
            println!("new address handle: {handle}");
        }
        Command::GetNumAddresses => {
            let num = reader.u32().unwrap_or(0);
            println!("num addresses: {num}");
        }
        Command::GetAddressAndPublicKey { .. } => {
            let address = reader.string().unwrap_or_default();
            let pubkey = reader.bytes().unwrap_or_default();
            println!("address: {address}");
            println!("pubkey: {}", hex::encode(pubkey));
        }
        Command::GetPrivateKey { .. } => {
            let key = reader.bytes().unwrap_or_default();
            println!("private key: {}", hex::encode(key));
        }
        Command::SignTransaction { .. } => {
            let der = reader.bytes().unwrap_or_default();
            println!("signature: {}", hex::encode(der));
        }
        Command::GetDeviceUuid => {
            let uuid = reader.fixed_bytes(16).unwrap_or_default();
            println!("uuid: {}", hex::encode(uuid));
        }
        Command::GetEntropy { .. } => {
            let bytes = reader.bytes().unwrap_or_default();
            println!("entropy: {}", hex::encode(bytes));
        }
        Command::GetMasterKey => {
            let key = reader.bytes().unwrap_or_default();
            let chain_code = reader.fixed_bytes(32).unwrap_or_default();
            println!("master key: {}", hex::encode(key));
            println!("chain code: {}", hex::encode(chain_code));
        }
        _ => {
            debug_assert_eq!(resp_id, MessageId::Success as u16);
            println!("ok");
        }
    }
}
