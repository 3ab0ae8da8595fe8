//! Packet framing and payload field codec.
//!
//! Framing is fixed: `##` ‖ uint16-be message id ‖ uint32-be payload length
//! ‖ payload. The payload itself is a small field-tagged encoding (length-
//! prefixed strings/bytes, fixed-width integers) rather than a full
//! protobuf implementation, with explicit field writes rather than a single
//! bulk serialize call so `SignTransaction`'s transaction bytes never need
//! to round-trip through an in-memory payload buffer.

use crate::error::MiscError;
use crate::protocol::io::ByteIo;

/// Wire message ids, partitioned by functional area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum MessageId {
    Initialize = 0x0001,
    Ping = 0x0002,

    ListWallets = 0x0010,
    CreateWallet = 0x0011,
    RestoreWallet = 0x0012,
    DeleteWallet = 0x0013,
    LoadWallet = 0x0014,
    BackupWallet = 0x0015,
    ChangeWalletName = 0x0016,
    ChangeEncryptionKey = 0x0017,
    FormatDevice = 0x0018,

    NewAddress = 0x0020,
    GetNumAddresses = 0x0021,
    GetAddressAndPublicKey = 0x0022,
    GetPrivateKey = 0x0023,

    SignTransaction = 0x0030,

    GetDeviceUuid = 0x0040,
    GetEntropy = 0x0041,
    GetMasterKey = 0x0042,

    ButtonRequest = 0x0050,
    ButtonAck = 0x0051,
    ButtonCancel = 0x0052,
    PinRequest = 0x0053,
    PinAck = 0x0054,
    PinCancel = 0x0055,
    OtpRequest = 0x0056,
    OtpAck = 0x0057,
    OtpCancel = 0x0058,

    Success = 0x0060,
    Failure = 0x0061,
    Features = 0x0070,
}

impl MessageId {
    pub fn from_u16(v: u16) -> Option<Self> {
        use MessageId::*;
        Some(match v {
            0x0001 => Initialize,
            0x0002 => Ping,
            0x0010 => ListWallets,
            0x0011 => CreateWallet,
            0x0012 => RestoreWallet,
            0x0013 => DeleteWallet,
            0x0014 => LoadWallet,
            0x0015 => BackupWallet,
            0x0016 => ChangeWalletName,
            0x0017 => ChangeEncryptionKey,
            0x0018 => FormatDevice,
            0x0020 => NewAddress,
            0x0021 => GetNumAddresses,
            0x0022 => GetAddressAndPublicKey,
            0x0023 => GetPrivateKey,
            0x0030 => SignTransaction,
            0x0040 => GetDeviceUuid,
            0x0041 => GetEntropy,
            0x0042 => GetMasterKey,
            0x0050 => ButtonRequest,
            0x0051 => ButtonAck,
            0x0052 => ButtonCancel,
            0x0053 => PinRequest,
            0x0054 => PinAck,
            0x0055 => PinCancel,
            0x0056 => OtpRequest,
            0x0057 => OtpAck,
            0x0058 => OtpCancel,
            0x0060 => Success,
            0x0061 => Failure,
            0x0070 => Features,
            _ => return None,
        })
    }
}

/// A wire-level error code is a `(set, code)` pair, keeping miscellaneous,
/// wallet, and transaction error codes in disjoint numeric spaces rather
/// than one flat enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSet {
    Misc = 1,
    Wallet = 2,
    Transaction = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorCode {
    pub set: ErrorSet,
    pub code: u16,
}

impl ErrorCode {
    pub fn misc(e: MiscError) -> Self {
        let code = match e {
            MiscError::InvalidPacket => 1,
            MiscError::UnexpectedPacket => 2,
            MiscError::PermissionDeniedUser => 3,
            MiscError::PermissionDeniedHost => 4,
            MiscError::OtpMismatch => 5,
            MiscError::ParameterTooLarge => 6,
        };
        ErrorCode { set: ErrorSet::Misc, code }
    }

    pub fn wallet(e: crate::wallet::WalletError) -> Self {
        use crate::wallet::WalletError::*;
        let code = match e {
            Full => 1,
            Empty => 2,
            ReadError => 3,
            WriteError => 4,
            NotThere => 5,
            NotLoaded => 6,
            InvalidHandle => 7,
            BackupError => 8,
            RngFailure => 9,
            InvalidWalletNum => 10,
            InvalidOperation => 11,
            AlreadyExists => 12,
            BadAddress => 13,
        };
        ErrorCode { set: ErrorSet::Wallet, code }
    }

    pub fn transaction(e: crate::txparser::TxError) -> Self {
        use crate::txparser::TxError::*;
        let code = match e {
            InvalidFormat => 1,
            TooManyInputs => 2,
            TooManyOutputs => 3,
            TooLarge => 4,
            NonStandard => 5,
            InvalidAmount => 6,
            InvalidReference => 7,
            ReadError => 8,
        };
        ErrorCode { set: ErrorSet::Transaction, code }
    }
}

/// A fixed 8-byte packet header: `##` ‖ id ‖ length.
pub struct PacketHeader {
    pub id: u16,
    pub length: u32,
}

pub fn read_header(io: &mut impl ByteIo) -> Result<PacketHeader, MiscError> {
    let marker = io.read_bytes(2)?;
    if marker != [b'#', b'#'] {
        return Err(MiscError::InvalidPacket);
    }
    let id_bytes = io.read_bytes(2)?;
    let id = u16::from_be_bytes([id_bytes[0], id_bytes[1]]);
    let len_bytes = io.read_bytes(4)?;
    let length = u32::from_be_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]);
    Ok(PacketHeader { id, length })
}

pub fn write_header(io: &mut impl ByteIo, id: u16, length: u32) -> Result<(), MiscError> {
    io.write_bytes(b"##")?;
    io.write_bytes(&id.to_be_bytes())?;
    io.write_bytes(&length.to_be_bytes())?;
    Ok(())
}

/// Sequentially writes fixed-width integers and length-prefixed
/// strings/bytes into a payload buffer.
#[derive(Default)]
pub struct PayloadWriter {
    buf: Vec<u8>,
}

impl PayloadWriter {
    pub fn new() -> Self {
        PayloadWriter::default()
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub fn u16(&mut self, v: u16) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn u64(&mut self, v: u64) -> &mut Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn bytes(&mut self, v: &[u8]) -> &mut Self {
        self.u32(v.len() as u32);
        self.buf.extend_from_slice(v);
        self
    }

    pub fn fixed_bytes(&mut self, v: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(v);
        self
    }

    pub fn string(&mut self, v: &str) -> &mut Self {
        self.bytes(v.as_bytes());
        self
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Sequentially reads fields out of a fully-buffered payload (used for
/// every message kind except `SignTransaction`'s transaction-bytes tail,
/// which is read directly off the transport — see `protocol::io::ByteIoSource`).
pub struct PayloadReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        PayloadReader { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], MiscError> {
        if self.pos + n > self.buf.len() {
            return Err(MiscError::InvalidPacket);
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn u8(&mut self) -> Result<u8, MiscError> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16, MiscError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn u32(&mut self) -> Result<u32, MiscError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn u64(&mut self) -> Result<u64, MiscError> {
        let b = self.take(8)?;
        Ok(u64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    pub fn fixed_bytes(&mut self, n: usize) -> Result<Vec<u8>, MiscError> {
        Ok(self.take(n)?.to_vec())
    }

    pub fn bytes(&mut self) -> Result<Vec<u8>, MiscError> {
        let len = self.u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    pub fn string(&mut self) -> Result<String, MiscError> {
        let bytes = self.bytes()?;
        String::from_utf8(bytes).map_err(|_| MiscError::InvalidPacket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::io::ChannelIo;

    #[test]
    fn header_round_trips() {
        let mut io = ChannelIo::new(vec![]);
        write_header(&mut io, MessageId::Ping as u16, 4).unwrap();
        let bytes = io.take_output();
        let mut reader = ChannelIo::new(bytes);
        let header = read_header(&mut reader).unwrap();
        assert_eq!(header.id, MessageId::Ping as u16);
        assert_eq!(header.length, 4);
    }

    #[test]
    fn bad_marker_is_invalid_packet() {
        let mut io = ChannelIo::new(vec![b'x', b'x', 0, 1, 0, 0, 0, 0]);
        let err = read_header(&mut io).unwrap_err();
        assert_eq!(err, MiscError::InvalidPacket);
    }

    #[test]
    fn payload_round_trips() {
        let mut writer = PayloadWriter::new();
        writer.u32(42).string("hello").bytes(&[1, 2, 3]);
        let bytes = writer.into_bytes();

        let mut reader = PayloadReader::new(&bytes);
        assert_eq!(reader.u32().unwrap(), 42);
        assert_eq!(reader.string().unwrap(), "hello");
        assert_eq!(reader.bytes().unwrap(), vec![1, 2, 3]);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn truncated_payload_is_invalid_packet() {
        let mut reader = PayloadReader::new(&[0, 0, 0, 1]);
        assert!(reader.u64().is_err());
    }
}
