//! Streaming Bitcoin transaction parser.
//!
//! Single-pass, byte-callback-driven: the parser never buffers the
//! transaction in RAM (buffering a transaction up to `MAX_TRANSACTION_SIZE`
//! bytes is infeasible on target hardware). Two SHA-256 contexts run
//! concurrently: the signature hash absorbs every byte, the
//! transaction-identity hash absorbs every byte except each input's script
//! bytes.

use thiserror::Error;

use crate::config::DeviceConfig;
use crate::hash::Sha256Ctx;

/// Errors the parser can report. `ReadError` takes
/// priority over every parse error: once the byte source fails, the parser
/// stops immediately rather than attempting to drain the rest of the
/// declared length.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TxError {
    #[error("transaction does not match the accepted wire format")]
    InvalidFormat,
    #[error("declared input count exceeds the device limit")]
    TooManyInputs,
    #[error("declared output count exceeds the device limit")]
    TooManyOutputs,
    #[error("declared transaction length exceeds the device limit")]
    TooLarge,
    #[error("transaction does not match the standard P2PKH pattern this device recognises")]
    NonStandard,
    #[error("output amount exceeds 21,000,000 BTC in satoshis")]
    InvalidAmount,
    #[error("a referenced previous output is malformed")]
    InvalidReference,
    #[error("the byte stream failed before the declared length was reached")]
    ReadError,
}

/// One parsed, to-be-displayed output; the parser calls `new_output_seen`
/// with one of these for each output.
pub struct ParsedOutput {
    pub amount_satoshis: u64,
    pub pubkey_hash: [u8; 20],
}

/// The parser's two digests, ready for ECDSA signing (`sig_hash`, after the
/// caller's chosen SIGHASH-dependent finalisation — this crate always uses
/// SIGHASH_ALL, so the caller just double-SHA-256s it) and for consent-bypass
/// comparison across multiple inputs of the same transaction (`tx_hash`).
pub struct ParsedTransaction {
    /// `SHA256(SHA256(all bytes))` — Bitcoin's legacy sighash digest.
    pub sig_hash: [u8; 32],
    /// `SHA256(all bytes except each input's script)` — stable across the
    /// per-input script substitution used when producing each input's
    /// individual `sig_hash`.
    pub tx_hash: [u8; 32],
    pub outputs: Vec<ParsedOutput>,
}

const MAX_AMOUNT_SATOSHIS: u64 = 21_000_000 * 100_000_000;
const P2PKH_SCRIPT_LEN: u64 = 0x19;

/// A source of bytes delivered one at a time, modelling its
/// `stream_get_one_byte`. Implementations may be backed by a network socket,
/// an in-memory buffer (tests), or — in firmware — the USART FIFO.
pub trait ByteSource {
    fn next_byte(&mut self) -> Result<u8, TxError>;
}

/// `ByteSource` over an in-memory slice, used by tests and the `wallet-sim`
/// binary.
pub struct SliceSource<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> SliceSource<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        SliceSource { bytes, pos: 0 }
    }
}

impl<'a> ByteSource for SliceSource<'a> {
    fn next_byte(&mut self) -> Result<u8, TxError> {
        let byte = *self.bytes.get(self.pos).ok_or(TxError::ReadError)?;
        self.pos += 1;
        Ok(byte)
    }
}

/// Drives a single-pass parse of `length` bytes from `source`.
pub struct TxParser<'a, F: FnMut(&ParsedOutput)> {
    config: &'a DeviceConfig,
    new_output_seen: F,
}

impl<'a, F: FnMut(&ParsedOutput)> TxParser<'a, F> {
    pub fn new(config: &'a DeviceConfig, new_output_seen: F) -> Self {
        TxParser { config, new_output_seen }
    }

    /// Parses exactly `length` bytes from `source`. Consumes exactly that
    /// many bytes in every case except a genuine stream read error, so the
    /// host's next packet boundary is never lost.
    pub fn parse(
        &mut self,
        source: &mut impl ByteSource,
        length: u64,
    ) -> Result<ParsedTransaction, TxError> {
        if length > self.config.max_transaction_size {
            return Err(TxError::TooLarge);
        }

        let mut cursor = Cursor {
            source,
            consumed: 0,
            length,
            sig_hash: Sha256Ctx::begin(),
            tx_hash: Sha256Ctx::begin(),
            in_input_script: false,
        };

        let result = parse_body(&mut cursor, self.config, &mut self.new_output_seen);

        match &result {
            Err(TxError::ReadError) => return result,
            _ => {
                // Totality: drain any undeclared-format leftover bytes so
                // the host's packet framing stays in sync even on a parse
                // error that returns before the declared length is reached.
                while cursor.consumed < cursor.length {
                    if cursor.read_raw().is_err() {
                        return Err(TxError::ReadError);
                    }
                }
            }
        }

        result.map(|outputs| {
            let sig_hash_once = cursor.sig_hash.clone().finish();
            ParsedTransaction {
                sig_hash: crate::hash::sha256(&sig_hash_once),
                tx_hash: cursor.tx_hash.clone().finish(),
                outputs,
            }
        })
    }
}

struct Cursor<'s, S: ByteSource + ?Sized> {
    source: &'s mut S,
    consumed: u64,
    length: u64,
    sig_hash: Sha256Ctx,
    tx_hash: Sha256Ctx,
    in_input_script: bool,
}

impl<'s, S: ByteSource + ?Sized> Cursor<'s, S> {
    fn read_raw(&mut self) -> Result<u8, TxError> {
        if self.consumed >= self.length {
            return Err(TxError::ReadError);
        }
        let byte = self.source.next_byte()?;
        self.consumed += 1;
        Ok(byte)
    }

    fn read_byte(&mut self) -> Result<u8, TxError> {
        let byte = self.read_raw()?;
        self.sig_hash.write_byte(byte);
        if !self.in_input_script {
            self.tx_hash.write_byte(byte);
        }
        Ok(byte)
    }

    fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>, TxError> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(self.read_byte()?);
        }
        Ok(out)
    }

    fn read_u32_le(&mut self) -> Result<u32, TxError> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
    }

    fn read_u64_le(&mut self) -> Result<u64, TxError> {
        let bytes = self.read_bytes(8)?;
        Ok(u64::from_le_bytes(bytes.try_into().unwrap()))
    }

    /// Bitcoin's compact-size varint: `<0xfd` one byte,
    /// `0xfd` prefix → 2-byte LE, `0xfe` prefix → 4-byte LE, `0xff` prefix
    /// (8-byte) rejected as out of range.
    fn read_varint(&mut self) -> Result<u64, TxError> {
        let first = self.read_byte()?;
        match first {
            0..=0xfc => Ok(first as u64),
            0xfd => {
                let bytes = self.read_bytes(2)?;
                Ok(u16::from_le_bytes(bytes.try_into().unwrap()) as u64)
            }
            0xfe => {
                let bytes = self.read_bytes(4)?;
                Ok(u32::from_le_bytes(bytes.try_into().unwrap()) as u64)
            }
            0xff => Err(TxError::InvalidFormat),
        }
    }
}

fn parse_body<S: ByteSource + ?Sized>(
    cursor: &mut Cursor<'_, S>,
    config: &DeviceConfig,
    new_output_seen: &mut impl FnMut(&ParsedOutput),
) -> Result<Vec<ParsedOutput>, TxError> {
    let version = cursor.read_u32_le()?;
    if version != 1 {
        return Err(TxError::InvalidFormat);
    }

    let num_inputs = cursor.read_varint()?;
    if num_inputs == 0 {
        return Err(TxError::InvalidFormat);
    }
    if num_inputs > config.max_inputs as u64 {
        return Err(TxError::TooManyInputs);
    }

    for _ in 0..num_inputs {
        let _prev_tx_hash = cursor.read_bytes(32)?;
        let _prev_index = cursor.read_u32_le()?;

        cursor.in_input_script = true;
        let script_len = cursor.read_varint()?;
        if script_len > config.max_transaction_size {
            cursor.in_input_script = false;
            return Err(TxError::InvalidReference);
        }
        let _script = cursor.read_bytes(script_len as usize)?;
        cursor.in_input_script = false;

        let sequence = cursor.read_u32_le()?;
        if sequence != 0xFFFF_FFFF {
            return Err(TxError::NonStandard);
        }
    }

    let num_outputs = cursor.read_varint()?;
    if num_outputs == 0 {
        return Err(TxError::InvalidFormat);
    }
    if num_outputs > config.max_outputs as u64 {
        return Err(TxError::TooManyOutputs);
    }

    let mut outputs = Vec::with_capacity(num_outputs as usize);
    for _ in 0..num_outputs {
        let amount = cursor.read_u64_le()?;
        if amount > MAX_AMOUNT_SATOSHIS {
            return Err(TxError::InvalidAmount);
        }

        let script_len = cursor.read_varint()?;
        if script_len != P2PKH_SCRIPT_LEN {
            return Err(TxError::NonStandard);
        }
        let script = cursor.read_bytes(script_len as usize)?;
        let pubkey_hash = parse_p2pkh_script(&script)?;

        let output = ParsedOutput {
            amount_satoshis: amount,
            pubkey_hash,
        };
        new_output_seen(&output);
        outputs.push(output);
    }

    let locktime = cursor.read_u32_le()?;
    if locktime != 0 {
        return Err(TxError::NonStandard);
    }

    let hashtype = cursor.read_u32_le()?;
    if hashtype != 1 {
        return Err(TxError::NonStandard);
    }

    Ok(outputs)
}

/// Validates `script` is exactly `OP_DUP OP_HASH160 0x14 <20 bytes>
/// OP_EQUALVERIFY OP_CHECKSIG` and returns the embedded pubkey hash.
fn parse_p2pkh_script(script: &[u8]) -> Result<[u8; 20], TxError> {
    const OP_DUP: u8 = 0x76;
    const OP_HASH160: u8 = 0xa9;
    const OP_EQUALVERIFY: u8 = 0x88;
    const OP_CHECKSIG: u8 = 0xac;

    if script.len() != 25
        || script[0] != OP_DUP
        || script[1] != OP_HASH160
        || script[2] != 0x14
        || script[23] != OP_EQUALVERIFY
        || script[24] != OP_CHECKSIG
    {
        return Err(TxError::NonStandard);
    }
    let mut hash = [0u8; 20];
    hash.copy_from_slice(&script[3..23]);
    Ok(hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p2pkh_script(hash: &[u8; 20]) -> Vec<u8> {
        let mut script = Vec::with_capacity(25);
        script.push(0x76);
        script.push(0xa9);
        script.push(0x14);
        script.extend_from_slice(hash);
        script.push(0x88);
        script.push(0xac);
        script
    }

    fn build_valid_tx(outputs: &[(u64, [u8; 20])]) -> Vec<u8> {
        let mut tx = Vec::new();
        tx.extend_from_slice(&1u32.to_le_bytes()); // version
        tx.push(1); // num_inputs
        tx.extend_from_slice(&[0xAAu8; 32]); // prev tx hash
        tx.extend_from_slice(&0u32.to_le_bytes()); // prev index
        tx.push(0); // empty scriptSig
        tx.extend_from_slice(&0xFFFF_FFFFu32.to_le_bytes()); // sequence

        tx.push(outputs.len() as u8); // num_outputs
        for (amount, hash) in outputs {
            tx.extend_from_slice(&amount.to_le_bytes());
            let script = p2pkh_script(hash);
            tx.push(script.len() as u8);
            tx.extend_from_slice(&script);
        }

        tx.extend_from_slice(&0u32.to_le_bytes()); // locktime
        tx.extend_from_slice(&1u32.to_le_bytes()); // hashtype suffix
        tx
    }

    #[test]
    fn parses_known_good_two_output_transaction() {
        let config = DeviceConfig::default();
        let outputs = [
            (600_000_000u64, [0x11u8; 20]),
            (1_234_567u64, [0x22u8; 20]),
        ];
        let bytes = build_valid_tx(&outputs);

        let mut seen = Vec::new();
        let mut parser = TxParser::new(&config, |out: &ParsedOutput| {
            seen.push((out.amount_satoshis, out.pubkey_hash));
        });
        let mut source = SliceSource::new(&bytes);
        let parsed = parser.parse(&mut source, bytes.len() as u64).unwrap();

        assert_eq!(seen.len(), 2);
        assert_eq!(parsed.outputs.len(), 2);
        assert_eq!(parsed.sig_hash, crate::hash::sha256d(&bytes));
    }

    #[test]
    fn blank_output_script_is_non_standard() {
        let config = DeviceConfig::default();
        let mut tx = Vec::new();
        tx.extend_from_slice(&1u32.to_le_bytes());
        tx.push(1);
        tx.extend_from_slice(&[0u8; 32]);
        tx.extend_from_slice(&0u32.to_le_bytes());
        tx.push(0);
        tx.extend_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
        tx.push(1); // num_outputs
        tx.extend_from_slice(&1_000u64.to_le_bytes());
        tx.push(0); // blank script: length 0
        tx.extend_from_slice(&0u32.to_le_bytes());
        tx.extend_from_slice(&1u32.to_le_bytes());

        let mut parser = TxParser::new(&config, |_: &ParsedOutput| {});
        let mut source = SliceSource::new(&tx);
        let err = parser.parse(&mut source, tx.len() as u64).unwrap_err();
        assert_eq!(err, TxError::NonStandard);
    }

    #[test]
    fn totality_consumes_exactly_declared_length_on_format_error() {
        let config = DeviceConfig::default();
        let mut tx = build_valid_tx(&[(100, [0x33u8; 20])]);
        // Corrupt the version field so parsing fails immediately, then pad
        // with trailing garbage the parser must still consume.
        tx[0] = 0xFF;
        tx.extend_from_slice(&[0u8; 16]);

        let mut parser = TxParser::new(&config, |_: &ParsedOutput| {});
        let mut source = SliceSource::new(&tx);
        let err = parser.parse(&mut source, tx.len() as u64).unwrap_err();
        assert_eq!(err, TxError::InvalidFormat);
    }

    #[test]
    fn stream_read_error_is_reported_immediately() {
        let config = DeviceConfig::default();
        let tx = build_valid_tx(&[(100, [0x44u8; 20])]);
        let mut parser = TxParser::new(&config, |_: &ParsedOutput| {});
        let mut source = SliceSource::new(&tx);
        // Declare a length longer than the source actually has.
        let err = parser.parse(&mut source, tx.len() as u64 + 10).unwrap_err();
        assert_eq!(err, TxError::ReadError);
    }

    #[test]
    fn zero_inputs_is_invalid_format() {
        let config = DeviceConfig::default();
        let mut tx = Vec::new();
        tx.extend_from_slice(&1u32.to_le_bytes());
        tx.push(0); // num_inputs = 0
        let mut parser = TxParser::new(&config, |_: &ParsedOutput| {});
        let mut source = SliceSource::new(&tx);
        let err = parser.parse(&mut source, tx.len() as u64).unwrap_err();
        assert_eq!(err, TxError::InvalidFormat);
    }
}
