//! Human-displayed text for amounts and addresses.
//!
//! The transaction parser only ever hands the rest of the device a
//! `pubkey_hash` and a satoshi count; this module turns those into the two
//! strings `new_output_seen(amount_text, address_text)` actually displays.

use crate::config::Network;

/// Base58check-encodes a P2PKH public-key hash under `network`'s version
/// byte: `base58(version || hash160 || checksum[0..4])`, where `checksum =
/// SHA256(SHA256(version || hash160))`.
pub fn encode_p2pkh(network: Network, pubkey_hash: &[u8; 20]) -> String {
    let mut payload = Vec::with_capacity(1 + 20 + 4);
    payload.push(network.pubkey_hash_version());
    payload.extend_from_slice(pubkey_hash);
    let checksum = crate::hash::sha256d(&payload);
    payload.extend_from_slice(&checksum[..4]);
    bs58::encode(payload).into_string()
}

/// Decodes a base58check P2PKH address back to its pubkey hash, verifying
/// the checksum and the network version byte.
pub fn decode_p2pkh(network: Network, address: &str) -> Result<[u8; 20], AddressError> {
    let payload = bs58::decode(address)
        .into_vec()
        .map_err(|_| AddressError::InvalidEncoding)?;
    if payload.len() != 25 {
        return Err(AddressError::InvalidEncoding);
    }
    if payload[0] != network.pubkey_hash_version() {
        return Err(AddressError::WrongNetwork);
    }
    let (body, checksum) = payload.split_at(21);
    let expected = crate::hash::sha256d(body);
    if checksum != &expected[..4] {
        return Err(AddressError::BadChecksum);
    }
    let mut hash = [0u8; 20];
    hash.copy_from_slice(&body[1..21]);
    Ok(hash)
}

#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum AddressError {
    #[error("address is not valid base58check")]
    InvalidEncoding,
    #[error("address does not match the expected checksum")]
    BadChecksum,
    #[error("address version byte does not match the configured network")]
    WrongNetwork,
}

/// Renders a satoshi amount as a decimal BTC string with exactly eight
/// fractional digits and no thousands separators, e.g. `123_456_789` ->
/// `"1.23456789"`.
pub fn format_amount(satoshis: u64) -> String {
    let whole = satoshis / 100_000_000;
    let frac = satoshis % 100_000_000;
    format!("{whole}.{frac:08}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_amount_pads_fraction() {
        assert_eq!(format_amount(123_456_789), "1.23456789");
        assert_eq!(format_amount(100_000_000), "1.00000000");
        assert_eq!(format_amount(1), "0.00000001");
        assert_eq!(format_amount(0), "0.00000000");
    }

    #[test]
    fn encode_decode_round_trips() {
        let hash = [0x42u8; 20];
        let address = encode_p2pkh(Network::Mainnet, &hash);
        let decoded = decode_p2pkh(Network::Mainnet, &address).unwrap();
        assert_eq!(decoded, hash);
    }

    #[test]
    fn wrong_network_is_rejected() {
        let hash = [0x11u8; 20];
        let address = encode_p2pkh(Network::Mainnet, &hash);
        let err = decode_p2pkh(Network::Testnet, &address).unwrap_err();
        assert_eq!(err, AddressError::WrongNetwork);
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let hash = [0x77u8; 20];
        let address = encode_p2pkh(Network::Mainnet, &hash);
        let mut bytes = address.into_bytes();
        let last = bytes.len() - 1;
        bytes[last] = if bytes[last] == b'1' { b'2' } else { b'1' };
        let corrupted = String::from_utf8(bytes).unwrap();
        assert!(decode_p2pkh(Network::Mainnet, &corrupted).is_err());
    }
}
