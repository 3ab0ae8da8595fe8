//! End-to-end dialogue tests driving the full `Protocol` dispatch loop
//! exactly as a host application would: one `ChannelIo` per session, one
//! `serve_one` call per request, feeding interjection replies as they come
//! due. Unlike the module-local `#[cfg(test)]` tests, these exercise a
//! multi-request session rather than one handler in isolation.

use btpc_wallet_core::config::DeviceConfig;
use btpc_wallet_core::protocol::codec::{MessageId, PayloadReader, PayloadWriter};
use btpc_wallet_core::protocol::entropy::FixedEntropySource;
use btpc_wallet_core::protocol::io::ChannelIo;
use btpc_wallet_core::protocol::ui::ScriptedUi;
use btpc_wallet_core::protocol::Protocol;
use btpc_wallet_core::storage::memory::MemoryFlash;

fn send(io: &mut ChannelIo, id: MessageId, payload: &[u8]) {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"##");
    bytes.extend_from_slice(&(id as u16).to_be_bytes());
    bytes.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    bytes.extend_from_slice(payload);
    io.feed(&bytes);
}

fn ack(io: &mut ChannelIo, id: MessageId, payload: &[u8]) {
    send(io, id, payload);
}

fn read_response(io: &mut ChannelIo) -> (MessageId, Vec<u8>) {
    use btpc_wallet_core::protocol::codec::read_header;
    let bytes = io.take_output();
    let mut reader = ChannelIo::new(bytes);
    let header = read_header(&mut reader).unwrap();
    let body = reader.read_bytes(header.length as usize).unwrap();
    (MessageId::from_u16(header.id).unwrap(), body)
}

/// `denials[i]` is the i-th button interjection's outcome (`false` =
/// approved). Button presses are the only consent level `ScriptedUi`
/// scripts; OTP/password replies are driven directly through the wire.
fn new_session(denials: Vec<bool>) -> (Protocol<MemoryFlash, ScriptedUi, FixedEntropySource>, ChannelIo) {
    let config = DeviceConfig::default();
    let flash = MemoryFlash::for_device(config.num_wallet_slots);
    let ui = ScriptedUi::new(denials);
    let entropy = FixedEntropySource::new(vec![0x13, 0x37, 0xc0, 0xfe, 0xba, 0xbe, 0x01, 0x02]);
    let protocol = Protocol::new(flash, config, ui, entropy).unwrap();
    (protocol, ChannelIo::new(vec![]))
}

#[test]
fn full_wallet_lifecycle_over_one_session() {
    // One approval each for CreateWallet, three NewAddress calls, and
    // GetAddressAndPublicKey.
    let (mut protocol, mut io) = new_session(vec![false; 5]);

    send(&mut io, MessageId::Initialize, &[]);
    protocol.serve_one(&mut io).unwrap();
    let (id, _) = read_response(&mut io);
    assert_eq!(id, MessageId::Features);

    let mut create_payload = PayloadWriter::new();
    create_payload.u32(0).string("daily").bytes(b"hunter2");
    send(&mut io, MessageId::CreateWallet, &create_payload.into_bytes());
    ack(&mut io, MessageId::ButtonAck, &[]);
    protocol.serve_one(&mut io).unwrap();
    let (id, _) = read_response(&mut io);
    assert_eq!(id, MessageId::Success);

    for _ in 0..3 {
        send(&mut io, MessageId::NewAddress, &[]);
        ack(&mut io, MessageId::ButtonAck, &[]);
        protocol.serve_one(&mut io).unwrap();
        let (id, _) = read_response(&mut io);
        assert_eq!(id, MessageId::Success);
    }

    send(&mut io, MessageId::GetNumAddresses, &[]);
    protocol.serve_one(&mut io).unwrap();
    let (id, body) = read_response(&mut io);
    assert_eq!(id, MessageId::Success);
    let mut reader = PayloadReader::new(&body);
    assert_eq!(reader.u32().unwrap(), 3);

    let mut get_addr_payload = PayloadWriter::new();
    get_addr_payload.u32(1);
    send(&mut io, MessageId::GetAddressAndPublicKey, &get_addr_payload.into_bytes());
    ack(&mut io, MessageId::ButtonAck, &[]);
    protocol.serve_one(&mut io).unwrap();
    let (id, body) = read_response(&mut io);
    assert_eq!(id, MessageId::Success);
    let mut reader = PayloadReader::new(&body);
    let address_text = reader.string().unwrap();
    assert!(address_text.chars().next().unwrap() == '1');
    let pubkey = reader.bytes().unwrap();
    assert_eq!(pubkey.len(), 33, "compressed public key");
}

#[test]
fn delete_wallet_requires_both_button_and_otp() {
    // One approval for CreateWallet, one for DeleteWallet's button step.
    let (mut protocol, mut io) = new_session(vec![false, false]);

    let mut create_payload = PayloadWriter::new();
    create_payload.u32(0).string("to-delete").bytes(b"");
    send(&mut io, MessageId::CreateWallet, &create_payload.into_bytes());
    ack(&mut io, MessageId::ButtonAck, &[]);
    protocol.serve_one(&mut io).unwrap();
    read_response(&mut io);

    let mut delete_payload = PayloadWriter::new();
    delete_payload.u32(0);
    send(&mut io, MessageId::DeleteWallet, &delete_payload.into_bytes());
    ack(&mut io, MessageId::ButtonAck, &[]);
    // The device now pauses again mid-dispatch for the OTP step; the OTP it
    // displayed is not known to this test in advance, so answer with an
    // obviously wrong value and confirm the dialogue rejects it rather than
    // silently succeeding.
    let mut otp_payload = PayloadWriter::new();
    otp_payload.string("000000");
    ack(&mut io, MessageId::OtpAck, &otp_payload.into_bytes());
    protocol.serve_one(&mut io).unwrap();
    let (id, body) = read_response(&mut io);
    assert_eq!(id, MessageId::Failure);
    let mut reader = PayloadReader::new(&body);
    let _set = reader.u16().unwrap();
    let _code = reader.u16().unwrap();

    send(&mut io, MessageId::ListWallets, &[]);
    protocol.serve_one(&mut io).unwrap();
    let (_, body) = read_response(&mut io);
    let mut reader = PayloadReader::new(&body);
    let _count = reader.u32().unwrap();
    let (_, present0, name0) = (reader.u32().unwrap(), reader.u8().unwrap(), reader.string().unwrap());
    assert_eq!(present0, 1, "wallet must survive a mismatched OTP");
    assert_eq!(name0, "to-delete");
}

#[test]
fn get_device_uuid_survives_across_many_requests() {
    let (mut protocol, mut io) = new_session(vec![]);
    send(&mut io, MessageId::GetDeviceUuid, &[]);
    protocol.serve_one(&mut io).unwrap();
    let (_, first) = read_response(&mut io);

    for _ in 0..5 {
        send(&mut io, MessageId::Ping, b"hi");
        protocol.serve_one(&mut io).unwrap();
        read_response(&mut io);
    }

    send(&mut io, MessageId::GetDeviceUuid, &[]);
    protocol.serve_one(&mut io).unwrap();
    let (_, second) = read_response(&mut io);
    assert_eq!(first, second);
}
