//! Byte-transport collaborator: one blocking byte in, one blocking byte out.
//! The real transport is a USART/USB FIFO pair serviced by interrupts; this
//! crate only needs the blocking byte-at-a-time contract, so it is modeled
//! as a trait `Protocol` is generic over.

use crate::error::MiscError;

pub trait ByteIo {
    fn read_byte(&mut self) -> Result<u8, MiscError>;
    fn write_byte(&mut self, byte: u8) -> Result<(), MiscError>;

    fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>, MiscError> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(self.read_byte()?);
        }
        Ok(out)
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), MiscError> {
        for b in bytes {
            self.write_byte(*b)?;
        }
        Ok(())
    }
}

/// In-memory `ByteIo` over a pair of byte queues, used by tests and by
/// `wallet-sim`'s stdio front end.
pub struct ChannelIo {
    inbox: std::collections::VecDeque<u8>,
    outbox: Vec<u8>,
}

impl ChannelIo {
    pub fn new(input: Vec<u8>) -> Self {
        ChannelIo {
            inbox: input.into(),
            outbox: Vec::new(),
        }
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.inbox.extend(bytes.iter().copied());
    }

    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.outbox)
    }
}

impl ByteIo for ChannelIo {
    fn read_byte(&mut self) -> Result<u8, MiscError> {
        self.inbox.pop_front().ok_or(MiscError::InvalidPacket)
    }

    fn write_byte(&mut self, byte: u8) -> Result<(), MiscError> {
        self.outbox.push(byte);
        Ok(())
    }
}

/// Adapts a `ByteIo` into a `txparser::ByteSource`, so the transaction parser
/// can read directly from the transport without the payload ever being
/// buffered in full.
pub struct ByteIoSource<'a, T: ByteIo> {
    io: &'a mut T,
}

impl<'a, T: ByteIo> ByteIoSource<'a, T> {
    pub fn new(io: &'a mut T) -> Self {
        ByteIoSource { io }
    }
}

impl<'a, T: ByteIo> crate::txparser::ByteSource for ByteIoSource<'a, T> {
    fn next_byte(&mut self) -> Result<u8, crate::txparser::TxError> {
        self.io.read_byte().map_err(|_| crate::txparser::TxError::ReadError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_io_round_trips() {
        let mut io = ChannelIo::new(vec![1, 2, 3]);
        assert_eq!(io.read_byte().unwrap(), 1);
        io.write_byte(9).unwrap();
        assert_eq!(io.take_output(), vec![9]);
        assert_eq!(io.read_bytes(2).unwrap(), vec![2, 3]);
    }

    #[test]
    fn empty_channel_reports_invalid_packet() {
        let mut io = ChannelIo::new(vec![]);
        assert_eq!(io.read_byte().unwrap_err(), MiscError::InvalidPacket);
    }
}
