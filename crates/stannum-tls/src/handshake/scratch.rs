//! Per-connection handshake I/O buffer.
//!
//! One buffer holds the single in-flight handshake message: outbound, it is
//! filled by a payload handler and drained into records; inbound, it
//! reassembles a message that may arrive split across records. The buffer
//! distinguishes "wiped" (nothing written for the current message yet) from
//! merely drained, because the writer composes header and payload exactly
//! once per message and must not repeat that after a would-block resume.

use zeroize::Zeroize;

use crate::TlsError;

/// TLS handshake message header length (type byte + 24-bit length).
pub(crate) const HANDSHAKE_HEADER_LENGTH: usize = 4;

pub(crate) struct HandshakeBuffer {
    buf: Vec<u8>,
    read_pos: usize,
    wiped: bool,
}

impl HandshakeBuffer {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            read_pos: 0,
            wiped: true,
        }
    }

    /// Whether the buffer is in the wiped state (no bytes written since the
    /// last wipe).
    pub fn is_wiped(&self) -> bool {
        self.wiped
    }

    /// Bytes written so far, including any already consumed.
    pub fn total_len(&self) -> usize {
        self.buf.len()
    }

    /// Bytes written but not yet consumed.
    pub fn data_available(&self) -> usize {
        self.buf.len() - self.read_pos
    }

    /// Append bytes to the buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.wiped = false;
        self.buf.extend_from_slice(data);
    }

    /// Consume and return the next `n` unread bytes.
    pub fn take(&mut self, n: usize) -> &[u8] {
        let start = self.read_pos;
        self.read_pos += n;
        &self.buf[start..self.read_pos]
    }

    /// Unread bytes, without consuming them.
    pub fn remaining(&self) -> &[u8] {
        &self.buf[self.read_pos..]
    }

    /// The full buffer contents, consumed or not.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Reset the read cursor, keeping accumulated bytes in place.
    pub fn reread(&mut self) {
        self.read_pos = 0;
    }

    /// Zero and discard all contents, returning to the wiped state.
    pub fn wipe(&mut self) {
        self.buf.zeroize();
        self.buf.clear();
        self.read_pos = 0;
        self.wiped = true;
    }

    /// Wipe and release the backing allocation (handshake finished).
    pub fn release(&mut self) {
        self.wipe();
        self.buf = Vec::new();
    }

    /// Write a handshake header with a placeholder length, to be backfilled
    /// by [`finish_header`](Self::finish_header) once the body is composed.
    pub fn write_header(&mut self, message_type: u8) {
        self.extend(&[message_type, 0, 0, 0]);
    }

    /// Backfill the header length field with the composed body length.
    pub fn finish_header(&mut self) -> Result<(), TlsError> {
        let body_len = self.buf.len() - HANDSHAKE_HEADER_LENGTH;
        if body_len > 0xFF_FFFF {
            return Err(TlsError::InternalError(
                "handshake message body exceeds 24-bit length".into(),
            ));
        }
        self.buf[1] = (body_len >> 16) as u8;
        self.buf[2] = (body_len >> 8) as u8;
        self.buf[3] = body_len as u8;
        Ok(())
    }

    /// Parse the handshake header at the start of the buffer, advancing the
    /// read cursor past it. Returns the wire message type and body length.
    pub fn parse_header(&mut self) -> Result<(u8, usize), TlsError> {
        if self.buf.len() < HANDSHAKE_HEADER_LENGTH {
            return Err(TlsError::InternalError(
                "handshake header parsed before it is complete".into(),
            ));
        }
        let message_type = self.buf[0];
        let body_len = ((self.buf[1] as usize) << 16)
            | ((self.buf[2] as usize) << 8)
            | self.buf[3] as usize;
        self.read_pos = HANDSHAKE_HEADER_LENGTH;
        Ok((message_type, body_len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wiped_vs_drained() {
        let mut buf = HandshakeBuffer::new();
        assert!(buf.is_wiped());
        assert_eq!(buf.data_available(), 0);

        buf.extend(&[1, 2, 3]);
        assert!(!buf.is_wiped());
        assert_eq!(buf.data_available(), 3);

        // Fully consumed is empty but not wiped.
        buf.take(3);
        assert_eq!(buf.data_available(), 0);
        assert!(!buf.is_wiped());

        buf.wipe();
        assert!(buf.is_wiped());
        assert_eq!(buf.total_len(), 0);
    }

    #[test]
    fn test_take_and_reread() {
        let mut buf = HandshakeBuffer::new();
        buf.extend(&[10, 20, 30, 40]);
        assert_eq!(buf.take(2), &[10, 20]);
        assert_eq!(buf.remaining(), &[30, 40]);
        buf.reread();
        assert_eq!(buf.data_available(), 4);
        assert_eq!(buf.take(4), &[10, 20, 30, 40]);
    }

    #[test]
    fn test_header_round_trip() {
        let mut buf = HandshakeBuffer::new();
        buf.write_header(11);
        buf.extend(&[0xAB; 300]);
        buf.finish_header().unwrap();

        assert_eq!(buf.as_slice()[..4], [11, 0x00, 0x01, 0x2C]);
        let (message_type, body_len) = buf.parse_header().unwrap();
        assert_eq!(message_type, 11);
        assert_eq!(body_len, 300);
        assert_eq!(buf.remaining().len(), 300);
    }

    #[test]
    fn test_zero_length_body_header() {
        let mut buf = HandshakeBuffer::new();
        buf.write_header(14);
        buf.finish_header().unwrap();
        let (message_type, body_len) = buf.parse_header().unwrap();
        assert_eq!(message_type, 14);
        assert_eq!(body_len, 0);
        assert_eq!(buf.data_available(), 0);
    }

    #[test]
    fn test_release_returns_to_wiped() {
        let mut buf = HandshakeBuffer::new();
        buf.extend(&[0xFF; 64]);
        buf.take(10);
        buf.release();
        assert!(buf.is_wiped());
        assert_eq!(buf.total_len(), 0);
        // Still usable afterwards.
        buf.extend(&[1]);
        assert_eq!(buf.remaining(), &[1]);
    }
}
