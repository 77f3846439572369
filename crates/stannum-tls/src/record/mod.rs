//! TLS record layer: framing, buffering, and resumable I/O.
//!
//! The record layer owns one in-flight inbound record and an outbound byte
//! queue. Reads and writes against a non-blocking transport may stop partway
//! through; all progress lives in this struct, so a call that returned
//! [`TlsError::WouldBlock`] can simply be repeated once the transport is
//! ready. Record protection (encryption/MAC) is a separate concern layered
//! by the payload handlers and is not implemented here.

use std::io::ErrorKind;

use zeroize::Zeroize;

use crate::{TlsError, Transport};

/// TLS record content types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ContentType {
    ChangeCipherSpec = 20,
    Alert = 21,
    Handshake = 22,
    ApplicationData = 23,
}

impl ContentType {
    /// Convert a wire byte to a known content type.
    ///
    /// Returns `None` for types this crate does not handle; the driver
    /// ignores such records rather than failing, per RFC forward
    /// compatibility.
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            20 => Some(ContentType::ChangeCipherSpec),
            21 => Some(ContentType::Alert),
            22 => Some(ContentType::Handshake),
            23 => Some(ContentType::ApplicationData),
            _ => None,
        }
    }
}

/// Maximum record plaintext length (RFC 5246 6.2.1).
pub const MAX_PLAINTEXT_LENGTH: usize = 16384;

/// Record header length for TLS records.
const RECORD_HEADER_LENGTH: usize = 5;

/// Whether the inbound buffers hold a decoded record or the next record still
/// has to be pulled off the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InStatus {
    Encrypted,
    Plaintext,
}

/// Record layer state for one connection.
pub struct RecordLayer {
    /// Maximum payload placed in a single outgoing record.
    pub max_fragment_size: usize,
    /// Version bytes stamped into outgoing record headers.
    pub protocol_version: u16,

    /// Serialized records waiting to be written to the transport.
    out: Vec<u8>,
    /// How much of `out` has already been written.
    out_pos: usize,

    /// Inbound record header, filled incrementally (5 bytes).
    header_in: Vec<u8>,
    /// Inbound record body, filled incrementally.
    in_buf: Vec<u8>,
    /// Read cursor into `in_buf`.
    in_pos: usize,
    in_status: InStatus,
    /// Content-type byte of the buffered record.
    in_type: u8,
    /// Whether the buffered record is an SSLv2-framed hello.
    in_sslv2: bool,
}

impl RecordLayer {
    pub fn new() -> Self {
        Self {
            max_fragment_size: MAX_PLAINTEXT_LENGTH,
            protocol_version: 0x0303,
            out: Vec::new(),
            out_pos: 0,
            header_in: Vec::with_capacity(RECORD_HEADER_LENGTH),
            in_buf: Vec::new(),
            in_pos: 0,
            in_status: InStatus::Encrypted,
            in_type: 0,
            in_sslv2: false,
        }
    }

    /// Largest payload the next outgoing record may carry.
    pub fn max_write_payload_size(&self) -> usize {
        self.max_fragment_size
    }

    /// Frame `payload` as one record and queue it for sending.
    pub fn write_record(&mut self, content_type: ContentType, payload: &[u8]) -> Result<(), TlsError> {
        if payload.len() > self.max_fragment_size {
            return Err(TlsError::RecordError(
                "payload exceeds max fragment size".into(),
            ));
        }
        self.out.reserve(RECORD_HEADER_LENGTH + payload.len());
        self.out.push(content_type as u8);
        self.out.extend_from_slice(&self.protocol_version.to_be_bytes());
        self.out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        self.out.extend_from_slice(payload);
        Ok(())
    }

    /// Write queued records to the transport.
    ///
    /// Returns [`TlsError::WouldBlock`] if the transport cannot take more
    /// bytes yet; already-written bytes are not re-sent on the next call.
    pub fn flush<T: Transport>(&mut self, transport: &mut T) -> Result<(), TlsError> {
        while self.out_pos < self.out.len() {
            match transport.write(&self.out[self.out_pos..]) {
                Ok(0) => {
                    return Err(TlsError::RecordError("transport write returned zero".into()));
                }
                Ok(n) => self.out_pos += n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Err(TlsError::WouldBlock),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(TlsError::IoError(e)),
            }
        }
        self.out.clear();
        self.out_pos = 0;
        Ok(())
    }

    /// Drop any queued outbound bytes.
    pub fn wipe_out(&mut self) {
        self.out.zeroize();
        self.out.clear();
        self.out_pos = 0;
    }

    /// Bytes queued but not yet written (test hook).
    pub fn out_pending(&self) -> usize {
        self.out.len() - self.out_pos
    }

    /// Read one full record from the transport.
    ///
    /// Returns the raw content-type byte and whether the record is an
    /// SSLv2-framed hello. Partial progress (a half-read header or body) is
    /// kept across [`TlsError::WouldBlock`] returns. The record body stays
    /// buffered until [`wipe_in`](Self::wipe_in).
    pub fn read_full_record<T: Transport>(&mut self, transport: &mut T) -> Result<(u8, bool), TlsError> {
        if self.in_status == InStatus::Plaintext {
            return Ok((self.in_type, self.in_sslv2));
        }

        while self.header_in.len() < RECORD_HEADER_LENGTH {
            let need = RECORD_HEADER_LENGTH - self.header_in.len();
            self.read_some(transport, need, true)?;
        }

        // An SSLv2-framed record sets the top bit of the first length byte.
        // Its 2-byte header is followed by the hello message type and
        // version, which the 5-byte header read above already consumed.
        let (in_type, fragment_len, sslv2) = if self.header_in[0] & 0x80 != 0 {
            let total = (((self.header_in[0] & 0x7F) as usize) << 8) | self.header_in[1] as usize;
            if total < 3 {
                return Err(TlsError::RecordError("SSLv2 record too short".into()));
            }
            (self.header_in[2], total - 3, true)
        } else {
            let len =
                u16::from_be_bytes([self.header_in[3], self.header_in[4]]) as usize;
            if len > self.max_fragment_size + 256 {
                return Err(TlsError::RecordError("record too large".into()));
            }
            (self.header_in[0], len, false)
        };

        while self.in_buf.len() < fragment_len {
            let need = fragment_len - self.in_buf.len();
            self.read_some(transport, need, false)?;
        }

        self.in_type = in_type;
        self.in_sslv2 = sslv2;
        self.in_pos = 0;
        self.in_status = InStatus::Plaintext;
        Ok((in_type, sslv2))
    }

    fn read_some<T: Transport>(
        &mut self,
        transport: &mut T,
        need: usize,
        header: bool,
    ) -> Result<(), TlsError> {
        let mut tmp = [0u8; MAX_PLAINTEXT_LENGTH];
        let want = need.min(tmp.len());
        match transport.read(&mut tmp[..want]) {
            Ok(0) => Err(TlsError::RecordError("unexpected EOF".into())),
            Ok(n) => {
                if header {
                    self.header_in.extend_from_slice(&tmp[..n]);
                } else {
                    self.in_buf.extend_from_slice(&tmp[..n]);
                }
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => Err(TlsError::WouldBlock),
            Err(e) if e.kind() == ErrorKind::Interrupted => Ok(()),
            Err(e) => Err(TlsError::IoError(e)),
        }
    }

    /// The buffered inbound record header.
    pub fn header_bytes(&self) -> &[u8] {
        &self.header_in
    }

    /// Unconsumed bytes remaining in the buffered record body.
    pub fn in_available(&self) -> usize {
        self.in_buf.len() - self.in_pos
    }

    /// Consume and return the next `n` bytes of the record body.
    pub fn take_in(&mut self, n: usize) -> &[u8] {
        let start = self.in_pos;
        self.in_pos += n;
        &self.in_buf[start..self.in_pos]
    }

    /// Wipe the inbound header and body buffers after a record has been
    /// processed; the next read pulls a fresh record off the wire.
    pub fn wipe_in(&mut self) {
        self.header_in.clear();
        self.in_buf.zeroize();
        self.in_buf.clear();
        self.in_pos = 0;
        self.in_type = 0;
        self.in_sslv2 = false;
        self.in_status = InStatus::Encrypted;
    }
}

impl Default for RecordLayer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io::{self, Read, Write};

    /// Transport fed from a byte queue; reading past it would block, and a
    /// per-call write budget exercises partial progress.
    struct QueueTransport {
        rx: VecDeque<u8>,
        tx: Vec<u8>,
        /// Bytes the transport will accept before reporting WouldBlock.
        write_budget: usize,
    }

    impl QueueTransport {
        fn new(rx: &[u8]) -> Self {
            Self {
                rx: rx.iter().copied().collect(),
                tx: Vec::new(),
                write_budget: usize::MAX,
            }
        }
    }

    impl Read for QueueTransport {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.rx.is_empty() {
                return Err(io::Error::new(ErrorKind::WouldBlock, "empty"));
            }
            let n = buf.len().min(self.rx.len());
            for b in buf.iter_mut().take(n) {
                *b = self.rx.pop_front().unwrap();
            }
            Ok(n)
        }
    }

    impl Write for QueueTransport {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let n = buf.len().min(self.write_budget);
            if n == 0 {
                return Err(io::Error::new(ErrorKind::WouldBlock, "full"));
            }
            self.write_budget -= n;
            self.tx.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl crate::Transport for QueueTransport {}

    #[test]
    fn test_write_record_frames_header() {
        let mut rl = RecordLayer::new();
        let mut t = QueueTransport::new(&[]);
        rl.write_record(ContentType::Handshake, &[1, 2, 3]).unwrap();
        rl.flush(&mut t).unwrap();
        assert_eq!(t.tx, vec![22, 0x03, 0x03, 0x00, 0x03, 1, 2, 3]);
    }

    #[test]
    fn test_write_record_respects_protocol_version() {
        let mut rl = RecordLayer::new();
        rl.protocol_version = 0x0301;
        let mut t = QueueTransport::new(&[]);
        rl.write_record(ContentType::Alert, &[2, 40]).unwrap();
        rl.flush(&mut t).unwrap();
        assert_eq!(&t.tx[..3], &[21, 0x03, 0x01]);
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let mut rl = RecordLayer::new();
        rl.max_fragment_size = 4;
        let err = rl
            .write_record(ContentType::Handshake, &[0; 5])
            .unwrap_err();
        assert!(matches!(err, TlsError::RecordError(_)));
    }

    #[test]
    fn test_flush_resumes_after_would_block() {
        let mut rl = RecordLayer::new();
        let mut t = QueueTransport::new(&[]);
        rl.write_record(ContentType::Handshake, &[9; 8]).unwrap();

        // 13 bytes total, the transport accepts 3 per refill: each flush
        // reports WouldBlock until the backlog drains, and the
        // already-written prefix is never repeated.
        let mut rounds = 0;
        loop {
            t.write_budget = 3;
            match rl.flush(&mut t) {
                Ok(()) => break,
                Err(e) => assert!(e.is_would_block()),
            }
            rounds += 1;
            assert!(rounds < 10, "flush made no progress");
        }
        assert_eq!(t.tx.len(), 13);
        assert_eq!(&t.tx[..5], &[22, 0x03, 0x03, 0x00, 0x08]);
        assert_eq!(rl.out_pending(), 0);
    }

    #[test]
    fn test_read_full_record() {
        let mut record = vec![22, 0x03, 0x03, 0x00, 0x04];
        record.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        let mut t = QueueTransport::new(&record);
        let mut rl = RecordLayer::new();
        let (ct, sslv2) = rl.read_full_record(&mut t).unwrap();
        assert_eq!(ct, 22);
        assert!(!sslv2);
        assert_eq!(rl.in_available(), 4);
        assert_eq!(rl.take_in(4), &[0xDE, 0xAD, 0xBE, 0xEF]);
        rl.wipe_in();
        assert_eq!(rl.in_available(), 0);
    }

    #[test]
    fn test_read_resumes_across_would_block() {
        let mut record = vec![23, 0x03, 0x03, 0x00, 0x02, 0xAA, 0xBB];
        let mut rl = RecordLayer::new();

        // Trickle the record in one byte at a time; every call until the last
        // returns WouldBlock and none loses progress.
        let mut t = QueueTransport::new(&[]);
        let last = record.pop().unwrap();
        for b in &record {
            t.rx.push_back(*b);
            let err = rl.read_full_record(&mut t).unwrap_err();
            assert!(err.is_would_block());
        }
        t.rx.push_back(last);
        let (ct, sslv2) = rl.read_full_record(&mut t).unwrap();
        assert_eq!(ct, 23);
        assert!(!sslv2);
        assert_eq!(rl.take_in(2), &[0xAA, 0xBB]);
    }

    #[test]
    fn test_read_repeated_call_returns_same_record() {
        let record = vec![22, 0x03, 0x03, 0x00, 0x01, 0x42];
        let mut t = QueueTransport::new(&record);
        let mut rl = RecordLayer::new();
        assert_eq!(rl.read_full_record(&mut t).unwrap(), (22, false));
        // The record stays buffered until wiped.
        assert_eq!(rl.read_full_record(&mut t).unwrap(), (22, false));
        assert_eq!(rl.in_available(), 1);
    }

    #[test]
    fn test_sslv2_hello_detection() {
        // 0x8000-style length of 6: msg type + 2 version bytes + 3 body bytes.
        let bytes = vec![0x80, 0x06, 0x01, 0x03, 0x03, 0x10, 0x20, 0x30];
        let mut t = QueueTransport::new(&bytes);
        let mut rl = RecordLayer::new();
        let (msg_type, sslv2) = rl.read_full_record(&mut t).unwrap();
        assert!(sslv2);
        assert_eq!(msg_type, 0x01);
        assert_eq!(rl.header_bytes(), &[0x80, 0x06, 0x01, 0x03, 0x03]);
        assert_eq!(rl.in_available(), 3);
        assert_eq!(rl.take_in(3), &[0x10, 0x20, 0x30]);
    }

    #[test]
    fn test_sslv2_undersized_length_rejected() {
        let bytes = vec![0x80, 0x02, 0x01, 0x03, 0x03];
        let mut t = QueueTransport::new(&bytes);
        let mut rl = RecordLayer::new();
        let err = rl.read_full_record(&mut t).unwrap_err();
        assert!(matches!(err, TlsError::RecordError(_)));
    }

    #[test]
    fn test_oversized_record_rejected() {
        let mut rl = RecordLayer::new();
        rl.max_fragment_size = 16;
        let record = vec![22, 0x03, 0x03, 0xFF, 0xFF];
        let mut t = QueueTransport::new(&record);
        let err = rl.read_full_record(&mut t).unwrap_err();
        assert!(matches!(err, TlsError::RecordError(_)));
    }

    #[test]
    fn test_eof_is_fatal() {
        let mut rl = RecordLayer::new();
        let t = QueueTransport::new(&[22, 0x03]);
        // Drain the two available bytes, then EOF (a closed transport reads
        // zero bytes; that is distinct from WouldBlock).
        struct ClosedAfter(QueueTransport);
        impl Read for ClosedAfter {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                if self.0.rx.is_empty() {
                    return Ok(0);
                }
                self.0.read(buf)
            }
        }
        impl Write for ClosedAfter {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.0.write(buf)
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }
        impl crate::Transport for ClosedAfter {}

        let mut closed = ClosedAfter(t);
        let err = rl.read_full_record(&mut closed).unwrap_err();
        assert!(matches!(err, TlsError::RecordError(_)));
    }

    #[test]
    fn test_content_type_round_trip() {
        assert_eq!(ContentType::from_u8(20), Some(ContentType::ChangeCipherSpec));
        assert_eq!(ContentType::from_u8(21), Some(ContentType::Alert));
        assert_eq!(ContentType::from_u8(22), Some(ContentType::Handshake));
        assert_eq!(ContentType::from_u8(23), Some(ContentType::ApplicationData));
        assert_eq!(ContentType::from_u8(24), None);
        assert_eq!(ContentType::Handshake as u8, 22);
    }
}
