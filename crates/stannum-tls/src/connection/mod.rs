//! The handshake driver: message writer, record reader, and negotiate loop.
//!
//! A [`Connection`] owns a transport, a record layer, the handshake state
//! (shape, cursor, scratch buffer, transcript), and the payload handlers.
//! [`negotiate`](Connection::negotiate) alternates between writing and
//! reading according to who writes the current message, until the cursor
//! reaches the terminal ApplicationData slot. Any record-layer operation may
//! report [`TlsError::WouldBlock`]; the driver then returns with all state
//! preserved and the caller re-enters once the transport is ready.

use crate::alert::AlertProcessor;
use crate::config::TlsConfig;
#[cfg(test)]
use crate::crypt::HandshakeHashes;
use crate::handshake::{
    descriptor, HandshakeContext, HandshakeMessage, HandshakeState, MessageHandlers, Writer,
    HANDSHAKE_HEADER_LENGTH, MAX_HANDSHAKE_MESSAGE_LENGTH,
};
use crate::record::{ContentType, RecordLayer};
use crate::{Blocked, TlsError, TlsRole, Transport};

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnectionState {
    Handshaking,
    Connected,
    Error,
}

/// Progress of inbound handshake-message reassembly.
enum MessageProgress {
    /// The full message is in the scratch buffer; carries the wire type.
    Complete(u8),
    /// More record data is needed; scratch keeps what has arrived.
    NeedMoreData,
}

/// A TLS connection driving the handshake over `T` with payload handlers `H`.
pub struct Connection<T: Transport, H: MessageHandlers> {
    transport: T,
    handlers: H,
    config: TlsConfig,
    record: RecordLayer,
    alerts: AlertProcessor,
    mode: TlsRole,
    pub(crate) state: ConnectionState,
    handshake: HandshakeState,
    session_id: [u8; 32],
    session_id_len: usize,
    corked_io: bool,
    managed_io: bool,
}

impl<T: Transport, H: MessageHandlers> Connection<T, H> {
    /// Create a client-side connection.
    pub fn client(transport: T, handlers: H, config: TlsConfig) -> Self {
        Self::new(transport, handlers, config, TlsRole::Client)
    }

    /// Create a server-side connection.
    pub fn server(transport: T, handlers: H, config: TlsConfig) -> Self {
        Self::new(transport, handlers, config, TlsRole::Server)
    }

    fn new(transport: T, handlers: H, config: TlsConfig, mode: TlsRole) -> Self {
        let mut record = RecordLayer::new();
        record.max_fragment_size = config.max_fragment_size;
        record.protocol_version = config.version.wire();
        let corked_io = config.corked_io;
        let managed_io = config.managed_io;
        Self {
            transport,
            handlers,
            config,
            record,
            alerts: AlertProcessor::new(),
            mode,
            state: ConnectionState::Handshaking,
            handshake: HandshakeState::new(),
            session_id: [0u8; 32],
            session_id_len: 0,
            corked_io,
            managed_io,
        }
    }

    /// This endpoint's role.
    pub fn mode(&self) -> TlsRole {
        self.mode
    }

    /// The logical message the handshake is currently positioned at.
    pub fn current_message(&self) -> HandshakeMessage {
        self.handshake.shape.sequence()[self.handshake.message_number]
    }

    /// Whether the handshake has completed.
    pub fn is_established(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// The session id attached to this connection, if any.
    pub fn session_id(&self) -> &[u8] {
        &self.session_id[..self.session_id_len]
    }

    /// The payload handlers.
    pub fn handlers(&self) -> &H {
        &self.handlers
    }

    pub fn handlers_mut(&mut self) -> &mut H {
        &mut self.handlers
    }

    #[cfg(test)]
    pub(crate) fn transcript(&self) -> &HandshakeHashes {
        &self.handshake.hashes
    }

    #[cfg(test)]
    pub(crate) fn message_number(&self) -> usize {
        self.handshake.message_number
    }

    /// Drive the handshake as far as the transport allows.
    ///
    /// Returns [`Blocked::NotBlocked`] once the handshake is complete, or
    /// [`Blocked::OnRead`]/[`Blocked::OnWrite`] when progress stalls on the
    /// transport; call again once it is ready. Fatal errors leave the
    /// connection unusable, and if session caching is active and a session id
    /// was issued, the cache entry for it is removed.
    pub fn negotiate(&mut self) -> Result<Blocked, TlsError> {
        if self.state == ConnectionState::Error {
            return Err(TlsError::HandshakeFailed(
                "connection has already failed".into(),
            ));
        }

        let me = Writer::for_role(self.mode);
        while descriptor(self.current_message()).writer != Writer::Both {
            // Flush anything still queued from the previous step.
            match self.record.flush(&mut self.transport) {
                Ok(()) => {}
                Err(e) if e.is_would_block() => return Ok(Blocked::OnWrite),
                Err(e) => {
                    self.state = ConnectionState::Error;
                    return Err(e);
                }
            }

            if descriptor(self.current_message()).writer == me {
                match self.handshake_write_io() {
                    Ok(()) => {}
                    Err(e) if e.is_would_block() => return Ok(Blocked::OnWrite),
                    Err(e) => {
                        self.state = ConnectionState::Error;
                        return Err(e);
                    }
                }
            } else {
                match self.handshake_read_io() {
                    Ok(()) => {}
                    Err(e) if e.is_would_block() => return Ok(Blocked::OnRead),
                    Err(e) => {
                        self.purge_cached_session();
                        self.state = ConnectionState::Error;
                        return Err(e);
                    }
                }
            }

            // Handshake just ended: the scratch allocation is no longer
            // needed.
            if descriptor(self.current_message()).writer == Writer::Both {
                self.handshake.io.release();
            }
        }

        self.state = ConnectionState::Connected;
        Ok(Blocked::NotBlocked)
    }

    /// Compose and send the current outbound message.
    ///
    /// A message is framed into as many records as its size requires, but
    /// records never carry bytes of two messages. Composition happens once
    /// per message (gated on the scratch buffer's wiped state), so a resumed
    /// call after a would-block only sends the remaining bytes.
    fn handshake_write_io(&mut self) -> Result<(), TlsError> {
        let msg = self.current_message();
        let desc = descriptor(msg);

        if self.handshake.io.is_wiped() {
            if desc.record_type == ContentType::Handshake {
                self.handshake.io.write_header(desc.wire_type);
            }
            self.dispatch(msg, false)?;
            if desc.record_type == ContentType::Handshake {
                self.handshake.io.finish_header()?;
            }
        }

        while self.handshake.io.data_available() > 0 {
            let max_payload = self.record.max_write_payload_size();
            let n = self.handshake.io.data_available().min(max_payload);
            let chunk = self.handshake.io.take(n);
            self.record.write_record(desc.record_type, chunk)?;
            if desc.record_type == ContentType::Handshake {
                self.handshake.hashes.update(chunk);
            }
            // Sending may block; the caller re-enters and resumes with the
            // unsent remainder still in scratch.
            self.record.flush(&mut self.transport)?;
        }

        self.handshake.io.wipe();
        self.record.wipe_out();
        self.advance_message()
    }

    /// Read one record and process as much handshake progress as it carries.
    fn handshake_read_io(&mut self) -> Result<(), TlsError> {
        let (record_type, sslv2) = self.record.read_full_record(&mut self.transport)?;

        if sslv2 {
            return self.read_sslv2_hello();
        }

        match ContentType::from_u8(record_type) {
            Some(ContentType::ApplicationData) => Err(TlsError::BadMessage(
                "application data received during handshake".into(),
            )),
            Some(ContentType::ChangeCipherSpec) => self.read_change_cipher_spec(),
            Some(ContentType::Alert) => {
                let n = self.record.in_available();
                let result = {
                    let fragment = self.record.take_in(n);
                    self.alerts.absorb(fragment)
                };
                self.record.wipe_in();
                // The cursor does not advance: the expected message is still
                // outstanding.
                result
            }
            Some(ContentType::Handshake) => self.read_handshake_record(),
            None => {
                // Record types this crate does not know are ignored, per RFC
                // forward compatibility.
                self.record.wipe_in();
                Ok(())
            }
        }
    }

    /// Process a ClientHello that arrived in SSLv2 framing.
    ///
    /// The transcript receives the bytes that would have appeared in a v3
    /// hello: the message type and version from the v2 header, then the v2
    /// body. These exact bytes are load-bearing for Finished verification.
    fn read_sslv2_hello(&mut self) -> Result<(), TlsError> {
        if self.current_message() != HandshakeMessage::ClientHello {
            return Err(TlsError::BadMessage(
                "SSLv2 hello at a position other than ClientHello".into(),
            ));
        }

        let header_tail = {
            let header = self.record.header_bytes();
            [header[2], header[3], header[4]]
        };
        self.handshake.hashes.update(&header_tail);

        let n = self.record.in_available();
        let body = self.record.take_in(n);
        self.handshake.hashes.update(body);
        self.handshake.io.extend(body);

        let result = self.dispatch(HandshakeMessage::ClientHello, true);
        self.handshake.io.wipe();
        result?;

        self.record.wipe_in();
        self.advance_message()
    }

    fn read_change_cipher_spec(&mut self) -> Result<(), TlsError> {
        let msg = self.current_message();
        if descriptor(msg).record_type != ContentType::ChangeCipherSpec {
            return Err(TlsError::BadMessage(
                "change cipher spec record out of sequence".into(),
            ));
        }
        if self.record.in_available() != 1 {
            return Err(TlsError::BadMessage(
                "change cipher spec body must be exactly one byte".into(),
            ));
        }

        let body = self.record.take_in(1);
        self.handshake.io.extend(body);
        let result = self.dispatch(msg, false);
        self.handshake.io.wipe();
        result?;

        self.record.wipe_in();
        self.advance_message()
    }

    /// Process a handshake record: it may hold a fragment of one message,
    /// exactly one message, or several messages back to back.
    fn read_handshake_record(&mut self) -> Result<(), TlsError> {
        while self.record.in_available() > 0 {
            match self.read_full_handshake_message()? {
                MessageProgress::NeedMoreData => {
                    // The next record continues this message; scratch holds
                    // what has arrived so far.
                    self.record.wipe_in();
                    return Ok(());
                }
                MessageProgress::Complete(wire_type) => {
                    let msg = self.current_message();
                    if wire_type != descriptor(msg).wire_type {
                        return Err(TlsError::BadMessage(
                            "unexpected handshake message type".into(),
                        ));
                    }
                    let result = self.dispatch(msg, false);
                    self.handshake.io.wipe();
                    if let Err(e) = result {
                        self.kill();
                        return Err(e);
                    }
                    self.advance_message()?;
                }
            }
        }

        self.record.wipe_in();
        Ok(())
    }

    /// Move record bytes into scratch until the current message is complete.
    ///
    /// Once the full header and body are present, the whole message
    /// (header included) is fed to the transcript and the wire type returned.
    fn read_full_handshake_message(&mut self) -> Result<MessageProgress, TlsError> {
        let buffered = self.handshake.io.total_len();
        if buffered < HANDSHAKE_HEADER_LENGTH {
            let need = HANDSHAKE_HEADER_LENGTH - buffered;
            if self.record.in_available() < need {
                // Badly fragmented: not even the header is complete. Take
                // what there is; the next record continues it.
                let n = self.record.in_available();
                let bytes = self.record.take_in(n);
                self.handshake.io.extend(bytes);
                return Ok(MessageProgress::NeedMoreData);
            }
            let bytes = self.record.take_in(need);
            self.handshake.io.extend(bytes);
        }

        let (wire_type, body_len) = self.handshake.io.parse_header()?;
        if body_len > MAX_HANDSHAKE_MESSAGE_LENGTH {
            return Err(TlsError::BadMessage("handshake message too long".into()));
        }

        let needed = body_len - self.handshake.io.data_available();
        let take = needed.min(self.record.in_available());
        let bytes = self.record.take_in(take);
        self.handshake.io.extend(bytes);

        if self.handshake.io.data_available() == body_len {
            self.handshake.hashes.update(self.handshake.io.as_slice());
            return Ok(MessageProgress::Complete(wire_type));
        }

        // Incomplete: rewind the read cursor so the next pass re-parses the
        // header, and wait for the next record.
        self.handshake.io.reread();
        Ok(MessageProgress::NeedMoreData)
    }

    /// Advance the cursor, managing the transport cork when send coalescing
    /// is enabled and the writing side changes.
    fn advance_message(&mut self) -> Result<(), TlsError> {
        let previous = self.current_message();
        self.handshake.message_number += 1;

        let sequence = self.handshake.shape.sequence();
        if self.handshake.message_number >= sequence.len() {
            return Err(TlsError::InternalError(
                "handshake shape was never negotiated".into(),
            ));
        }

        // Leave the cork alone unless coalescing is on and the caller had
        // not corked the transport themselves.
        if !self.corked_io || self.transport.was_corked() {
            return Ok(());
        }

        let current_writer = descriptor(self.current_message()).writer;
        if current_writer == descriptor(previous).writer {
            return Ok(());
        }

        if current_writer == Writer::for_role(self.mode) {
            if self.managed_io {
                self.transport.cork();
            }
            return Ok(());
        }

        // We became the reader, or reached the terminal both-sides slot:
        // release any coalesced records.
        if self.managed_io {
            self.transport.uncork();
        }
        Ok(())
    }

    /// Invoke the payload handler for `(msg, role)`.
    fn dispatch(&mut self, msg: HandshakeMessage, sslv2: bool) -> Result<(), TlsError> {
        use HandshakeMessage::*;
        use TlsRole::*;

        let mut ctx = HandshakeContext {
            mode: self.mode,
            io: &mut self.handshake.io,
            hashes: &self.handshake.hashes,
            shape: &mut self.handshake.shape,
            session_id: &mut self.session_id,
            session_id_len: &mut self.session_id_len,
            config: &self.config,
        };

        if sslv2 {
            return match (msg, self.mode) {
                (ClientHello, Server) => self.handlers.sslv2_client_hello_recv(&mut ctx),
                _ => Err(TlsError::InternalError(
                    "SSLv2 hello dispatched outside the server ClientHello slot".into(),
                )),
            };
        }

        match (msg, self.mode) {
            (ClientHello, Client) => self.handlers.client_hello_send(&mut ctx),
            (ClientHello, Server) => self.handlers.client_hello_recv(&mut ctx),
            (ServerHello, Server) => self.handlers.server_hello_send(&mut ctx),
            (ServerHello, Client) => self.handlers.server_hello_recv(&mut ctx),
            (ServerCert, Server) => self.handlers.server_cert_send(&mut ctx),
            (ServerCert, Client) => self.handlers.server_cert_recv(&mut ctx),
            (ServerCertStatus, Server) => self.handlers.server_status_send(&mut ctx),
            (ServerCertStatus, Client) => self.handlers.server_status_recv(&mut ctx),
            (ServerKey, Server) => self.handlers.server_key_send(&mut ctx),
            (ServerKey, Client) => self.handlers.server_key_recv(&mut ctx),
            (ServerHelloDone, Server) => self.handlers.server_done_send(&mut ctx),
            (ServerHelloDone, Client) => self.handlers.server_done_recv(&mut ctx),
            (ClientKey, Client) => self.handlers.client_key_send(&mut ctx),
            (ClientKey, Server) => self.handlers.client_key_recv(&mut ctx),
            (ClientChangeCipherSpec, Client) => self.handlers.client_ccs_send(&mut ctx),
            (ClientChangeCipherSpec, Server) => self.handlers.client_ccs_recv(&mut ctx),
            (ClientFinished, Client) => self.handlers.client_finished_send(&mut ctx),
            (ClientFinished, Server) => self.handlers.client_finished_recv(&mut ctx),
            (ServerChangeCipherSpec, Server) => self.handlers.server_ccs_send(&mut ctx),
            (ServerChangeCipherSpec, Client) => self.handlers.server_ccs_recv(&mut ctx),
            (ServerFinished, Server) => self.handlers.server_finished_send(&mut ctx),
            (ServerFinished, Client) => self.handlers.server_finished_recv(&mut ctx),
            (ServerCertReq, _) | (ClientCert, _) | (ClientCertVerify, _) => {
                Err(TlsError::InternalError(
                    "client authentication messages have no handler".into(),
                ))
            }
            (ApplicationData, _) => Err(TlsError::InternalError(
                "application data is not a handshake message".into(),
            )),
        }
    }

    /// Mark the connection unusable after a fatal handler failure.
    fn kill(&mut self) {
        self.state = ConnectionState::Error;
    }

    /// Remove this connection's session from the cache after a fatal
    /// handshake failure, so the broken handshake cannot be resumed.
    fn purge_cached_session(&mut self) {
        if !self.config.is_caching_enabled() || self.session_id_len == 0 {
            return;
        }
        if let Some(cache) = &self.config.session_cache {
            if let Ok(mut cache) = cache.lock() {
                cache.remove(&self.session_id[..self.session_id_len]);
            }
        }
    }
}
