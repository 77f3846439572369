//! Handshake message catalogue, shape tables, and the payload-handler seam.
//!
//! The driver sequences *logical* messages. Each logical message has a fixed
//! descriptor (record type, wire type byte, writer role), and each negotiated
//! handshake flavor ("shape") is a fixed ordered sequence of logical messages
//! ending at the ApplicationData sentinel. Payload parsing and construction
//! are behind the [`MessageHandlers`] trait.

pub(crate) mod scratch;

use crate::config::TlsConfig;
use crate::crypt::{HandshakeHashes, KeyExchange};
use crate::record::ContentType;
use crate::session::TlsSession;
use crate::{TlsError, TlsRole};

pub(crate) use scratch::{HandshakeBuffer, HANDSHAKE_HEADER_LENGTH};

/* Handshake wire message types, RFC 5246 7.4. */
const TLS_CLIENT_HELLO: u8 = 1;
const TLS_SERVER_HELLO: u8 = 2;
const TLS_SERVER_CERT: u8 = 11;
const TLS_SERVER_KEY: u8 = 12;
const TLS_SERVER_CERT_REQ: u8 = 13;
const TLS_SERVER_HELLO_DONE: u8 = 14;
const TLS_CLIENT_CERT: u8 = 11;
const TLS_CLIENT_CERT_VERIFY: u8 = 15;
const TLS_CLIENT_KEY: u8 = 16;
const TLS_CLIENT_FINISHED: u8 = 20;
const TLS_SERVER_FINISHED: u8 = 20;
const TLS_SERVER_CERT_STATUS: u8 = 22;

/// Largest handshake message body the reader will reassemble.
pub const MAX_HANDSHAKE_MESSAGE_LENGTH: usize = 64 * 1024;

/// Logical handshake messages, in no particular order.
///
/// Several logical messages share a wire type byte (certificates, Finished);
/// the logical identity additionally encodes which side sends it and where it
/// sits in the sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeMessage {
    ClientHello,
    ServerHello,
    ServerCert,
    ServerCertStatus,
    ServerKey,
    ServerCertReq,
    ServerHelloDone,
    ClientCert,
    ClientKey,
    ClientCertVerify,
    ClientChangeCipherSpec,
    ClientFinished,
    ServerChangeCipherSpec,
    ServerFinished,
    ApplicationData,
}

/// Which endpoint writes a given message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Writer {
    Client,
    Server,
    /// Terminal sentinel: both sides may write application data.
    Both,
}

impl Writer {
    pub(crate) fn for_role(role: TlsRole) -> Self {
        match role {
            TlsRole::Client => Writer::Client,
            TlsRole::Server => Writer::Server,
        }
    }
}

/// Static per-message facts the driver needs: how the message is framed, its
/// wire type byte (zero for non-handshake records), and who writes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MessageDescriptor {
    pub record_type: ContentType,
    pub wire_type: u8,
    pub writer: Writer,
}

pub(crate) const fn descriptor(msg: HandshakeMessage) -> MessageDescriptor {
    use HandshakeMessage::*;
    match msg {
        ClientHello => MessageDescriptor {
            record_type: ContentType::Handshake,
            wire_type: TLS_CLIENT_HELLO,
            writer: Writer::Client,
        },
        ServerHello => MessageDescriptor {
            record_type: ContentType::Handshake,
            wire_type: TLS_SERVER_HELLO,
            writer: Writer::Server,
        },
        ServerCert => MessageDescriptor {
            record_type: ContentType::Handshake,
            wire_type: TLS_SERVER_CERT,
            writer: Writer::Server,
        },
        ServerCertStatus => MessageDescriptor {
            record_type: ContentType::Handshake,
            wire_type: TLS_SERVER_CERT_STATUS,
            writer: Writer::Server,
        },
        ServerKey => MessageDescriptor {
            record_type: ContentType::Handshake,
            wire_type: TLS_SERVER_KEY,
            writer: Writer::Server,
        },
        ServerCertReq => MessageDescriptor {
            record_type: ContentType::Handshake,
            wire_type: TLS_SERVER_CERT_REQ,
            writer: Writer::Server,
        },
        ServerHelloDone => MessageDescriptor {
            record_type: ContentType::Handshake,
            wire_type: TLS_SERVER_HELLO_DONE,
            writer: Writer::Server,
        },
        ClientCert => MessageDescriptor {
            record_type: ContentType::Handshake,
            wire_type: TLS_CLIENT_CERT,
            writer: Writer::Client,
        },
        ClientKey => MessageDescriptor {
            record_type: ContentType::Handshake,
            wire_type: TLS_CLIENT_KEY,
            writer: Writer::Client,
        },
        ClientCertVerify => MessageDescriptor {
            record_type: ContentType::Handshake,
            wire_type: TLS_CLIENT_CERT_VERIFY,
            writer: Writer::Client,
        },
        ClientChangeCipherSpec => MessageDescriptor {
            record_type: ContentType::ChangeCipherSpec,
            wire_type: 0,
            writer: Writer::Client,
        },
        ClientFinished => MessageDescriptor {
            record_type: ContentType::Handshake,
            wire_type: TLS_CLIENT_FINISHED,
            writer: Writer::Client,
        },
        ServerChangeCipherSpec => MessageDescriptor {
            record_type: ContentType::ChangeCipherSpec,
            wire_type: 0,
            writer: Writer::Server,
        },
        ServerFinished => MessageDescriptor {
            record_type: ContentType::Handshake,
            wire_type: TLS_SERVER_FINISHED,
            writer: Writer::Server,
        },
        ApplicationData => MessageDescriptor {
            record_type: ContentType::ApplicationData,
            wire_type: 0,
            writer: Writer::Both,
        },
    }
}

/// Bitmask identifying the negotiated handshake flavor.
///
/// Exactly six values have message sequences; shape selection can produce no
/// others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandshakeShape(u8);

impl HandshakeShape {
    pub const INITIAL: Self = Self(0);
    pub const NEGOTIATED: Self = Self(0x01);
    pub const FULL_HANDSHAKE: Self = Self(0x02);
    pub const PERFECT_FORWARD_SECRECY: Self = Self(0x04);
    pub const OCSP_STATUS: Self = Self(0x08);
    pub const RESUME: Self = Self(0x10);

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn contains(self, flag: Self) -> bool {
        self.0 & flag.0 == flag.0
    }

    /// The ordered message sequence for this shape.
    ///
    /// Panics on a bitmask outside the six populated combinations; shape
    /// selection cannot produce one, so reaching this is a programming error.
    pub fn sequence(self) -> &'static [HandshakeMessage] {
        use HandshakeMessage::*;

        const NEGOTIATED: HandshakeShape = HandshakeShape::NEGOTIATED;
        const RESUMED: HandshakeShape = NEGOTIATED.union(HandshakeShape::RESUME);
        const FULL: HandshakeShape = NEGOTIATED.union(HandshakeShape::FULL_HANDSHAKE);
        const FULL_PFS: HandshakeShape = FULL.union(HandshakeShape::PERFECT_FORWARD_SECRECY);
        const FULL_OCSP: HandshakeShape = FULL.union(HandshakeShape::OCSP_STATUS);
        const FULL_PFS_OCSP: HandshakeShape = FULL_PFS.union(HandshakeShape::OCSP_STATUS);

        match self {
            Self::INITIAL => &[ClientHello, ServerHello],
            RESUMED => &[
                ClientHello,
                ServerHello,
                ServerChangeCipherSpec,
                ServerFinished,
                ClientChangeCipherSpec,
                ClientFinished,
                ApplicationData,
            ],
            FULL => &[
                ClientHello,
                ServerHello,
                ServerCert,
                ServerHelloDone,
                ClientKey,
                ClientChangeCipherSpec,
                ClientFinished,
                ServerChangeCipherSpec,
                ServerFinished,
                ApplicationData,
            ],
            FULL_PFS => &[
                ClientHello,
                ServerHello,
                ServerCert,
                ServerKey,
                ServerHelloDone,
                ClientKey,
                ClientChangeCipherSpec,
                ClientFinished,
                ServerChangeCipherSpec,
                ServerFinished,
                ApplicationData,
            ],
            FULL_OCSP => &[
                ClientHello,
                ServerHello,
                ServerCert,
                ServerCertStatus,
                ServerHelloDone,
                ClientKey,
                ClientChangeCipherSpec,
                ClientFinished,
                ServerChangeCipherSpec,
                ServerFinished,
                ApplicationData,
            ],
            FULL_PFS_OCSP => &[
                ClientHello,
                ServerHello,
                ServerCert,
                ServerCertStatus,
                ServerKey,
                ServerHelloDone,
                ClientKey,
                ClientChangeCipherSpec,
                ClientFinished,
                ServerChangeCipherSpec,
                ServerFinished,
                ApplicationData,
            ],
            other => unreachable!("no message sequence for handshake shape {other:?}"),
        }
    }
}

/// Per-connection handshake state: the selected shape, the cursor into its
/// sequence, the in-flight message buffer, and the running transcript.
pub(crate) struct HandshakeState {
    pub shape: HandshakeShape,
    pub message_number: usize,
    pub io: HandshakeBuffer,
    pub hashes: HandshakeHashes,
}

impl HandshakeState {
    pub fn new() -> Self {
        Self {
            shape: HandshakeShape::INITIAL,
            message_number: 0,
            io: HandshakeBuffer::new(),
            hashes: HandshakeHashes::new(),
        }
    }
}

/// Handler-facing view of the connection while one message is processed.
///
/// A send handler appends its message body with [`write_body`]; a receive
/// handler reads the reassembled body from [`body`]. The hello handlers call
/// [`set_handshake_type`] once negotiation resolves.
///
/// [`write_body`]: Self::write_body
/// [`body`]: Self::body
/// [`set_handshake_type`]: Self::set_handshake_type
pub struct HandshakeContext<'a> {
    pub(crate) mode: TlsRole,
    pub(crate) io: &'a mut HandshakeBuffer,
    pub(crate) hashes: &'a HandshakeHashes,
    pub(crate) shape: &'a mut HandshakeShape,
    pub(crate) session_id: &'a mut [u8; 32],
    pub(crate) session_id_len: &'a mut usize,
    pub(crate) config: &'a TlsConfig,
}

impl HandshakeContext<'_> {
    /// This endpoint's role.
    pub fn role(&self) -> TlsRole {
        self.mode
    }

    /// The reassembled message body (receive handlers). For ChangeCipherSpec
    /// this is the single spec byte; for an SSLv2 hello it is the v2 record
    /// body.
    pub fn body(&self) -> &[u8] {
        self.io.remaining()
    }

    /// Append bytes to the outgoing message body (send handlers).
    pub fn write_body(&mut self, data: &[u8]) {
        self.io.extend(data);
    }

    /// The running transcript, for Finished computation. The message being
    /// composed has not been hashed yet; a received message already has.
    pub fn transcript(&self) -> &HandshakeHashes {
        self.hashes
    }

    /// The currently selected handshake shape.
    pub fn shape(&self) -> HandshakeShape {
        *self.shape
    }

    /// The connection's session id (possibly empty).
    pub fn session_id(&self) -> &[u8] {
        &self.session_id[..*self.session_id_len]
    }

    /// Record the session id for this connection (at most 32 bytes).
    pub fn set_session_id(&mut self, id: &[u8]) -> Result<(), TlsError> {
        if id.len() > 32 {
            return Err(TlsError::BadMessage("session id longer than 32 bytes".into()));
        }
        self.session_id[..id.len()].copy_from_slice(id);
        *self.session_id_len = id.len();
        Ok(())
    }

    /// Select the handshake shape, once negotiation has resolved.
    ///
    /// Called from the ClientHello handler on the server and the ServerHello
    /// handler on the client. If session caching is enabled and the current
    /// session id is cached, the abbreviated shape is selected and the cached
    /// session returned (the server additionally generates a fresh 32-byte
    /// session id). Otherwise the full-handshake shape is selected, extended
    /// by the ephemeral flag of the negotiated key exchange and by OCSP
    /// stapling.
    pub fn set_handshake_type(
        &mut self,
        key_exchange: KeyExchange,
        ocsp_status: bool,
    ) -> Result<Option<TlsSession>, TlsError> {
        *self.shape = HandshakeShape::NEGOTIATED;

        if let Some(cached) = self.lookup_cached_session() {
            *self.shape = HandshakeShape::NEGOTIATED.union(HandshakeShape::RESUME);
            if self.mode == TlsRole::Server {
                getrandom::getrandom(&mut self.session_id[..]).map_err(|_| {
                    TlsError::HandshakeFailed("session id generation failed".into())
                })?;
                *self.session_id_len = 32;
            }
            return Ok(Some(cached));
        }

        *self.shape = self.shape.union(HandshakeShape::FULL_HANDSHAKE);
        if key_exchange.is_ephemeral() {
            *self.shape = self.shape.union(HandshakeShape::PERFECT_FORWARD_SECRECY);
        }
        if ocsp_status {
            *self.shape = self.shape.union(HandshakeShape::OCSP_STATUS);
        }
        Ok(None)
    }

    fn lookup_cached_session(&self) -> Option<TlsSession> {
        if *self.session_id_len == 0 {
            return None;
        }
        let cache = self.config.session_cache.as_ref()?;
        let cache = cache.lock().ok()?;
        cache.get(&self.session_id[..*self.session_id_len]).cloned()
    }
}

/// Payload handlers for every supported (message, role) pair.
///
/// The driver invokes exactly one method per completed message: the `_send`
/// method on the side that writes it, the `_recv` method on the side that
/// reads it. Send handlers append the message body to the context; the driver
/// frames it (handshake header, record layout). Receive handlers see the
/// fully reassembled body.
///
/// `ServerCertReq`, `ClientCert`, and `ClientCertVerify` have no handlers:
/// no populated shape contains them, and dispatching to one is reported as an
/// internal error.
pub trait MessageHandlers {
    fn client_hello_send(&mut self, ctx: &mut HandshakeContext<'_>) -> Result<(), TlsError>;
    fn client_hello_recv(&mut self, ctx: &mut HandshakeContext<'_>) -> Result<(), TlsError>;
    /// Receive a ClientHello that arrived in SSLv2 framing. The body is the
    /// v2 record body; the driver has already fed the reconstituted bytes to
    /// the transcript.
    fn sslv2_client_hello_recv(&mut self, ctx: &mut HandshakeContext<'_>) -> Result<(), TlsError>;

    fn server_hello_send(&mut self, ctx: &mut HandshakeContext<'_>) -> Result<(), TlsError>;
    fn server_hello_recv(&mut self, ctx: &mut HandshakeContext<'_>) -> Result<(), TlsError>;

    fn server_cert_send(&mut self, ctx: &mut HandshakeContext<'_>) -> Result<(), TlsError>;
    fn server_cert_recv(&mut self, ctx: &mut HandshakeContext<'_>) -> Result<(), TlsError>;

    fn server_status_send(&mut self, ctx: &mut HandshakeContext<'_>) -> Result<(), TlsError>;
    fn server_status_recv(&mut self, ctx: &mut HandshakeContext<'_>) -> Result<(), TlsError>;

    fn server_key_send(&mut self, ctx: &mut HandshakeContext<'_>) -> Result<(), TlsError>;
    fn server_key_recv(&mut self, ctx: &mut HandshakeContext<'_>) -> Result<(), TlsError>;

    fn server_done_send(&mut self, ctx: &mut HandshakeContext<'_>) -> Result<(), TlsError>;
    fn server_done_recv(&mut self, ctx: &mut HandshakeContext<'_>) -> Result<(), TlsError>;

    fn client_key_send(&mut self, ctx: &mut HandshakeContext<'_>) -> Result<(), TlsError>;
    fn client_key_recv(&mut self, ctx: &mut HandshakeContext<'_>) -> Result<(), TlsError>;

    /// Send a ChangeCipherSpec: append the single spec byte and switch the
    /// outbound cipher state.
    fn client_ccs_send(&mut self, ctx: &mut HandshakeContext<'_>) -> Result<(), TlsError>;
    fn client_ccs_recv(&mut self, ctx: &mut HandshakeContext<'_>) -> Result<(), TlsError>;

    fn client_finished_send(&mut self, ctx: &mut HandshakeContext<'_>) -> Result<(), TlsError>;
    fn client_finished_recv(&mut self, ctx: &mut HandshakeContext<'_>) -> Result<(), TlsError>;

    fn server_ccs_send(&mut self, ctx: &mut HandshakeContext<'_>) -> Result<(), TlsError>;
    fn server_ccs_recv(&mut self, ctx: &mut HandshakeContext<'_>) -> Result<(), TlsError>;

    fn server_finished_send(&mut self, ctx: &mut HandshakeContext<'_>) -> Result<(), TlsError>;
    fn server_finished_recv(&mut self, ctx: &mut HandshakeContext<'_>) -> Result<(), TlsError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_wire_values() {
        // RFC 5246 7.4: wire values are load-bearing for interop.
        assert_eq!(descriptor(HandshakeMessage::ClientHello).wire_type, 1);
        assert_eq!(descriptor(HandshakeMessage::ServerHello).wire_type, 2);
        assert_eq!(descriptor(HandshakeMessage::ServerCert).wire_type, 11);
        assert_eq!(descriptor(HandshakeMessage::ServerKey).wire_type, 12);
        assert_eq!(descriptor(HandshakeMessage::ServerCertReq).wire_type, 13);
        assert_eq!(descriptor(HandshakeMessage::ServerHelloDone).wire_type, 14);
        assert_eq!(descriptor(HandshakeMessage::ClientCert).wire_type, 11);
        assert_eq!(descriptor(HandshakeMessage::ClientCertVerify).wire_type, 15);
        assert_eq!(descriptor(HandshakeMessage::ClientKey).wire_type, 16);
        assert_eq!(descriptor(HandshakeMessage::ClientFinished).wire_type, 20);
        assert_eq!(descriptor(HandshakeMessage::ServerFinished).wire_type, 20);
        assert_eq!(descriptor(HandshakeMessage::ServerCertStatus).wire_type, 22);
    }

    #[test]
    fn test_descriptor_record_types_and_writers() {
        use HandshakeMessage::*;
        for msg in [ClientChangeCipherSpec, ServerChangeCipherSpec] {
            let d = descriptor(msg);
            assert_eq!(d.record_type, ContentType::ChangeCipherSpec);
            assert_eq!(d.wire_type, 0);
        }
        assert_eq!(
            descriptor(ApplicationData).record_type,
            ContentType::ApplicationData
        );
        assert_eq!(descriptor(ApplicationData).writer, Writer::Both);

        assert_eq!(descriptor(ClientHello).writer, Writer::Client);
        assert_eq!(descriptor(ClientKey).writer, Writer::Client);
        assert_eq!(descriptor(ClientFinished).writer, Writer::Client);
        assert_eq!(descriptor(ServerHello).writer, Writer::Server);
        assert_eq!(descriptor(ServerCert).writer, Writer::Server);
        assert_eq!(descriptor(ServerFinished).writer, Writer::Server);
    }

    #[test]
    fn test_all_sequences_well_formed() {
        use HandshakeMessage::*;
        let shapes = [
            HandshakeShape::INITIAL,
            HandshakeShape::NEGOTIATED.union(HandshakeShape::RESUME),
            HandshakeShape::NEGOTIATED.union(HandshakeShape::FULL_HANDSHAKE),
            HandshakeShape::NEGOTIATED
                .union(HandshakeShape::FULL_HANDSHAKE)
                .union(HandshakeShape::PERFECT_FORWARD_SECRECY),
            HandshakeShape::NEGOTIATED
                .union(HandshakeShape::FULL_HANDSHAKE)
                .union(HandshakeShape::OCSP_STATUS),
            HandshakeShape::NEGOTIATED
                .union(HandshakeShape::FULL_HANDSHAKE)
                .union(HandshakeShape::PERFECT_FORWARD_SECRECY)
                .union(HandshakeShape::OCSP_STATUS),
        ];

        for shape in shapes {
            let seq = shape.sequence();
            assert!(seq.len() <= 16);
            // Every negotiated sequence starts like INITIAL, so a cursor past
            // the hellos stays valid across shape selection.
            assert_eq!(seq[0], ClientHello);
            if seq.len() > 1 {
                assert_eq!(seq[1], ServerHello);
            }
            // Only INITIAL lacks the terminal sentinel.
            if shape != HandshakeShape::INITIAL {
                assert_eq!(*seq.last().unwrap(), ApplicationData);
                for msg in &seq[..seq.len() - 1] {
                    assert_ne!(descriptor(*msg).writer, Writer::Both);
                }
            }
        }
    }

    #[test]
    fn test_pfs_and_ocsp_sequence_contents() {
        use HandshakeMessage::*;
        let pfs = HandshakeShape::NEGOTIATED
            .union(HandshakeShape::FULL_HANDSHAKE)
            .union(HandshakeShape::PERFECT_FORWARD_SECRECY);
        assert!(pfs.sequence().contains(&ServerKey));
        assert!(!pfs.sequence().contains(&ServerCertStatus));

        let ocsp = HandshakeShape::NEGOTIATED
            .union(HandshakeShape::FULL_HANDSHAKE)
            .union(HandshakeShape::OCSP_STATUS);
        assert!(ocsp.sequence().contains(&ServerCertStatus));
        assert!(!ocsp.sequence().contains(&ServerKey));

        let resumed = HandshakeShape::NEGOTIATED.union(HandshakeShape::RESUME);
        assert_eq!(resumed.sequence().len(), 7);
        assert!(!resumed.sequence().contains(&ServerCert));
    }

    #[test]
    #[should_panic(expected = "no message sequence")]
    fn test_unpopulated_shape_asserts() {
        // FULL_HANDSHAKE without NEGOTIATED is not a legal shape.
        HandshakeShape::FULL_HANDSHAKE.sequence();
    }

    #[test]
    fn test_shape_flag_algebra() {
        let s = HandshakeShape::NEGOTIATED
            .union(HandshakeShape::FULL_HANDSHAKE)
            .union(HandshakeShape::OCSP_STATUS);
        assert!(s.contains(HandshakeShape::NEGOTIATED));
        assert!(s.contains(HandshakeShape::OCSP_STATUS));
        assert!(!s.contains(HandshakeShape::RESUME));
        assert!(!s.contains(HandshakeShape::PERFECT_FORWARD_SECRECY));
        assert!(s.contains(HandshakeShape::INITIAL));
    }
}
