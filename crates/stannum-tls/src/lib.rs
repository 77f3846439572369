#![forbid(unsafe_code)]
#![doc = "TLS 1.0-1.2 handshake driver: message sequencing, record framing, transcript."]

pub mod alert;
pub mod config;
pub mod connection;
pub mod crypt;
pub mod handshake;
pub mod record;
pub mod session;

use std::io;

use crate::crypt::KeyExchange;

pub use stannum_types::TlsError;

/// TLS protocol version.
///
/// Selects the version bytes placed in record headers. Version negotiation
/// itself happens in the hello payload handlers, outside this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TlsVersion {
    Tls10,
    Tls11,
    Tls12,
}

impl TlsVersion {
    /// The two-byte wire encoding of this version.
    pub fn wire(self) -> u16 {
        match self {
            TlsVersion::Tls10 => 0x0301,
            TlsVersion::Tls11 => 0x0302,
            TlsVersion::Tls12 => 0x0303,
        }
    }
}

/// TLS cipher suite identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CipherSuite(pub u16);

impl CipherSuite {
    pub const TLS_RSA_WITH_AES_128_CBC_SHA: Self = Self(0x002F);
    pub const TLS_RSA_WITH_AES_256_CBC_SHA: Self = Self(0x0035);
    pub const TLS_DHE_RSA_WITH_AES_128_CBC_SHA: Self = Self(0x0033);
    pub const TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256: Self = Self(0xC02F);
    pub const TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384: Self = Self(0xC030);

    /// The key-exchange family of this suite, if it is one this crate knows.
    pub fn key_exchange(self) -> Option<KeyExchange> {
        match self.0 {
            0x002F | 0x0035 => Some(KeyExchange::Rsa),
            0x0033 => Some(KeyExchange::Dhe),
            0xC02F | 0xC030 => Some(KeyExchange::Ecdhe),
            _ => None,
        }
    }
}

/// The role of a TLS endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsRole {
    Client,
    Server,
}

/// Where handshake progress stopped when `negotiate` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Blocked {
    /// The handshake is complete.
    NotBlocked,
    /// A record-layer read could not complete; retry when readable.
    OnRead,
    /// A record-layer write could not complete; retry when writable.
    OnWrite,
}

/// Byte transport underneath the record layer.
///
/// Non-blocking transports report `io::ErrorKind::WouldBlock`; the record
/// layer converts that into [`TlsError::WouldBlock`] so the driver can
/// suspend and resume. The cork hooks are used for optional send coalescing
/// between consecutive same-side handshake messages; the defaults make
/// corking a no-op.
pub trait Transport: io::Read + io::Write {
    /// Start coalescing outgoing writes.
    fn cork(&mut self) {}

    /// Stop coalescing and let buffered writes go out.
    fn uncork(&mut self) {}

    /// Whether the caller had already corked the transport before handing it
    /// to the connection. A corked transport is left alone.
    fn was_corked(&self) -> bool {
        false
    }
}

impl Transport for std::net::TcpStream {}
