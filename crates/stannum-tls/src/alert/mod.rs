//! TLS alert protocol: level/description codes and handshake-time processing.

use crate::TlsError;

/// Alert severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AlertLevel {
    Warning = 1,
    Fatal = 2,
}

impl AlertLevel {
    pub fn from_u8(v: u8) -> Result<Self, u8> {
        match v {
            1 => Ok(AlertLevel::Warning),
            2 => Ok(AlertLevel::Fatal),
            _ => Err(v),
        }
    }
}

/// Alert description codes (RFC 5246 Section 7.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AlertDescription {
    CloseNotify = 0,
    UnexpectedMessage = 10,
    BadRecordMac = 20,
    RecordOverflow = 22,
    DecompressionFailure = 30,
    HandshakeFailure = 40,
    NoCertificateReserved = 41,
    BadCertificate = 42,
    UnsupportedCertificate = 43,
    CertificateRevoked = 44,
    CertificateExpired = 45,
    CertificateUnknown = 46,
    IllegalParameter = 47,
    UnknownCa = 48,
    AccessDenied = 49,
    DecodeError = 50,
    DecryptError = 51,
    ProtocolVersion = 70,
    InsufficientSecurity = 71,
    InternalError = 80,
    UserCanceled = 90,
    NoRenegotiation = 100,
    UnsupportedExtension = 110,
}

impl AlertDescription {
    pub fn from_u8(v: u8) -> Result<Self, u8> {
        match v {
            0 => Ok(AlertDescription::CloseNotify),
            10 => Ok(AlertDescription::UnexpectedMessage),
            20 => Ok(AlertDescription::BadRecordMac),
            22 => Ok(AlertDescription::RecordOverflow),
            30 => Ok(AlertDescription::DecompressionFailure),
            40 => Ok(AlertDescription::HandshakeFailure),
            41 => Ok(AlertDescription::NoCertificateReserved),
            42 => Ok(AlertDescription::BadCertificate),
            43 => Ok(AlertDescription::UnsupportedCertificate),
            44 => Ok(AlertDescription::CertificateRevoked),
            45 => Ok(AlertDescription::CertificateExpired),
            46 => Ok(AlertDescription::CertificateUnknown),
            47 => Ok(AlertDescription::IllegalParameter),
            48 => Ok(AlertDescription::UnknownCa),
            49 => Ok(AlertDescription::AccessDenied),
            50 => Ok(AlertDescription::DecodeError),
            51 => Ok(AlertDescription::DecryptError),
            70 => Ok(AlertDescription::ProtocolVersion),
            71 => Ok(AlertDescription::InsufficientSecurity),
            80 => Ok(AlertDescription::InternalError),
            90 => Ok(AlertDescription::UserCanceled),
            100 => Ok(AlertDescription::NoRenegotiation),
            110 => Ok(AlertDescription::UnsupportedExtension),
            _ => Err(v),
        }
    }
}

/// Accumulates alert bytes arriving during the handshake.
///
/// Alerts are two bytes but may be split across records. Warnings are
/// tolerated and discarded; a fatal alert or close_notify ends the
/// handshake.
pub(crate) struct AlertProcessor {
    pending: Vec<u8>,
}

impl AlertProcessor {
    pub fn new() -> Self {
        Self {
            pending: Vec::with_capacity(2),
        }
    }

    /// Feed one alert-record fragment.
    pub fn absorb(&mut self, mut fragment: &[u8]) -> Result<(), TlsError> {
        while !fragment.is_empty() {
            let need = 2 - self.pending.len();
            let take = need.min(fragment.len());
            self.pending.extend_from_slice(&fragment[..take]);
            fragment = &fragment[take..];

            if self.pending.len() < 2 {
                break;
            }
            let level = self.pending[0];
            let description = self.pending[1];
            self.pending.clear();

            if description == AlertDescription::CloseNotify as u8 {
                return Err(TlsError::ConnectionClosed);
            }
            if level == AlertLevel::Fatal as u8 {
                return Err(TlsError::AlertReceived(describe(description)));
            }
            // Warning alerts are ignored.
        }
        Ok(())
    }
}

fn describe(code: u8) -> String {
    match AlertDescription::from_u8(code) {
        Ok(desc) => format!("{desc:?}"),
        Err(v) => format!("unknown alert {v}"),
    }
}
