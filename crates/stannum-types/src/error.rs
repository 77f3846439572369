/// TLS protocol errors.
///
/// `WouldBlock` is the only retryable variant: it means a record-layer read
/// or write could not complete and the caller should re-enter once the
/// transport is ready. Every other variant is fatal for the connection.
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("operation would block")]
    WouldBlock,
    #[error("bad handshake message: {0}")]
    BadMessage(String),
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),
    #[error("alert received: {0}")]
    AlertReceived(String),
    #[error("record layer error: {0}")]
    RecordError(String),
    #[error("connection closed")]
    ConnectionClosed,
    #[error("internal error: {0}")]
    InternalError(String),
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
}

impl TlsError {
    /// Whether this error is retryable after the transport becomes ready.
    pub fn is_would_block(&self) -> bool {
        matches!(self, TlsError::WouldBlock)
    }
}
