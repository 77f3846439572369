//! Transcript accumulator over handshake bytes.
//!
//! Every handshake byte that crosses the wire (headers included, in send or
//! receive order) is fed into four digests in parallel, so whichever pair the
//! negotiated cipher suite needs for Finished is available. CHANGE_CIPHER_SPEC
//! and ALERT records never enter the transcript.

use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384};

/// Running multi-digest over the handshake transcript.
///
/// Snapshots (`md5_digest` etc.) clone the live state and finalize the clone,
/// so Finished handlers can read intermediate hashes without disturbing the
/// accumulator.
#[derive(Clone)]
pub struct HandshakeHashes {
    md5: Md5,
    sha1: Sha1,
    sha256: Sha256,
    sha384: Sha384,
}

impl HandshakeHashes {
    pub fn new() -> Self {
        Self {
            md5: Md5::new(),
            sha1: Sha1::new(),
            sha256: Sha256::new(),
            sha384: Sha384::new(),
        }
    }

    /// Feed handshake bytes into all four digests.
    pub fn update(&mut self, data: &[u8]) {
        self.md5.update(data);
        self.sha1.update(data);
        self.sha256.update(data);
        self.sha384.update(data);
    }

    /// MD5 over the transcript so far.
    pub fn md5_digest(&self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out.copy_from_slice(&self.md5.clone().finalize());
        out
    }

    /// SHA-1 over the transcript so far.
    pub fn sha1_digest(&self) -> [u8; 20] {
        let mut out = [0u8; 20];
        out.copy_from_slice(&self.sha1.clone().finalize());
        out
    }

    /// SHA-256 over the transcript so far.
    pub fn sha256_digest(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out.copy_from_slice(&self.sha256.clone().finalize());
        out
    }

    /// SHA-384 over the transcript so far.
    pub fn sha384_digest(&self) -> [u8; 48] {
        let mut out = [0u8; 48];
        out.copy_from_slice(&self.sha384.clone().finalize());
        out
    }
}

impl Default for HandshakeHashes {
    fn default() -> Self {
        Self::new()
    }
}
