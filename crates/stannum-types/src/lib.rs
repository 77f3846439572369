#![forbid(unsafe_code)]
#![doc = "Shared types for the stannum TLS stack."]

mod error;

pub use error::TlsError;
