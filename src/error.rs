//! Session-start errors.
//!
//! Everything that can fail after a session is up is either swallowed and
//! logged (transient inference/translation failures) or surfaced as a
//! metrics event (protocol failures). Only start-time failures are typed:
//! the caller can act on them before any event has been emitted.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StartError {
    /// The configuration is internally inconsistent or out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A required credential is absent or obviously malformed.
    #[error("missing or invalid credential: {0}")]
    MissingCredential(String),

    /// The audio source refused to start (permission denied, device gone).
    #[error("audio capture failed to start: {0}")]
    Capture(String),

    /// The remote realtime endpoint could not be reached.
    #[error("connection to realtime endpoint failed: {0}")]
    Connect(String),
}
