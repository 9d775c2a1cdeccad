//! Error types for signature verification.
//!
//! A signature mismatch is deliberately *not* an error: it is reported as
//! `Verification { verified: false, .. }` so callers can tell a well-formed
//! but untrusted request apart from a protocol violation.

use bytes::Bytes;
use std::io;
use thiserror::Error;

use crate::signature::SIGNATURE_HEADER;

/// Errors that can occur while verifying a webhook request.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// The signature header was absent, empty, or only whitespace.
    #[error("{} header not specified", SIGNATURE_HEADER)]
    MissingSignature,

    /// The signature header was not a valid hex string.
    #[error("error when decoding header {}: {}", SIGNATURE_HEADER, .0)]
    MalformedSignature(#[source] hex::FromHexError),

    /// The request body could not be read to completion.
    ///
    /// `body` holds every byte read before the failure so it can still be
    /// handed to the next consumer.
    #[error("error occurred when reading request body: {source}")]
    BodyRead {
        #[source]
        source: io::Error,
        body: Bytes,
    },
}

impl VerifyError {
    /// Short machine-friendly name of the error kind, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            VerifyError::MissingSignature => "missing_signature",
            VerifyError::MalformedSignature(_) => "malformed_signature",
            VerifyError::BodyRead { .. } => "body_read",
        }
    }

    /// Bytes consumed from the body before the error occurred.
    ///
    /// Empty for header errors, since the body is never touched in that case.
    pub fn restored_body(&self) -> Bytes {
        match self {
            VerifyError::BodyRead { body, .. } => body.clone(),
            _ => Bytes::new(),
        }
    }
}
