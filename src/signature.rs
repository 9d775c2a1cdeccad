//! Clubhouse webhook signature verification
//!
//! Clubhouse signs outgoing webhooks with HMAC-SHA256. The message is the raw
//! request body and the key is the secret configured on the webhook. The
//! digest is sent hex-encoded in the `Clubhouse-Signature` header.
//!
//! Verification consumes the body, so every outcome that reads it hands the
//! bytes back to the caller for the next consumer in the chain.

use bytes::Bytes;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;
use std::io::{Cursor, Read};

use crate::error::VerifyError;
use axum::http::HeaderMap;

/// Type alias for HMAC-SHA256
type HmacSha256 = Hmac<Sha256>;

/// Name of the header carrying the hex-encoded signature.
pub const SIGNATURE_HEADER: &str = "Clubhouse-Signature";

/// Outcome of a verification that got as far as reading the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    /// Whether the signature matched the body.
    pub verified: bool,
    /// The exact body bytes that were consumed.
    pub body: Bytes,
}

impl Verification {
    /// A fresh reader over the consumed body, positioned at the start.
    pub fn restore(&self) -> Cursor<Bytes> {
        Cursor::new(self.body.clone())
    }
}

/// Verifies `Clubhouse-Signature` headers against a shared secret.
///
/// The secret is only used to key the MAC at construction and is not kept
/// around in plain form. A verifier holds no mutable state, so a single
/// instance can be shared across concurrently handled requests.
#[derive(Clone)]
pub struct SignatureVerifier {
    mac: HmacSha256,
}

impl fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl SignatureVerifier {
    /// Create a verifier for the given secret.
    ///
    /// An empty secret is accepted; supplying a real one is the caller's job.
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let mac =
            HmacSha256::new_from_slice(secret.as_ref()).expect("HMAC can take any key size");
        Self { mac }
    }

    /// Verify a request given its headers and body reader.
    ///
    /// The header is checked before the body is touched: on
    /// [`VerifyError::MissingSignature`] and [`VerifyError::MalformedSignature`]
    /// nothing is read from `body`. Otherwise the reader is drained and the
    /// bytes come back either in the returned [`Verification`] or, if the
    /// read failed partway, in [`VerifyError::BodyRead`].
    ///
    /// A signature that decodes fine but does not match is `Ok` with
    /// `verified == false`.
    pub fn verify<R: Read + ?Sized>(
        &self,
        headers: &HeaderMap,
        body: &mut R,
    ) -> Result<Verification, VerifyError> {
        let expected = signature_from_headers(headers)?;

        let mut buf = Vec::new();
        // read_to_end keeps whatever it managed to read before an error
        if let Err(source) = body.read_to_end(&mut buf) {
            return Err(VerifyError::BodyRead {
                source,
                body: Bytes::from(buf),
            });
        }

        let body = Bytes::from(buf);
        Ok(Verification {
            verified: self.matches(&expected, &body),
            body,
        })
    }

    /// Verify a hex signature against a body that is already in memory.
    ///
    /// Returns [`VerifyError::MissingSignature`] for a blank signature and
    /// [`VerifyError::MalformedSignature`] if it is not valid hex.
    pub fn verify_bytes(&self, signature: &str, body: &[u8]) -> Result<bool, VerifyError> {
        let expected = decode_signature(signature.as_bytes())?;
        Ok(self.matches(&expected, body))
    }

    /// Constant-time comparison of `expected` against the MAC of `message`.
    ///
    /// A digest of the wrong length simply fails to match.
    pub(crate) fn matches(&self, expected: &[u8], message: &[u8]) -> bool {
        let mut mac = self.mac.clone();
        mac.update(message);
        mac.verify_slice(expected).is_ok()
    }
}

/// Extract and hex-decode the signature header without touching the body.
pub(crate) fn signature_from_headers(headers: &HeaderMap) -> Result<Vec<u8>, VerifyError> {
    let value = headers
        .get(SIGNATURE_HEADER)
        .ok_or(VerifyError::MissingSignature)?;
    decode_signature(value.as_bytes())
}

fn decode_signature(raw: &[u8]) -> Result<Vec<u8>, VerifyError> {
    let raw = raw.trim_ascii();
    if raw.is_empty() {
        return Err(VerifyError::MissingSignature);
    }
    hex::decode(raw).map_err(VerifyError::MalformedSignature)
}

/// Compute the signature a sender would place in the `Clubhouse-Signature`
/// header: lowercase hex HMAC-SHA256 of `body` keyed by `secret`.
pub fn compute_signature(secret: impl AsRef<[u8]>, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_ref()).expect("HMAC can take any key size");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}
