//! Verification of Clubhouse outgoing webhook signatures.
//!
//! Clubhouse signs each webhook body with HMAC-SHA256 under a shared secret
//! and sends the hex digest in the `Clubhouse-Signature` header.
//! [`signature::SignatureVerifier`] checks that header against the body and
//! hands the consumed body back; [`middleware`] wraps it as an axum
//! middleware; [`server`] is a small receiver built on both.

pub mod config;
pub mod error;
pub mod logging;
pub mod middleware;
pub mod server;
pub mod signature;

pub use error::VerifyError;
pub use middleware::{verify_signature, HeaderVerification};
pub use signature::{compute_signature, SignatureVerifier, Verification, SIGNATURE_HEADER};
