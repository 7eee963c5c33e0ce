//! Promised-request verification (RFC 9113 Section 8.4.1).
//!
//! A server may only push requests that are safe, cacheable and
//! authoritative for it. The three checks are separate predicates so a
//! rejection identifies which policy was violated.

use crate::connection::Connection;
use crate::headers::Headers;

/// Policy checks applied to the headers of a PUSH_PROMISE before the
/// promised stream is reserved.
pub trait PromisedRequestVerifier {
    /// Whether the server is authoritative for the promised request.
    fn is_authoritative(&self, conn: &Connection, headers: &Headers) -> bool;

    /// Whether the promised request is known to be cacheable.
    fn is_cacheable(&self, headers: &Headers) -> bool;

    /// Whether the promised request is known to be safe.
    fn is_safe(&self, headers: &Headers) -> bool;
}

/// Verifier that accepts every promised request. The default when no
/// verifier is configured.
#[derive(Debug, Default)]
pub struct AlwaysVerify;

impl PromisedRequestVerifier for AlwaysVerify {
    fn is_authoritative(&self, _conn: &Connection, _headers: &Headers) -> bool {
        true
    }

    fn is_cacheable(&self, _headers: &Headers) -> bool {
        true
    }

    fn is_safe(&self, _headers: &Headers) -> bool {
        true
    }
}
