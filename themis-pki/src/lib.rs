//! PKI signing-service and JWKS validator semantic contracts.
//!
//! Both the signing service and the JWKS endpoint are external
//! collaborators (spec.md §1's explicit Non-goal on HTTP client
//! internals); this crate defines the contract and cache/refresh
//! behavior the rest of the core relies on, plus local, non-HTTP
//! implementations sufficient for development and for the audit logger's
//! own tests.

pub mod jwks;
pub mod signing;

pub use jwks::{Jwk, JwksDocument, JwksSource, JwksValidator};
pub use signing::{LocalSigningProvider, SignatureResult, SigningProvider};
