//! Post-commit verification
//!
//! Fingerprints the committed delta and, when enabled, reads the warehouse
//! back to check it against that fingerprint and for referential
//! completeness.

pub mod checksum;
pub mod report;
pub mod verify;

pub use checksum::fingerprint;
pub use report::{VerificationFailure, VerificationReport};
pub use verify::{referential_completeness, Verifier};
