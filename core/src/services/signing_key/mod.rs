//! Signing-key provisioning for access tokens
//!
//! This module owns everything about the Ed25519 keys that sign V2 access
//! tokens:
//! - Lazy, exactly-once key creation through the store's insert-if-absent
//! - Interval-based dynamic rotation with a verification grace window
//! - The bridge from stored key material into `jsonwebtoken` keys

pub mod material;
mod store;


pub use store::SigningKeyStore;
