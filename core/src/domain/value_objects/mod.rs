//! Value objects representing immutable domain concepts.

pub mod session_bundles;

// Re-export commonly used types
pub use session_bundles::{
    CreatedSession, RefreshedSession, RegeneratedSession, SessionSummary, VerifiedSession,
};
