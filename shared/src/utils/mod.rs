//! Common utility functions

pub mod api_key;

// Re-export commonly used utilities
pub use api_key::*;
