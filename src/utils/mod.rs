//! Utilities
pub mod fmt;
pub mod linalg;
pub mod stats;
