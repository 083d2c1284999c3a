//! Remessa Common Types
//!
//! This crate contains shared types used across Remessa, including
//! currency codes, strictly positive exchange rates and batch input ids.

pub mod identifiers;
pub mod monetary;
pub mod error;

pub use identifiers::*;
pub use monetary::*;
pub use error::*;
