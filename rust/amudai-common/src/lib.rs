//! Core definitions (error types, result alias and verification macros), relied upon
//! by all amudai-* crates.

pub mod error;
pub mod macros;
pub mod result;

pub use result::Result;
