//! Conversion between the nested upload format and flat `SessionRecord` rows.
//!
//! - `normalizer`: nested JSON entry to `SessionRecord`
//! - `nesting`: `SessionRecord` back to the nested upload shape

pub mod nesting;
pub mod normalizer;

pub use nesting::nest;
pub use normalizer::{normalize, normalize_batch};
