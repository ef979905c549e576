//! Upload pipeline: raw request body to committed rows.

pub mod upload;

pub use upload::{parse_body, upload_batch};
