//! Utility helpers: glob patterns, digests and timestamps.

mod digest;
mod glob;
pub mod timestamps;

pub use digest::{md5_hex, sha256_hex};
pub use glob::GlobPattern;
pub use timestamps::{iso_timestamp, now_utc, Timestamp};
