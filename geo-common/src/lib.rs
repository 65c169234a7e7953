// geo-common - Reply model and decoder shared by the geospatial client
//
// This crate has no I/O: it turns one JSON reply or push event into a `Reply`.

pub mod error;
pub mod protocol;
pub mod reply;

// Re-export for convenience
pub use error::*;
pub use protocol::*;
pub use reply::*;
