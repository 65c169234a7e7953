//! # Geospatial Sync Client
//!
//! Purpose: Provide a lightweight, synchronous client for a geospatial
//! database speaking RESP with JSON replies, with connection pooling and live
//! geofence feeds.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Reuse handshaken TCP connections.
//! 2. **One Decoder**: Command replies and push events share `geo_common::Reply`.
//! 3. **Typed Failures**: Every failure is a `ClientError` variant; nothing is
//!    retried internally.
//!
//! ## Quick Start
//!
//! ```no_run
//! use geo_client::GeoClient;
//!
//! let client = GeoClient::connect("127.0.0.1:9851")?;
//! client.set("fleet", "truck1", &["POINT", "33.5123", "-112.2693"])?;
//! if let Some(reply) = client.get("fleet", "truck1", &[])? {
//!     println!("{}", reply.object);
//! }
//! # Ok::<(), geo_client::ClientError>(())
//! ```

mod client;
mod error;
mod feed;
mod pool;
mod resp;
mod session;

pub use geo_common::{DecodeError, Reply};

pub use client::{ClientConfig, GeoClient};
pub use error::{ClientError, ClientResult};
pub use feed::{FeedCanceller, LiveFeed};
pub use pool::PoolStatus;
