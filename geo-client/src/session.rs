//! # Command Session
//!
//! Purpose: Run one command on a pooled connection and classify the reply as
//! success, server rejection, or decode failure.
//!
//! ## Reply Classification
//!
//! ```text
//! frame ──┬─ -error line ───────────────────────► Server { message }
//!         ├─ +text / $bulk ─► decode ─┬─ Err ───► Decode { source }
//!         │                           ├─ ok=false► Server { message: err }
//!         │                           └─ ok=true ► Reply
//!         └─ anything else ─────────────────────► UnexpectedResponse
//! ```

use geo_common::Reply;
use tracing::debug;

use crate::error::{ClientError, ClientResult};
use crate::feed::LiveFeed;
use crate::pool::{ConnectionPool, PoolConfig, PoolStatus};
use crate::resp::Frame;

/// Pooled command executor bound to one server address.
pub struct Session {
    pool: ConnectionPool,
}

impl Session {
    /// Creates the pool; warm-up connections are handshaken here.
    pub fn new(config: PoolConfig) -> ClientResult<Self> {
        Ok(Session {
            pool: ConnectionPool::new(config)?,
        })
    }

    /// Executes `command` with at least one argument.
    ///
    /// The connection goes back to the pool on every path; it is discarded
    /// only when the transport itself failed.
    ///
    /// # Errors
    /// - `InvalidArguments` when `args` is empty (no network access happens).
    /// - `Connect`/`PoolTimeout` when no connection could be borrowed.
    /// - `Io`/`Protocol`/`ConnectionClosed` on transport failure.
    /// - `Decode` when the reply is not a valid reply document.
    /// - `Server` when the server rejected the command.
    pub fn execute(&self, command: &str, args: &[&str]) -> ClientResult<Reply> {
        if args.is_empty() {
            return Err(ClientError::InvalidArguments);
        }

        let frame = {
            let mut conn = self.pool.acquire()?;
            debug!(command, args = args.len(), "dispatching command");
            conn.exec(command, args)?
        };
        into_reply(command, frame)
    }

    /// Starts a live feed on a dedicated connection outside the pool.
    pub fn subscribe(&self, command: &str, args: &[&str]) -> ClientResult<LiveFeed> {
        if args.is_empty() {
            return Err(ClientError::InvalidArguments);
        }
        let conn = self.pool.open_detached()?;
        LiveFeed::start(conn, command, args)
    }

    pub fn pool_status(&self) -> PoolStatus {
        self.pool.status()
    }
}

/// Turns a reply frame into a successful `Reply` or a classified error.
pub(crate) fn into_reply(command: &str, frame: Frame) -> ClientResult<Reply> {
    let reply = decode_frame(command, frame)?;
    if !reply.ok {
        return Err(ClientError::Server {
            command: command.to_string(),
            message: reply.err,
        });
    }
    Ok(reply)
}

/// Decodes a frame without judging the `ok` flag; push events carry none.
pub(crate) fn decode_frame(command: &str, frame: Frame) -> ClientResult<Reply> {
    if let Frame::Error(message) = frame {
        return Err(ClientError::Server {
            command: command.to_string(),
            message: String::from_utf8_lossy(&message).into_owned(),
        });
    }

    let payload = frame.into_payload().ok_or(ClientError::UnexpectedResponse)?;
    Reply::decode(&payload).map_err(|source| ClientError::Decode {
        command: command.to_string(),
        source,
    })
}
