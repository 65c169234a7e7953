//! # Live Geofence Feed
//!
//! Purpose: Follow the stream of push events a server sends after a fence
//! command, decoding each frame with the same reply decoder.
//!
//! ## Usage Notes
//!
//! - A feed owns its connection for its whole life; the connection never
//!   joins the pool.
//! - Events arrive strictly in order and the feed cannot be restarted;
//!   subscribe again for a new one.
//! - The iterator ends (`None`) when the server closes the connection or the
//!   feed is cancelled. A transport failure is yielded once as `Err`, then
//!   the iterator ends.

use std::iter::FusedIterator;
use std::net::{Shutdown, TcpStream};

use geo_common::Reply;
use tracing::debug;

use crate::error::{ClientError, ClientResult};
use crate::pool::Connection;
use crate::session::{decode_frame, into_reply};

/// Iterator over live feed events.
pub struct LiveFeed {
    conn: Connection,
    command: String,
    done: bool,
}

impl LiveFeed {
    /// Sends the fence command and waits for the live acknowledgement.
    pub(crate) fn start(mut conn: Connection, command: &str, args: &[&str]) -> ClientResult<Self> {
        let frame = conn.exec(command, args)?;
        let ack = into_reply(command, frame)?;
        if !ack.live {
            return Err(ClientError::UnexpectedResponse);
        }
        // Events may be hours apart.
        conn.set_read_timeout(None)?;
        debug!(command, "live feed started");

        Ok(LiveFeed {
            conn,
            command: command.to_string(),
            done: false,
        })
    }

    /// Handle that ends this feed from another thread.
    pub fn canceller(&self) -> ClientResult<FeedCanceller> {
        Ok(FeedCanceller {
            stream: self.conn.try_clone_stream()?,
        })
    }

    fn finish(&mut self) {
        if !self.done {
            self.done = true;
            debug!(command = %self.command, "live feed ended");
        }
    }
}

impl Iterator for LiveFeed {
    type Item = ClientResult<Reply>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.conn.receive() {
            Ok(frame) => Some(decode_frame(&self.command, frame)),
            Err(ClientError::ConnectionClosed) => {
                self.finish();
                None
            }
            Err(err) => {
                self.finish();
                Some(Err(err))
            }
        }
    }
}

impl FusedIterator for LiveFeed {}

impl Drop for LiveFeed {
    fn drop(&mut self) {
        self.conn.shutdown();
    }
}

/// Cancels a `LiveFeed` by shutting its socket down.
pub struct FeedCanceller {
    stream: TcpStream,
}

impl FeedCanceller {
    /// Ends the feed; a blocked `next` returns `None`.
    pub fn cancel(&self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}
