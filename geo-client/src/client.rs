//! # Synchronous Client API
//!
//! Purpose: Expose a compact, blocking API for the geospatial command set
//! (SET, GET, SCAN, SEARCH, DEL, PDEL, EXPIRE, PERSIST, TTL) and live fences.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `GeoClient` hides pooling, framing and decoding.
//! 2. **CLI-Shaped Arguments**: Trailing arguments are passed through verbatim,
//!    in the same form the server's own CLI accepts.
//! 3. **Absent Is Not An Error**: `get` maps the server's "id not found" to
//!    `Ok(None)`; every other rejection stays an error.

use std::time::Duration;

use geo_common::Reply;
use serde::Deserialize;

use crate::error::{ClientError, ClientResult};
use crate::feed::LiveFeed;
use crate::pool::{PoolConfig, PoolStatus};
use crate::session::Session;

/// Configuration for the client and its pool.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server address, e.g. "127.0.0.1:9851".
    pub addr: String,
    /// Maximum idle connections kept in the pool.
    pub max_idle: usize,
    /// Maximum total connections (idle + in-use).
    pub max_total: usize,
    /// Connections opened and handshaken by `connect`.
    pub min_idle: usize,
    /// Optional TCP read timeout.
    pub read_timeout: Option<Duration>,
    /// Optional TCP write timeout.
    pub write_timeout: Option<Duration>,
    /// Optional TCP connect timeout.
    pub connect_timeout: Option<Duration>,
    /// Optional bound on waiting for a free pooled connection.
    pub acquire_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            addr: "127.0.0.1:9851".to_string(),
            max_idle: 8,
            max_total: 16,
            min_idle: 1,
            read_timeout: None,
            write_timeout: None,
            connect_timeout: None,
            acquire_timeout: None,
        }
    }
}

impl From<ClientConfig> for PoolConfig {
    fn from(config: ClientConfig) -> Self {
        PoolConfig {
            addr: config.addr,
            max_idle: config.max_idle,
            max_total: config.max_total,
            min_idle: config.min_idle,
            read_timeout: config.read_timeout,
            write_timeout: config.write_timeout,
            connect_timeout: config.connect_timeout,
            acquire_timeout: config.acquire_timeout,
        }
    }
}

/// Synchronous client with connection pooling.
///
/// A default-constructed client is not connected; every operation on it
/// fails with `Uninitialized` without touching the network.
#[derive(Default)]
pub struct GeoClient {
    session: Option<Session>,
}

impl GeoClient {
    /// Creates a client with default configuration.
    pub fn connect(addr: impl Into<String>) -> ClientResult<Self> {
        let config = ClientConfig {
            addr: addr.into(),
            ..ClientConfig::default()
        };
        Self::with_config(config)
    }

    /// Creates a client with a custom configuration.
    pub fn with_config(config: ClientConfig) -> ClientResult<Self> {
        let session = Session::new(config.into())?;
        Ok(GeoClient {
            session: Some(session),
        })
    }

    /// Closes the pool. Later calls fail with `Uninitialized`.
    pub fn close(&mut self) -> ClientResult<()> {
        self.session
            .take()
            .map(drop)
            .ok_or(ClientError::Uninitialized)
    }

    fn session(&self) -> ClientResult<&Session> {
        self.session.as_ref().ok_or(ClientError::Uninitialized)
    }

    /// Runs an arbitrary command; at least one argument is required.
    pub fn execute(&self, command: &str, args: &[&str]) -> ClientResult<Reply> {
        self.session()?.execute(command, args)
    }

    /// Saves an object. `args` holds the value part (e.g. `POINT 33 -115`)
    /// and must not be empty.
    pub fn set(&self, key: &str, id: &str, args: &[&str]) -> ClientResult<()> {
        let session = self.session()?;
        if args.is_empty() {
            return Err(ClientError::InvalidArguments);
        }
        session.execute("SET", &with_prefix(&[key, id], args)).map(drop)
    }

    /// Fetches one object.
    ///
    /// Returns `Ok(None)` when the server reports the id as not found.
    pub fn get(&self, key: &str, id: &str, args: &[&str]) -> ClientResult<Option<Reply>> {
        match self.session()?.execute("GET", &with_prefix(&[key, id], args)) {
            Ok(reply) => Ok(Some(reply)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Iterates the objects of a key.
    pub fn scan(&self, key: &str, args: &[&str]) -> ClientResult<Reply> {
        self.session()?.execute("SCAN", &with_prefix(&[key], args))
    }

    /// Iterates the string values of a key.
    pub fn search(&self, key: &str, args: &[&str]) -> ClientResult<Reply> {
        self.session()?.execute("SEARCH", &with_prefix(&[key], args))
    }

    /// Deletes one object.
    pub fn del(&self, key: &str, id: &str) -> ClientResult<()> {
        self.session()?.execute("DEL", &[key, id]).map(drop)
    }

    /// Deletes every object whose id matches `pattern`.
    pub fn pdel(&self, key: &str, pattern: &str) -> ClientResult<()> {
        self.session()?.execute("PDEL", &[key, pattern]).map(drop)
    }

    /// Sets or resets the timeout of an object.
    pub fn expire(&self, key: &str, id: &str, seconds: u64) -> ClientResult<()> {
        let seconds = seconds.to_string();
        self.session()?
            .execute("EXPIRE", &[key, id, seconds.as_str()])
            .map(drop)
    }

    /// Removes the timeout of an object.
    pub fn persist(&self, key: &str, id: &str) -> ClientResult<()> {
        self.session()?.execute("PERSIST", &[key, id]).map(drop)
    }

    /// Returns the remaining time-to-live of an object, in seconds.
    pub fn ttl(&self, key: &str, id: &str) -> ClientResult<f64> {
        self.session()?
            .execute("TTL", &[key, id])
            .map(|reply| reply.ttl)
    }

    /// Idle and total connection counts of the pool.
    pub fn pool_status(&self) -> ClientResult<PoolStatus> {
        Ok(self.session()?.pool_status())
    }

    /// Starts a live feed, e.g. `live("NEARBY", &["fleet", "FENCE", "POINT", "33", "-115", "5000"])`.
    ///
    /// The feed holds its own connection until it is dropped or cancelled.
    pub fn live(&self, command: &str, args: &[&str]) -> ClientResult<LiveFeed> {
        self.session()?.subscribe(command, args)
    }
}

fn with_prefix<'a>(prefix: &[&'a str], args: &[&'a str]) -> Vec<&'a str> {
    let mut out = Vec::with_capacity(prefix.len() + args.len());
    out.extend_from_slice(prefix);
    out.extend_from_slice(args);
    out
}
