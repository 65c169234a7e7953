//! # Connection Pool
//!
//! Purpose: Reuse TCP connections that have already switched the server to
//! JSON output, so each command costs one round trip.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Keep a bounded set of reusable connections.
//! 2. **Handshake Before Admit**: A connection becomes visible to borrowers
//!    only after `OUTPUT json` succeeded on it.
//! 3. **Blocking Checkout**: At capacity, borrowers wait for a release
//!    (optionally bounded by `acquire_timeout`).
//! 4. **RAII Release**: Dropping a `PooledConnection` returns it on every exit
//!    path; broken connections are discarded instead.

use std::collections::VecDeque;
use std::io::{BufReader, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use geo_common::{OUTPUT_COMMAND, OUTPUT_JSON};

use crate::error::{ClientError, ClientResult};
use crate::resp::{encode_command, read_frame, Frame};
use crate::session::into_reply;

/// Pool configuration for the client.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Server address, e.g. "127.0.0.1:9851".
    pub addr: String,
    /// Maximum number of idle connections to keep.
    pub max_idle: usize,
    /// Maximum total connections (idle + in-use).
    pub max_total: usize,
    /// Connections opened when the pool is created.
    pub min_idle: usize,
    /// Optional TCP read timeout.
    pub read_timeout: Option<Duration>,
    /// Optional TCP write timeout.
    pub write_timeout: Option<Duration>,
    /// Optional TCP connect timeout.
    pub connect_timeout: Option<Duration>,
    /// How long a borrower waits at capacity; `None` waits indefinitely.
    pub acquire_timeout: Option<Duration>,
}

/// Point-in-time pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Connections waiting in the pool.
    pub idle: usize,
    /// Connections owned by the pool, idle or borrowed.
    pub total: usize,
}

struct PoolState {
    idle: VecDeque<Connection>,
    total: usize,
}

struct PoolInner {
    config: PoolConfig,
    state: Mutex<PoolState>,
    available: Condvar,
}

impl PoolInner {
    fn release_slot(&self) {
        let mut state = self.state.lock();
        state.total = state.total.saturating_sub(1);
        self.available.notify_one();
    }

    fn return_connection(&self, conn: Connection) {
        let mut state = self.state.lock();
        if state.idle.len() < self.config.max_idle {
            state.idle.push_back(conn);
        } else {
            state.total = state.total.saturating_sub(1);
        }
        self.available.notify_one();
    }
}

/// Connection pool handle.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Creates the pool and opens `min_idle` handshaken connections.
    ///
    /// # Errors
    /// Returns `Connect` if any warm-up connection cannot be opened or its
    /// handshake is rejected.
    pub fn new(mut config: PoolConfig) -> ClientResult<Self> {
        config.max_total = config.max_total.max(1);
        let warm = config.min_idle.min(config.max_total);

        let mut idle = VecDeque::with_capacity(config.max_idle);
        for _ in 0..warm {
            idle.push_back(Connection::open(&config)?);
        }

        let total = idle.len();
        Ok(ConnectionPool {
            inner: Arc::new(PoolInner {
                config,
                state: Mutex::new(PoolState { idle, total }),
                available: Condvar::new(),
            }),
        })
    }

    /// Borrows a connection, opening a new one while under capacity and
    /// waiting for a release otherwise.
    pub fn acquire(&self) -> ClientResult<PooledConnection> {
        let config = &self.inner.config;
        let deadline = config.acquire_timeout.map(|wait| Instant::now() + wait);
        let mut timed_out = false;

        let mut state = self.inner.state.lock();
        loop {
            if let Some(conn) = state.idle.pop_front() {
                return Ok(PooledConnection::new(self.inner.clone(), conn));
            }

            if state.total < config.max_total {
                state.total += 1;
                drop(state);
                return match Connection::open(config) {
                    Ok(conn) => Ok(PooledConnection::new(self.inner.clone(), conn)),
                    Err(err) => {
                        self.inner.release_slot();
                        Err(err)
                    }
                };
            }

            if timed_out {
                return Err(ClientError::PoolTimeout(
                    config.acquire_timeout.unwrap_or_default(),
                ));
            }

            match deadline {
                Some(deadline) => {
                    timed_out = self.inner.available.wait_until(&mut state, deadline).timed_out();
                }
                None => self.inner.available.wait(&mut state),
            }
        }
    }

    /// Opens a handshaken connection that is never returned to the pool.
    pub fn open_detached(&self) -> ClientResult<Connection> {
        Connection::open(&self.inner.config)
    }

    /// Snapshot of idle and total connection counts.
    pub fn status(&self) -> PoolStatus {
        let state = self.inner.state.lock();
        PoolStatus {
            idle: state.idle.len(),
            total: state.total,
        }
    }
}

/// RAII wrapper returning a connection to the pool on drop.
pub struct PooledConnection {
    pool: Arc<PoolInner>,
    conn: Option<Connection>,
    valid: bool,
}

impl PooledConnection {
    fn new(pool: Arc<PoolInner>, conn: Connection) -> Self {
        PooledConnection {
            pool,
            conn: Some(conn),
            valid: true,
        }
    }

    /// Sends one command and reads its reply frame.
    pub fn exec(&mut self, command: &str, args: &[&str]) -> ClientResult<Frame> {
        let conn = self.conn.as_mut().ok_or(ClientError::ConnectionClosed)?;
        let response = conn.exec(command, args);
        if let Err(err) = &response {
            if err.breaks_connection() {
                // The stream may be mid-frame; never hand it out again.
                self.valid = false;
            }
        }
        response
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };

        if self.valid {
            self.pool.return_connection(conn);
        } else {
            warn!(addr = %self.pool.config.addr, "discarding broken connection");
            conn.shutdown();
            self.pool.release_slot();
        }
    }
}

/// Single TCP connection in JSON output mode, with reusable buffers.
pub struct Connection {
    reader: BufReader<TcpStream>,
    line_buf: Vec<u8>,
    write_buf: Vec<u8>,
}

impl Connection {
    /// Connects and negotiates JSON output.
    ///
    /// # Errors
    /// Any transport failure or handshake rejection, wrapped in `Connect`.
    pub fn open(config: &PoolConfig) -> ClientResult<Self> {
        Self::connect(config).map_err(|source| ClientError::Connect {
            addr: config.addr.clone(),
            source: Box::new(source),
        })
    }

    fn connect(config: &PoolConfig) -> ClientResult<Self> {
        let stream = connect_stream(config)?;
        stream.set_read_timeout(config.read_timeout)?;
        stream.set_write_timeout(config.write_timeout)?;
        stream.set_nodelay(true)?;
        debug!(addr = %config.addr, "connection opened");

        let mut conn = Connection {
            reader: BufReader::new(stream),
            line_buf: Vec::with_capacity(128),
            write_buf: Vec::with_capacity(256),
        };

        if let Err(err) = conn.handshake() {
            warn!(addr = %config.addr, error = %err, "output handshake rejected");
            conn.shutdown();
            return Err(err);
        }
        debug!(addr = %config.addr, "output mode negotiated");
        Ok(conn)
    }

    fn handshake(&mut self) -> ClientResult<()> {
        let frame = self.exec(OUTPUT_COMMAND, &[OUTPUT_JSON])?;
        into_reply(OUTPUT_COMMAND, frame).map(drop)
    }

    /// Writes one command frame.
    pub fn send(&mut self, command: &str, args: &[&str]) -> ClientResult<()> {
        self.write_buf.clear();
        encode_command(command, args, &mut self.write_buf);

        let stream = self.reader.get_mut();
        stream.write_all(&self.write_buf)?;
        stream.flush()?;
        Ok(())
    }

    /// Reads one reply frame.
    pub fn receive(&mut self) -> ClientResult<Frame> {
        read_frame(&mut self.reader, &mut self.line_buf)
    }

    /// Sends one command and waits for its reply frame.
    pub fn exec(&mut self, command: &str, args: &[&str]) -> ClientResult<Frame> {
        self.send(command, args)?;
        self.receive()
    }

    /// Replaces the read timeout set at connect time.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> ClientResult<()> {
        self.reader.get_ref().set_read_timeout(timeout)?;
        Ok(())
    }

    /// Clones the socket handle so another thread can shut it down.
    pub fn try_clone_stream(&self) -> ClientResult<TcpStream> {
        Ok(self.reader.get_ref().try_clone()?)
    }

    /// Closes both directions; the peer sees end of stream.
    pub fn shutdown(&self) {
        let _ = self.reader.get_ref().shutdown(Shutdown::Both);
    }
}

fn connect_stream(config: &PoolConfig) -> ClientResult<TcpStream> {
    let addr: SocketAddr = config.addr.parse().map_err(|_| ClientError::InvalidAddress)?;
    let stream = match config.connect_timeout {
        Some(timeout) => TcpStream::connect_timeout(&addr, timeout)?,
        None => TcpStream::connect(addr)?,
    };
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, Read};
    use std::net::TcpListener;
    use std::thread;

    /// Accepts connections forever; every command gets `{"ok":true}` except
    /// `OUTPUT`, which gets `handshake_reply`.
    fn spawn_server(handshake_reply: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { return };
                thread::spawn(move || serve(stream, handshake_reply));
            }
        });
        addr
    }

    fn serve(mut stream: TcpStream, handshake_reply: &str) {
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line).unwrap_or(0) == 0 {
                return;
            }
            let count: usize = line.trim_end()[1..].parse().unwrap();
            let mut args = Vec::new();
            for _ in 0..count {
                line.clear();
                reader.read_line(&mut line).unwrap();
                let len: usize = line.trim_end()[1..].parse().unwrap();
                let mut data = vec![0u8; len + 2];
                reader.read_exact(&mut data).unwrap();
                data.truncate(len);
                args.push(String::from_utf8(data).unwrap());
            }
            let reply = if args[0] == "OUTPUT" {
                handshake_reply
            } else {
                r#"{"ok":true}"#
            };
            let frame = format!("${}\r\n{}\r\n", reply.len(), reply);
            if stream.write_all(frame.as_bytes()).is_err() {
                return;
            }
        }
    }

    fn config(addr: String, max_total: usize, acquire_timeout: Option<Duration>) -> PoolConfig {
        PoolConfig {
            addr,
            max_idle: max_total,
            max_total,
            min_idle: 1,
            read_timeout: Some(Duration::from_secs(2)),
            write_timeout: Some(Duration::from_secs(2)),
            connect_timeout: Some(Duration::from_secs(2)),
            acquire_timeout,
        }
    }

    #[test]
    fn warms_up_and_reuses_connections() {
        let addr = spawn_server(r#"{"ok":true}"#);
        let pool = ConnectionPool::new(config(addr, 2, None)).unwrap();
        assert_eq!(pool.status(), PoolStatus { idle: 1, total: 1 });

        {
            let mut conn = pool.acquire().unwrap();
            assert_eq!(pool.status().idle, 0);
            let frame = conn.exec("PING", &["x"]).unwrap();
            assert_eq!(frame.into_payload(), Some(br#"{"ok":true}"#.to_vec()));
        }
        assert_eq!(pool.status(), PoolStatus { idle: 1, total: 1 });
    }

    #[test]
    fn rejected_handshake_fails_pool_creation() {
        let addr = spawn_server(r#"{"ok":false,"err":"output disabled"}"#);
        let err = ConnectionPool::new(config(addr, 1, None)).err().unwrap();
        match err {
            ClientError::Connect { source, .. } => {
                assert_eq!(source.server_message(), Some("output disabled"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn times_out_at_capacity() {
        let addr = spawn_server(r#"{"ok":true}"#);
        let wait = Duration::from_millis(50);
        let pool = ConnectionPool::new(config(addr, 1, Some(wait))).unwrap();

        let held = pool.acquire().unwrap();
        let err = pool.acquire().err().unwrap();
        assert!(matches!(err, ClientError::PoolTimeout(d) if d == wait));

        drop(held);
        assert!(pool.acquire().is_ok());
    }

    #[test]
    fn waiter_wakes_on_release() {
        let addr = spawn_server(r#"{"ok":true}"#);
        let pool = ConnectionPool::new(config(addr, 1, None)).unwrap();

        let held = pool.acquire().unwrap();
        let waiter = {
            let pool = pool.clone();
            thread::spawn(move || pool.acquire().map(drop))
        };
        thread::sleep(Duration::from_millis(50));
        drop(held);

        assert!(waiter.join().unwrap().is_ok());
        assert_eq!(pool.status().total, 1);
    }

    #[test]
    fn invalid_address_is_reported() {
        let err = ConnectionPool::new(config("not-an-addr".into(), 1, None)).err().unwrap();
        match err {
            ClientError::Connect { source, .. } => {
                assert!(matches!(*source, ClientError::InvalidAddress));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
