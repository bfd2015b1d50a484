//! # Connection Pool
//!
//! Purpose: Reuse TCP connections for the client so each operation pays for
//! one round-trip instead of a handshake.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Keep a bounded set of reusable connections.
//! 2. **Minimal Locking**: Hold the mutex only while moving connections or
//!    counters; dialing and closing sockets happen outside it.
//! 3. **Bounded Waits**: Exhaustion blocks on a condition variable until a
//!    slot frees or `pool_timeout` elapses, never indefinitely.
//! 4. **Background Bookkeeping**: One maintenance thread pre-warms
//!    `min_idle_conns` and drops idle or aged connections.
//!
//! ## Structure Overview
//!
//! ```text
//! ConnectionPool
//!   └── inner: Arc<PoolInner>
//!         ├── state: Mutex<PoolState { idle, total, closed }>
//!         ├── available: Condvar   (acquire waiters)
//!         ├── shutdown: Arc<Shutdown> (shared with the maintenance thread)
//!         └── maintenance: Mutex<Option<JoinHandle>>
//! ```

use std::io::{BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use kvlink_common::FailureCause;

use crate::config::StoreConfig;
use crate::resp::{encode_command, read_response, RespValue, WireResult};

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Connections owned by the pool, including ones being dialed.
    pub total: usize,
    /// Connections parked and ready for reuse.
    pub idle: usize,
    /// Connections checked out by callers.
    pub in_use: usize,
}

struct IdleConnection {
    conn: Connection,
    idle_since: Instant,
}

struct PoolState {
    // LIFO: the most recently returned connection is reused first, so the
    // tail of the stack is the one that goes stale.
    idle: Vec<IdleConnection>,
    total: usize,
    closed: bool,
}

struct PoolInner {
    config: StoreConfig,
    min_idle: usize,
    state: Mutex<PoolState>,
    available: Condvar,
    shutdown: Arc<Shutdown>,
    maintenance: Mutex<Option<JoinHandle<()>>>,
}

/// Stop signal for the maintenance thread.
///
/// Lives outside `PoolInner` so the thread can sleep on it without keeping
/// the pool alive.
#[derive(Default)]
struct Shutdown {
    stopped: Mutex<bool>,
    signal: Condvar,
}

impl Shutdown {
    fn stop(&self) {
        *self.stopped.lock() = true;
        self.signal.notify_all();
    }

    /// Sleeps up to `interval`; returns true once `stop` has been called.
    fn wait(&self, interval: Duration) -> bool {
        let mut stopped = self.stopped.lock();
        if !*stopped {
            self.signal.wait_for(&mut stopped, interval);
        }
        *stopped
    }
}

/// Connection pool handle. Clones share the same pool.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Creates the pool and starts its maintenance thread.
    ///
    /// No connection is dialed on the calling thread; warm-up happens in the
    /// background.
    pub fn new(config: StoreConfig) -> WireResult<Self> {
        let min_idle = config.effective_min_idle();
        let inner = Arc::new(PoolInner {
            state: Mutex::new(PoolState {
                idle: Vec::with_capacity(config.pool_size),
                total: 0,
                closed: false,
            }),
            available: Condvar::new(),
            shutdown: Arc::new(Shutdown::default()),
            maintenance: Mutex::new(None),
            min_idle,
            config,
        });

        let weak = Arc::downgrade(&inner);
        let handle = std::thread::Builder::new()
            .name("kvlink-pool".to_string())
            .spawn(move || run_maintenance(weak))?;
        *inner.maintenance.lock() = Some(handle);

        info!(
            addr = %inner.config.addr,
            pool_size = inner.config.pool_size,
            min_idle,
            "connection pool created"
        );
        Ok(ConnectionPool { inner })
    }

    /// Acquires a connection, waiting up to `pool_timeout` when exhausted.
    pub fn acquire(&self) -> WireResult<PooledConnection> {
        let timeout = self.inner.config.pool_timeout;
        // `None` when the timeout is too large to represent: wait without one.
        let deadline = Instant::now().checked_add(timeout);
        let mut stale = Vec::new();
        let mut state = self.inner.state.lock();

        loop {
            if state.closed {
                return Err(FailureCause::Closed);
            }

            let now = Instant::now();
            loop {
                let Some(idle) = state.idle.pop() else {
                    break;
                };
                if self.inner.is_stale(&idle, now) {
                    state.total = state.total.saturating_sub(1);
                    stale.push(idle.conn);
                    continue;
                }
                drop(state);
                discard(stale);
                return Ok(PooledConnection::new(self.inner.clone(), idle.conn));
            }

            if state.total < self.inner.config.pool_size {
                state.total += 1;
                drop(state);
                discard(stale);
                return match Connection::open(&self.inner.config) {
                    Ok(conn) => Ok(PooledConnection::new(self.inner.clone(), conn)),
                    Err(err) => {
                        self.inner.release_slot();
                        Err(err)
                    }
                };
            }

            let timed_out = match deadline {
                Some(deadline) => self
                    .inner
                    .available
                    .wait_until(&mut state, deadline)
                    .timed_out(),
                None => {
                    self.inner.available.wait(&mut state);
                    false
                }
            };
            if timed_out
                && !state.closed
                && state.idle.is_empty()
                && state.total >= self.inner.config.pool_size
            {
                drop(state);
                discard(stale);
                debug!(?timeout, "pool acquisition timed out");
                return Err(FailureCause::PoolTimeout(timeout));
            }
        }
    }

    /// Returns current pool counters.
    pub fn stats(&self) -> PoolStats {
        let state = self.inner.state.lock();
        PoolStats {
            total: state.total,
            idle: state.idle.len(),
            in_use: state.total.saturating_sub(state.idle.len()),
        }
    }

    /// Closes the pool: idle connections are dropped, waiters fail with
    /// `Closed`, and the maintenance thread is joined.
    ///
    /// Connections still checked out are dropped when their guard is.
    pub fn close(&self) -> WireResult<()> {
        let idle = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return Err(FailureCause::Closed);
            }
            state.closed = true;
            let idle = std::mem::take(&mut state.idle);
            state.total = state.total.saturating_sub(idle.len());
            idle
        };
        self.inner.available.notify_all();
        self.inner.shutdown.stop();

        let dropped = idle.len();
        discard(idle.into_iter().map(|idle| idle.conn).collect());

        if let Some(handle) = self.inner.maintenance.lock().take() {
            let _ = handle.join();
        }
        info!(addr = %self.inner.config.addr, dropped, "connection pool closed");
        Ok(())
    }

    /// Returns true once `close` has run.
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }
}

impl PoolInner {
    fn is_aged(&self, conn: &Connection, now: Instant) -> bool {
        let max_age = self.config.max_conn_age;
        !max_age.is_zero() && now.saturating_duration_since(conn.created_at) >= max_age
    }

    fn is_stale(&self, idle: &IdleConnection, now: Instant) -> bool {
        let idle_timeout = self.config.idle_timeout;
        let idle_expired =
            !idle_timeout.is_zero() && now.saturating_duration_since(idle.idle_since) >= idle_timeout;
        idle_expired || self.is_aged(&idle.conn, now)
    }

    fn release_slot(&self) {
        let mut state = self.state.lock();
        state.total = state.total.saturating_sub(1);
        drop(state);
        self.available.notify_one();
    }

    fn return_connection(&self, conn: Connection, valid: bool) {
        let now = Instant::now();
        let mut state = self.state.lock();
        if valid && !state.closed && !self.is_aged(&conn, now) {
            state.idle.push(IdleConnection {
                conn,
                idle_since: now,
            });
            drop(state);
            self.available.notify_one();
            return;
        }

        state.total = state.total.saturating_sub(1);
        drop(state);
        self.available.notify_one();
        debug!(valid, "discarded connection on release");
        drop(conn);
    }

    /// Drops idle connections past `idle_timeout` or `max_conn_age`.
    fn reap(&self) -> usize {
        let now = Instant::now();
        let stale: Vec<Connection> = {
            let mut state = self.state.lock();
            let (keep, stale): (Vec<_>, Vec<_>) = std::mem::take(&mut state.idle)
                .into_iter()
                .partition(|idle| !self.is_stale(idle, now));
            state.idle = keep;
            state.total = state.total.saturating_sub(stale.len());
            stale.into_iter().map(|idle| idle.conn).collect()
        };

        let reaped = stale.len();
        if reaped > 0 {
            self.available.notify_all();
            debug!(reaped, "reaped stale idle connections");
        }
        discard(stale);
        reaped
    }

    /// Dials until `min_idle` connections are parked or the pool is full.
    ///
    /// Stops at the first dial failure; the next pass tries again.
    fn fill_min_idle(&self) {
        loop {
            {
                let mut state = self.state.lock();
                if state.closed
                    || state.idle.len() >= self.min_idle
                    || state.total >= self.config.pool_size
                {
                    return;
                }
                state.total += 1;
            }

            match Connection::open(&self.config) {
                Ok(conn) => {
                    let mut state = self.state.lock();
                    if state.closed {
                        state.total = state.total.saturating_sub(1);
                        return;
                    }
                    state.idle.push(IdleConnection {
                        conn,
                        idle_since: Instant::now(),
                    });
                    drop(state);
                    self.available.notify_one();
                }
                Err(err) => {
                    self.release_slot();
                    warn!(addr = %self.config.addr, error = %err, "idle warm-up dial failed");
                    return;
                }
            }
        }
    }
}

impl Drop for PoolInner {
    fn drop(&mut self) {
        self.shutdown.stop();
    }
}

/// Maintenance loop: warm up, reap, then sleep until the next pass or close.
///
/// Holds only a weak reference between passes so dropping every client
/// handle without `close` still lets the pool go away.
fn run_maintenance(pool: Weak<PoolInner>) {
    loop {
        let Some(inner) = pool.upgrade() else {
            return;
        };

        inner.reap();
        inner.fill_min_idle();

        let interval = inner.config.idle_check_frequency;
        if inner.state.lock().closed || interval.is_zero() {
            return;
        }
        let shutdown = Arc::clone(&inner.shutdown);
        drop(inner);

        if shutdown.wait(interval) {
            return;
        }
    }
}

fn discard(conns: Vec<Connection>) {
    if !conns.is_empty() {
        debug!(count = conns.len(), "closing stale connections");
    }
    drop(conns);
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

    /// Executes a RESP command and returns the parsed reply.
    ///
    /// An IO or framing failure poisons the connection so it is closed
    /// instead of going back to the pool. Error replies do not.
    pub fn exec(&mut self, args: &[&[u8]]) -> WireResult<RespValue> {
        let Some(conn) = self.conn.as_mut() else {
            return Err(FailureCause::Closed);
        };
        let response = conn.exec(args);
        if response.is_err() {
            self.valid = false;
        }
        response
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.return_connection(conn, self.valid);
        }
    }
}

/// Single TCP connection with reusable buffers.
struct Connection {
    // Buffered reader reduces syscalls while still allowing direct writes.
    reader: BufReader<TcpStream>,
    line_buf: Vec<u8>,
    write_buf: Vec<u8>,
    created_at: Instant,
}

impl Connection {
    /// Dials the store and runs the `AUTH`/`SELECT` handshake.
    fn open(config: &StoreConfig) -> WireResult<Self> {
        let stream = connect_stream(&config.addr, config.connect_timeout)?;
        stream.set_read_timeout(config.read_timeout)?;
        stream.set_write_timeout(config.write_timeout)?;
        // Disable Nagle to keep request latency low for small payloads.
        stream.set_nodelay(true)?;

        let mut conn = Connection {
            reader: BufReader::new(stream),
            line_buf: Vec::with_capacity(128),
            write_buf: Vec::with_capacity(256),
            created_at: Instant::now(),
        };

        if let Some(password) = config.password.as_deref() {
            conn.expect_ok("AUTH", &[b"AUTH", password.as_bytes()])?;
        }
        if config.db != 0 {
            let db = config.db.to_string();
            conn.expect_ok("SELECT", &[b"SELECT", db.as_bytes()])?;
        }

        debug!(addr = %config.addr, db = config.db, "dialed connection");
        Ok(conn)
    }

    fn expect_ok(&mut self, command: &'static str, args: &[&[u8]]) -> WireResult<()> {
        match self.exec(args)? {
            RespValue::Simple(_) => Ok(()),
            RespValue::Error(message) => Err(FailureCause::Server(
                String::from_utf8_lossy(&message).into_owned(),
            )),
            _ => Err(FailureCause::UnexpectedResponse { command }),
        }
    }

    fn exec(&mut self, args: &[&[u8]]) -> WireResult<RespValue> {
        self.write_buf.clear();
        encode_command(args, &mut self.write_buf);

        let stream = self.reader.get_mut();
        stream.write_all(&self.write_buf)?;
        stream.flush()?;

        read_response(&mut self.reader, &mut self.line_buf)
    }
}

fn connect_stream(addr: &str, timeout: Option<Duration>) -> WireResult<TcpStream> {
    let addrs = addr
        .to_socket_addrs()
        .map_err(|_| FailureCause::InvalidAddress(addr.to_string()))?;

    let mut last_err = None;
    for socket_addr in addrs {
        let attempt = match timeout {
            Some(timeout) => TcpStream::connect_timeout(&socket_addr, timeout),
            None => TcpStream::connect(socket_addr),
        };
        match attempt {
            Ok(stream) => return Ok(stream),
            Err(err) => last_err = Some(err),
        }
    }

    Err(match last_err {
        Some(err) => FailureCause::Io(err),
        None => FailureCause::InvalidAddress(addr.to_string()),
    })
}
