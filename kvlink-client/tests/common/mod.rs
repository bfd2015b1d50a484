#![allow(dead_code)]

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use kvlink_client::{
    FailureCause, KeyValueStore, StoreClient, StoreConfig, StoreError, TtlStatus,
};
use kvlink_memory::MemoryStore;
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Client config for tests: no background warm-up, short timeouts.
pub fn test_config(addr: impl Into<String>) -> StoreConfig {
    let mut config = StoreConfig::with_addr(addr);
    config.pool_size = 4;
    config.min_idle_conns = 0;
    config.pool_timeout = Duration::from_secs(1);
    config.connect_timeout = Some(Duration::from_secs(1));
    config.read_timeout = Some(Duration::from_secs(2));
    config.write_timeout = Some(Duration::from_secs(2));
    config
}

pub fn client_for(addr: impl Into<String>) -> StoreClient {
    init_tracing();
    StoreClient::connect(test_config(addr)).expect("client")
}

/// Polls `check` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    check()
}

/// Redis-compatible test server backed by a `MemoryStore`.
///
/// Accepts any number of connections, one thread each, and records every
/// command it receives.
pub struct TestServer {
    pub addr: String,
    pub store: Arc<MemoryStore>,
    accepted: Arc<AtomicUsize>,
    commands: Arc<Mutex<Vec<Vec<String>>>>,
}

impl TestServer {
    pub fn start() -> Self {
        Self::start_with_password(None)
    }

    pub fn start_with_password(password: Option<&str>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr").to_string();
        let store = Arc::new(MemoryStore::new());
        let accepted = Arc::new(AtomicUsize::new(0));
        let commands = Arc::new(Mutex::new(Vec::new()));
        let password = password.map(str::to_string);

        let server_store = Arc::clone(&store);
        let server_accepted = Arc::clone(&accepted);
        let server_commands = Arc::clone(&commands);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                server_accepted.fetch_add(1, Ordering::SeqCst);
                let store = Arc::clone(&server_store);
                let commands = Arc::clone(&server_commands);
                let password = password.clone();
                thread::spawn(move || serve_connection(stream, store, commands, password));
            }
        });

        TestServer {
            addr,
            store,
            accepted,
            commands,
        }
    }

    /// Connections accepted so far.
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Every command received, as text, in arrival order.
    pub fn commands(&self) -> Vec<Vec<String>> {
        self.commands.lock().expect("commands").clone()
    }
}

fn serve_connection(
    stream: TcpStream,
    store: Arc<MemoryStore>,
    commands: Arc<Mutex<Vec<Vec<String>>>>,
    password: Option<String>,
) {
    let mut writer = stream.try_clone().expect("clone");
    let mut reader = BufReader::new(stream);
    let mut authenticated = password.is_none();

    while let Ok(Some(args)) = read_command(&mut reader) {
        let text: Vec<String> = args
            .iter()
            .map(|arg| String::from_utf8_lossy(arg).into_owned())
            .collect();
        if text.is_empty() {
            continue;
        }
        commands.lock().expect("commands").push(text.clone());

        let response = if text[0].eq_ignore_ascii_case("AUTH") {
            if password.as_deref() == text.get(1).map(String::as_str) {
                authenticated = true;
                resp_simple("OK")
            } else {
                resp_raw_error("WRONGPASS invalid username-password pair")
            }
        } else if !authenticated {
            resp_raw_error("NOAUTH Authentication required.")
        } else {
            dispatch(&text, &store)
        };

        if writer.write_all(&response).is_err() {
            break;
        }
    }
}

fn dispatch(args: &[String], store: &MemoryStore) -> Vec<u8> {
    let cmd = args[0].to_ascii_uppercase();
    match (cmd.as_str(), args.len()) {
        ("PING", 1) => resp_simple("PONG"),
        ("SELECT", 2) => match args[1].parse::<u32>() {
            Ok(_) => resp_simple("OK"),
            Err(_) => resp_error("invalid DB index"),
        },
        ("SET", 3) => {
            store.set(&args[1], &args[2]).expect("set");
            resp_simple("OK")
        }
        ("SET", 5) if args[3].eq_ignore_ascii_case("EX") => match args[4].parse::<u64>() {
            Ok(0) => resp_error("invalid expire time in 'set' command"),
            Ok(seconds) => match store.set_with_ttl(&args[1], &args[2], seconds) {
                Ok(()) => resp_simple("OK"),
                Err(err) => resp_store_error(err),
            },
            Err(_) => resp_error("value is not an integer or out of range"),
        },
        ("GET", 2) => match store.get(&args[1]) {
            Ok(value) => resp_bulk(value.as_bytes()),
            Err(_) => resp_null(),
        },
        ("DEL", n) if n >= 2 => {
            let removed = args[1..]
                .iter()
                .filter(|key| store.delete(key).expect("del"))
                .count();
            resp_integer(removed as i64)
        }
        ("EXISTS", n) if n >= 2 => {
            let present = args[1..]
                .iter()
                .filter(|key| store.exists(key).expect("exists"))
                .count();
            resp_integer(present as i64)
        }
        ("TTL", 2) => match store.ttl(&args[1]).expect("ttl") {
            // Round to the nearest second the way the server does.
            TtlStatus::ExpiresIn(remaining) => {
                resp_integer(((remaining.as_millis() + 500) / 1000) as i64)
            }
            other => resp_integer(other.as_reply()),
        },
        ("EXPIRE", 3) => match args[2].parse::<u64>() {
            Ok(seconds) => match store.expire(&args[1], seconds) {
                Ok(updated) => resp_integer(updated as i64),
                Err(err) => resp_store_error(err),
            },
            Err(_) => resp_error("value is not an integer or out of range"),
        },
        ("KEYS", 2) => resp_bulk_array(&store.keys(&args[1]).expect("keys")),
        ("SCAN", n) if n >= 2 => scan(args, store),
        _ => resp_error(&format!("unknown command '{}'", args[0])),
    }
}

fn scan(args: &[String], store: &MemoryStore) -> Vec<u8> {
    let Ok(cursor) = args[1].parse::<u64>() else {
        return resp_error("invalid cursor");
    };
    let mut pattern = "*".to_string();
    let mut count = 10usize;
    let mut idx = 2;
    while idx + 1 < args.len() {
        match args[idx].to_ascii_uppercase().as_str() {
            "MATCH" => pattern = args[idx + 1].clone(),
            "COUNT" => match args[idx + 1].parse::<i64>() {
                Ok(value) if value < 1 => return resp_error("syntax error"),
                Ok(value) => count = value as usize,
                Err(_) => return resp_error("value is not an integer or out of range"),
            },
            _ => return resp_error("syntax error"),
        }
        idx += 2;
    }

    let page = store.scan(cursor, &pattern, count).expect("scan");
    let mut buf = b"*2\r\n".to_vec();
    buf.extend_from_slice(&resp_bulk(page.cursor.to_string().as_bytes()));
    buf.extend_from_slice(&resp_bulk_array(&page.keys));
    buf
}

/// Accepts a single connection and hands each command to `handler` with
/// its index. Used for replies the in-memory server never produces.
pub fn spawn_scripted<F>(handler: F) -> String
where
    F: Fn(usize, Vec<Vec<u8>>, &mut TcpStream) + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr").to_string();

    thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
        let mut reader = BufReader::new(stream.try_clone().expect("clone"));
        let mut idx = 0;
        while let Ok(Some(args)) = read_command(&mut reader) {
            handler(idx, args, &mut stream);
            idx += 1;
        }
    });

    addr
}

/// Returns an address nothing is listening on.
pub fn closed_port_addr() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr").to_string();
    drop(listener);
    addr
}

fn read_command<R: BufRead>(reader: &mut R) -> std::io::Result<Option<Vec<Vec<u8>>>> {
    let mut line = Vec::new();
    if !read_line(reader, &mut line)? {
        return Ok(None);
    }
    if line.first() != Some(&b'*') {
        return Err(invalid("expected array"));
    }
    let count = parse_usize(&line[1..])?;
    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        if !read_line(reader, &mut line)? {
            return Ok(None);
        }
        if line.first() != Some(&b'$') {
            return Err(invalid("expected bulk"));
        }
        let len = parse_usize(&line[1..])?;
        let mut data = vec![0u8; len];
        reader.read_exact(&mut data)?;
        let mut crlf = [0u8; 2];
        reader.read_exact(&mut crlf)?;
        if crlf != *b"\r\n" {
            return Err(invalid("missing crlf"));
        }
        args.push(data);
    }
    Ok(Some(args))
}

fn read_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<bool> {
    buf.clear();
    if reader.read_until(b'\n', buf)? == 0 {
        return Ok(false);
    }
    if !buf.ends_with(b"\r\n") {
        return Err(invalid("invalid line"));
    }
    buf.truncate(buf.len() - 2);
    Ok(true)
}

fn parse_usize(data: &[u8]) -> std::io::Result<usize> {
    std::str::from_utf8(data)
        .ok()
        .and_then(|text| text.parse().ok())
        .ok_or_else(|| invalid("bad length"))
}

fn invalid(message: &str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, message.to_string())
}

pub fn resp_simple(message: &str) -> Vec<u8> {
    format!("+{message}\r\n").into_bytes()
}

pub fn resp_error(message: &str) -> Vec<u8> {
    format!("-ERR {message}\r\n").into_bytes()
}

pub fn resp_raw_error(message: &str) -> Vec<u8> {
    format!("-{message}\r\n").into_bytes()
}

/// Replies with a store failure; a `Server` cause already carries its prefix.
fn resp_store_error(err: StoreError) -> Vec<u8> {
    match err {
        StoreError::Failed(FailureCause::Server(message)) => resp_raw_error(&message),
        other => resp_error(&other.to_string()),
    }
}

pub fn resp_integer(value: i64) -> Vec<u8> {
    format!(":{value}\r\n").into_bytes()
}

pub fn resp_bulk(data: &[u8]) -> Vec<u8> {
    let mut buf = format!("${}\r\n", data.len()).into_bytes();
    buf.extend_from_slice(data);
    buf.extend_from_slice(b"\r\n");
    buf
}

pub fn resp_null() -> Vec<u8> {
    b"$-1\r\n".to_vec()
}

pub fn resp_bulk_array(items: &[String]) -> Vec<u8> {
    let mut buf = format!("*{}\r\n", items.len()).into_bytes();
    for item in items {
        buf.extend_from_slice(&resp_bulk(item.as_bytes()));
    }
    buf
}

pub fn write_reply(stream: &mut TcpStream, reply: &[u8]) {
    let _ = stream.write_all(reply);
    let _ = stream.flush();
}
