//! In-process kanban server.

use parking_lot::Mutex;
use sdict_io::TransportConfig;
use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::debug;

/// Greeting sent before every reply.
pub const WELCOME: &[u8] = b"Welcome to simple kanban server.\n";

const SOCKET_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_REQUEST_LEN: usize = 1024;

/// Observable kanban server state.
#[derive(Debug, Default)]
pub struct KanbanState {
    /// Blob served by `cat`. Empty means `null`.
    pub blob: Vec<u8>,
    /// Messages served by `get<version>`.
    pub versions: HashMap<u32, String>,
    /// Requests received, refused connections included.
    pub requests: Vec<String>,
    /// Number of upcoming connections to drop without reading.
    pub refuse_next: u32,
}

/// A fake kanban server bound to a loopback port.
///
/// Stops when dropped.
pub struct FakeKanbanServer {
    addr: SocketAddr,
    state: Arc<Mutex<KanbanState>>,
    stopping: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl FakeKanbanServer {
    /// Starts a server. Requests with another password are dropped.
    pub fn start(password: &str, blob: Vec<u8>, versions: HashMap<u32, String>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind fake server");
        let addr = listener.local_addr().expect("Failed to read local address");

        let state = Arc::new(Mutex::new(KanbanState {
            blob,
            versions,
            ..KanbanState::default()
        }));
        let stopping = Arc::new(AtomicBool::new(false));

        let thread = {
            let state = Arc::clone(&state);
            let stopping = Arc::clone(&stopping);
            let password = password.to_owned();
            std::thread::spawn(move || {
                for stream in listener.incoming() {
                    if stopping.load(Ordering::SeqCst) {
                        break;
                    }
                    let Ok(stream) = stream else { continue };
                    if let Err(e) = serve(stream, &password, &state) {
                        debug!(error = %e, "kanban connection ended with error");
                    }
                }
            })
        };

        Self {
            addr,
            state,
            stopping,
            thread: Some(thread),
        }
    }

    /// Returns the bound port.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Transport settings pointing at this server, with short timeouts.
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig::new("127.0.0.1", self.port())
            .with_connect_timeout(Duration::from_secs(1))
            .with_read_timeout(Duration::from_secs(2))
            .with_connect_retries(0)
    }

    /// Locks the server state.
    pub fn state(&self) -> parking_lot::MutexGuard<'_, KanbanState> {
        self.state.lock()
    }

    /// Drops the next `count` connections right after accepting them.
    pub fn refuse_next(&self, count: u32) {
        self.state.lock().refuse_next = count;
    }
}

impl Drop for FakeKanbanServer {
    fn drop(&mut self) {
        self.stopping.store(true, Ordering::SeqCst);
        let _ = TcpStream::connect(self.addr);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl std::fmt::Debug for FakeKanbanServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeKanbanServer")
            .field("addr", &self.addr)
            .finish()
    }
}

fn serve(mut stream: TcpStream, password: &str, state: &Mutex<KanbanState>) -> io::Result<()> {
    {
        let mut state = state.lock();
        if state.refuse_next > 0 {
            state.refuse_next -= 1;
            state.requests.push(String::from("<refused>"));
            return Ok(());
        }
    }
    stream.set_read_timeout(Some(SOCKET_TIMEOUT))?;

    let mut request = Vec::new();
    let mut buf = [0u8; 256];
    while !request.ends_with(b"quit") && request.len() < MAX_REQUEST_LEN {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Ok(());
        }
        request.extend_from_slice(&buf[..n]);
    }
    let request = String::from_utf8_lossy(&request).into_owned();

    let reply = {
        let mut state = state.lock();
        state.requests.push(request.clone());
        let Some(command) = request
            .strip_prefix(password)
            .and_then(|r| r.strip_suffix("quit"))
        else {
            return Ok(());
        };

        let mut reply = WELCOME.to_vec();
        if command == "cat" {
            push_payload(&mut reply, &state.blob);
        } else if let Some(version) = command.strip_prefix("get") {
            reply.extend_from_slice(b"get");
            let message = version
                .parse::<u32>()
                .ok()
                .and_then(|v| state.versions.get(&v));
            push_payload(&mut reply, message.map_or(&[][..], |m| m.as_bytes()));
        } else {
            return Ok(());
        }
        reply
    };

    stream.write_all(&reply)
}

fn push_payload(reply: &mut Vec<u8>, payload: &[u8]) {
    if payload.is_empty() {
        reply.extend_from_slice(b"null");
    } else {
        let len = u32::try_from(payload.len()).expect("test payload fits in u32");
        reply.extend_from_slice(&len.to_le_bytes());
        reply.extend_from_slice(payload);
    }
}
