//! In-process dictionary server speaking the encrypted command protocol.
//!
//! Connections are served one at a time on a background thread. Each
//! connection starts at sequence 0; every packet received and every reply
//! sent advances the server's counter, mirroring the client.

use parking_lot::Mutex;
use sdict_io::TransportConfig;
use sdict_protocol::{Cipher, CmdPacket, Command, Record, RecordCodec, SimpleProtobuf, Tea, HEADER_LEN};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::debug;

/// Read timeout applied to accepted sockets.
const SOCKET_TIMEOUT: Duration = Duration::from_secs(5);

/// Observable server state.
#[derive(Debug, Default)]
pub struct ServerState {
    /// Stored records, in insertion order. Duplicates are allowed.
    pub records: Vec<Record>,
    /// Connections accepted, refused ones included.
    pub connections: u32,
    /// CAT commands served.
    pub cat_requests: u32,
    /// MD5 commands served.
    pub md5_requests: u32,
    /// Raw keys removed by DEL, in order.
    pub deleted_keys: Vec<Vec<u8>>,
    /// Number of upcoming connections to drop without reading.
    pub refuse_next: u32,
    /// Send an undecryptable blob for the next CAT.
    pub corrupt_next_cat: bool,
}

impl ServerState {
    /// Encodes the stored records.
    pub fn blob(&self) -> Vec<u8> {
        SimpleProtobuf
            .encode(&self.records)
            .expect("test records must encode")
    }

    /// Returns the last value stored under `key`.
    pub fn value(&self, key: &str) -> Option<String> {
        self.records
            .iter()
            .rev()
            .find(|r| r.key == key.as_bytes())
            .map(|r| String::from_utf8_lossy(&r.value).into_owned())
    }
}

struct Keys {
    read: Tea,
    write: Option<Tea>,
}

/// A fake SimpleDict server bound to a loopback port.
///
/// Stops when dropped.
pub struct FakeDictServer {
    addr: SocketAddr,
    state: Arc<Mutex<ServerState>>,
    stopping: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl FakeDictServer {
    /// Starts a server holding `records`.
    ///
    /// Without `set_password` every DEL, SET and DAT is answered with `erro`.
    pub fn start(password: &str, set_password: Option<&str>, records: Vec<Record>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind fake server");
        let addr = listener.local_addr().expect("Failed to read local address");

        let state = Arc::new(Mutex::new(ServerState {
            records,
            ..ServerState::default()
        }));
        let stopping = Arc::new(AtomicBool::new(false));
        let keys = Keys {
            read: Tea::from_password(password.as_bytes()),
            write: set_password.map(|p| Tea::from_password(p.as_bytes())),
        };

        let thread = {
            let state = Arc::clone(&state);
            let stopping = Arc::clone(&stopping);
            std::thread::spawn(move || accept_loop(&listener, &keys, &state, &stopping))
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

    /// Locks the server state for inspection or modification.
    pub fn state(&self) -> parking_lot::MutexGuard<'_, ServerState> {
        self.state.lock()
    }

    /// Drops the next `count` connections right after accepting them.
    pub fn refuse_next(&self, count: u32) {
        self.state.lock().refuse_next = count;
    }

    /// Makes the next CAT reply undecryptable.
    pub fn corrupt_next_cat(&self) {
        self.state.lock().corrupt_next_cat = true;
    }
}

impl Drop for FakeDictServer {
    fn drop(&mut self) {
        self.stopping.store(true, Ordering::SeqCst);
        // Wake the accept loop.
        let _ = TcpStream::connect(self.addr);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl std::fmt::Debug for FakeDictServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeDictServer")
            .field("addr", &self.addr)
            .finish()
    }
}

fn accept_loop(
    listener: &TcpListener,
    keys: &Keys,
    state: &Mutex<ServerState>,
    stopping: &AtomicBool,
) {
    for stream in listener.incoming() {
        if stopping.load(Ordering::SeqCst) {
            break;
        }
        let Ok(stream) = stream else { continue };

        let refused = {
            let mut state = state.lock();
            state.connections += 1;
            if state.refuse_next > 0 {
                state.refuse_next -= 1;
                true
            } else {
                false
            }
        };
        if refused {
            debug!("refusing connection");
            continue;
        }

        if let Err(e) = serve(stream, keys, state) {
            debug!(error = %e, "connection ended with error");
        }
    }
}

fn serve(mut stream: TcpStream, keys: &Keys, state: &Mutex<ServerState>) -> io::Result<()> {
    stream.set_read_timeout(Some(SOCKET_TIMEOUT))?;
    let mut seq = 0u8;
    let mut pending_key: Option<Vec<u8>> = None;

    loop {
        let mut raw = vec![0u8; HEADER_LEN];
        if stream.read_exact(&mut raw).is_err() {
            return Ok(());
        }
        let mut body = vec![0u8; usize::from(raw[1])];
        stream.read_exact(&mut body)?;
        raw.extend_from_slice(&body);

        let Ok(packet) = CmdPacket::parse(&raw) else {
            return Ok(());
        };
        let command = packet.command();
        if command == Command::End {
            return Ok(());
        }

        let key = match command {
            Command::Del | Command::Set | Command::Dat => keys.write.as_ref(),
            _ => Some(&keys.read),
        };
        let payload = key.and_then(|k| packet.open(k, seq));
        seq = seq.wrapping_add(1);

        let Some(payload) = payload else {
            ack(&mut stream, &keys.read, &mut seq, "erro")?;
            continue;
        };

        match command {
            Command::Md5 => {
                let changed = {
                    let mut state = state.lock();
                    state.md5_requests += 1;
                    let digest: [u8; 16] = md5_of(&state.blob());
                    payload != digest
                };
                ack(&mut stream, &keys.read, &mut seq, if changed { "nequ" } else { "equ" })?;
            }
            Command::Cat => {
                let (blob, corrupt) = {
                    let mut state = state.lock();
                    state.cat_requests += 1;
                    (state.blob(), std::mem::take(&mut state.corrupt_next_cat))
                };
                let mut data = keys.read.encrypt(&blob, seq);
                seq = seq.wrapping_add(1);
                if corrupt {
                    data.pop();
                }
                let mut reply = format!("{}$", data.len()).into_bytes();
                reply.extend_from_slice(&data);
                stream.write_all(&reply)?;
            }
            Command::Del => {
                let removed = {
                    let mut state = state.lock();
                    match state.records.iter().position(|r| r.key == payload) {
                        Some(index) => {
                            state.records.remove(index);
                            state.deleted_keys.push(payload);
                            true
                        }
                        None => false,
                    }
                };
                ack(&mut stream, &keys.read, &mut seq, if removed { "succ" } else { "null" })?;
            }
            Command::Set => {
                pending_key = Some(payload);
                ack(&mut stream, &keys.read, &mut seq, "data")?;
            }
            Command::Dat => match pending_key.take() {
                Some(key) => {
                    state.lock().records.push(Record { key, value: payload });
                    ack(&mut stream, &keys.read, &mut seq, "succ")?;
                }
                None => ack(&mut stream, &keys.read, &mut seq, "erro")?,
            },
            _ => ack(&mut stream, &keys.read, &mut seq, "erro")?,
        }
    }
}

fn ack(stream: &mut TcpStream, key: &Tea, seq: &mut u8, text: &str) -> io::Result<()> {
    let packet = CmdPacket::encode(Command::Ack, text.as_bytes(), key, *seq)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
    *seq = seq.wrapping_add(1);
    stream.write_all(&packet)
}

fn md5_of(data: &[u8]) -> [u8; 16] {
    use md5::{Digest, Md5};
    Md5::digest(data).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_blob_and_value() {
        let state = ServerState {
            records: vec![Record::new("a", "1"), Record::new("a", "2")],
            ..ServerState::default()
        };
        assert_eq!(state.value("a").as_deref(), Some("2"));
        assert_eq!(state.value("b"), None);
        assert_eq!(
            SimpleProtobuf.decode(&state.blob()).unwrap(),
            state.records
        );
    }

    #[test]
    fn refused_connections_are_counted() {
        let server = FakeDictServer::start("pw", None, Vec::new());
        server.refuse_next(1);

        let mut stream = TcpStream::connect(("127.0.0.1", server.port())).unwrap();
        let mut buf = [0u8; 1];
        stream
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        assert!(matches!(stream.read(&mut buf), Ok(0) | Err(_)));

        assert_eq!(server.state().connections, 1);
        assert_eq!(server.state().refuse_next, 0);
    }
}
