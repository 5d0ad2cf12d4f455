//! Blocking TCP transport.

use crate::config::TransportConfig;
use crate::progress::Progress;
use crate::queue::ByteQueue;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use tracing::{debug, warn};

/// Size of the scratch buffer used for each socket read.
pub const RECEIVE_BUFFER_SIZE: usize = 64 * 1024;

/// Connection state of a [`Transport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket is open.
    Disconnected,
    /// A connect attempt is in progress.
    Connecting,
    /// A socket is open and usable.
    Connected,
}

/// A blocking TCP client owning at most one connection at a time.
///
/// # Failure Model
///
/// No method returns an error. I/O failures are logged and turned into
/// `false` / `None`, so callers decide on retries.
///
/// # Buffering
///
/// Reads are accumulated in a [`ByteQueue`] so that a single socket read can
/// serve several logical frames. Bytes left in the queue are discarded when a
/// new connection is opened.
pub struct Transport {
    config: TransportConfig,
    stream: Option<TcpStream>,
    state: ConnectionState,
    buffer: ByteQueue,
    scratch: Box<[u8]>,
    progress: Option<Box<dyn Progress>>,
}

impl Transport {
    /// Creates a disconnected transport for the configured server.
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            stream: None,
            state: ConnectionState::Disconnected,
            buffer: ByteQueue::new(),
            scratch: vec![0u8; RECEIVE_BUFFER_SIZE].into_boxed_slice(),
            progress: None,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Returns the current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Returns true if a socket is open.
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Number of received bytes not yet handed out.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Installs a progress listener used by [`receive`](Self::receive).
    pub fn set_progress(&mut self, listener: impl Progress + 'static) {
        self.progress = Some(Box::new(listener));
    }

    /// Removes the progress listener.
    pub fn clear_progress(&mut self) {
        self.progress = None;
    }

    /// Opens a connection, retrying up to `connect_retries` times.
    ///
    /// Any previously open socket is dropped first, together with bytes still
    /// buffered from it.
    pub fn connect(&mut self) -> bool {
        self.stream = None;
        self.buffer.clear();
        self.state = ConnectionState::Connecting;

        let attempts = self.config.connect_attempts();
        for attempt in 1..=attempts {
            match self.open_stream() {
                Ok(stream) => {
                    self.stream = Some(stream);
                    self.state = ConnectionState::Connected;
                    debug!(
                        host = %self.config.host,
                        port = self.config.port,
                        attempt,
                        "connect server successful"
                    );
                    return true;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "connect server failed");
                }
            }
        }

        self.state = ConnectionState::Disconnected;
        warn!(attempts, "connect server failed after all attempts");
        false
    }

    fn open_stream(&self) -> io::Result<TcpStream> {
        let addrs = (self.config.host.as_str(), self.config.port).to_socket_addrs()?;

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.config.connect_timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(self.config.read_timeout))?;
                    stream.set_nodelay(true)?;
                    return Ok(stream);
                }
                Err(e) => last_error = Some(e),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "host resolved to no address")
        }))
    }

    /// Writes and flushes `message`.
    ///
    /// A `None` message is skipped on purpose: nothing is written and `false`
    /// is returned.
    pub fn send(&mut self, message: Option<&[u8]>) -> bool {
        let Some(stream) = self.stream.as_mut() else {
            debug!("send message failed: no connect");
            return false;
        };
        let Some(message) = message else {
            debug!("skip empty message");
            return false;
        };

        match stream.write_all(message).and_then(|()| stream.flush()) {
            Ok(()) => {
                debug!(msg = %hex::encode(message), "send msg");
                true
            }
            Err(e) => {
                warn!(error = %e, "send message failed");
                false
            }
        }
    }

    /// Reads a single byte, serving buffered bytes first.
    ///
    /// Returns `None` at end of stream, on error, or when disconnected.
    pub fn read_byte(&mut self) -> Option<u8> {
        if let Some(byte) = self.buffer.pop_front() {
            return Some(byte);
        }
        let stream = self.stream.as_mut()?;

        let mut byte = [0u8; 1];
        loop {
            match stream.read(&mut byte) {
                Ok(0) => return None,
                Ok(_) => return Some(byte[0]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(error = %e, "read byte failed");
                    return None;
                }
            }
        }
    }

    /// Receives exactly `total` bytes, or everything buffered when `total`
    /// is zero.
    ///
    /// If `total` equals the number of bytes already buffered they are
    /// returned without touching the socket. Otherwise socket reads are
    /// accumulated until at least `total` bytes are buffered; any surplus
    /// stays queued for the next call.
    ///
    /// With `report_progress`, the installed listener receives the buffered
    /// percentage each time it changes.
    ///
    /// Returns `None` if the peer closes the connection, the read times out,
    /// or an I/O error occurs. Partial data stays buffered.
    pub fn receive(&mut self, total: usize, report_progress: bool) -> Option<Vec<u8>> {
        if total == self.buffer.len() {
            return Some(self.buffer.drain());
        }
        let Some(stream) = self.stream.as_mut() else {
            debug!("no connect to receive message");
            return None;
        };

        let mut previous = 0u32;
        while total > self.buffer.len() {
            match stream.read(&mut self.scratch) {
                Ok(0) => {
                    warn!(
                        expected = total,
                        buffered = self.buffer.len(),
                        "connection closed before message was complete"
                    );
                    return None;
                }
                Ok(count) => {
                    self.buffer.enqueue(&self.scratch[..count]);
                    debug!(count, "reply length");

                    if report_progress && total > 0 {
                        let current = percentage(self.buffer.len(), total);
                        if current != previous {
                            if let Some(listener) = self.progress.as_mut() {
                                listener.notify(current);
                            }
                            previous = current;
                        }
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                    std::thread::sleep(self.config.poll_interval);
                }
                Err(e) => {
                    warn!(error = %e, expected = total, "receive message failed");
                    return None;
                }
            }
        }

        if total == 0 {
            Some(self.buffer.drain())
        } else {
            self.buffer.dequeue(total)
        }
    }

    /// Receives `total` bytes and decodes them as UTF-8, replacing invalid
    /// sequences.
    pub fn receive_string(&mut self, total: usize) -> Option<String> {
        self.receive(total, false)
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Closes the connection.
    ///
    /// Returns `true` if there was nothing to close.
    pub fn close(&mut self) -> bool {
        self.state = ConnectionState::Disconnected;
        let Some(stream) = self.stream.take() else {
            return true;
        };

        match stream.shutdown(Shutdown::Both) {
            Ok(()) => true,
            Err(e) if e.kind() == io::ErrorKind::NotConnected => true,
            Err(e) => {
                warn!(error = %e, "close connection failed");
                false
            }
        }
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("buffered", &self.buffer.len())
            .field("has_progress", &self.progress.is_some())
            .finish()
    }
}

fn percentage(buffered: usize, total: usize) -> u32 {
    let pct = (buffered as u64).saturating_mul(100) / total as u64;
    pct.min(100) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::Duration;

    /// Starts a one-shot server that writes `chunks` with a pause between
    /// each, then reads until the client hangs up.
    fn serve_chunks(chunks: Vec<Vec<u8>>) -> (u16, thread::JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            for chunk in chunks {
                socket.write_all(&chunk).unwrap();
                socket.flush().unwrap();
                thread::sleep(Duration::from_millis(20));
            }
            let mut received = Vec::new();
            let _ = socket.read_to_end(&mut received);
            received
        });
        (port, handle)
    }

    fn transport_for(port: u16) -> Transport {
        Transport::new(
            TransportConfig::new("127.0.0.1", port)
                .with_read_timeout(Duration::from_secs(2))
                .with_connect_retries(0),
        )
    }

    #[test]
    fn percentage_is_clamped() {
        assert_eq!(percentage(0, 10), 0);
        assert_eq!(percentage(5, 10), 50);
        assert_eq!(percentage(30, 10), 100);
    }

    #[test]
    fn connect_refused_returns_false() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let mut transport = transport_for(port);

        assert!(!transport.connect());
        assert_eq!(transport.state(), ConnectionState::Disconnected);
        assert!(!transport.is_connected());
    }

    #[test]
    fn operations_while_disconnected() {
        let mut transport = transport_for(1);

        assert!(!transport.send(Some(b"hello")));
        assert_eq!(transport.read_byte(), None);
        assert_eq!(transport.receive(4, false), None);
        assert!(transport.close());
    }

    #[test]
    fn receive_splits_one_read_across_frames() {
        let (port, server) = serve_chunks(vec![b"abcdefgh".to_vec()]);
        let mut transport = transport_for(port);
        assert!(transport.connect());

        assert_eq!(transport.receive(3, false), Some(b"abc".to_vec()));
        // Remaining five bytes are served from the buffer.
        assert_eq!(transport.buffered(), 5);
        assert_eq!(transport.receive(5, false), Some(b"defgh".to_vec()));

        assert!(transport.close());
        server.join().unwrap();
    }

    #[test]
    fn receive_accumulates_chunks_and_reports_progress() {
        let (port, server) = serve_chunks(vec![vec![1u8; 25], vec![2u8; 25], vec![3u8; 50]]);
        let mut transport = transport_for(port);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        transport.set_progress(move |p| sink.lock().unwrap().push(p));

        assert!(transport.connect());
        let data = transport.receive(100, true).unwrap();
        assert_eq!(data.len(), 100);
        assert_eq!(data[0], 1);
        assert_eq!(data[99], 3);

        let seen = seen.lock().unwrap().clone();
        assert!(!seen.is_empty());
        assert_eq!(*seen.last().unwrap(), 100);
        // Strictly increasing: no duplicate notifications.
        assert!(seen.windows(2).all(|w| w[0] < w[1]));

        transport.close();
        server.join().unwrap();
    }

    #[test]
    fn receive_zero_drains_buffer() {
        let (port, server) = serve_chunks(vec![b"xyz".to_vec()]);
        let mut transport = transport_for(port);
        assert!(transport.connect());

        assert_eq!(transport.receive(1, false), Some(b"x".to_vec()));
        assert_eq!(transport.receive(0, false), Some(b"yz".to_vec()));

        transport.close();
        server.join().unwrap();
    }

    #[test]
    fn receive_fails_when_peer_closes_early() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            socket.write_all(b"short").unwrap();
        });

        let mut transport = transport_for(port);
        assert!(transport.connect());
        server.join().unwrap();

        assert_eq!(transport.receive(64, false), None);
        assert_eq!(transport.buffered(), 5);

        // Close keeps partial data; only a new connect discards it.
        transport.close();
        assert_eq!(transport.buffered(), 5);
    }

    #[test]
    fn read_byte_prefers_buffer() {
        let (port, server) = serve_chunks(vec![b"42$payload".to_vec()]);
        let mut transport = transport_for(port);
        assert!(transport.connect());

        assert_eq!(transport.receive(1, false), Some(b"4".to_vec()));
        assert_eq!(transport.read_byte(), Some(b'2'));
        assert_eq!(transport.read_byte(), Some(b'$'));
        assert_eq!(transport.receive_string(7).as_deref(), Some("payload"));

        transport.close();
        server.join().unwrap();
    }

    #[test]
    fn send_reaches_server_and_none_is_skipped() {
        let (port, server) = serve_chunks(vec![]);
        let mut transport = transport_for(port);
        assert!(transport.connect());

        assert!(!transport.send(None));
        assert!(transport.send(Some(b"ping")));
        assert!(transport.close());
        assert!(transport.close());

        assert_eq!(server.join().unwrap(), b"ping".to_vec());
    }
}
