//! Single-owner worker for sharing a dictionary session with async code.
//!
//! The session is blocking and needs `&mut self`, so it lives on a dedicated
//! thread. Callers talk to it through cloneable [`DictHandle`]s; requests are
//! served one at a time in arrival order, so a fetch can never interleave
//! with a set or delete.

use crate::dict::{FetchOutcome, SimpleDict};
use crate::error::{DictError, DictResult};
use sdict_protocol::{Cipher, RecordCodec, SimpleProtobuf, Tea};
use std::thread::JoinHandle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Maximum number of queued requests.
pub const REQUEST_QUEUE_DEPTH: usize = 64;

const THREAD_NAME: &str = "sdict-worker";

enum Request {
    Fetch {
        force: bool,
        reply: oneshot::Sender<DictResult<FetchOutcome>>,
    },
    Get {
        key: String,
        reply: oneshot::Sender<Option<String>>,
    },
    Set {
        key: String,
        value: String,
        reply: oneshot::Sender<DictResult<()>>,
    },
    Del {
        key: String,
        reply: oneshot::Sender<DictResult<()>>,
    },
    Keys {
        reply: oneshot::Sender<Vec<String>>,
    },
    LatestKeys {
        reply: oneshot::Sender<Vec<String>>,
    },
    Search {
        text: String,
        reply: oneshot::Sender<Vec<String>>,
    },
    Len {
        reply: oneshot::Sender<usize>,
    },
    Shutdown,
}

/// Owns the thread running a [`SimpleDict`].
pub struct DictWorker<C: Cipher + 'static = Tea, R: RecordCodec + 'static = SimpleProtobuf> {
    sender: mpsc::Sender<Request>,
    thread: JoinHandle<SimpleDict<C, R>>,
}

impl<C: Cipher + 'static, R: RecordCodec + 'static> DictWorker<C, R> {
    /// Moves `dict` onto a new worker thread.
    ///
    /// # Errors
    ///
    /// Returns [`DictError::WorkerUnavailable`] if the thread cannot be
    /// spawned.
    pub fn spawn(dict: SimpleDict<C, R>) -> DictResult<Self> {
        let (sender, receiver) = mpsc::channel(REQUEST_QUEUE_DEPTH);
        let thread = std::thread::Builder::new()
            .name(THREAD_NAME.into())
            .spawn(move || serve(dict, receiver))
            .map_err(|e| {
                warn!(error = %e, "failed to spawn dictionary worker");
                DictError::WorkerUnavailable
            })?;

        Ok(Self { sender, thread })
    }

    /// Returns a handle for sending requests.
    pub fn handle(&self) -> DictHandle {
        DictHandle {
            sender: self.sender.clone(),
        }
    }

    /// Stops the worker after the requests already queued and returns the
    /// session.
    ///
    /// Requests sent by other handles afterwards fail with
    /// [`DictError::WorkerUnavailable`].
    ///
    /// # Errors
    ///
    /// Returns [`DictError::WorkerUnavailable`] if the worker thread panicked.
    pub async fn shutdown(self) -> DictResult<SimpleDict<C, R>> {
        // A closed channel means the loop already ended; joining still works.
        let _ = self.sender.send(Request::Shutdown).await;

        let thread = self.thread;
        tokio::task::spawn_blocking(move || thread.join())
            .await
            .map_err(|_| DictError::WorkerUnavailable)?
            .map_err(|_| DictError::WorkerUnavailable)
    }
}

impl<C: Cipher + 'static, R: RecordCodec + 'static> std::fmt::Debug for DictWorker<C, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DictWorker")
            .field("thread", &self.thread.thread().name())
            .finish()
    }
}

fn serve<C: Cipher, R: RecordCodec>(
    mut dict: SimpleDict<C, R>,
    mut receiver: mpsc::Receiver<Request>,
) -> SimpleDict<C, R> {
    debug!("dictionary worker started");

    // Send errors mean the caller gave up waiting; the result is dropped.
    while let Some(request) = receiver.blocking_recv() {
        match request {
            Request::Fetch { force, reply } => {
                let _ = reply.send(dict.fetch(force));
            }
            Request::Get { key, reply } => {
                let _ = reply.send(dict.get(&key).map(str::to_owned));
            }
            Request::Set { key, value, reply } => {
                let _ = reply.send(dict.set(&key, &value));
            }
            Request::Del { key, reply } => {
                let _ = reply.send(dict.del(&key));
            }
            Request::Keys { reply } => {
                let _ = reply.send(dict.keys().map(str::to_owned).collect());
            }
            Request::LatestKeys { reply } => {
                let _ = reply.send(dict.latest_keys().to_vec());
            }
            Request::Search { text, reply } => {
                let _ = reply.send(dict.search(&text));
            }
            Request::Len { reply } => {
                let _ = reply.send(dict.len());
            }
            Request::Shutdown => break,
        }
    }

    debug!("dictionary worker stopped");
    dict
}

/// Cloneable async front end to a [`DictWorker`].
///
/// Every method fails with [`DictError::WorkerUnavailable`] once the worker
/// has stopped.
#[derive(Debug, Clone)]
pub struct DictHandle {
    sender: mpsc::Sender<Request>,
}

impl DictHandle {
    async fn call<T>(&self, request: impl FnOnce(oneshot::Sender<T>) -> Request) -> DictResult<T> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(request(reply))
            .await
            .map_err(|_| DictError::WorkerUnavailable)?;
        response.await.map_err(|_| DictError::WorkerUnavailable)
    }

    /// See [`SimpleDict::fetch`].
    pub async fn fetch(&self, force: bool) -> DictResult<FetchOutcome> {
        self.call(|reply| Request::Fetch { force, reply }).await?
    }

    /// See [`SimpleDict::get`].
    pub async fn get(&self, key: impl Into<String>) -> DictResult<Option<String>> {
        let key = key.into();
        self.call(|reply| Request::Get { key, reply }).await
    }

    /// See [`SimpleDict::set`].
    pub async fn set(&self, key: impl Into<String>, value: impl Into<String>) -> DictResult<()> {
        let (key, value) = (key.into(), value.into());
        self.call(|reply| Request::Set { key, value, reply }).await?
    }

    /// See [`SimpleDict::del`].
    pub async fn del(&self, key: impl Into<String>) -> DictResult<()> {
        let key = key.into();
        self.call(|reply| Request::Del { key, reply }).await?
    }

    /// See [`SimpleDict::keys`].
    pub async fn keys(&self) -> DictResult<Vec<String>> {
        self.call(|reply| Request::Keys { reply }).await
    }

    /// See [`SimpleDict::latest_keys`].
    pub async fn latest_keys(&self) -> DictResult<Vec<String>> {
        self.call(|reply| Request::LatestKeys { reply }).await
    }

    /// See [`SimpleDict::search`].
    pub async fn search(&self, text: impl Into<String>) -> DictResult<Vec<String>> {
        let text = text.into();
        self.call(|reply| Request::Search { text, reply }).await
    }

    /// See [`SimpleDict::len`].
    pub async fn len(&self) -> DictResult<usize> {
        self.call(|reply| Request::Len { reply }).await
    }
}
