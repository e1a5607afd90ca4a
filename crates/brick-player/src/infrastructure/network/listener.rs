//! RemoteEventListener: TCP accept loop for remote controller events.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Accepting connections until [`RemoteEventListener::stop`] is called.
//!    Each connection is served by its own Tokio task.
//! 3. Reading the request head and handing the request path to the single
//!    *decoder task*, which owns the [`SequenceFilter`].
//! 4. Publishing each decoded batch to the event multiplexer and writing the
//!    response (echo or control page) back to the client.
//!
//! ```text
//! client ─► connection task ──path──► decoder task ──batch──► multiplexer
//!                 ▲                        │
//!                 └──────── response ──────┘
//! ```
//!
//! Decoding is serialised on the decoder task, so the per-key sequence table
//! needs no lock.  Writing the response happens back on the connection task,
//! so responses to different clients may complete in any order.
//!
//! A failure while serving one client becomes a `500` for that client only;
//! it never stops the accept loop.

use std::net::SocketAddr;
use std::time::Duration;

use brick_core::protocol::http::{
    find_head_end, parse_request_head, HttpError, HttpResponse, MAX_HEAD_BYTES,
};
use brick_core::{decode_request_path, DecodedRequest, SequenceFilter};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::application::multiplexer::EventSource;

/// How long a client may take to send its request head.
const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// How long to keep reading after answering an oversized request, so the
/// unread remainder does not turn the close into a reset.
const LINGER: Duration = Duration::from_secs(1);

/// Capacity of the connection → decoder queue.
const DECODE_QUEUE_CAPACITY: usize = 64;

/// Error type for listener lifecycle operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to bind remote event listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("remote event listener is already running on {0}")]
    AlreadyRunning(SocketAddr),
}

/// One request path waiting to be decoded.
struct DecodeJob {
    path: String,
    reply: oneshot::Sender<HttpResponse>,
}

struct Running {
    local_addr: SocketAddr,
    cancel: CancellationToken,
    accept_task: JoinHandle<()>,
    decoder_task: JoinHandle<()>,
}

/// Serves the remote event protocol over TCP.
pub struct RemoteEventListener {
    source: EventSource,
    running: Option<Running>,
}

impl RemoteEventListener {
    /// Creates a stopped listener that will publish to `source`.
    pub fn new(source: EventSource) -> Self {
        Self {
            source,
            running: None,
        }
    }

    /// Binds `addr` and starts accepting connections.  Returns the bound
    /// address, which differs from `addr` when port `0` was requested.
    ///
    /// Every start uses a fresh sequence table.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::AlreadyRunning`] when started twice and
    /// [`ListenerError::Bind`] when the address cannot be bound.
    pub async fn start(&mut self, addr: SocketAddr) -> Result<SocketAddr, ListenerError> {
        if let Some(running) = &self.running {
            return Err(ListenerError::AlreadyRunning(running.local_addr));
        }

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ListenerError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ListenerError::Bind { addr, source })?;

        let cancel = CancellationToken::new();
        let (jobs_tx, jobs_rx) = mpsc::channel(DECODE_QUEUE_CAPACITY);

        let decoder_task =
            tokio::spawn(run_decoder(jobs_rx, self.source.clone(), cancel.clone()));
        let accept_task = tokio::spawn(run_accept_loop(listener, jobs_tx, cancel.clone()));

        info!("remote event listener on http://{local_addr}/");
        self.running = Some(Running {
            local_addr,
            cancel,
            accept_task,
            decoder_task,
        });
        Ok(local_addr)
    }

    /// The bound address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.local_addr)
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Stops accepting connections, ends the decoder task, and discards the
    /// sequence table.  Stopping a stopped listener is a no-op.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        running.cancel.cancel();
        for (name, task) in [
            ("accept loop", running.accept_task),
            ("decoder", running.decoder_task),
        ] {
            if let Err(e) = task.await {
                warn!("remote listener {name} ended abnormally: {e}");
            }
        }
        info!("remote event listener on {} stopped", running.local_addr);
    }
}

impl Drop for RemoteEventListener {
    fn drop(&mut self) {
        if let Some(running) = &self.running {
            running.cancel.cancel();
        }
    }
}

// ── Accept loop ───────────────────────────────────────────────────────────────

async fn run_accept_loop(
    listener: TcpListener,
    jobs: mpsc::Sender<DecodeJob>,
    cancel: CancellationToken,
) {
    loop {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("stopping accept loop");
                break;
            }
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer_addr)) => {
                debug!("remote connection from {peer_addr}");
                let jobs = jobs.clone();
                tokio::spawn(async move {
                    if let Err(e) = serve_connection(stream, jobs).await {
                        debug!("connection {peer_addr} closed with error: {e}");
                    }
                });
            }
            Err(e) => {
                // Transient accept error (e.g. too many open file descriptors).
                error!("accept error: {e}");
            }
        }
    }
}

// ── Per-connection handler ────────────────────────────────────────────────────

async fn serve_connection(
    mut stream: TcpStream,
    jobs: mpsc::Sender<DecodeJob>,
) -> std::io::Result<()> {
    let head = match timeout(READ_TIMEOUT, read_request_head(&mut stream)).await {
        Ok(head) => head?,
        Err(_) => {
            debug!("client did not send a request head in time");
            return Ok(());
        }
    };

    let (response, unread_input) = match head {
        // Client closed without sending anything.
        None => return Ok(()),
        Some(Err(e)) => (HttpResponse::internal_error(e.to_string()), true),
        Some(Ok(head)) => match parse_request_head(&head) {
            Ok(line) => (dispatch(line.path, &jobs).await, false),
            Err(e) => (HttpResponse::internal_error(e.to_string()), false),
        },
    };

    stream.write_all(&response.to_bytes()).await?;
    stream.shutdown().await?;

    if unread_input {
        let _ = timeout(LINGER, discard_input(&mut stream)).await;
    }
    Ok(())
}

async fn discard_input(stream: &mut TcpStream) -> std::io::Result<()> {
    let mut sink = [0u8; 1024];
    while stream.read(&mut sink).await? > 0 {}
    Ok(())
}

/// Reads until the end of the request head.
///
/// Returns `Ok(None)` when the peer closes before sending a byte and
/// `Some(Err(_))` when the head exceeds [`MAX_HEAD_BYTES`].  A head cut short
/// by the peer closing is returned as is.
async fn read_request_head(
    stream: &mut TcpStream,
) -> std::io::Result<Option<Result<Vec<u8>, HttpError>>> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(if buf.is_empty() { None } else { Some(Ok(buf)) });
        }
        buf.extend_from_slice(&chunk[..n]);

        if let Some(end) = find_head_end(&buf) {
            buf.truncate(end);
            return Ok(Some(Ok(buf)));
        }
        if buf.len() > MAX_HEAD_BYTES {
            return Ok(Some(Err(HttpError::HeadTooLarge {
                limit: MAX_HEAD_BYTES,
            })));
        }
    }
}

async fn dispatch(path: String, jobs: &mpsc::Sender<DecodeJob>) -> HttpResponse {
    let (reply, response) = oneshot::channel();
    if jobs.send(DecodeJob { path, reply }).await.is_err() {
        return HttpResponse::internal_error("event pipeline is not running");
    }
    response
        .await
        .unwrap_or_else(|_| HttpResponse::internal_error("event pipeline dropped the request"))
}

// ── Decoder task ──────────────────────────────────────────────────────────────

async fn run_decoder(
    mut jobs: mpsc::Receiver<DecodeJob>,
    source: EventSource,
    cancel: CancellationToken,
) {
    let mut filter = SequenceFilter::new();

    loop {
        let job = tokio::select! {
            _ = cancel.cancelled() => break,
            job = jobs.recv() => job,
        };
        let Some(DecodeJob { path, reply }) = job else {
            break;
        };

        let decoded = decode_request_path(&path, &mut filter);
        let response = match &decoded {
            DecodedRequest::Events { batch, .. } if !batch.is_empty() => {
                match source.publish(batch.clone()).await {
                    Ok(()) => HttpResponse::for_request(&decoded),
                    Err(e) => {
                        warn!("cannot forward remote events: {e}");
                        HttpResponse::internal_error(e.to_string())
                    }
                }
            }
            _ => HttpResponse::for_request(&decoded),
        };

        // The client may have gone away; nothing to do then.
        let _ = reply.send(response);
    }

    debug!(keys = filter.len(), "decoder stopped; discarding sequence table");
    filter.clear();
}
