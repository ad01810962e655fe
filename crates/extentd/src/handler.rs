//! Per-connection request loop.
//!
//! Each accepted socket gets one [`ConnectionHandler`] on its own task. The
//! handler reads one request, answers it with exactly one `reply`, and repeats
//! until the peer hangs up or the stream breaks. When it stops it flushes the
//! extent table to disk.
//!
//! Reply statuses:
//!
//! | request | `ok` | `negative` | `error` |
//! |---|---|---|---|
//! | `put_extents` | stored, hashes in order | | payload not a list of base64 strings |
//! | `get_extents` | all found, contents in order | some hash unknown; found contents only | payload not a list of 64-hex hashes |
//! | `poll_extent` | present | absent | payload not a one-hash list |
//!
//! A hash that is not 64 hex characters can never name a stored extent, but it
//! is still a malformed request, so `get_extents` answers `error` for it rather
//! than `negative`. Requests with an unknown code get no reply at all.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use extent::{Extent, ExtentData, ExtentHash, ExtentStore, ExtentTable, FlushPolicy};
use extentproto::{Connection, Frame, MsgCode, MsgStatus, WireError};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, error, info, info_span, warn, Instrument};

/// What every handler shares: the table and where it persists.
#[derive(Clone)]
pub struct StoreContext {
    pub table: Arc<ExtentTable>,
    pub extent_dir: PathBuf,
    pub flush_policy: FlushPolicy,
}

impl StoreContext {
    /// Flush the table on the blocking pool and log the outcome.
    pub async fn flush(&self) {
        let table = Arc::clone(&self.table);
        let dir = self.extent_dir.clone();
        let policy = self.flush_policy;

        match tokio::task::spawn_blocking(move || table.flush_to_disk(&dir, policy)).await {
            Ok(report) if report.is_clean() => {
                debug!(written = report.written, %policy, "flushed extents");
            }
            Ok(report) => {
                warn!(
                    written = report.written,
                    failed = report.failed.len(),
                    %policy,
                    "flush finished with failures"
                );
            }
            Err(e) => error!("flush task failed: {e}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandlerState {
    Listening,
    Dispatching,
    Closed,
}

impl fmt::Display for HandlerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerState::Listening => f.write_str("listening"),
            HandlerState::Dispatching => f.write_str("dispatching"),
            HandlerState::Closed => f.write_str("closed"),
        }
    }
}

pub struct ConnectionHandler<S> {
    conn: Connection<S>,
    ctx: StoreContext,
    state: HandlerState,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, peer: impl Into<String>, ctx: StoreContext) -> Self {
        Self {
            conn: Connection::with_label(stream, peer),
            ctx,
            state: HandlerState::Listening,
        }
    }

    /// Serve the connection until it closes, then flush.
    pub async fn run(mut self) {
        let span = info_span!("connection", peer = %self.conn.label());
        async move {
            info!("client connected");
            self.serve().await;

            self.transition(HandlerState::Closed);
            if let Err(e) = self.conn.shutdown().await {
                debug!("shutdown after close: {e}");
            }
            self.ctx.flush().await;
            info!("client disconnected");
        }
        .instrument(span)
        .await
    }

    async fn serve(&mut self) {
        loop {
            self.transition(HandlerState::Listening);
            let frame = match self.conn.receive().await {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    debug!("peer closed the connection");
                    return;
                }
                Err(e) => {
                    error!("receive failed: {e}");
                    return;
                }
            };

            self.transition(HandlerState::Dispatching);
            if let Err(e) = self.dispatch(frame).await {
                error!("reply failed: {e}");
                return;
            }
        }
    }

    fn transition(&mut self, next: HandlerState) {
        if self.state != next {
            debug!(from = %self.state, to = %next, "state change");
            self.state = next;
        }
    }

    async fn dispatch(&mut self, frame: Frame) -> Result<(), WireError> {
        match frame.kind() {
            Some(MsgCode::PutExtents) => self.put_extents(&frame).await,
            Some(MsgCode::GetExtents) => self.get_extents(&frame).await,
            Some(MsgCode::PollExtent) => self.poll_extent(&frame).await,
            Some(MsgCode::Reply) | None => {
                // Not a request; the peer gets no answer.
                error!(code = frame.header.code, "unrecognized request code");
                Ok(())
            }
        }
    }

    /// Answer a request whose payload could not be decoded.
    async fn reject(&mut self, code: MsgCode, reason: WireError) -> Result<(), WireError> {
        error!(%code, "bad request payload: {reason}");
        self.conn.reply(MsgStatus::Error, None).await
    }

    async fn put_extents(&mut self, frame: &Frame) -> Result<(), WireError> {
        let chunks: Vec<ExtentData> = match frame.json() {
            Ok(chunks) => chunks,
            Err(e) => return self.reject(MsgCode::PutExtents, e).await,
        };

        let hashes: Vec<ExtentHash> = chunks
            .into_iter()
            .map(|data| self.ctx.table.put(Extent::new(data.into_bytes())))
            .collect();
        debug!(count = hashes.len(), "stored extents");

        self.conn.reply_json(MsgStatus::Ok, &hashes).await
    }

    async fn get_extents(&mut self, frame: &Frame) -> Result<(), WireError> {
        let hashes: Vec<ExtentHash> = match frame.json() {
            Ok(hashes) => hashes,
            Err(e) => return self.reject(MsgCode::GetExtents, e).await,
        };

        let mut found = Vec::with_capacity(hashes.len());
        let mut missing = 0usize;
        for hash in &hashes {
            match self.ctx.table.get(hash) {
                Some(content) => found.push(ExtentData::from(content)),
                None => {
                    error!(hash = %hash, "no such extent");
                    missing += 1;
                }
            }
        }

        let status = if missing == 0 {
            MsgStatus::Ok
        } else {
            MsgStatus::Negative
        };
        debug!(found = found.len(), missing, "looked up extents");
        self.conn.reply_json(status, &found).await
    }

    async fn poll_extent(&mut self, frame: &Frame) -> Result<(), WireError> {
        let hashes: Vec<ExtentHash> = match frame.json() {
            Ok(hashes) => hashes,
            Err(e) => return self.reject(MsgCode::PollExtent, e).await,
        };

        let present = match hashes.first() {
            Some(hash) => self.ctx.table.has(hash),
            None => {
                error!("poll_extent without a hash");
                return self.conn.reply(MsgStatus::Error, None).await;
            }
        };

        let status = if present {
            MsgStatus::AFFIRMATIVE
        } else {
            MsgStatus::Negative
        };
        self.conn.reply(status, None).await
    }
}
