//! Client side of the extent protocol.
//!
//! An [`ExtentSession`] owns one persistent stream to the extent server. All
//! exchanges go through a session-wide async mutex: the stream carries no
//! request ids, so a second caller must wait until the first caller's reply
//! has been read in full.
//!
//! Dropping an operation's future midway (under `tokio::time::timeout`, say)
//! leaves its reply unread. The session then fails every later operation
//! with [`WireError::Abandoned`]; reconnect to recover.

use bytes::Bytes;
use extent::{chunk, reassemble, ExtentData, ExtentHash, ExtentRecipe, DEFAULT_EXTENT_SIZE};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::connection::{Connection, Frame};
use crate::message::{MsgCode, MsgStatus, WireError};

/// Why a client operation failed.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error("server answered with status {0}")]
    Rejected(MsgStatus),
    #[error("server answered with message code {0} instead of a reply")]
    UnexpectedReply(i64),
    #[error("expected {expected} items in reply, got {actual}")]
    CountMismatch { expected: usize, actual: usize },
    #[error("extent {hash} came back with different content")]
    Corrupt { hash: ExtentHash },
}

pub struct ExtentSession<S = TcpStream> {
    conn: Mutex<Connection<S>>,
    chunk_size: usize,
}

impl ExtentSession<TcpStream> {
    /// Open a TCP connection to the extent server.
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, SessionError> {
        let stream = TcpStream::connect(addr).await.map_err(WireError::from)?;
        let label = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "server".to_string());
        debug!(server = %label, "connected to extent server");
        Ok(Self::from_connection(Connection::with_label(stream, label)))
    }
}

impl<S> ExtentSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self::from_connection(Connection::new(stream))
    }

    fn from_connection(conn: Connection<S>) -> Self {
        Self {
            conn: Mutex::new(conn),
            chunk_size: DEFAULT_EXTENT_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    async fn exchange(&self, code: MsgCode, payload: &str) -> Result<Frame, SessionError> {
        let mut conn = self.conn.lock().await;
        let frame = conn
            .send_and_await_reply(code, MsgStatus::None, Some(payload))
            .await?;
        if frame.kind() != Some(MsgCode::Reply) {
            return Err(SessionError::UnexpectedReply(frame.header.code));
        }
        Ok(frame)
    }

    /// Store `chunks` on the server and return their hashes in order.
    pub async fn put_extents(&self, chunks: &[Bytes]) -> Result<Vec<ExtentHash>, SessionError> {
        let wire: Vec<ExtentData> = chunks.iter().cloned().map(ExtentData::from).collect();
        let payload = serde_json::to_string(&wire).map_err(WireError::MalformedPayload)?;

        let frame = self.exchange(MsgCode::PutExtents, &payload).await?;
        if !frame.status().is_ok() {
            return Err(SessionError::Rejected(frame.status()));
        }

        let hashes: Vec<ExtentHash> = frame.json()?;
        check_count(chunks.len(), hashes.len())?;
        for (chunk, hash) in chunks.iter().zip(&hashes) {
            if !hash.matches(chunk) {
                return Err(SessionError::Corrupt { hash: hash.clone() });
            }
        }
        Ok(hashes)
    }

    /// Fetch the contents of `hashes` in order.
    ///
    /// Fails with [`SessionError::Rejected`] if the server is missing any of
    /// them; a partial answer is never returned.
    pub async fn get_extents(&self, hashes: &[ExtentHash]) -> Result<Vec<Bytes>, SessionError> {
        let payload = serde_json::to_string(hashes).map_err(WireError::MalformedPayload)?;

        let frame = self.exchange(MsgCode::GetExtents, &payload).await?;
        if !frame.status().is_ok() {
            return Err(SessionError::Rejected(frame.status()));
        }

        let contents: Vec<ExtentData> = frame.json()?;
        check_count(hashes.len(), contents.len())?;
        hashes
            .iter()
            .zip(contents)
            .map(|(hash, data)| {
                if hash.matches(data.as_ref()) {
                    Ok(data.into_bytes())
                } else {
                    Err(SessionError::Corrupt { hash: hash.clone() })
                }
            })
            .collect()
    }

    /// Ask whether the server holds `hash`.
    pub async fn poll_extent(&self, hash: &ExtentHash) -> Result<bool, SessionError> {
        let payload = serde_json::to_string(&[hash]).map_err(WireError::MalformedPayload)?;

        let frame = self.exchange(MsgCode::PollExtent, &payload).await?;
        match frame.status() {
            MsgStatus::Ok => Ok(true),
            MsgStatus::Negative => Ok(false),
            other => Err(SessionError::Rejected(other)),
        }
    }

    /// Chunk `content`, store every chunk, and return the recipe.
    pub async fn try_write_file(&self, content: &[u8]) -> Result<ExtentRecipe, SessionError> {
        if content.is_empty() {
            return Ok(ExtentRecipe::empty());
        }
        let chunks: Vec<Bytes> = chunk::split(content, self.chunk_size)
            .into_iter()
            .map(Bytes::copy_from_slice)
            .collect();
        debug!(bytes = content.len(), count = chunks.len(), "writing file");
        Ok(ExtentRecipe::new(self.put_extents(&chunks).await?))
    }

    /// Fetch every extent of `recipe` and concatenate them.
    pub async fn try_read_file(&self, recipe: &ExtentRecipe) -> Result<Bytes, SessionError> {
        if recipe.is_empty() {
            return Ok(Bytes::new());
        }
        debug!(count = recipe.len(), "reading file");
        let contents = self.get_extents(recipe.hashes()).await?;
        Ok(reassemble(contents))
    }

    /// Like [`try_write_file`](Self::try_write_file), but a failure is logged
    /// and reported as an empty recipe.
    ///
    /// An empty recipe for non-empty content means the write was lost.
    pub async fn write_file(&self, content: &[u8]) -> ExtentRecipe {
        match self.try_write_file(content).await {
            Ok(recipe) => recipe,
            Err(e) => {
                error!(bytes = content.len(), "write failed: {e}");
                ExtentRecipe::empty()
            }
        }
    }

    /// Like [`try_read_file`](Self::try_read_file), but a failure is logged
    /// and reported as empty content.
    pub async fn read_file(&self, recipe: &ExtentRecipe) -> Bytes {
        match self.try_read_file(recipe).await {
            Ok(content) => content,
            Err(e) => {
                error!(recipe = %recipe, "read failed: {e}");
                Bytes::new()
            }
        }
    }
}

fn check_count(expected: usize, actual: usize) -> Result<(), SessionError> {
    if expected == actual {
        Ok(())
    } else {
        Err(SessionError::CountMismatch { expected, actual })
    }
}
