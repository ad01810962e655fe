//! Accept loop.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use extent::{ensure_extent_dir, ExtentTable, FlushPolicy, PersistenceError};
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::handler::{ConnectionHandler, StoreContext};

/// The extent server: one shared table, one handler task per connection.
#[derive(Clone)]
pub struct ExtentServer {
    ctx: StoreContext,
}

impl ExtentServer {
    /// A server over an empty table.
    pub fn new(extent_dir: impl Into<PathBuf>, flush_policy: FlushPolicy) -> Self {
        Self {
            ctx: StoreContext {
                table: Arc::new(ExtentTable::new()),
                extent_dir: extent_dir.into(),
                flush_policy,
            },
        }
    }

    /// Prepare `extent_dir` and load what it holds.
    ///
    /// The directory is created if missing. A path that exists but is not a
    /// directory is an error, as is a directory that cannot be listed.
    pub fn open(extent_dir: &Path, flush_policy: FlushPolicy) -> Result<Self, PersistenceError> {
        ensure_extent_dir(extent_dir)?;
        let server = Self::new(extent_dir, flush_policy);
        let report = server.ctx.table.load_from_disk(extent_dir)?;
        info!(
            dir = %extent_dir.display(),
            loaded = report.loaded,
            skipped = report.skipped.len(),
            "extent store ready"
        );
        Ok(server)
    }

    pub fn table(&self) -> &Arc<ExtentTable> {
        &self.ctx.table
    }

    pub fn extent_dir(&self) -> &Path {
        &self.ctx.extent_dir
    }

    /// Accept connections until `shutdown` fires.
    ///
    /// On shutdown, open connections are dropped and the table is flushed
    /// once more before returning.
    pub async fn run(&self, listener: TcpListener, shutdown: CancellationToken) -> io::Result<()> {
        let local = listener.local_addr()?;
        info!(addr = %local, "extent server listening");

        let mut handlers = JoinSet::new();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let handler = ConnectionHandler::new(stream, peer.to_string(), self.ctx.clone());
                        handlers.spawn(handler.run());
                    }
                    Err(e) => warn!("accept failed: {e}"),
                },
            }

            // Reap finished connections so the set doesn't grow unbounded.
            while let Some(done) = handlers.try_join_next() {
                if let Err(e) = done {
                    warn!("connection task failed: {e}");
                }
            }
        }

        info!(open = handlers.len(), "shutting down, closing connections");
        handlers.shutdown().await;
        self.ctx.flush().await;
        Ok(())
    }

    /// Bind `addr` and serve until `shutdown` fires.
    pub async fn serve(&self, addr: &str, shutdown: CancellationToken) -> io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.run(listener, shutdown).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use extent::ExtentStore;
    use tempfile::TempDir;

    #[test]
    fn open_creates_missing_dir() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("nested/extents");

        let server = ExtentServer::open(&dir, FlushPolicy::Full).unwrap();
        assert!(dir.is_dir());
        assert_eq!(server.extent_dir(), dir.as_path());
        assert!(server.table().is_empty());
    }

    #[test]
    fn open_refuses_a_plain_file() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("not-a-dir");
        std::fs::write(&file, b"hi").unwrap();

        let err = ExtentServer::open(&file, FlushPolicy::Full).err().unwrap();
        assert!(matches!(err, PersistenceError::NotADirectory { .. }));
    }

    #[tokio::test]
    async fn cancelled_server_flushes_before_returning() {
        let tmp = TempDir::new().unwrap();
        let server = ExtentServer::open(tmp.path(), FlushPolicy::Dirty).unwrap();
        let hash = server.table().insert(b"left in memory".to_vec());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        server.run(listener, shutdown).await.unwrap();

        assert!(tmp.path().join(hash.as_str()).is_file());
        assert_eq!(server.table().dirty_count(), 0);
    }
}
