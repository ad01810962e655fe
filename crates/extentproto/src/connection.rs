//! Line-framed transport shared by the server and the client.
//!
//! A [`Connection`] wraps any async byte stream (a `TcpStream` in production,
//! a `tokio::io::duplex` pipe in tests) and moves whole protocol units across
//! it: header line, then payload line when the header announces one.
//!
//! There is no multiplexing. Exactly one request/reply exchange may be in
//! flight on a connection, so callers sharing one must serialize access.
//!
//! An exchange whose future is dropped between its send and its reply leaves
//! the stream out of step: the late reply would be read by the next caller as
//! its own. [`Connection::send_and_await_reply`] detects this and refuses all
//! further exchanges with [`WireError::Abandoned`].

use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufStream};
use tracing::debug;

use crate::message::{Message, MsgCode, MsgStatus, WireError};

/// A received protocol unit: header plus payload line (empty if none).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: Message,
    pub payload: String,
}

impl Frame {
    pub fn kind(&self) -> Option<MsgCode> {
        self.header.kind()
    }

    pub fn status(&self) -> MsgStatus {
        self.header.status
    }

    /// Decode the payload line as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, WireError> {
        serde_json::from_str(&self.payload).map_err(WireError::MalformedPayload)
    }
}

/// One end of an extent protocol stream.
pub struct Connection<S> {
    stream: BufStream<S>,
    label: String,
    /// Set while a request is out and its reply has not been read.
    awaiting_reply: bool,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self::with_label(stream, "stream")
    }

    /// Create with a label (usually the peer address) used in log lines.
    pub fn with_label(stream: S, label: impl Into<String>) -> Self {
        Self {
            stream: BufStream::new(stream),
            label: label.into(),
            awaiting_reply: false,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Send a header and, if `payload` is non-empty, the payload line.
    pub async fn send(
        &mut self,
        code: MsgCode,
        status: MsgStatus,
        payload: Option<&str>,
    ) -> Result<(), WireError> {
        let payload = payload.unwrap_or_default();
        if payload.contains('\n') {
            return Err(WireError::UnframeablePayload);
        }

        let header = Message::new(code, payload.len() as u64, status);
        let line = header.to_line();
        debug!(peer = %self.label, "sending header {line}");

        self.stream.write_all(line.as_bytes()).await?;
        self.stream.write_all(b"\n").await?;
        if header.has_payload() {
            debug!(peer = %self.label, bytes = payload.len(), "sending payload");
            self.stream.write_all(payload.as_bytes()).await?;
            self.stream.write_all(b"\n").await?;
        }
        self.stream.flush().await?;
        Ok(())
    }

    /// Send with a JSON-encoded payload.
    pub async fn send_json<T: Serialize + ?Sized>(
        &mut self,
        code: MsgCode,
        status: MsgStatus,
        payload: &T,
    ) -> Result<(), WireError> {
        let json = serde_json::to_string(payload).map_err(WireError::MalformedPayload)?;
        self.send(code, status, Some(&json)).await
    }

    /// Send a `reply` message.
    pub async fn reply(&mut self, status: MsgStatus, payload: Option<&str>) -> Result<(), WireError> {
        self.send(MsgCode::Reply, status, payload).await
    }

    /// Send a `reply` message with a JSON-encoded payload.
    pub async fn reply_json<T: Serialize + ?Sized>(
        &mut self,
        status: MsgStatus,
        payload: &T,
    ) -> Result<(), WireError> {
        self.send_json(MsgCode::Reply, status, payload).await
    }

    /// Block until the next unit arrives.
    ///
    /// Returns `Ok(None)` when the peer closes the stream cleanly between
    /// units. A close after the header but before its payload is an error.
    pub async fn receive(&mut self) -> Result<Option<Frame>, WireError> {
        debug!(peer = %self.label, "waiting for message header");
        let Some(line) = self.read_line().await? else {
            return Ok(None);
        };
        let header = Message::from_line(&line)?;
        debug!(peer = %self.label, "received header {line}");

        let payload = if header.has_payload() {
            match self.read_line().await? {
                Some(payload) => payload,
                None => return Err(WireError::MissingPayload(header.length)),
            }
        } else {
            String::new()
        };
        debug!(peer = %self.label, bytes = payload.len(), "received payload");

        Ok(Some(Frame { header, payload }))
    }

    /// Send a request and wait for the peer's answer on the same stream.
    ///
    /// Fails with [`WireError::Abandoned`] if an earlier exchange never
    /// finished, whether it was cancelled or failed partway.
    pub async fn send_and_await_reply(
        &mut self,
        code: MsgCode,
        status: MsgStatus,
        payload: Option<&str>,
    ) -> Result<Frame, WireError> {
        if self.awaiting_reply {
            return Err(WireError::Abandoned);
        }

        self.awaiting_reply = true;
        self.send(code, status, payload).await?;
        let frame = self.receive().await?.ok_or(WireError::Closed)?;
        self.awaiting_reply = false;
        Ok(frame)
    }

    /// Flush and shut down the write half.
    pub async fn shutdown(&mut self) -> Result<(), WireError> {
        self.stream.flush().await?;
        self.stream.shutdown().await?;
        Ok(())
    }

    async fn read_line(&mut self) -> Result<Option<String>, WireError> {
        let mut line = String::new();
        if self.stream.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }
        Ok(Some(line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio::io::{duplex, AsyncReadExt};

    #[tokio::test]
    async fn header_only_roundtrip() {
        let (a, b) = duplex(1024);
        let mut left = Connection::new(a);
        let mut right = Connection::new(b);

        left.reply(MsgStatus::Negative, None).await.unwrap();
        let frame = right.receive().await.unwrap().unwrap();

        assert_eq!(frame.kind(), Some(MsgCode::Reply));
        assert_eq!(frame.status(), MsgStatus::Negative);
        assert_eq!(frame.header.length, 0);
        assert_eq!(frame.payload, "");
    }

    #[tokio::test]
    async fn payload_roundtrip() {
        let (a, b) = duplex(1024);
        let mut left = Connection::new(a);
        let mut right = Connection::new(b);

        left.send_json(MsgCode::PutExtents, MsgStatus::None, &["aGVsbG8g", "d29ybGQ="])
            .await
            .unwrap();
        let frame = right.receive().await.unwrap().unwrap();

        assert_eq!(frame.kind(), Some(MsgCode::PutExtents));
        assert_eq!(frame.header.length, frame.payload.len() as u64);
        let chunks: Vec<String> = frame.json().unwrap();
        assert_eq!(chunks, vec!["aGVsbG8g".to_string(), "d29ybGQ=".to_string()]);
    }

    #[tokio::test]
    async fn exact_bytes_on_the_wire() {
        let (a, mut b) = duplex(1024);
        let mut left = Connection::new(a);
        left.send(MsgCode::PollExtent, MsgStatus::None, Some(r#"["ab"]"#))
            .await
            .unwrap();
        left.shutdown().await.unwrap();

        let mut raw = String::new();
        b.read_to_string(&mut raw).await.unwrap();
        assert_eq!(raw, "{\"code\":4,\"length\":6,\"status\":0}\n[\"ab\"]\n");
    }

    #[tokio::test]
    async fn empty_payload_sends_no_second_line() {
        let (a, mut b) = duplex(1024);
        let mut left = Connection::new(a);
        left.send(MsgCode::GetExtents, MsgStatus::None, Some("")).await.unwrap();
        left.shutdown().await.unwrap();

        let mut raw = String::new();
        b.read_to_string(&mut raw).await.unwrap();
        assert_eq!(raw.lines().count(), 1);
    }

    #[tokio::test]
    async fn clean_close_is_none() {
        let (a, b) = duplex(64);
        let mut right = Connection::new(b);
        drop(a);
        assert!(right.receive().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn close_before_payload_is_an_error() {
        let (mut a, b) = duplex(256);
        let mut right = Connection::new(b);
        a.write_all(b"{\"code\":3,\"length\":10,\"status\":0}\n").await.unwrap();
        drop(a);

        let err = right.receive().await.unwrap_err();
        assert!(matches!(err, WireError::MissingPayload(10)));
    }

    #[tokio::test]
    async fn crlf_is_tolerated() {
        let (mut a, b) = duplex(256);
        let mut right = Connection::new(b);
        a.write_all(b"{\"code\":1,\"length\":2,\"status\":1}\r\n[]\r\n").await.unwrap();

        let frame = right.receive().await.unwrap().unwrap();
        assert_eq!(frame.payload, "[]");
        assert_eq!(frame.status(), MsgStatus::Ok);
    }

    #[tokio::test]
    async fn newline_in_payload_is_refused() {
        let (a, _b) = duplex(64);
        let mut left = Connection::new(a);
        let err = left
            .send(MsgCode::PutExtents, MsgStatus::None, Some("a\nb"))
            .await
            .unwrap_err();
        assert!(matches!(err, WireError::UnframeablePayload));
    }

    #[tokio::test]
    async fn send_and_await_reply_on_closed_peer() {
        let (a, b) = duplex(1024);
        let mut left = Connection::new(a);

        // Peer reads the request, then hangs up without answering.
        let peer = tokio::spawn(async move {
            let mut right = Connection::new(b);
            right.receive().await.unwrap();
        });

        let err = left
            .send_and_await_reply(MsgCode::PollExtent, MsgStatus::None, Some("[\"x\"]"))
            .await
            .unwrap_err();
        assert!(matches!(err, WireError::Closed));
        peer.await.unwrap();
    }

    #[tokio::test]
    async fn dropped_exchange_poisons_the_stream() {
        let (a, b) = duplex(1024);
        let mut left = Connection::new(a);
        let mut right = Connection::new(b);

        // Nobody answers, so the exchange is still waiting when it is dropped.
        let pending = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            left.send_and_await_reply(MsgCode::PollExtent, MsgStatus::None, Some("[\"x\"]")),
        )
        .await;
        assert!(pending.is_err());

        // The late reply must not be taken as the answer to a new request.
        right.receive().await.unwrap().unwrap();
        right.reply(MsgStatus::Negative, None).await.unwrap();

        let err = left
            .send_and_await_reply(MsgCode::PollExtent, MsgStatus::None, Some("[\"y\"]"))
            .await
            .unwrap_err();
        assert!(matches!(err, WireError::Abandoned));
    }
}
