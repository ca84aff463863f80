//! Length-prefixed JSON over an async byte stream.
//!
//! Each message is one frame: a 4-byte big-endian length followed by the
//! UTF-8 JSON envelope.
//!
//! ```text
//! [u32 BE: len][UTF-8 JSON bytes of len]
//! ```
//!
//! Works over anything that is `AsyncRead + AsyncWrite`: a `TcpStream`, a
//! Unix socket, a child process's pipes, or `tokio::io::duplex` in tests.

use super::Transport;
use crate::config::{EndpointOptions, RpcConfig};
use crate::endpoint::{RpcEndpoint, WeakRpcEndpoint};
use crate::message::RpcMessage;
use crate::{Result, RpcError};
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Read a length-prefixed frame.
///
/// Returns `None` on clean EOF (peer closed the stream).
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > RpcConfig::MAX_FRAME_SIZE {
        return Err(RpcError::FrameTooLarge {
            size: len,
            max: RpcConfig::MAX_FRAME_SIZE,
        });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

/// Write a length-prefixed frame.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> Result<()> {
    if payload.len() > RpcConfig::MAX_FRAME_SIZE {
        return Err(RpcError::FrameTooLarge {
            size: payload.len(),
            max: RpcConfig::MAX_FRAME_SIZE,
        });
    }
    let len = payload.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Outbound half: serializes messages into frames on the writer.
///
/// The writer is behind a tokio `Mutex` so frames from concurrent sends never
/// interleave.
pub struct StreamTransport<W> {
    writer: Mutex<W>,
}

impl<W> StreamTransport<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }
}

#[async_trait::async_trait]
impl<W> Transport for StreamTransport<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn post_message(&self, message: &RpcMessage) -> Result<()> {
        let bytes = serde_json::to_vec(message)?;
        let mut writer = self.writer.lock().await;
        write_frame(&mut *writer, &bytes).await
    }
}

/// Keeps the reader task of a stream endpoint alive. Dropping it stops
/// inbound delivery.
#[derive(Debug)]
pub struct StreamHandle {
    reader: Option<JoinHandle<()>>,
}

impl StreamHandle {
    /// Wait until the peer closes the stream or the endpoint goes away.
    pub async fn closed(mut self) {
        if let Some(reader) = self.reader.take() {
            let _ = reader.await;
        }
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

/// Build an endpoint over separate read and write halves.
///
/// When the read side ends (EOF or I/O error) the endpoint is destroyed, so
/// requests still waiting fail with [`RpcError::Destroyed`] instead of
/// running into their timeout.
pub fn connect<R, W>(reader: R, writer: W, options: EndpointOptions) -> (RpcEndpoint, StreamHandle)
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let endpoint = RpcEndpoint::new(options, Arc::new(StreamTransport::new(writer)));
    let reader = tokio::spawn(read_loop(reader, endpoint.downgrade()));
    (
        endpoint,
        StreamHandle {
            reader: Some(reader),
        },
    )
}

/// Build an endpoint over a bidirectional stream such as a `TcpStream`.
pub fn connect_stream<S>(stream: S, options: EndpointOptions) -> (RpcEndpoint, StreamHandle)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    connect(reader, writer, options)
}

async fn read_loop<R: AsyncRead + Unpin>(mut reader: R, endpoint: WeakRpcEndpoint) {
    loop {
        let frame = match read_frame(&mut reader).await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                debug!("Stream closed by peer");
                break;
            }
            Err(e) => {
                warn!("Stream read failed: {}", e);
                break;
            }
        };

        let payload: Value = match serde_json::from_slice(&frame) {
            Ok(payload) => payload,
            Err(e) => {
                debug!("Dropping undecodable frame ({} bytes): {}", frame.len(), e);
                continue;
            }
        };

        if !endpoint.deliver(payload, None) {
            break;
        }
    }

    if let Some(endpoint) = endpoint.upgrade() {
        endpoint.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_frame_read_write_roundtrip() {
        let payload = b"hello world";
        let mut buf = Vec::new();

        write_frame(&mut buf, payload).await.unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let read_back = read_frame(&mut cursor).await.unwrap();

        assert_eq!(read_back, Some(payload.to_vec()));
    }

    #[tokio::test]
    async fn test_frame_read_empty_stream_returns_none() {
        let mut cursor = std::io::Cursor::new(Vec::<u8>::new());
        let result = read_frame(&mut cursor).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_frame_read_oversized_returns_error() {
        let huge_len: u32 = (RpcConfig::MAX_FRAME_SIZE + 1) as u32;
        let mut buf = Vec::new();
        buf.extend_from_slice(&huge_len.to_be_bytes());
        buf.extend_from_slice(&[0u8; 8]);

        let mut cursor = std::io::Cursor::new(buf);
        let result = read_frame(&mut cursor).await;
        assert!(matches!(result, Err(RpcError::FrameTooLarge { .. })));
    }

    #[tokio::test]
    async fn test_frames_carry_json_envelope() {
        let (client, mut server) = tokio::io::duplex(4096);
        let (endpoint, _handle) = connect_stream(client, EndpointOptions::new("tcp"));

        endpoint
            .send_notification("mapSaved", Some(json!({"map": "town"})))
            .await
            .unwrap();

        let frame = read_frame(&mut server).await.unwrap().unwrap();
        let value: Value = serde_json::from_slice(&frame).unwrap();
        assert_eq!(value["type"], "request");
        assert_eq!(value["method"], "mapSaved");
        assert_eq!(value["channel"], "tcp");
        assert_eq!(value["params"], json!({"map": "town"}));
    }

    #[tokio::test]
    async fn test_round_trip_over_duplex() {
        let (a, b) = tokio::io::duplex(4096);
        let (caller, _caller_handle) = connect_stream(a, EndpointOptions::new("tcp"));
        let (server, _server_handle) = connect_stream(b, EndpointOptions::new("tcp"));

        server.register_handler("upper", |params: Option<Value>| async move {
            let text = params
                .as_ref()
                .and_then(Value::as_str)
                .ok_or("expected a string")?;
            Ok::<_, &str>(json!(text.to_uppercase()))
        });

        let result = caller.send_request("upper", Some(json!("grass"))).await.unwrap();
        assert_eq!(result, json!("GRASS"));
    }

    #[tokio::test]
    async fn test_peer_close_destroys_endpoint() {
        let (a, b) = tokio::io::duplex(4096);
        let (caller, handle) = connect_stream(a, EndpointOptions::new("tcp"));

        let pending = {
            let caller = caller.clone();
            tokio::spawn(async move { caller.send_request("never", None).await })
        };
        // Let the request reach the peer before hanging up.
        tokio::task::yield_now().await;
        drop(b);

        handle.closed().await;
        assert!(caller.is_destroyed());
        assert!(matches!(pending.await.unwrap(), Err(RpcError::Destroyed)));
    }

    #[tokio::test]
    async fn test_garbage_frames_are_skipped() {
        let (client, mut server) = tokio::io::duplex(4096);
        let (endpoint, _handle) = connect_stream(client, EndpointOptions::new("tcp"));
        endpoint.register_handler("ping", |_| async { Ok::<_, String>(json!("pong")) });

        write_frame(&mut server, b"not json").await.unwrap();
        let request = json!({"type": "request", "id": "p-1", "method": "ping"});
        write_frame(&mut server, &serde_json::to_vec(&request).unwrap())
            .await
            .unwrap();

        let frame = read_frame(&mut server).await.unwrap().unwrap();
        let value: Value = serde_json::from_slice(&frame).unwrap();
        assert_eq!(value["id"], "p-1");
        assert_eq!(value["result"], "pong");
    }
}
