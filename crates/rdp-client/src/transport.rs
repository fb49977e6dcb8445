//! Drives a [`Connection`] over a byte stream.
//!
//! One task reads frames and dispatches them in arrival order; another drains
//! the outbound request channel. When either side stops, the connection is
//! closed and every pending request fails with `ConnectionClosed`.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::codec::{encode_frame, FrameDecoder};
use crate::config::ConnectionConfig;
use crate::connection::{Connection, OutboundRequests};
use crate::error::Result;

const READ_CHUNK: usize = 8 * 1024;

pub struct TransportHandle {
    shutdown: CancellationToken,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl TransportHandle {
    /// Stop both tasks and close the connection.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Cancelled once the transport stops, whether on request, on EOF or on
    /// an I/O error.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Wait for both tasks to finish.
    pub async fn join(self) {
        let _ = self.reader.await;
        let _ = self.writer.await;
    }
}

pub fn spawn<R, W>(
    connection: Connection,
    outbound: OutboundRequests,
    reader: R,
    writer: W,
    config: ConnectionConfig,
) -> TransportHandle
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let shutdown = CancellationToken::new();
    let reader = tokio::spawn(read_loop(
        reader,
        connection.clone(),
        FrameDecoder::new(&config),
        shutdown.clone(),
    ));
    let writer = tokio::spawn(write_loop(writer, connection, outbound, shutdown.clone()));
    TransportHandle {
        shutdown,
        reader,
        writer,
    }
}

/// Connect to a debugger server over TCP.
pub async fn connect_tcp(
    addr: impl ToSocketAddrs,
    config: ConnectionConfig,
) -> Result<(Connection, TransportHandle)> {
    let stream = TcpStream::connect(addr).await?;
    let _ = stream.set_nodelay(true);
    let (reader, writer) = stream.into_split();
    let (connection, outbound) = Connection::new();
    let transport = spawn(connection.clone(), outbound, reader, writer, config);
    Ok((connection, transport))
}

async fn read_loop<R>(
    mut reader: R,
    connection: Connection,
    mut decoder: FrameDecoder,
    shutdown: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    let mut chunk = vec![0u8; READ_CHUNK];

    'read: loop {
        let read = tokio::select! {
            _ = shutdown.cancelled() => break,
            res = reader.read(&mut chunk) => res,
        };
        let n = match read {
            Ok(0) => {
                tracing::debug!(target: "rdp.transport", "debuggee closed the stream");
                break;
            }
            Ok(n) => n,
            Err(err) => {
                tracing::warn!(target: "rdp.transport", %err, "read failed");
                break;
            }
        };

        decoder.push(&chunk[..n]);
        loop {
            match decoder.next_frame() {
                Ok(Some(message)) => connection.dispatch(message),
                Ok(None) => break,
                Err(err) => {
                    tracing::warn!(target: "rdp.transport", %err, "undecodable stream; closing");
                    break 'read;
                }
            }
        }
    }

    shutdown.cancel();
    connection.close();
}

async fn write_loop<W>(
    mut writer: W,
    connection: Connection,
    mut outbound: OutboundRequests,
    shutdown: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        let request = tokio::select! {
            _ = shutdown.cancelled() => break,
            request = outbound.recv() => request,
        };
        let Some(request) = request else {
            break;
        };

        let frame = match encode_frame(&request) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(target: "rdp.transport", to = %request.to, %err, "dropping unencodable request");
                continue;
            }
        };
        let written = async {
            writer.write_all(&frame).await?;
            writer.flush().await
        };
        if let Err(err) = written.await {
            tracing::warn!(target: "rdp.transport", %err, "write failed");
            break;
        }
    }

    let _ = writer.shutdown().await;
    shutdown.cancel();
    connection.close();
}
