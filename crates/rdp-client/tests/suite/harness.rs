use std::time::Duration;

use rdp_client::codec::{encode_frame, FrameDecoder};
use rdp_client::transport::{self, TransportHandle};
use rdp_client::{Connection, ConnectionConfig};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

const TIMEOUT: Duration = Duration::from_secs(5);

/// The debuggee end of an in-memory stream.
pub struct Debuggee {
    stream: DuplexStream,
    decoder: FrameDecoder,
}

impl Debuggee {
    /// Next request the client wrote.
    pub async fn recv(&mut self) -> Value {
        tokio::time::timeout(TIMEOUT, async {
            let mut chunk = [0u8; 4096];
            loop {
                if let Some(frame) = self.decoder.next_frame().expect("client wrote a bad frame") {
                    return frame;
                }
                let n = self.stream.read(&mut chunk).await.expect("read from client");
                assert!(n > 0, "client closed the stream");
                self.decoder.push(&chunk[..n]);
            }
        })
        .await
        .expect("timed out waiting for a request")
    }

    pub async fn expect(&mut self, to: &str, kind: &str) -> Value {
        let request = self.recv().await;
        assert_eq!(request["to"], to, "unexpected request {request}");
        assert_eq!(request["type"], kind, "unexpected request {request}");
        request
    }

    pub async fn send(&mut self, packet: Value) {
        let frame = encode_frame(&packet).unwrap();
        self.send_raw(&frame).await;
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
        self.stream.flush().await.unwrap();
    }
}

pub fn connect() -> (Connection, TransportHandle, Debuggee) {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let (reader, writer) = tokio::io::split(client);
    let (connection, outbound) = Connection::new();
    let handle = transport::spawn(
        connection.clone(),
        outbound,
        reader,
        writer,
        ConnectionConfig::default(),
    );
    let debuggee = Debuggee {
        stream: server,
        decoder: FrameDecoder::default(),
    };
    (connection, handle, debuggee)
}

pub async fn stopped(handle: &TransportHandle) {
    tokio::time::timeout(TIMEOUT, handle.shutdown_token().cancelled())
        .await
        .expect("transport did not stop");
}
