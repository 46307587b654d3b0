//! Queue transport speaking newline-delimited JSON over TCP.
//!
//! One send is one short-lived connection: the client writes a single
//! request line carrying the batch entries and reads a single response line
//! naming the entries the service did not accept. Connection, write or
//! response parsing failure counts as the whole attempt undelivered; the
//! retry layer above decides what to do next.

use super::{QueueEntry, QueueTransport, SendResponse, TransportError};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

#[derive(Serialize)]
struct BatchRequest<'a> {
    entries: &'a [QueueEntry],
}

#[derive(Deserialize)]
struct BatchResponse {
    #[serde(default)]
    failed: Vec<String>,
}

/// Transport for a remote queue reachable as a plain TCP endpoint.
pub struct TcpQueueTransport {
    endpoint: String,
}

impl TcpQueueTransport {
    pub fn new(endpoint: String) -> Self {
        TcpQueueTransport { endpoint }
    }

    async fn send(&self, entries: &[QueueEntry]) -> Result<SendResponse, TransportError> {
        let mut stream = TcpStream::connect(&self.endpoint).await?;

        let mut request = serde_json::to_vec(&BatchRequest { entries })?;
        request.push(b'\n');
        stream.write_all(&request).await?;
        stream.flush().await?;

        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        let read = reader.read_line(&mut line).await?;
        if read == 0 {
            return Err(TransportError::Protocol(
                "connection closed before response".to_string(),
            ));
        }

        let response: BatchResponse = serde_json::from_str(line.trim_end())?;
        Ok(SendResponse {
            failed: response.failed,
        })
    }
}

impl QueueTransport for TcpQueueTransport {
    fn send_batch<'a>(
        &'a self,
        entries: &'a [QueueEntry],
    ) -> Pin<Box<dyn Future<Output = Result<SendResponse, TransportError>> + Send + 'a>> {
        Box::pin(self.send(entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    /// A one-shot fake queue service: accepts a single connection, captures
    /// the request line and answers with the given response line.
    async fn fake_service(response: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = listener.local_addr().unwrap().to_string();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();

            let mut request = Vec::new();
            let mut byte = [0u8; 1];
            loop {
                socket.read_exact(&mut byte).await.unwrap();
                if byte[0] == b'\n' {
                    break;
                }
                request.push(byte[0]);
            }

            socket.write_all(response.as_bytes()).await.unwrap();
            socket.write_all(b"\n").await.unwrap();

            String::from_utf8(request).unwrap()
        });

        (endpoint, handle)
    }

    fn entries() -> Vec<QueueEntry> {
        vec![
            QueueEntry {
                id: "0".to_string(),
                body: "{\"sensor_name\":\"sauna\"}".to_string(),
            },
            QueueEntry {
                id: "1".to_string(),
                body: "{\"sensor_name\":\"yard\"}".to_string(),
            },
        ]
    }

    #[tokio::test]
    async fn test_send_batch_full_success() {
        let (endpoint, service) = fake_service("{\"failed\":[]}").await;
        let transport = TcpQueueTransport::new(endpoint);

        let response = transport.send_batch(&entries()).await.unwrap();
        assert!(response.failed.is_empty());

        let request = service.await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&request).unwrap();
        assert_eq!(parsed["entries"][0]["id"], "0");
        assert_eq!(parsed["entries"][1]["body"], "{\"sensor_name\":\"yard\"}");
    }

    #[tokio::test]
    async fn test_send_batch_reports_failed_ids() {
        let (endpoint, service) = fake_service("{\"failed\":[\"1\"]}").await;
        let transport = TcpQueueTransport::new(endpoint);

        let response = transport.send_batch(&entries()).await.unwrap();
        assert_eq!(response.failed, vec!["1".to_string()]);
        service.await.unwrap();
    }

    #[tokio::test]
    async fn test_send_batch_rejects_malformed_response() {
        let (endpoint, service) = fake_service("not json").await;
        let transport = TcpQueueTransport::new(endpoint);

        let result = transport.send_batch(&entries()).await;
        assert!(matches!(result, Err(TransportError::Json(_))));
        service.await.unwrap();
    }

    #[tokio::test]
    async fn test_send_batch_connection_refused() {
        // bind then drop to get an endpoint nothing listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = listener.local_addr().unwrap().to_string();
        drop(listener);

        let transport = TcpQueueTransport::new(endpoint);
        let result = transport.send_batch(&entries()).await;
        assert!(matches!(result, Err(TransportError::Io(_))));
    }
}
