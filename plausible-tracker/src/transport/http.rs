//! Native HTTP transport using reqwest.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE as CONTENT_TYPE_HEADER;

use super::{EventRequest, Transport, CONTENT_TYPE};
use crate::error::{TrackerError, TrackerResult};
use crate::event::Callback;

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// HTTP transport backed by an async reqwest client.
///
/// Requests are spawned with [`tokio::task::spawn_local`] so completion
/// callbacks run on the host thread and need not be `Send`. `send` must
/// therefore be called from within a [`tokio::task::LocalSet`].
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Creates a transport with the default timeout.
    pub fn new() -> TrackerResult<Self> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Creates a transport with a custom timeout.
    pub fn with_timeout(timeout: Duration) -> TrackerResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TrackerError::TransportInit(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: EventRequest, on_settled: Option<Callback>) {
        let client = self.client.clone();
        let EventRequest { endpoint, body } = request;

        tokio::task::spawn_local(async move {
            let result = client
                .post(endpoint.as_str())
                .header(CONTENT_TYPE_HEADER, CONTENT_TYPE)
                .body(body)
                .send()
                .await;

            // The response body is never read; only settlement matters.
            match result {
                Ok(response) => {
                    tracing::debug!(endpoint = %endpoint, status = %response.status(), "Event request settled");
                }
                Err(e) => {
                    tracing::debug!(endpoint = %endpoint, error = %e, "Event request failed");
                }
            }

            if let Some(callback) = on_settled {
                callback();
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::oneshot;
    use tokio::task::LocalSet;

    /// Read one HTTP request from `stream`, answer 202 and return the raw request.
    async fn capture_request(stream: &mut TcpStream) -> String {
        let mut raw = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            raw.extend_from_slice(&chunk[..n]);

            let text = String::from_utf8_lossy(&raw);
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if raw.len() >= end + 4 + length {
                    break;
                }
            }
        }

        stream
            .write_all(b"HTTP/1.1 202 Accepted\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
            .await
            .unwrap();
        String::from_utf8(raw).unwrap()
    }

    #[tokio::test]
    async fn test_sends_single_plain_text_post() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}/api/event", listener.local_addr().unwrap());
        let body = r#"{"n":"pageview","u":"https://example.com/","d":"example.com","r":null,"w":1280}"#;

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let request = capture_request(&mut stream).await;
            let another = tokio::time::timeout(Duration::from_millis(200), listener.accept()).await;
            (request, another.is_ok())
        });

        LocalSet::new()
            .run_until(async {
                // Bypass any proxy configured in the environment.
                let transport = ReqwestTransport {
                    client: reqwest::Client::builder().no_proxy().build().unwrap(),
                };
                let (tx, rx) = oneshot::channel();
                transport.send(
                    EventRequest::new(endpoint.as_str(), body),
                    Some(Box::new(move || {
                        let _ = tx.send(());
                    })),
                );

                let settled = tokio::time::timeout(Duration::from_secs(5), rx).await;
                assert!(matches!(settled, Ok(Ok(()))));
            })
            .await;

        let (request, second_connection) = server.await.unwrap();
        let (head, sent_body) = request.split_once("\r\n\r\n").unwrap();
        let head = head.to_ascii_lowercase();

        assert!(head.starts_with("post /api/event http/1.1\r\n"), "{}", head);
        assert!(head.contains("\r\ncontent-type: text/plain\r\n"), "{}", head);
        assert_eq!(sent_body, body);
        assert!(!second_connection, "exactly one request per event");
    }

    #[tokio::test]
    async fn test_callback_runs_when_delivery_fails() {
        let local = LocalSet::new();
        local
            .run_until(async {
                let transport = ReqwestTransport::with_timeout(Duration::from_secs(2)).unwrap();
                let (tx, rx) = oneshot::channel();

                // Port 9 (discard) is not listening; the request fails fast or times out.
                transport.send(
                    EventRequest::new("http://127.0.0.1:9/api/event", r#"{"n":"pageview"}"#),
                    Some(Box::new(move || {
                        let _ = tx.send(());
                    })),
                );

                let settled = tokio::time::timeout(Duration::from_secs(5), rx).await;
                assert!(
                    matches!(settled, Ok(Ok(()))),
                    "callback should run once the request settles"
                );
            })
            .await;
    }

    #[tokio::test]
    async fn test_invalid_endpoint_still_settles() {
        let local = LocalSet::new();
        local
            .run_until(async {
                let transport = ReqwestTransport::new().unwrap();
                let (tx, rx) = oneshot::channel();

                transport.send(
                    EventRequest::new("/relative/api/event", "{}"),
                    Some(Box::new(move || {
                        let _ = tx.send(());
                    })),
                );

                let settled = tokio::time::timeout(Duration::from_secs(5), rx).await;
                assert!(matches!(settled, Ok(Ok(()))));
            })
            .await;
    }
}
