//! Stream relay: opens the backend chat stream and hands SSE events to the
//! caller one at a time, in backend order, until the stream ends or is
//! aborted.

use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::sse::{SseEvent, SseParser};
use crate::config::Config;
use crate::error::{Error, Result};

const EVENT_STREAM: &str = "text/event-stream";
const CHAT_PATH: &str = "/agent/session/chat";

/// Body of a chat request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest<'a> {
    session_id: &'a str,
    message: &'a str,
}

/// Opens chat streams against the backend.
#[derive(Debug, Clone)]
pub struct StreamRelay {
    client: Client,
    base_url: String,
    buffer: usize,
}

impl StreamRelay {
    /// Build a relay from config.
    ///
    /// Only the connect phase is bounded by the request timeout; the body
    /// of a stream may legitimately stay open for a long time.
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.request_timeout())
            .build()?;
        Ok(Self::with_client(client, config.api_root(), config.stream_buffer))
    }

    pub fn with_client(client: Client, base_url: &str, buffer: usize) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            buffer: buffer.max(1),
        }
    }

    /// Send `message` on `session_id` and start relaying the reply.
    ///
    /// Fails immediately if the backend cannot be reached, answers with a
    /// non-success status, or does not answer with an event stream.
    pub async fn open(&self, session_id: &str, message: &str) -> Result<ChatStream> {
        let url = format!("{}{CHAT_PATH}", self.base_url);
        debug!(%url, session_id, "opening chat stream");

        let response = self
            .client
            .post(&url)
            .header(ACCEPT, EVENT_STREAM)
            .json(&ChatRequest {
                session_id,
                message,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Http {
                status: status.as_u16(),
                body,
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        if !content_type.as_deref().is_some_and(is_event_stream) {
            return Err(Error::NotEventStream { content_type });
        }

        let (tx, rx) = mpsc::channel(self.buffer);
        let cancel = CancellationToken::new();
        tokio::spawn(read_body(response, tx, cancel.clone()));

        Ok(ChatStream::from_parts(rx, cancel))
    }
}

/// Media types compare case-insensitively; parameters such as `charset`
/// are ignored.
fn is_event_stream(content_type: &str) -> bool {
    content_type
        .get(..EVENT_STREAM.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(EVENT_STREAM))
}

/// Reader task: parse the response body and forward events until the body
/// ends, a transport error occurs, or the stream is aborted.
async fn read_body(
    response: reqwest::Response,
    tx: mpsc::Sender<Result<SseEvent>>,
    cancel: CancellationToken,
) {
    let mut body = response.bytes_stream();
    let mut parser = SseParser::new();
    let mut forwarded = 0usize;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(forwarded, "chat stream aborted");
                return;
            }
            chunk = body.next() => match chunk {
                Some(Ok(bytes)) => {
                    for event in parser.feed(&bytes) {
                        if !forward(&tx, &cancel, Ok(event)).await {
                            return;
                        }
                        forwarded += 1;
                    }
                }
                Some(Err(err)) => {
                    warn!(error = %err, forwarded, "chat stream transport error");
                    forward(&tx, &cancel, Err(Error::Transport(err))).await;
                    return;
                }
                None => {
                    if let Some(event) = parser.finish() {
                        if forward(&tx, &cancel, Ok(event)).await {
                            forwarded += 1;
                        }
                    }
                    debug!(forwarded, "chat stream closed by backend");
                    return;
                }
            }
        }
    }
}

/// Send one item, giving up if the stream is aborted or the consumer left.
async fn forward(
    tx: &mpsc::Sender<Result<SseEvent>>,
    cancel: &CancellationToken,
    item: Result<SseEvent>,
) -> bool {
    tokio::select! {
        biased;
        () = cancel.cancelled() => false,
        sent = tx.send(item) => sent.is_ok(),
    }
}

/// Cancels a [`ChatStream`] from elsewhere.
#[derive(Debug, Clone)]
pub struct AbortHandle(CancellationToken);

impl AbortHandle {
    pub fn abort(&self) {
        self.0.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.0.is_cancelled()
    }
}

/// An open chat stream.
///
/// Dropping the stream aborts it.
#[derive(Debug)]
pub struct ChatStream {
    rx: mpsc::Receiver<Result<SseEvent>>,
    cancel: CancellationToken,
}

impl ChatStream {
    /// Assemble a stream from a channel; the sending side plays the
    /// backend. Used by the relay and by alternative transports.
    pub const fn from_parts(rx: mpsc::Receiver<Result<SseEvent>>, cancel: CancellationToken) -> Self {
        Self { rx, cancel }
    }

    /// Next event in backend order, or `None` once the stream has ended or
    /// been aborted. A transport error is yielded once, then the stream ends.
    pub async fn next(&mut self) -> Option<Result<SseEvent>> {
        if self.cancel.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => None,
            item = self.rx.recv() => item,
        }
    }

    /// Stop the stream. Events not yet yielded are discarded.
    pub fn abort(&self) {
        self.cancel.cancel();
        debug!("chat stream abort requested");
    }

    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle(self.cancel.clone())
    }

    pub fn is_aborted(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for ChatStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel_stream() -> (mpsc::Sender<Result<SseEvent>>, ChatStream) {
        let (tx, rx) = mpsc::channel(8);
        (tx, ChatStream::from_parts(rx, CancellationToken::new()))
    }

    #[tokio::test]
    async fn yields_in_order_then_ends() {
        let (tx, mut stream) = channel_stream();
        for data in ["a", "b", "c"] {
            tx.send(Ok(SseEvent::data(data))).await.unwrap();
        }
        drop(tx);

        let mut seen = Vec::new();
        while let Some(item) = stream.next().await {
            seen.push(item.unwrap().data);
        }
        assert_eq!(seen, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn abort_stops_delivery() {
        let (tx, mut stream) = channel_stream();
        tx.send(Ok(SseEvent::data("first"))).await.unwrap();
        tx.send(Ok(SseEvent::data("second"))).await.unwrap();

        assert_eq!(stream.next().await.unwrap().unwrap().data, "first");
        stream.abort_handle().abort();
        assert!(stream.is_aborted());
        assert!(stream.next().await.is_none());
    }

    /// Serve `router` on an ephemeral port and return its `/api` root.
    async fn serve(router: axum::Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        format!("http://{addr}/api")
    }

    #[tokio::test]
    async fn json_answer_is_not_a_stream() {
        let router = axum::Router::new().route(
            "/api/agent/session/chat",
            axum::routing::post(|| async { axum::Json(serde_json::json!({"code": 200, "data": null})) }),
        );
        let relay = StreamRelay::with_client(Client::new(), &serve(router).await, 4);

        match relay.open("s-1", "hello").await.unwrap_err() {
            Error::NotEventStream { content_type } => {
                assert_eq!(content_type.as_deref(), Some("application/json"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn content_type_is_case_insensitive() {
        let router = axum::Router::new().route(
            "/api/agent/session/chat",
            axum::routing::post(|| async {
                ([(CONTENT_TYPE, "Text/Event-Stream; charset=utf-8")], "data: hi\n\n")
            }),
        );
        let relay = StreamRelay::with_client(Client::new(), &serve(router).await, 4);

        let mut stream = relay.open("s-1", "hello").await.unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap().data, "hi");
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn event_stream_media_type() {
        assert!(is_event_stream("text/event-stream"));
        assert!(is_event_stream("TEXT/EVENT-STREAM;charset=UTF-8"));
        assert!(!is_event_stream("application/json"));
        assert!(!is_event_stream("text/"));
    }

    #[tokio::test]
    async fn unreachable_backend_fails_fast() {
        // Port 9 (discard) on localhost is almost never listening.
        let relay = StreamRelay::with_client(Client::new(), "http://127.0.0.1:9/api", 4);
        let err = relay.open("s-1", "hello").await.unwrap_err();
        assert!(err.is_transport());
    }
}
