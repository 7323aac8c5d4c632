use std::fmt;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;

use hookscope_types::StreamIdentity;

/// Close code reported when the transport dies without a close frame
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Close code reported when a close frame carries no status
pub const CLOSE_NO_STATUS: u16 = 1005;

/// Monotonic generation id distinguishing the live connection's events from
/// a replaced connection's
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnId(u64);

impl ConnId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One frame received from the stream
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WireMessage {
    Text(String),
    Binary(Vec<u8>),
}

/// Lifecycle and delivery events emitted by a connection task
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The handshake completed
    Opened,
    /// One inbound frame
    Message(WireMessage),
    /// Transport trouble; a close event follows separately
    Error(String),
    /// The server or the network ended the connection, with a close code
    Closed(u16),
}

/// A connection event tagged with the generation that produced it
#[derive(Clone, Debug)]
pub struct SessionEvent {
    pub conn: ConnId,
    pub event: ConnectionEvent,
}

/// Handle owning a live connection task.
///
/// The task is governed by the cancellation token: cancelling detaches the
/// session from the connection, and a cancelled task emits nothing further.
/// Dropping the handle cancels too.
pub struct ConnectionHandle {
    id: ConnId,
    identity: StreamIdentity,
    cancel: CancellationToken,
}

impl ConnectionHandle {
    pub fn new(id: ConnId, identity: StreamIdentity, cancel: CancellationToken) -> Self {
        Self {
            id,
            identity,
            cancel,
        }
    }

    pub fn id(&self) -> ConnId {
        self.id
    }

    pub fn identity(&self) -> &StreamIdentity {
        &self.identity
    }

    /// Detach from the connection; the task closes the socket and goes away
    /// without emitting a close event
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Opens connection tasks for a stream identity. The seam exists so session
/// logic can be driven by a scripted connector in tests.
pub trait Connector: Send + Sync {
    fn connect(
        &self,
        identity: &StreamIdentity,
        conn: ConnId,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> ConnectionHandle;
}

/// Real WebSocket connector addressing `<endpoint>/<identity>`
pub struct WsConnector {
    endpoint: String,
}

impl WsConnector {
    /// `endpoint` carries scheme and host, e.g. `wss://example.com`
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }

    fn stream_url(&self, identity: &StreamIdentity) -> String {
        format!("{}/{}", self.endpoint.trim_end_matches('/'), identity)
    }
}

impl Connector for WsConnector {
    fn connect(
        &self,
        identity: &StreamIdentity,
        conn: ConnId,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> ConnectionHandle {
        let url = self.stream_url(identity);
        let cancel = CancellationToken::new();
        let _task = tokio::spawn(run_connection(url, conn, events, cancel.clone()));
        ConnectionHandle::new(conn, identity.clone(), cancel)
    }
}

fn emit(events: &mpsc::UnboundedSender<SessionEvent>, conn: ConnId, event: ConnectionEvent) {
    let _ = events.send(SessionEvent { conn, event });
}

async fn run_connection(
    url: String,
    conn: ConnId,
    events: mpsc::UnboundedSender<SessionEvent>,
    cancel: CancellationToken,
) {
    let mut ws = tokio::select! {
        _ = cancel.cancelled() => return,

        connected = connect_async(&url) => match connected {
            Ok((ws, _response)) => ws,
            Err(e) => {
                tracing::debug!(%url, error = %e, "debug stream connect failed");
                emit(&events, conn, ConnectionEvent::Error(e.to_string()));
                emit(&events, conn, ConnectionEvent::Closed(CLOSE_ABNORMAL));
                return;
            }
        }
    };

    tracing::debug!(%url, %conn, "debug stream connected");
    emit(&events, conn, ConnectionEvent::Opened);

    let close_code = loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = ws.close(None).await;
                return;
            }

            frame = ws.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    emit(&events, conn, ConnectionEvent::Message(WireMessage::Text(text)));
                }
                Some(Ok(Message::Binary(bytes))) => {
                    emit(&events, conn, ConnectionEvent::Message(WireMessage::Binary(bytes)));
                }
                Some(Ok(Message::Close(frame))) => {
                    break frame.map(|f| u16::from(f.code)).unwrap_or(CLOSE_NO_STATUS);
                }
                // Ping/pong is answered by the protocol layer
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(error = %e, "debug stream read failed");
                    emit(&events, conn, ConnectionEvent::Error(e.to_string()));
                    break CLOSE_ABNORMAL;
                }
                None => break CLOSE_ABNORMAL,
            }
        }
    };

    if !cancel.is_cancelled() {
        emit(&events, conn, ConnectionEvent::Closed(close_code));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::SinkExt;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> SessionEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for connection event")
            .expect("event channel closed")
    }

    #[tokio::test]
    async fn test_delivers_frames_and_close_code() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            ws.send(Message::Text("alpha".to_string())).await.unwrap();
            ws.send(Message::Text("beta".to_string())).await.unwrap();
            ws.close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "".into(),
            }))
            .await
            .unwrap();
            while ws.next().await.is_some() {}
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        let connector = WsConnector::new(format!("ws://{}", addr));
        let handle = connector.connect(&StreamIdentity::new("rTestAccount1"), ConnId::new(1), tx);

        let opened = next_event(&mut rx).await;
        assert_eq!(opened.conn, ConnId::new(1));
        assert_eq!(opened.event, ConnectionEvent::Opened);

        assert_eq!(
            next_event(&mut rx).await.event,
            ConnectionEvent::Message(WireMessage::Text("alpha".to_string()))
        );
        assert_eq!(
            next_event(&mut rx).await.event,
            ConnectionEvent::Message(WireMessage::Text("beta".to_string()))
        );
        assert_eq!(next_event(&mut rx).await.event, ConnectionEvent::Closed(1000));

        server.await.unwrap();
        drop(handle);
    }

    #[tokio::test]
    async fn test_connect_failure_reports_abnormal_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let connector = WsConnector::new(format!("ws://{}", addr));
        let _handle = connector.connect(&StreamIdentity::new("rTestAccount1"), ConnId::new(7), tx);

        assert!(matches!(
            next_event(&mut rx).await.event,
            ConnectionEvent::Error(_)
        ));
        assert_eq!(
            next_event(&mut rx).await.event,
            ConnectionEvent::Closed(CLOSE_ABNORMAL)
        );
    }

    #[tokio::test]
    async fn test_shutdown_emits_no_close_event() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            while ws.next().await.is_some() {}
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        let connector = WsConnector::new(format!("ws://{}", addr));
        let handle = connector.connect(&StreamIdentity::new("rTestAccount1"), ConnId::new(2), tx);

        assert_eq!(next_event(&mut rx).await.event, ConnectionEvent::Opened);

        handle.shutdown();
        let remaining = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for channel close");
        assert!(remaining.is_none());

        server.await.unwrap();
    }

    #[test]
    fn test_stream_url_handles_trailing_slash() {
        let connector = WsConnector::new("wss://example.com/");
        assert_eq!(
            connector.stream_url(&StreamIdentity::new("rAbc")),
            "wss://example.com/rAbc"
        );
    }
}
