//! Transport session: one WebSocket connection. Writer task + read loop;
//! raw events go upward untouched — protocol interpretation happens in the
//! connection manager via the frame codec.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use lenslink_core::wire::FrameEnvelope;
use lenslink_core::Endpoint;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// Bound on the WebSocket handshake, per transport attempt.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Raw transport event, delivered to the connection manager untouched.
#[derive(Debug)]
pub enum SessionEvent {
    Frame(FrameEnvelope),
    /// Remote side completed the close handshake.
    Closed(String),
    /// Mid-session I/O failure.
    Error(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("connect timed out")]
    ConnectTimeout,
    #[error("websocket connect failed: {0}")]
    Connect(Box<tokio_tungstenite::tungstenite::Error>),
    #[error("session not open")]
    NotOpen,
}

enum Command {
    Send(Message),
    Close,
}

/// Handle to one open session. Clones share the same connection; `close` is
/// idempotent and safe from any context.
#[derive(Clone)]
pub struct Session {
    cmd_tx: mpsc::UnboundedSender<Command>,
    open: Arc<AtomicBool>,
}

impl Session {
    /// Open a session toward `endpoint`, bounded by `timeout`. Blocks the
    /// calling worker, never the consumer's context.
    pub async fn open(
        endpoint: &Endpoint,
        timeout: Duration,
    ) -> Result<(Session, mpsc::UnboundedReceiver<SessionEvent>), SessionError> {
        let connect = connect_async(endpoint.url());
        let (ws, _) = match tokio::time::timeout(timeout, connect).await {
            Ok(Ok(ok)) => ok,
            Ok(Err(e)) => return Err(SessionError::Connect(Box::new(e))),
            Err(_) => return Err(SessionError::ConnectTimeout),
        };

        let open = Arc::new(AtomicBool::new(true));
        let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<Command>();
        let (event_tx, event_rx) = mpsc::unbounded_channel::<SessionEvent>();
        let (mut sink, mut stream) = ws.split();

        let writer_open = open.clone();
        let writer_events = event_tx.clone();
        tokio::spawn(async move {
            while let Some(cmd) = cmd_rx.recv().await {
                match cmd {
                    Command::Send(msg) => {
                        if let Err(e) = sink.send(msg).await {
                            writer_open.store(false, Ordering::SeqCst);
                            let _ = writer_events.send(SessionEvent::Error(e.to_string()));
                            break;
                        }
                    }
                    Command::Close => {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
        });

        let reader_open = open.clone();
        tokio::spawn(async move {
            loop {
                match stream.next().await {
                    Some(Ok(Message::Binary(bytes))) => {
                        let _ = event_tx.send(SessionEvent::Frame(FrameEnvelope::Binary(
                            bytes.to_vec(),
                        )));
                    }
                    Some(Ok(Message::Text(text))) => {
                        let _ = event_tx
                            .send(SessionEvent::Frame(FrameEnvelope::Text(text.to_string())));
                    }
                    // Ping replies are handled by the protocol layer.
                    Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                    Some(Ok(Message::Close(frame))) => {
                        reader_open.store(false, Ordering::SeqCst);
                        let reason = frame
                            .map(|f| f.reason.to_string())
                            .filter(|r| !r.is_empty())
                            .unwrap_or_else(|| "closed by remote".to_string());
                        let _ = event_tx.send(SessionEvent::Closed(reason));
                        break;
                    }
                    Some(Err(e)) => {
                        reader_open.store(false, Ordering::SeqCst);
                        let _ = event_tx.send(SessionEvent::Error(e.to_string()));
                        break;
                    }
                    None => {
                        reader_open.store(false, Ordering::SeqCst);
                        let _ = event_tx.send(SessionEvent::Error("connection reset".to_string()));
                        break;
                    }
                }
            }
        });

        Ok((Session { cmd_tx, open }, event_rx))
    }

    /// Queue bytes for transmission. Best-effort once queued; fails with
    /// `NotOpen` outside the open state.
    pub fn send(&self, bytes: Vec<u8>) -> Result<(), SessionError> {
        if !self.is_open() {
            return Err(SessionError::NotOpen);
        }
        self.cmd_tx
            .send(Command::Send(Message::Binary(bytes.into())))
            .map_err(|_| SessionError::NotOpen)
    }

    /// Queue a protocol-level liveness probe.
    pub fn ping(&self) -> Result<(), SessionError> {
        if !self.is_open() {
            return Err(SessionError::NotOpen);
        }
        self.cmd_tx
            .send(Command::Send(Message::Ping(Vec::new().into())))
            .map_err(|_| SessionError::NotOpen)
    }

    /// Close the session. Idempotent: the second and later calls are no-ops.
    pub fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            let _ = self.cmd_tx.send(Command::Close);
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn bind_server() -> (std::net::SocketAddr, TcpListener) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        (addr, listener)
    }

    #[tokio::test]
    async fn receives_frames_then_remote_close() {
        let (addr, listener) = bind_server().await;
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            ws.send(Message::Text("status: ok".into())).await.unwrap();
            ws.send(Message::Binary(vec![9, 9, 9].into())).await.unwrap();
            ws.close(None).await.unwrap();
            while ws.next().await.is_some() {}
        });

        let ep = Endpoint::wireless(addr);
        let (session, mut rx) = Session::open(&ep, CONNECT_TIMEOUT).await.unwrap();

        match rx.recv().await {
            Some(SessionEvent::Frame(FrameEnvelope::Text(t))) => assert_eq!(t, "status: ok"),
            other => panic!("expected text frame, got {other:?}"),
        }
        match rx.recv().await {
            Some(SessionEvent::Frame(FrameEnvelope::Binary(b))) => assert_eq!(b, vec![9, 9, 9]),
            other => panic!("expected binary frame, got {other:?}"),
        }
        match rx.recv().await {
            Some(SessionEvent::Closed(_)) => {}
            other => panic!("expected close, got {other:?}"),
        }
        assert!(!session.is_open());
    }

    #[tokio::test]
    async fn connect_refused_reports_error() {
        let (addr, listener) = bind_server().await;
        drop(listener);
        let ep = Endpoint::wireless(addr);
        match Session::open(&ep, CONNECT_TIMEOUT).await {
            Err(SessionError::Connect(_)) => {}
            other => panic!("expected connect error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn handshake_stall_times_out() {
        // TCP accepts via the backlog but nobody answers the WS handshake.
        let (addr, _listener) = bind_server().await;
        let ep = Endpoint::wireless(addr);
        match Session::open(&ep, Duration::from_millis(100)).await {
            Err(SessionError::ConnectTimeout) => {}
            other => panic!("expected timeout, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn send_after_close_is_not_open() {
        let (addr, listener) = bind_server().await;
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            while ws.next().await.is_some() {}
        });

        let ep = Endpoint::wireless(addr);
        let (session, _rx) = Session::open(&ep, CONNECT_TIMEOUT).await.unwrap();
        assert!(session.send(vec![1]).is_ok());

        session.close();
        session.close();
        assert!(matches!(session.send(vec![2]), Err(SessionError::NotOpen)));
        assert!(matches!(session.ping(), Err(SessionError::NotOpen)));
    }
}
