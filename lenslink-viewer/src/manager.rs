//! Connection manager: transport selection and fallback, session
//! supervision, ordered event delivery. Owns the core state machine and
//! executes the actions it returns; all decisions live in the core.

use std::collections::VecDeque;
use std::sync::Arc;

use lenslink_core::core::{Action, ConnectionState, LinkCore};
use lenslink_core::wire::FrameEnvelope;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::discovery;
use crate::dispatch::{event_queue, EventSink, EventStream};
use crate::heartbeat::{self, HEARTBEAT_INTERVAL};
use crate::session::{Session, SessionEvent, CONNECT_TIMEOUT};

/// Public handle to one logical session. `start` spawns the worker and
/// returns immediately; every outcome, including total connect failure,
/// arrives as an event on the returned stream.
pub struct LinkManager {
    stop_tx: Arc<watch::Sender<bool>>,
    worker: JoinHandle<()>,
}

impl LinkManager {
    /// Begin asynchronous connection establishment: wired channel first,
    /// wireless discovery as fallback. Must be called within a tokio
    /// runtime. Never fails synchronously.
    pub fn start(config: Config) -> (LinkManager, EventStream) {
        let (events_tx, events_rx) = event_queue();
        let (stop_tx, stop_rx) = watch::channel(false);
        let worker = tokio::spawn(run_link(config, events_tx, stop_rx));
        (
            LinkManager {
                stop_tx: Arc::new(stop_tx),
                worker,
            },
            events_rx,
        )
    }

    /// Tear down the active session and heartbeat monitor. Safe from any
    /// context; repeated calls and calls after closure are no-ops.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Detached handle for contexts that outlive the manager borrow, such as
    /// a signal-handling task.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            stop_tx: self.stop_tx.clone(),
        }
    }

    /// Wait for the worker to finish. After this returns, no further events
    /// are emitted.
    pub async fn join(self) {
        let _ = self.worker.await;
    }
}

/// Cloneable handle that requests teardown from any context. Same guarantees
/// as [`LinkManager::stop`].
#[derive(Clone)]
pub struct StopHandle {
    stop_tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }
}

/// Drive one logical session from first connect attempt to terminal close.
async fn run_link(config: Config, events: EventSink, mut stop: watch::Receiver<bool>) {
    let mut core = LinkCore::new(config.stream_port);
    let sid = core.session_id();
    let mut session: Option<Session> = None;
    let mut session_rx: Option<mpsc::UnboundedReceiver<SessionEvent>> = None;
    let mut hb_stop: Option<watch::Sender<bool>> = None;

    let mut pending: VecDeque<Action> = core.start().into();

    loop {
        while let Some(action) = pending.pop_front() {
            match action {
                Action::Emit(event) => events.emit(event),
                Action::Connect(endpoint) => {
                    info!(session = %sid, kind = ?endpoint.kind, addr = %endpoint.addr, "connecting");
                    match Session::open(&endpoint, CONNECT_TIMEOUT).await {
                        Ok((s, rx)) => {
                            session = Some(s);
                            session_rx = Some(rx);
                            pending.extend(core.on_open());
                        }
                        Err(e) => {
                            warn!(session = %sid, kind = ?endpoint.kind, error = %e, "connect attempt failed");
                            pending.extend(core.on_connect_failed());
                        }
                    }
                }
                Action::Discover => match discovery::locate(config.discovery_dest()).await {
                    Ok(addr) => {
                        info!(session = %sid, %addr, "streamer located");
                        pending.extend(core.on_discovered(addr));
                    }
                    Err(e) => {
                        warn!(session = %sid, error = %e, "discovery failed");
                        pending.extend(core.on_discovery_failed());
                    }
                },
                Action::StartHeartbeat => {
                    if let Some(s) = &session {
                        let (tx, rx) = watch::channel(false);
                        tokio::spawn(heartbeat::run_monitor(s.clone(), HEARTBEAT_INTERVAL, rx));
                        hb_stop = Some(tx);
                    }
                }
                Action::StopHeartbeat => {
                    if let Some(tx) = hb_stop.take() {
                        let _ = tx.send(true);
                    }
                }
                Action::CloseSession => {
                    if let Some(s) = &session {
                        s.close();
                    }
                }
            }
        }

        if core.state() == &ConnectionState::Closing {
            pending.extend(core.on_teardown_complete());
            continue;
        }
        if core.is_closed() {
            break;
        }
        if *stop.borrow_and_update() {
            pending.extend(core.on_stop());
            continue;
        }

        // After draining, a live core is always Open with a session.
        let Some(rx) = session_rx.as_mut() else { break };
        tokio::select! {
            changed = stop.changed() => {
                // A dropped handle counts as a stop request.
                let _ = changed;
                pending.extend(core.on_stop());
            }
            event = rx.recv() => match event {
                Some(SessionEvent::Frame(envelope)) => {
                    if let FrameEnvelope::Text(text) = &envelope {
                        debug!(session = %sid, control = %text, "control message");
                    }
                    match core.on_envelope(&envelope) {
                        Ok(actions) => pending.extend(actions),
                        Err(e) => {
                            warn!(session = %sid, error = %e, "dropping undecodable frame");
                        }
                    }
                }
                Some(SessionEvent::Closed(reason)) => pending.extend(core.on_remote_close(reason)),
                Some(SessionEvent::Error(message)) => {
                    pending.extend(core.on_transport_error(message));
                }
                None => pending.extend(core.on_transport_error("session channel closed".to_string())),
            },
        }
    }

    // Every exit path releases the monitor and the session.
    if let Some(tx) = hb_stop.take() {
        let _ = tx.send(true);
    }
    if let Some(s) = &session {
        s.close();
    }
    info!(session = %sid, "link worker finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use lenslink_core::announce;
    use lenslink_core::wire::encode_frame;
    use lenslink_core::{ConnectionEvent, DistortionParameters};
    use std::net::{IpAddr, Ipv4Addr};
    use tokio::net::{TcpListener, UdpSocket};
    use tokio_tungstenite::tungstenite::Message;

    fn test_config(stream_port: u16, discovery_port: u16) -> Config {
        Config {
            stream_port,
            discovery_port,
            discovery_group: IpAddr::V4(Ipv4Addr::LOCALHOST),
        }
    }

    /// A port that refuses connections: bind, read the port, drop.
    async fn refused_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        port
    }

    /// Streamer that sends the given parameter frames, then closes.
    async fn spawn_streamer(frames: Vec<DistortionParameters>) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            for params in &frames {
                ws.send(Message::Binary(encode_frame(params).into()))
                    .await
                    .unwrap();
            }
            ws.close(None).await.unwrap();
            while ws.next().await.is_some() {}
        });
        port
    }

    /// Discovery responder on loopback advertising `stream_port`.
    async fn spawn_responder(stream_port: u16) -> u16 {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = socket.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut buf = [0u8; 64];
            while let Ok((n, from)) = socket.recv_from(&mut buf).await {
                if announce::parse_probe(&buf[..n]).is_ok() {
                    let _ = socket.send_to(&announce::encode_reply(stream_port), from).await;
                }
            }
        });
        port
    }

    #[tokio::test]
    async fn wired_connect_streams_frames_in_order() {
        let expected = vec![
            DistortionParameters { k1: 0.30, k2: 0.04 },
            DistortionParameters { k1: 0.31, k2: 0.04 },
            DistortionParameters { k1: 0.32, k2: 0.05 },
        ];
        let port = spawn_streamer(expected.clone()).await;
        let (manager, mut events) = LinkManager::start(test_config(port, 1));

        assert_eq!(events.next().await, Some(ConnectionEvent::Connected));
        for params in &expected {
            assert_eq!(
                events.next().await,
                Some(ConnectionEvent::FrameDecoded(*params))
            );
        }
        match events.next().await {
            Some(ConnectionEvent::Disconnected(_)) => {}
            other => panic!("expected Disconnected, got {other:?}"),
        }
        assert_eq!(events.next().await, None);
        manager.join().await;
    }

    #[tokio::test]
    async fn falls_back_to_discovered_endpoint() {
        let wired_port = refused_port().await;
        let stream_port = spawn_streamer(vec![DistortionParameters { k1: 0.30, k2: 0.04 }]).await;
        let discovery_port = spawn_responder(stream_port).await;

        let (manager, mut events) =
            LinkManager::start(test_config(wired_port, discovery_port));

        assert_eq!(events.next().await, Some(ConnectionEvent::Connected));
        assert_eq!(
            events.next().await,
            Some(ConnectionEvent::FrameDecoded(DistortionParameters {
                k1: 0.30,
                k2: 0.04
            }))
        );
        match events.next().await {
            Some(ConnectionEvent::Disconnected(_)) => {}
            other => panic!("expected Disconnected, got {other:?}"),
        }
        // Exactly one Connected for the whole fallback sequence.
        assert_eq!(events.next().await, None);
        manager.join().await;
    }

    #[tokio::test]
    async fn reports_error_when_no_transport_available() {
        let wired_port = refused_port().await;
        // Discovery probes go to a socket that never answers.
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let discovery_port = silent.local_addr().unwrap().port();

        let (manager, mut events) =
            LinkManager::start(test_config(wired_port, discovery_port));
        match events.next().await {
            Some(ConnectionEvent::Error(message)) => {
                assert_eq!(message, "no transport available");
            }
            other => panic!("expected Error, got {other:?}"),
        }
        assert_eq!(events.next().await, None);
        manager.join().await;
    }

    #[tokio::test]
    async fn stop_twice_emits_one_disconnected() {
        // Streamer that holds the session open until the client closes.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            while ws.next().await.is_some() {}
        });

        let (manager, mut events) = LinkManager::start(test_config(port, 1));
        assert_eq!(events.next().await, Some(ConnectionEvent::Connected));

        manager.stop_handle().stop();
        manager.stop();
        assert_eq!(
            events.next().await,
            Some(ConnectionEvent::Disconnected("closed by caller".into()))
        );
        assert_eq!(events.next().await, None);
        manager.join().await;
    }

    #[tokio::test]
    async fn bad_frame_does_not_end_session() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            ws.send(Message::Binary(vec![1, 2, 3].into())).await.unwrap();
            ws.send(Message::Binary(
                encode_frame(&DistortionParameters { k1: 0.5, k2: 0.1 }).into(),
            ))
            .await
            .unwrap();
            ws.close(None).await.unwrap();
            while ws.next().await.is_some() {}
        });

        let (manager, mut events) = LinkManager::start(test_config(port, 1));
        assert_eq!(events.next().await, Some(ConnectionEvent::Connected));
        // The malformed frame is dropped; the next one still arrives.
        assert_eq!(
            events.next().await,
            Some(ConnectionEvent::FrameDecoded(DistortionParameters {
                k1: 0.5,
                k2: 0.1
            }))
        );
        match events.next().await {
            Some(ConnectionEvent::Disconnected(_)) => {}
            other => panic!("expected Disconnected, got {other:?}"),
        }
        manager.join().await;
    }
}
