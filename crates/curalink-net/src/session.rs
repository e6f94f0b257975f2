//! The transport session task.
//!
//! Owns the single live duplex channel for the authenticated user.  External
//! code talks to it through typed command and event channels; push frames are
//! validated at this boundary and fanned out as [`ServerEvent`]s.  Reconnects
//! run inside the task with exponential backoff; the components above only
//! see `Connected` / `Disconnected` events and are responsible for re-joining
//! rooms and re-requesting unread snapshots themselves.

use std::collections::HashMap;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use curalink_shared::error::TransportError;
use curalink_shared::protocol::{ClientEvent, Frame, ServerEvent};

use crate::connector::{Connector, Credential, Duplex};

// ---------------------------------------------------------------------------
// Command / event types
// ---------------------------------------------------------------------------

/// Commands sent *into* the session task.
#[derive(Debug)]
pub enum SessionCommand {
    /// Fire-and-forget emit.
    Emit(ClientEvent),
    /// Emit with a direct acknowledgement, correlated by ack id.
    EmitAck {
        event: ClientEvent,
        reply: oneshot::Sender<Result<serde_json::Value, TransportError>>,
    },
    /// Register a push-event receiver under a stable key.  Re-subscribing
    /// under the same key replaces the previous receiver, so repeated
    /// registration never causes duplicate delivery.
    Subscribe {
        key: String,
        tx: mpsc::Sender<ServerEvent>,
    },
    Unsubscribe(String),
    /// Gracefully shut down the session.
    Shutdown,
}

/// Events sent *from* the session task to the application.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Connected {
        /// True when this connection follows an earlier one; the caller must
        /// re-join rooms and re-request unread snapshots.
        resumed: bool,
    },
    Disconnected {
        reason: String,
        /// False only when the session has given up (auth rejected).
        retrying: bool,
    },
    /// A validated push event.
    Event(ServerEvent),
}

/// Session tuning knobs.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Bounded wait for `emit_ack` before it resolves to failure.
    pub ack_timeout: Duration,
    /// Capacity of every channel the session creates.
    pub channel_capacity: usize,
    /// First reconnect delay; doubled per consecutive failure.
    pub reconnect_initial: Duration,
    /// Upper bound on the reconnect delay.
    pub reconnect_max: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_secs(10),
            channel_capacity: 256,
            reconnect_initial: Duration::from_millis(500),
            reconnect_max: Duration::from_secs(30),
        }
    }
}

// ---------------------------------------------------------------------------
// Session handle
// ---------------------------------------------------------------------------

/// Cloneable handle to the session task.
#[derive(Clone)]
pub struct Session {
    cmd_tx: mpsc::Sender<SessionCommand>,
    ack_timeout: Duration,
    channel_capacity: usize,
}

impl Session {
    pub async fn emit(&self, event: ClientEvent) -> Result<(), TransportError> {
        self.cmd_tx
            .send(SessionCommand::Emit(event))
            .await
            .map_err(|_| TransportError::SessionClosed)
    }

    /// Emit and wait for the server's direct acknowledgement.  Resolves to an
    /// explicit failure after the configured timeout rather than hanging.
    pub async fn emit_ack(
        &self,
        event: ClientEvent,
    ) -> Result<serde_json::Value, TransportError> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(SessionCommand::EmitAck { event, reply })
            .await
            .map_err(|_| TransportError::SessionClosed)?;

        match tokio::time::timeout(self.ack_timeout, rx).await {
            Err(_) => Err(TransportError::AckTimeout(self.ack_timeout)),
            Ok(Err(_)) => Err(TransportError::SessionClosed),
            Ok(Ok(result)) => result,
        }
    }

    /// Register (or replace) the push-event receiver for `key`.
    pub async fn subscribe(&self, key: &str) -> Result<mpsc::Receiver<ServerEvent>, TransportError> {
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        self.cmd_tx
            .send(SessionCommand::Subscribe {
                key: key.to_string(),
                tx,
            })
            .await
            .map_err(|_| TransportError::SessionClosed)?;
        Ok(rx)
    }

    pub async fn unsubscribe(&self, key: &str) -> Result<(), TransportError> {
        self.cmd_tx
            .send(SessionCommand::Unsubscribe(key.to_string()))
            .await
            .map_err(|_| TransportError::SessionClosed)
    }

    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(SessionCommand::Shutdown).await;
    }
}

/// Spawn the session task.
///
/// Returns the command handle and the primary event receiver.  Connection
/// errors are never thrown from here; they surface as `Disconnected` events
/// while the task retries with backoff.
pub fn spawn_session<C: Connector>(
    connector: C,
    credential: Credential,
    config: SessionConfig,
) -> (Session, mpsc::Receiver<SessionEvent>) {
    let (cmd_tx, cmd_rx) = mpsc::channel(config.channel_capacity);
    let (events_tx, events_rx) = mpsc::channel(config.channel_capacity);

    let session = Session {
        cmd_tx,
        ack_timeout: config.ack_timeout,
        channel_capacity: config.channel_capacity,
    };

    let task = SessionTask {
        connector,
        credential,
        config,
        cmd_rx,
        events_tx,
        subscribers: HashMap::new(),
        pending_acks: HashMap::new(),
        next_ack: 1,
    };
    tokio::spawn(task.run());

    (session, events_rx)
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

enum LinkOutcome {
    Shutdown,
    Lost(String),
}

struct SessionTask<C> {
    connector: C,
    credential: Credential,
    config: SessionConfig,
    cmd_rx: mpsc::Receiver<SessionCommand>,
    events_tx: mpsc::Sender<SessionEvent>,
    subscribers: HashMap<String, mpsc::Sender<ServerEvent>>,
    pending_acks: HashMap<u64, oneshot::Sender<Result<serde_json::Value, TransportError>>>,
    next_ack: u64,
}

impl<C: Connector> SessionTask<C> {
    async fn run(mut self) {
        // Consecutive failed connect attempts; 0 means connect immediately.
        let mut attempt: u32 = 0;
        let mut had_session = false;

        'connect: loop {
            if attempt > 0 && self.wait_backoff(attempt).await {
                break 'connect;
            }

            match self.connector.connect(&self.credential).await {
                Ok(duplex) => {
                    attempt = 0;
                    let resumed = had_session;
                    had_session = true;
                    info!(resumed, "Duplex channel established");
                    let _ = self
                        .events_tx
                        .send(SessionEvent::Connected { resumed })
                        .await;

                    match self.run_connected(duplex).await {
                        LinkOutcome::Shutdown => break 'connect,
                        LinkOutcome::Lost(reason) => {
                            warn!(reason = %reason, "Duplex channel lost");
                            self.fail_pending(&reason);
                            let _ = self
                                .events_tx
                                .send(SessionEvent::Disconnected {
                                    reason,
                                    retrying: true,
                                })
                                .await;
                            attempt = 1;
                        }
                    }
                }
                Err(TransportError::AuthRejected(reason)) => {
                    error!(reason = %reason, "Authentication rejected, giving up");
                    self.fail_pending(&reason);
                    let _ = self
                        .events_tx
                        .send(SessionEvent::Disconnected {
                            reason,
                            retrying: false,
                        })
                        .await;
                    // Keep serving commands (each fails individually) until
                    // the owner shuts the session down.
                    while let Some(cmd) = self.cmd_rx.recv().await {
                        if self.handle_command_offline(cmd) {
                            break;
                        }
                    }
                    break 'connect;
                }
                Err(err) => {
                    warn!(error = %err, attempt, "Connect attempt failed");
                    if attempt == 0 {
                        let _ = self
                            .events_tx
                            .send(SessionEvent::Disconnected {
                                reason: err.to_string(),
                                retrying: true,
                            })
                            .await;
                    }
                    attempt = attempt.saturating_add(1);
                }
            }
        }

        info!("Session task terminated");
    }

    /// Sleep out the backoff while still serving commands.  Returns true on
    /// shutdown.
    async fn wait_backoff(&mut self, attempt: u32) -> bool {
        let delay = backoff_delay(&self.config, attempt);
        debug!(?delay, attempt, "Waiting before reconnect attempt");
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return false,
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(cmd) => {
                        if self.handle_command_offline(cmd) {
                            return true;
                        }
                    }
                    None => return true,
                },
            }
        }
    }

    /// Serve commands while no duplex is up.  Returns true on shutdown.
    fn handle_command_offline(&mut self, cmd: SessionCommand) -> bool {
        match cmd {
            SessionCommand::Emit(event) => {
                debug!(event = event.name(), "Emit while disconnected, dropped");
            }
            SessionCommand::EmitAck { event, reply } => {
                debug!(event = event.name(), "Emit-ack while disconnected, failing");
                let _ = reply.send(Err(TransportError::NotConnected));
            }
            SessionCommand::Subscribe { key, tx } => {
                self.subscribers.insert(key, tx);
            }
            SessionCommand::Unsubscribe(key) => {
                self.subscribers.remove(&key);
            }
            SessionCommand::Shutdown => return true,
        }
        false
    }

    async fn run_connected(&mut self, mut duplex: Duplex) -> LinkOutcome {
        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        None | Some(SessionCommand::Shutdown) => {
                            info!("Session shutdown requested");
                            return LinkOutcome::Shutdown;
                        }
                        Some(SessionCommand::Emit(event)) => {
                            let name = event.name();
                            match event.into_frame() {
                                Ok(frame) => {
                                    if duplex.outbound.send(frame).await.is_err() {
                                        return LinkOutcome::Lost("outbound channel closed".into());
                                    }
                                }
                                Err(e) => warn!(event = name, error = %e, "Failed to encode event"),
                            }
                        }
                        Some(SessionCommand::EmitAck { event, reply }) => {
                            self.reap_abandoned_acks();
                            let name = event.name();
                            match event.into_frame() {
                                Ok(mut frame) => {
                                    let id = self.next_ack;
                                    self.next_ack += 1;
                                    frame.ack = Some(id);
                                    if duplex.outbound.send(frame).await.is_err() {
                                        let _ = reply.send(Err(TransportError::ConnectionLost(
                                            "outbound channel closed".into(),
                                        )));
                                        return LinkOutcome::Lost("outbound channel closed".into());
                                    }
                                    self.pending_acks.insert(id, reply);
                                }
                                Err(e) => {
                                    warn!(event = name, error = %e, "Failed to encode event");
                                    let _ = reply.send(Err(TransportError::Encode(e.to_string())));
                                }
                            }
                        }
                        Some(SessionCommand::Subscribe { key, tx }) => {
                            self.subscribers.insert(key, tx);
                        }
                        Some(SessionCommand::Unsubscribe(key)) => {
                            self.subscribers.remove(&key);
                        }
                    }
                }

                frame = duplex.inbound.recv() => {
                    match frame {
                        Some(frame) => self.handle_inbound(frame).await,
                        None => return LinkOutcome::Lost("inbound channel closed".into()),
                    }
                }
            }
        }
    }

    async fn handle_inbound(&mut self, frame: Frame) {
        // Acknowledgement frames resolve a pending command; they never reach
        // the push pipeline.
        if let Some(id) = frame.ack {
            match self.pending_acks.remove(&id) {
                Some(reply) => {
                    let _ = reply.send(Ok(frame.payload));
                }
                None => debug!(id, "Acknowledgement for unknown or timed-out command"),
            }
            return;
        }

        match ServerEvent::from_frame(&frame) {
            Ok(Some(event)) => {
                let _ = self.events_tx.send(SessionEvent::Event(event.clone())).await;

                let mut dead = Vec::new();
                for (key, tx) in &self.subscribers {
                    if tx.send(event.clone()).await.is_err() {
                        dead.push(key.clone());
                    }
                }
                for key in dead {
                    debug!(key = %key, "Dropping closed subscriber");
                    self.subscribers.remove(&key);
                }
            }
            Ok(None) => debug!(event = %frame.event, "Ignoring unhandled event"),
            Err(e) => warn!(error = %e, "Dropping malformed inbound frame"),
        }
    }

    /// Drop pending-ack entries whose caller already timed out.
    fn reap_abandoned_acks(&mut self) {
        self.pending_acks.retain(|_, reply| !reply.is_closed());
    }

    fn fail_pending(&mut self, reason: &str) {
        for (_, reply) in self.pending_acks.drain() {
            let _ = reply.send(Err(TransportError::ConnectionLost(reason.to_string())));
        }
    }
}

fn backoff_delay(config: &SessionConfig, attempt: u32) -> Duration {
    let base = config
        .reconnect_initial
        .saturating_mul(1u32 << (attempt - 1).min(16))
        .min(config.reconnect_max);
    let jitter_ceiling = (base.as_millis() as u64 / 4).max(1);
    let jitter = rand::thread_rng().gen_range(0..jitter_ceiling);
    base + Duration::from_millis(jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{loopback, LoopbackPeer};
    use curalink_shared::protocol::SendMessagePayload;
    use curalink_shared::types::{ParticipantRole, RoomId, UserId};

    fn credential() -> Credential {
        Credential {
            user_id: UserId::from("u1"),
            role: ParticipantRole::Customer,
            token: "t".into(),
        }
    }

    fn quick_config() -> SessionConfig {
        SessionConfig {
            ack_timeout: Duration::from_millis(100),
            channel_capacity: 32,
            reconnect_initial: Duration::from_millis(10),
            reconnect_max: Duration::from_millis(50),
        }
    }

    async fn start() -> (Session, mpsc::Receiver<SessionEvent>, mpsc::Receiver<LoopbackPeer>) {
        let (connector, accept_rx) = loopback(32);
        let (session, events_rx) = spawn_session(connector, credential(), quick_config());
        (session, events_rx, accept_rx)
    }

    fn send_message_event() -> ClientEvent {
        ClientEvent::SendMessage(SendMessagePayload {
            room_id: RoomId::from("room-1"),
            sender_id: UserId::from("u1"),
            sender_type: ParticipantRole::Customer,
            content: Some("hello".into()),
            file_link: None,
            file_type: None,
            file_name: None,
        })
    }

    fn push_message_frame(id: &str) -> Frame {
        Frame::new(
            "newMessage",
            serde_json::json!({
                "id": id,
                "roomId": "room-1",
                "senderId": "u2",
                "senderType": "EXPERT",
                "content": "hi",
                "timestamp": "2026-03-02T10:00:00Z",
            }),
        )
    }

    #[tokio::test]
    async fn test_emit_reaches_the_wire() {
        let (session, mut events, mut accept) = start().await;
        let mut peer = accept.recv().await.unwrap();
        assert!(matches!(events.recv().await, Some(SessionEvent::Connected { resumed: false })));

        session
            .emit(ClientEvent::JoinChat {
                room_id: RoomId::from("room-1"),
                user_id: UserId::from("u1"),
            })
            .await
            .unwrap();

        let frame = peer.inbound.recv().await.unwrap();
        assert_eq!(frame.event, "joinChat");
        assert_eq!(frame.payload["roomId"], "room-1");
        assert_eq!(frame.ack, None);
    }

    #[tokio::test]
    async fn test_emit_ack_resolves_with_server_reply() {
        let (session, mut events, mut accept) = start().await;
        let mut peer = accept.recv().await.unwrap();
        assert!(matches!(events.recv().await, Some(SessionEvent::Connected { .. })));

        let answer = tokio::spawn(async move {
            let frame = peer.inbound.recv().await.unwrap();
            assert_eq!(frame.event, "sendMessage");
            let id = frame.ack.expect("ack id");
            peer.outbound
                .send(Frame {
                    event: "ack".into(),
                    payload: serde_json::json!({"id": "s1"}),
                    ack: Some(id),
                })
                .await
                .unwrap();
            peer
        });

        let reply = session.emit_ack(send_message_event()).await.unwrap();
        assert_eq!(reply["id"], "s1");
        answer.await.unwrap();
    }

    #[tokio::test]
    async fn test_emit_ack_times_out() {
        let (session, mut events, mut accept) = start().await;
        let _peer = accept.recv().await.unwrap();
        assert!(matches!(events.recv().await, Some(SessionEvent::Connected { .. })));

        // The peer never answers.
        let err = session.emit_ack(send_message_event()).await.unwrap_err();
        assert!(matches!(err, TransportError::AckTimeout(_)));
    }

    #[tokio::test]
    async fn test_resubscribe_replaces_previous_receiver() {
        let (session, mut events, mut accept) = start().await;
        let mut peer = accept.recv().await.unwrap();
        assert!(matches!(events.recv().await, Some(SessionEvent::Connected { .. })));

        let mut first = session.subscribe("bridge").await.unwrap();
        let mut second = session.subscribe("bridge").await.unwrap();

        // Commands are processed in order; once this emit shows up on the
        // wire, both subscribe commands have been applied.
        session.emit(ClientEvent::GetUnreadCount).await.unwrap();
        let barrier = peer.inbound.recv().await.unwrap();
        assert_eq!(barrier.event, "getUnreadCount");

        peer.outbound.send(push_message_frame("m1")).await.unwrap();

        let got = second.recv().await.unwrap();
        assert!(matches!(got, ServerEvent::NewMessage(_)));

        // The replaced receiver saw nothing.
        assert!(matches!(
            first.try_recv(),
            Err(mpsc::error::TryRecvError::Empty | mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[tokio::test]
    async fn test_malformed_frames_do_not_kill_the_session() {
        let (_session, mut events, mut accept) = start().await;
        let peer = accept.recv().await.unwrap();
        assert!(matches!(events.recv().await, Some(SessionEvent::Connected { .. })));

        // Known event, garbage payload: dropped with a warning.
        peer.outbound
            .send(Frame::new("newMessage", serde_json::json!({"id": 42})))
            .await
            .unwrap();
        // Unknown event: ignored.
        peer.outbound
            .send(Frame::new("callOffer", serde_json::json!({})))
            .await
            .unwrap();
        // A well-formed push still arrives.
        peer.outbound.send(push_message_frame("m2")).await.unwrap();

        match events.recv().await {
            Some(SessionEvent::Event(ServerEvent::NewMessage(payload))) => {
                assert_eq!(payload.id.as_str(), "m2");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_reconnect_after_link_loss() {
        let (session, mut events, mut accept) = start().await;
        let peer = accept.recv().await.unwrap();
        assert!(matches!(events.recv().await, Some(SessionEvent::Connected { resumed: false })));

        // Sever the link by dropping the far end.
        drop(peer);

        assert!(matches!(
            events.recv().await,
            Some(SessionEvent::Disconnected { retrying: true, .. })
        ));

        // The task reconnects on its own and the new link carries traffic.
        let mut peer2 = accept.recv().await.unwrap();
        assert!(matches!(events.recv().await, Some(SessionEvent::Connected { resumed: true })));

        session
            .emit(ClientEvent::GetAllChatUnreadCounts)
            .await
            .unwrap();
        let frame = peer2.inbound.recv().await.unwrap();
        assert_eq!(frame.event, "getAllChatUnreadCounts");
    }

    #[tokio::test]
    async fn test_link_loss_fails_inflight_acks() {
        let (session, mut events, mut accept) = start().await;
        let mut peer = accept.recv().await.unwrap();
        assert!(matches!(events.recv().await, Some(SessionEvent::Connected { .. })));

        let killer = tokio::spawn(async move {
            // Swallow the command, then drop the link instead of answering.
            let _ = peer.inbound.recv().await;
            drop(peer);
        });

        let err = session.emit_ack(send_message_event()).await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::ConnectionLost(_) | TransportError::AckTimeout(_)
        ));
        killer.await.unwrap();
    }
}
