//! Connector abstraction over the persistent duplex channel.
//!
//! The real socket implementation lives outside this workspace; the engine
//! only needs something that can authenticate a credential and hand back the
//! two directed halves of an established connection.  A loopback connector
//! ships here for tests and local development.

use async_trait::async_trait;
use tokio::sync::mpsc;

use curalink_shared::error::TransportError;
use curalink_shared::protocol::Frame;
use curalink_shared::types::{ParticipantRole, UserId};

/// Credential presented when opening the duplex channel.
#[derive(Debug, Clone)]
pub struct Credential {
    pub user_id: UserId,
    pub role: ParticipantRole,
    pub token: String,
}

/// The two directed halves of one established duplex connection.
pub struct Duplex {
    pub outbound: mpsc::Sender<Frame>,
    pub inbound: mpsc::Receiver<Frame>,
}

/// Opens authenticated duplex channels.  Called again by the session task for
/// every reconnect attempt.
#[async_trait]
pub trait Connector: Send + 'static {
    async fn connect(&mut self, credential: &Credential) -> Result<Duplex, TransportError>;
}

// ---------------------------------------------------------------------------
// Loopback
// ---------------------------------------------------------------------------

/// The far end of one loopback connection: frames the client sent arrive on
/// `inbound`, frames pushed into `outbound` are delivered to the client.
pub struct LoopbackPeer {
    pub inbound: mpsc::Receiver<Frame>,
    pub outbound: mpsc::Sender<Frame>,
}

/// In-process connector joining the session to a test or development harness.
/// Every `connect` call produces a fresh channel pair and hands the far end
/// to the acceptor, so reconnects behave like the real thing.
pub struct LoopbackConnector {
    accept_tx: mpsc::Sender<LoopbackPeer>,
    capacity: usize,
}

/// Build a loopback connector and the acceptor receiving its far ends.
pub fn loopback(capacity: usize) -> (LoopbackConnector, mpsc::Receiver<LoopbackPeer>) {
    let (accept_tx, accept_rx) = mpsc::channel(8);
    (
        LoopbackConnector {
            accept_tx,
            capacity,
        },
        accept_rx,
    )
}

#[async_trait]
impl Connector for LoopbackConnector {
    async fn connect(&mut self, _credential: &Credential) -> Result<Duplex, TransportError> {
        let (client_tx, peer_rx) = mpsc::channel(self.capacity);
        let (peer_tx, client_rx) = mpsc::channel(self.capacity);

        self.accept_tx
            .send(LoopbackPeer {
                inbound: peer_rx,
                outbound: peer_tx,
            })
            .await
            .map_err(|_| TransportError::ConnectionLost("loopback acceptor gone".into()))?;

        Ok(Duplex {
            outbound: client_tx,
            inbound: client_rx,
        })
    }
}
