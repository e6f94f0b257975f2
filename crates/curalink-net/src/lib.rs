// Transport layer: one authenticated duplex channel per session, typed at
// the boundary.

pub mod connector;
pub mod session;

pub use connector::{loopback, Connector, Credential, Duplex, LoopbackConnector, LoopbackPeer};
pub use session::{spawn_session, Session, SessionCommand, SessionConfig, SessionEvent};
