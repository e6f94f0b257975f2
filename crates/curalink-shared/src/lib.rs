//! # curalink-shared
//!
//! Domain types, wire protocol, and the error taxonomy shared by every crate
//! of the Curalink conversation sync engine.

pub mod error;
pub mod models;
pub mod protocol;
pub mod types;

pub use error::{
    CuralinkError, MergeError, ProtocolError, TransportError, UploadError, ValidationError,
};
pub use models::*;
pub use types::{ConnectionState, MessageId, ParticipantRole, PendingId, RoomId, UserId};
