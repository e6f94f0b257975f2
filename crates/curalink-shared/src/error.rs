use thiserror::Error;

use crate::types::UserId;

#[derive(Error, Debug)]
pub enum CuralinkError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Merge error: {0}")]
    Merge(#[from] MergeError),

    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("API error: {0}")]
    Api(String),
}

/// Failures of the duplex channel.  Never thrown synchronously from the
/// session task; commands fail individually and connection loss is reported
/// through session events.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Authentication rejected: {0}")]
    AuthRejected(String),

    #[error("Acknowledgement timed out after {0:?}")]
    AckTimeout(std::time::Duration),

    #[error("Could not encode outbound event: {0}")]
    Encode(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Session closed")]
    SessionClosed,
}

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed payload for '{event}': {source}")]
    MalformedPayload {
        event: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Payload serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// An inbound signal whose room could not be resolved.  Logged and dropped,
/// never propagated into the stores.
#[derive(Error, Debug)]
pub enum MergeError {
    #[error("No room found for counterpart {0}")]
    UnknownCounterpart(UserId),

    #[error("Could not resolve room identifier '{0}'")]
    UnresolvableRoom(String),
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Upload rejected: {0}")]
    Rejected(String),

    #[error("Upload failed: {0}")]
    Failed(String),
}

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Message has neither text nor attachment")]
    EmptyMessage,
}
