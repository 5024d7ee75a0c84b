use thiserror::Error;

/// errors surfaced at the link/mux boundary
///
/// anything below this (io errors, noise errors, codec errors) is
/// mapped into one of these variants before it crosses into the
/// router; callers above the link boundary only ever see `NetError`.
#[derive(Debug, Error)]
pub enum NetError {
    #[error("handshake with remote failed")]
    HandshakeFailed(#[source] anyhow::Error),

    #[error("remote identity was rejected")]
    Rejected,

    #[error("link lost")]
    LinkLost,

    #[error("no route to target")]
    RouteNotFound,

    #[error("the new router refused to take over this query")]
    RerouteRejected,

    #[error("operation timed out")]
    Timeout,

    #[error("operation cancelled")]
    Cancelled,

    #[error("protocol violation: {0}")]
    ProtocolError(String),

    #[error("no free stream ids remain on this link")]
    NoStreamIds,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("a handler is already registered for this name")]
    AlreadyRegistered,
}
