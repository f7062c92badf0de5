/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The requested operation is already running.
    ///
    /// Some device-to-device stacks report a second `start_advertising`
    /// or `start_discovery` as an error even though the first one is
    /// still active. The connection manager compensates this into
    /// success; it is never a user-facing failure.
    #[error("{0} already in progress")]
    AlreadyInProgress(&'static str),

    /// The endpoint is not known to the medium (never discovered, or
    /// it stopped advertising).
    #[error("unknown endpoint: {0}")]
    UnknownEndpoint(String),

    /// There is no pending connection with this endpoint to accept or
    /// reject.
    #[error("no pending connection with endpoint {0}")]
    NoPendingConnection(String),

    /// Sending a payload requires an established connection.
    #[error("not connected to endpoint {0}")]
    NotConnected(String),

    /// Sending data failed on an established connection.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// The underlying socket or listener failed.
    #[error("io error: {0}")]
    Io(#[source] std::io::Error),
}
