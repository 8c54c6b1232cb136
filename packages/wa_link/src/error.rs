use tokio_tungstenite::tungstenite;

/// Errors surfaced by a protocol engine connection
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// The engine could not be reached at all
    #[error("engine unavailable: {0}")]
    Unavailable(String),

    /// The connection to the engine went away while a request was in flight
    #[error("engine connection closed")]
    ConnectionClosed,

    /// The engine answered but refused the request
    #[error("engine rejected request: {0}")]
    Rejected(String),

    /// A frame could not be encoded or decoded
    #[error("malformed frame: {0}")]
    Protocol(#[from] serde_json::Error),

    #[error(transparent)]
    Transport(#[from] tungstenite::Error),
}

impl LinkError {
    /// Connection-refused style IO failures mean the sidecar is not running yet,
    /// everything else is a genuine transport error.
    pub fn from_tungstenite(err: tungstenite::Error) -> Self {
        let is_connect = match &err {
            tungstenite::Error::Io(io_err) => matches!(
                io_err.kind(),
                std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
            ),
            _ => false,
        };
        if is_connect {
            Self::Unavailable(err.to_string())
        } else {
            Self::Transport(err)
        }
    }
}
