use thiserror::Error;

#[derive(Error, Debug)]
pub enum SystemError {
    #[error("Unsupported tool server kind: {0} (configure a launcher for its suffix)")]
    UnsupportedServerKind(String),

    #[error("Failed to start tool server `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Handshake with tool server failed: {0}")]
    HandshakeFailed(String),

    #[error("Tool server session is not initialized")]
    NotInitialized,

    #[error("Tool server channel closed")]
    ChannelClosed,

    #[error("Malformed message from tool server: {0}")]
    MalformedMessage(String),

    #[error("Tool server returned error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Tool reported an error: {0}")]
    ToolFailed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

pub type SystemResult<T> = Result<T, SystemError>;
