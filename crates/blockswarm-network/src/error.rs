use thiserror::Error;

/// Errors raised by framing and transport
#[derive(Debug, Error)]
pub enum NetworkError {
    /// Socket-level failure (refused, reset, ...)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The exchange did not finish within its timeout
    #[error("timeout")]
    Timeout,

    /// The remote closed the connection before a full frame arrived
    #[error("connection closed")]
    ConnectionClosed,

    /// Frame header carries a schema version we do not speak
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// Frame length exceeds the configured bound
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// Payload could not be encoded or decoded
    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),
}

impl NetworkError {
    /// Whether the failure came from the remote sending bad data
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedVersion(_) | Self::FrameTooLarge { .. } | Self::Codec(_)
        )
    }
}
