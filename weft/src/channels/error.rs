use thiserror::Error;

/// Errors from applying writes to channels.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// A node wrote to a channel the graph does not declare.
    #[error("unknown channel: {0}")]
    UnknownChannel(String),
    #[error("invalid update for {channel}: {reason}")]
    InvalidUpdate { channel: String, reason: String },
}
