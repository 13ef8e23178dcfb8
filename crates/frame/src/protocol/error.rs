use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The client went away before the request body was complete. The connection is dropped
    /// without a response.
    #[error("request aborted: client disconnected before the body was complete")]
    Aborted,

    #[error("invalid scope: {reason}")]
    InvalidScope { reason: String },

    #[error("can't send message: {reason}")]
    Send { reason: String },

    #[error("unexpected message {message_type} on a {kind} connection")]
    UnexpectedMessage { message_type: &'static str, kind: &'static str },

    /// The connection channel was taken over by a view and is no longer available.
    #[error("connection channel has been detached from the request")]
    ChannelDetached,
}

impl ProtocolError {
    pub fn invalid_scope<S: ToString>(str: S) -> Self {
        Self::InvalidScope { reason: str.to_string() }
    }

    pub fn send<S: ToString>(str: S) -> Self {
        Self::Send { reason: str.to_string() }
    }

    pub fn unexpected_message(message_type: &'static str, kind: &'static str) -> Self {
        Self::UnexpectedMessage { message_type, kind }
    }

    /// Returns true if this error means the client disconnected mid-request.
    #[inline]
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}
