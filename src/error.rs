use soul_transport::TransportError;
use thiserror::Error;

/// Failures surfaced to the user-visible error region.
///
/// The `Display` text is exactly what the error banner shows.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    #[error("Missing chat identifiers: set an organization and a subroutine")]
    MissingChatIdentifiers,
    /// Token fetch or handshake failure for the current attempt.
    #[error("{0}")]
    Connection(TransportError),
    /// The transport rejected an outbound message after it was shown.
    #[error("{0}")]
    Dispatch(TransportError),
    /// A non-streaming reply failed to resolve.
    #[error("{0}")]
    Deferred(TransportError),
}

impl ChatError {
    #[must_use]
    pub fn transport(&self) -> Option<&TransportError> {
        match self {
            Self::MissingChatIdentifiers => None,
            Self::Connection(error) | Self::Dispatch(error) | Self::Deferred(error) => Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use soul_transport::AuthTokenError;

    use super::*;

    #[test]
    fn banner_text_is_the_transport_message() {
        let error = ChatError::Connection(TransportError::Auth(AuthTokenError::new(
            "Failed to fetch auth token",
        )));
        assert_eq!(error.to_string(), "Failed to fetch auth token");

        let error = ChatError::Dispatch(TransportError::Send("broken pipe".to_string()));
        assert_eq!(error.to_string(), "failed to send message: broken pipe");
    }

    #[test]
    fn missing_identifiers_has_no_transport_cause() {
        assert!(ChatError::MissingChatIdentifiers.transport().is_none());
    }
}
