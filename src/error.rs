// error.rs
// Failure taxonomy for one send attempt and the notices shown for each

use thiserror::Error;

pub const CONFIGURATION_MISSING_NOTICE: &str =
    "No provider configured. Please configure one in config.toml.";
pub const AUTHENTICATION_NOTICE: &str = "Authentication failed. Check your API key.";
pub const NOT_FOUND_NOTICE: &str = "Model not found. Check your configuration.";
pub const RATE_LIMITED_NOTICE: &str = "Rate limit exceeded. Try again later.";
pub const GENERIC_NOTICE: &str = "An error occurred. Please try again.";
pub const NETWORK_NOTICE: &str = "Network error. Check your connection.";
pub const CONNECTION_LOST_NOTICE: &str = "Network connection lost. Please try again.";

/// Why an in-flight stream was asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The user stopped generation (Ctrl-C, or a new action settled the stream).
    User,
    /// Connectivity went away while the stream was open.
    ConnectionLost,
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("no provider or model selected")]
    ConfigurationMissing,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("API error ({status}): {detail}")]
    HttpStatus { status: u16, detail: String },

    #[error("could not decode completion response: {0}")]
    Decode(String),

    #[error("stream cancelled ({0:?})")]
    Cancelled(CancelReason),
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        ChatError::Transport(err.to_string())
    }
}

/// Classification of an HTTP error status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpStatusKind {
    Authentication,
    NotFound,
    RateLimited,
    Generic,
}

impl HttpStatusKind {
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => HttpStatusKind::Authentication,
            404 => HttpStatusKind::NotFound,
            429 => HttpStatusKind::RateLimited,
            _ => HttpStatusKind::Generic,
        }
    }

    pub fn notice(self) -> &'static str {
        match self {
            HttpStatusKind::Authentication => AUTHENTICATION_NOTICE,
            HttpStatusKind::NotFound => NOT_FOUND_NOTICE,
            HttpStatusKind::RateLimited => RATE_LIMITED_NOTICE,
            HttpStatusKind::Generic => GENERIC_NOTICE,
        }
    }
}

impl ChatError {
    /// Text of the notice appended to the conversation, if this error reaches the user.
    pub fn notice(&self) -> Option<&'static str> {
        match self {
            ChatError::ConfigurationMissing => Some(CONFIGURATION_MISSING_NOTICE),
            ChatError::Transport(_) => Some(NETWORK_NOTICE),
            ChatError::HttpStatus { status, .. } => Some(HttpStatusKind::from_status(*status).notice()),
            ChatError::Decode(_) => Some(GENERIC_NOTICE),
            ChatError::Cancelled(CancelReason::ConnectionLost) => Some(CONNECTION_LOST_NOTICE),
            ChatError::Cancelled(CancelReason::User) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(HttpStatusKind::from_status(401), HttpStatusKind::Authentication);
        assert_eq!(HttpStatusKind::from_status(404), HttpStatusKind::NotFound);
        assert_eq!(HttpStatusKind::from_status(429), HttpStatusKind::RateLimited);
        assert_eq!(HttpStatusKind::from_status(500), HttpStatusKind::Generic);
        assert_eq!(HttpStatusKind::from_status(403), HttpStatusKind::Generic);
    }

    #[test]
    fn test_notice_mapping() {
        let rate = ChatError::HttpStatus { status: 429, detail: "slow down".into() };
        assert_eq!(rate.notice(), Some("Rate limit exceeded. Try again later."));

        let auth = ChatError::HttpStatus { status: 401, detail: "bad key".into() };
        assert_eq!(auth.notice(), Some("Authentication failed. Check your API key."));

        assert_eq!(ChatError::Cancelled(CancelReason::User).notice(), None);
        assert_eq!(
            ChatError::Cancelled(CancelReason::ConnectionLost).notice(),
            Some(CONNECTION_LOST_NOTICE)
        );
        assert_eq!(ChatError::Transport("reset".into()).notice(), Some(NETWORK_NOTICE));
    }

    #[test]
    fn test_error_display_keeps_detail() {
        let err = ChatError::HttpStatus { status: 500, detail: "upstream exploded".into() };
        assert_eq!(err.to_string(), "API error (500): upstream exploded");
    }
}
