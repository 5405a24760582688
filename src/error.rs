use serde::Deserialize;

const FALLBACK_MESSAGE: &str = "An error occurred";

/// Errors surfaced by the mArchive client.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A 401 the session guard could not recover from.
    #[error("Session expired")]
    AuthExpired,

    /// The session refresh itself failed. Local session state has been cleared.
    #[error("Session refresh failed: {message}")]
    AuthInvalid {
        status: Option<u16>,
        message: String,
    },

    /// Client-side error (4xx) with the server-supplied message.
    #[error("{message}")]
    Validation { status: u16, message: String },

    /// Server-side error (5xx).
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// The request never produced an HTTP response.
    #[error("Network error: {0}")]
    Network(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The response body did not match the expected shape.
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

impl Error {
    /// Builds the typed error for a non-2xx response.
    ///
    /// The message is the `error` field of a JSON body when present, otherwise
    /// the raw body text.
    #[must_use]
    pub fn from_status(status: u16, body: &[u8]) -> Self {
        let message = error_message(body);
        if status >= 500 {
            Self::Server { status, message }
        } else {
            Self::Validation { status, message }
        }
    }

    /// HTTP status associated with this error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::AuthExpired => Some(401),
            Self::AuthInvalid { status, .. } => *status,
            Self::Validation { status, .. } | Self::Server { status, .. } => Some(*status),
            Self::Network(_) | Self::Decode(_) | Self::Config(_) => None,
        }
    }

    /// Whether the error means the user is no longer signed in.
    #[must_use]
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::AuthExpired | Self::AuthInvalid { .. })
    }

    /// Whether a bounded retry may succeed (transport failures and 5xx).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Server { .. })
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Self::Network(Box::new(e))
    }
}

pub(crate) fn error_message(body: &[u8]) -> String {
    if let Ok(parsed) = serde_json::from_slice::<ErrorBody>(body) {
        return parsed
            .error
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| FALLBACK_MESSAGE.to_string());
    }
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        FALLBACK_MESSAGE.to_string()
    } else {
        text.to_string()
    }
}
