use thiserror::Error;

/// Core error types for fwsync
#[derive(Debug, Error)]
pub enum Error {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Startup configuration is missing or unusable
    #[error("Configuration error: {0}")]
    Config(String),

    /// Request never got an HTTP answer (DNS, connect, timeout, TLS)
    #[error("Provider transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Provider answered with a non-2xx status.
    ///
    /// The body is kept for operator logs only and is not part of the
    /// display text.
    #[error("Provider returned HTTP {status}")]
    Provider { status: u16, body: String },

    /// Provider answered 2xx with a body we cannot decode
    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),

    /// Internal logic error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether retrying the same request later can succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Transport(_) => true,
            Error::Provider { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Operator-facing explanation of a provider failure
#[derive(Debug, Clone)]
pub struct ErrorTranslation {
    pub user_message: String,
    pub suggestions: Vec<String>,
}

impl ErrorTranslation {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            user_message: message.into(),
            suggestions: Vec::new(),
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }
}

/// Known provider status codes and what they usually mean
pub struct ProviderErrorPattern;

impl ProviderErrorPattern {
    /// Translates a provider HTTP status into an operator hint.
    pub fn match_status(status: u16) -> ErrorTranslation {
        match status {
            401 => ErrorTranslation::new("Provider rejected the API token")
                .with_suggestion("Check tokens.json for expired or revoked tokens")
                .with_suggestion("Tokens need read/write access to firewalls"),
            403 => ErrorTranslation::new("API token lacks permission for this firewall")
                .with_suggestion("Grant the token read/write scope on Firewalls"),
            404 => ErrorTranslation::new("Firewall does not exist on the provider")
                .with_suggestion("It may have been deleted outside fwsync")
                .with_suggestion("Untrack it with DELETE /firewall/{id}"),
            400 | 422 => ErrorTranslation::new("Provider refused the rule document")
                .with_suggestion("Check systemIPs.json for malformed addresses")
                .with_suggestion("A rule may exceed the provider's address limit"),
            429 => ErrorTranslation::new("Provider rate limit reached")
                .with_suggestion("The push is retried on the next tick")
                .with_suggestion("Add more tokens to tokens.json to spread the load"),
            500..=599 => ErrorTranslation::new("Provider is unavailable")
                .with_suggestion("The push is retried on the next tick"),
            _ => ErrorTranslation::new(format!("Unexpected provider status {status}")),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
