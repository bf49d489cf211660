/// Error type returned by this crate.
///
/// Retryable kinds ([`Network`](Self::Network), [`RateLimited`](Self::RateLimited),
/// [`Server`](Self::Server), [`TransientAuth`](Self::TransientAuth)) are only
/// returned once the retry budget is spent; `attempts` records how many HTTP
/// attempts were made.
#[derive(Debug, thiserror::Error)]
pub enum BoxApiError {
    /// Invalid local usage, detected before any network call.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Connection or transport failure from `reqwest`; no response was received.
    #[error("network error after {attempts} attempt(s): {source}")]
    Network {
        #[source]
        source: reqwest::Error,
        attempts: u32,
    },
    /// HTTP 429 from the API.
    #[error("rate limited after {attempts} attempt(s): {body}")]
    RateLimited { body: String, attempts: u32 },
    /// HTTP 5xx from the API.
    #[error("server error {status} after {attempts} attempt(s): {body}")]
    Server {
        status: u16,
        body: String,
        attempts: u32,
    },
    /// HTTP 400 carrying `invalid_grant`.
    ///
    /// Treated as a transient auth or clock-skew condition and retried for
    /// compatibility with the upstream SDKs. A grant that is permanently
    /// invalid therefore spends the whole backoff budget before failing.
    #[error("invalid grant after {attempts} attempt(s): {body}")]
    TransientAuth { body: String, attempts: u32 },
    /// Any other non-success HTTP status. Never retried.
    ///
    /// `attempts` counts earlier retryable failures too, so a 500 followed by
    /// a 404 reports 2.
    #[error("http error {status} after {attempts} attempt(s): {body}")]
    Api {
        status: u16,
        attempts: u32,
        /// Raw response body.
        body: String,
        /// Parsed `code` or `error` field, if the body was a JSON error object.
        code: Option<String>,
        /// Parsed `message` or `error_description` field.
        message: Option<String>,
        request_id: Option<String>,
    },
    /// Response body does not match the expected shape.
    #[error("decode error: {0}")]
    Deserialization(String),
    /// Local I/O failure while preparing a request body.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BoxApiError {
    /// Returns `true` for kinds the executor retries.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network { .. }
                | Self::RateLimited { .. }
                | Self::Server { .. }
                | Self::TransientAuth { .. }
        )
    }

    /// Number of HTTP attempts made, for kinds that reached the network.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::Api { attempts, .. }
            | Self::Network { attempts, .. }
            | Self::RateLimited { attempts, .. }
            | Self::Server { attempts, .. }
            | Self::TransientAuth { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }

    /// HTTP status code, when a response was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RateLimited { .. } => Some(429),
            Self::TransientAuth { .. } => Some(400),
            Self::Server { status, .. } | Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub(crate) fn with_attempts(self, count: u32) -> Self {
        match self {
            Self::Network { source, .. } => Self::Network {
                source,
                attempts: count,
            },
            Self::RateLimited { body, .. } => Self::RateLimited {
                body,
                attempts: count,
            },
            Self::Server { status, body, .. } => Self::Server {
                status,
                body,
                attempts: count,
            },
            Self::TransientAuth { body, .. } => Self::TransientAuth {
                body,
                attempts: count,
            },
            Self::Api {
                status,
                body,
                code,
                message,
                request_id,
                ..
            } => Self::Api {
                status,
                attempts: count,
                body,
                code,
                message,
                request_id,
            },
            other => other,
        }
    }
}
