/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.box.com/2.0/";
/// Default upload base URL.
pub const DEFAULT_BASE_UPLOAD_URL: &str = "https://upload.box.com/api/2.0/";
/// Default number of retries after the initial attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Configures endpoints, timeouts and retry behavior.
///
/// Options are fixed once handed to [`BoxClient::with_options`](crate::BoxClient::with_options);
/// build a new client to change them.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientOptions {
    /// API base URL, with trailing slash.
    pub base_url: String,
    /// Upload base URL, with trailing slash.
    pub base_upload_url: String,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Maximum number of retries after the initial attempt.
    pub max_retries: u32,
    /// Base retry backoff in milliseconds (exponential strategy).
    pub retry_backoff_ms: u64,
    /// Upper bound for a single backoff wait, before jitter.
    pub max_backoff_ms: u64,
    /// User ID sent as `As-User` on every request unless the request sets its own.
    pub as_user: Option<String>,
    /// Extra headers sent on every request.
    ///
    /// `X-Box-UA` is rejected. An `As-User` entry is moved into [`as_user`](Self::as_user)
    /// unless that is already set.
    pub default_headers: Vec<(String, String)>,
    /// Honour `HTTP_PROXY`/`HTTPS_PROXY` from the environment.
    pub use_system_proxy: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            base_upload_url: DEFAULT_BASE_UPLOAD_URL.to_owned(),
            timeout_ms: 60_000,
            connect_timeout_ms: 30_000,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff_ms: 1_000,
            max_backoff_ms: 60_000,
            as_user: None,
            default_headers: Vec::new(),
            use_system_proxy: true,
        }
    }
}
