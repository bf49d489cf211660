use std::{fmt, sync::Arc, time::Duration};

use reqwest::{header, StatusCode};

use crate::{
    request::{AS_USER_HEADER, CLIENT_INFO_HEADER},
    wire::ErrorBody,
    ApiRequest, ApiResponse, BackoffCounter, BackoffPolicy, BoxApiError, ClientOptions, Clock,
    Result,
};

/// Value of the client identification header.
pub fn client_info() -> String {
    format!("agent=box-rust-sdk/{}; env=Rust", env!("CARGO_PKG_VERSION"))
}

/// Sends requests with authentication, classification and retries.
///
/// Blocking: every send and every backoff wait runs on the calling thread.
#[derive(Clone)]
pub struct RequestExecutor {
    http: reqwest::blocking::Client,
    authorization: String,
    options: ClientOptions,
    policy: BackoffPolicy,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("authorization", &"<redacted>")
            .field("options", &self.options)
            .field("policy", &self.policy)
            .finish()
    }
}

/// A failed attempt, before the retry decision.
struct Failure {
    error: BoxApiError,
    retry_after: Option<Duration>,
}

impl From<BoxApiError> for Failure {
    fn from(error: BoxApiError) -> Self {
        Self {
            error,
            retry_after: None,
        }
    }
}

impl RequestExecutor {
    pub(crate) fn new(
        authorization: String,
        mut options: ClientOptions,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        fold_default_headers(&mut options)?;

        let mut builder = reqwest::blocking::Client::builder()
            .timeout(Duration::from_millis(options.timeout_ms))
            .connect_timeout(Duration::from_millis(options.connect_timeout_ms));
        if !options.use_system_proxy {
            builder = builder.no_proxy();
        }
        let http = builder.build().map_err(|err| {
            BoxApiError::configuration(format!("failed to build HTTP client: {err}"))
        })?;

        Ok(Self {
            http,
            authorization,
            policy: BackoffPolicy::from_options(&options),
            options,
            clock,
        })
    }

    pub(crate) fn set_clock(&mut self, clock: Arc<dyn Clock>) {
        self.clock = clock;
    }

    pub(crate) fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    pub(crate) fn authorization(&self) -> &str {
        &self.authorization
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Backoff counter for one logical call, using the connection's limits.
    pub fn backoff_counter(&self) -> BackoffCounter {
        BackoffCounter::new(self.policy, Arc::clone(&self.clock), self.options.max_retries)
    }

    /// Sends `request`, retrying retryable failures until the budget is spent.
    ///
    /// Makes at most `max_retries + 1` HTTP attempts. A body that cannot be
    /// replayed turns the first failure into the final one.
    pub fn send(&self, request: &mut ApiRequest) -> Result<ApiResponse> {
        let mut counter = match &request.backoff {
            Some(counter) => {
                let mut counter = counter.clone();
                counter.reset();
                counter
            }
            None => self.backoff_counter(),
        };
        request.attempts = 0;

        loop {
            request.attempts += 1;

            let failure = match self.attempt(request) {
                Ok(response) => return Ok(response),
                Err(failure) => failure,
            };

            let attempts = request.attempts;
            if !failure.error.is_retryable() {
                return Err(failure.error.with_attempts(attempts));
            }

            if !counter.can_retry() {
                return Err(failure.error.with_attempts(attempts));
            }

            match request.body.reset() {
                Ok(true) => {}
                Ok(false) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("request body cannot be replayed, not retrying");
                    return Err(failure.error.with_attempts(attempts));
                }
                Err(_err) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(error = %_err, "failed to rewind request body, not retrying");
                    return Err(failure.error.with_attempts(attempts));
                }
            }

            #[cfg(feature = "tracing")]
            tracing::debug!(error = %failure.error, attempt = attempts, "retrying request");

            counter.wait(failure.retry_after);
        }
    }

    fn attempt(&self, request: &mut ApiRequest) -> std::result::Result<ApiResponse, Failure> {
        #[cfg(feature = "tracing")]
        let _span = tracing::debug_span!(
            "box.http",
            method = %request.method(),
            url = %request.url(),
            attempt = request.attempts,
        )
        .entered();

        let body = request.body.prepare()?;

        let mut builder = self
            .http
            .request(request.method().clone(), request.url().clone())
            .header(CLIENT_INFO_HEADER, client_info())
            .header(header::AUTHORIZATION, &self.authorization);

        for (name, value) in &self.options.default_headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(as_user) = &self.options.as_user {
            if request.header(AS_USER_HEADER).is_none() {
                builder = builder.header(AS_USER_HEADER, as_user.as_str());
            }
        }
        for (name, value) in request.headers() {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(timeout) = request.timeout() {
            builder = builder.timeout(timeout);
        }
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let response = builder.send()?;
        let status = response.status();

        #[cfg(feature = "tracing")]
        tracing::debug!(status = status.as_u16(), "received response");

        if status.is_success() || status.is_redirection() {
            return ApiResponse::read(response, request.method()).map_err(Failure::from);
        }

        let retry_after = retry_after(status, response.headers());
        let body = response.text()?;
        Err(Failure {
            error: classify(status.as_u16(), body),
            retry_after,
        })
    }
}

/// Rejects a default `X-Box-UA` and moves a default `As-User` into
/// `options.as_user`, so both header rules hold for connection defaults too.
fn fold_default_headers(options: &mut ClientOptions) -> Result<()> {
    let mut default_as_user = None;
    let mut headers = Vec::with_capacity(options.default_headers.len());
    for (name, value) in options.default_headers.drain(..) {
        if name.eq_ignore_ascii_case(CLIENT_INFO_HEADER) {
            return Err(BoxApiError::configuration(format!(
                "{CLIENT_INFO_HEADER} header cannot be set in default headers"
            )));
        }
        if name.eq_ignore_ascii_case(AS_USER_HEADER) {
            default_as_user = Some(value);
        } else {
            headers.push((name, value));
        }
    }
    options.default_headers = headers;
    if options.as_user.is_none() {
        options.as_user = default_as_user;
    }
    Ok(())
}

fn network_failure(err: reqwest::Error) -> BoxApiError {
    if err.is_builder() {
        return BoxApiError::configuration(format!("invalid request: {err}"));
    }
    BoxApiError::Network {
        source: err,
        attempts: 1,
    }
}

impl From<reqwest::Error> for Failure {
    fn from(err: reqwest::Error) -> Self {
        network_failure(err).into()
    }
}

/// Maps a non-success status and body to an error kind.
pub(crate) fn classify(status: u16, body: String) -> BoxApiError {
    match status {
        429 => BoxApiError::RateLimited { body, attempts: 1 },
        500..=599 => BoxApiError::Server {
            status,
            body,
            attempts: 1,
        },
        _ => {
            let parsed = ErrorBody::parse(&body).unwrap_or_default();
            if status == 400 && parsed.code() == Some("invalid_grant") {
                return BoxApiError::TransientAuth { body, attempts: 1 };
            }
            BoxApiError::Api {
                status,
                attempts: 1,
                code: parsed.code().map(str::to_owned),
                message: parsed.message().map(str::to_owned),
                request_id: parsed.request_id,
                body,
            }
        }
    }
}

fn retry_after(status: StatusCode, headers: &header::HeaderMap) -> Option<Duration> {
    if status != StatusCode::TOO_MANY_REQUESTS {
        return None;
    }
    headers
        .get(header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
