use std::time::Duration;

use reqwest::Method;
use serde::Serialize;
use url::Url;

use crate::{BackoffCounter, BoxApiError, MultipartEncoder, RequestBody, Result};

/// Client identification header. Always set by the executor.
pub const CLIENT_INFO_HEADER: &str = "X-Box-UA";
/// Impersonation header. At most one value per request.
pub const AS_USER_HEADER: &str = "As-User";

/// One logical API call: target, headers, body and retry bookkeeping.
#[derive(Debug)]
pub struct ApiRequest {
    method: Method,
    url: Url,
    headers: Vec<(String, String)>,
    pub(crate) body: RequestBody,
    pub(crate) attempts: u32,
    pub(crate) backoff: Option<BackoffCounter>,
    timeout: Option<Duration>,
}

impl ApiRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
            body: RequestBody::Empty,
            attempts: 0,
            backoff: None,
            timeout: None,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: Url) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn put(url: Url) -> Self {
        Self::new(Method::PUT, url)
    }

    pub fn delete(url: Url) -> Self {
        Self::new(Method::DELETE, url)
    }

    /// Adds a header.
    ///
    /// `X-Box-UA` is reserved and rejected. `As-User` replaces any earlier
    /// value; every other key accumulates.
    pub fn add_header(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let key = key.into();
        let value = value.into();

        if key.eq_ignore_ascii_case(CLIENT_INFO_HEADER) {
            return Err(BoxApiError::configuration(format!(
                "{CLIENT_INFO_HEADER} header cannot be modified"
            )));
        }

        if key.eq_ignore_ascii_case(AS_USER_HEADER) {
            self.headers
                .retain(|(name, _)| !name.eq_ignore_ascii_case(AS_USER_HEADER));
        }

        self.headers.push((key, value));
        Ok(())
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Result<Self> {
        self.add_header(key, value)?;
        Ok(self)
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// First value of `key`, compared case-insensitively.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, value)| value.as_str())
    }

    pub fn set_body(&mut self, body: impl Into<RequestBody>) {
        self.body = body.into();
    }

    /// Serializes `value` as the JSON body.
    pub fn set_json<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        let body = serde_json::to_vec(value)
            .map_err(|err| BoxApiError::configuration(format!("invalid JSON body: {err}")))?;
        self.replace_header("Content-Type", "application/json");
        self.body = RequestBody::Bytes(body);
        Ok(())
    }

    /// Uses `encoder` as a streamed multipart body and sets its headers.
    pub fn set_multipart(&mut self, encoder: MultipartEncoder) {
        self.replace_header("Content-Type", &MultipartEncoder::content_type_header());
        if let Some(sha1) = encoder.content_sha1() {
            self.replace_header("Content-MD5", sha1);
        }
        self.body = RequestBody::Multipart(encoder);
    }

    /// Overrides the connection's backoff for this request.
    ///
    /// Every `send` starts from a fresh copy of `counter`.
    pub fn set_backoff_counter(&mut self, counter: BackoffCounter) {
        self.backoff = Some(counter);
    }

    /// Overrides the connection's request timeout.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = Some(timeout);
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn body(&self) -> &RequestBody {
        &self.body
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// HTTP attempts made by the last `send`.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    fn replace_header(&mut self, key: &str, value: &str) {
        self.headers
            .retain(|(name, _)| !name.eq_ignore_ascii_case(key));
        self.headers.push((key.to_owned(), value.to_owned()));
    }
}
