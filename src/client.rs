use std::{fmt, sync::Arc};

use serde::{de::DeserializeOwned, Serialize};
use url::Url;

use crate::{
    ApiRequest, ApiResponse, BoxApiError, ClientOptions, Clock, ListQuery, MultipartEncoder,
    Pageable, RequestExecutor, ResourceIterable, Result, SystemClock, Uploadable,
};

#[derive(Clone)]
/// Authenticated handle to the Box REST API.
///
/// Cloning is cheap; clones share one connection pool and configuration.
pub struct BoxClient {
    executor: Arc<RequestExecutor>,
    base_url: Url,
    base_upload_url: Url,
}

impl fmt::Debug for BoxClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoxClient")
            .field("base_url", &self.base_url.as_str())
            .field("base_upload_url", &self.base_upload_url.as_str())
            .field("executor", &self.executor)
            .finish()
    }
}

impl BoxClient {
    /// Creates a client from an access token.
    ///
    /// If the token is missing the `Bearer ` prefix, it is added automatically.
    pub fn new(token: impl AsRef<str>) -> Result<Self> {
        Self::new_raw_auth(normalize_bearer_authorization(token.as_ref()))
    }

    /// Creates a client with a full raw authorization value.
    ///
    /// Example: `"Bearer <token>"` or any custom scheme.
    pub fn new_raw_auth(authorization: impl Into<String>) -> Result<Self> {
        Self::build(
            authorization.into(),
            ClientOptions::default(),
            Arc::new(SystemClock),
        )
    }

    /// Creates a client from environment variables.
    ///
    /// Reads:
    /// - `BOX_DEVELOPER_TOKEN`: access token (Bearer prefix optional)
    /// - `BOX_API_URL`: optional API base URL override
    ///
    /// Returns a configuration error if the token is missing or empty.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use boxcloud_http::BoxClient;
    ///
    /// let client = BoxClient::from_env().expect("missing BOX_DEVELOPER_TOKEN");
    /// ```
    pub fn from_env() -> Result<Self> {
        let token = std::env::var("BOX_DEVELOPER_TOKEN").map_err(|_| {
            BoxApiError::configuration("missing BOX_DEVELOPER_TOKEN environment variable")
        })?;
        if token.trim().is_empty() {
            return Err(BoxApiError::configuration(
                "BOX_DEVELOPER_TOKEN is set but empty",
            ));
        }

        let client = Self::new(token)?;
        match std::env::var("BOX_API_URL") {
            Ok(url) if !url.trim().is_empty() => {
                let options = ClientOptions {
                    base_url: url.trim().to_owned(),
                    ..client.options().clone()
                };
                client.with_options(options)
            }
            _ => Ok(client),
        }
    }

    /// Applies client options such as base URLs, timeouts and retry behavior.
    ///
    /// Builds a new connection pool; existing clones keep the old options.
    pub fn with_options(self, opts: ClientOptions) -> Result<Self> {
        let authorization = self.executor.authorization().to_owned();
        let clock = self.executor.clock();
        Self::build(authorization, opts, clock)
    }

    /// Replaces the clock used for backoff waits and jitter.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        Arc::make_mut(&mut self.executor).set_clock(clock);
        self
    }

    fn build(authorization: String, options: ClientOptions, clock: Arc<dyn Clock>) -> Result<Self> {
        let base_url = parse_base(&options.base_url, "base_url")?;
        let base_upload_url = parse_base(&options.base_upload_url, "base_upload_url")?;
        let executor = RequestExecutor::new(authorization, options, clock)?;
        Ok(Self {
            executor: Arc::new(executor),
            base_url,
            base_upload_url,
        })
    }

    pub fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    pub fn options(&self) -> &ClientOptions {
        self.executor.options()
    }

    /// Sends a request through the retrying executor.
    pub fn send(&self, request: &mut ApiRequest) -> Result<ApiResponse> {
        self.executor.send(request)
    }

    /// Resolves `path` against the API base URL.
    pub fn api_url(&self, path: &str) -> Result<Url> {
        join(&self.base_url, path)
    }

    /// Resolves `path` against the upload base URL.
    pub fn upload_url(&self, path: &str) -> Result<Url> {
        join(&self.base_upload_url, path)
    }

    /// GETs `path` and parses the JSON response.
    pub fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let mut request = ApiRequest::get(self.api_url(path)?);
        self.send(&mut request)?.json()
    }

    /// Sends `body` as JSON and parses the JSON response.
    pub fn send_json<B, T>(&self, method: reqwest::Method, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut request = ApiRequest::new(method, self.api_url(path)?);
        request.set_json(body)?;
        self.send(&mut request)?.json()
    }

    /// Lazily lists `path`, using offset paging of [`DEFAULT_LIMIT`](crate::DEFAULT_LIMIT)
    /// unless `query` sets paging.
    pub fn list<T: DeserializeOwned>(&self, path: &str, query: ListQuery) -> Result<ResourceIterable<T>> {
        ResourceIterable::new(
            self.clone(),
            self.api_url(path)?,
            query,
            crate::PagingParameters::default(),
        )
    }

    /// Lazily lists a [`Pageable`] endpoint.
    pub fn iterate<P: Pageable>(&self, endpoint: &P, query: ListQuery) -> Result<ResourceIterable<P::Item>> {
        ResourceIterable::new(
            self.clone(),
            self.api_url(&endpoint.list_path())?,
            query,
            endpoint.default_paging(),
        )
    }

    /// POSTs `encoder` to an [`Uploadable`] endpoint.
    pub fn upload<U: Uploadable>(&self, target: &U, encoder: MultipartEncoder) -> Result<ApiResponse> {
        let mut request = ApiRequest::post(target.upload_url(self)?);
        request.set_multipart(encoder);
        self.send(&mut request)
    }
}

fn parse_base(raw: &str, name: &str) -> Result<Url> {
    let mut raw = raw.trim().to_owned();
    if !raw.ends_with('/') {
        raw.push('/');
    }
    let url = Url::parse(&raw)
        .map_err(|err| BoxApiError::configuration(format!("invalid {name} '{raw}': {err}")))?;
    if url.cannot_be_a_base() {
        return Err(BoxApiError::configuration(format!(
            "{name} '{raw}' cannot be used as a base URL"
        )));
    }
    Ok(url)
}

fn join(base: &Url, path: &str) -> Result<Url> {
    base.join(path.trim_start_matches('/'))
        .map_err(|err| BoxApiError::configuration(format!("invalid path '{path}': {err}")))
}

fn normalize_bearer_authorization(token: &str) -> String {
    let trimmed = token.trim();
    let prefix = trimmed.get(..7);
    if prefix.is_some_and(|value| value.eq_ignore_ascii_case("bearer ")) {
        trimmed.to_owned()
    } else {
        format!("Bearer {trimmed}")
    }
}
