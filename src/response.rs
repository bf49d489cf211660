use std::{
    fmt,
    io::{Cursor, Read},
};

use reqwest::{header, Method, StatusCode};
use serde::de::DeserializeOwned;

use crate::{BoxApiError, Result};

/// Response body, decided once by content type.
pub enum ResponseBody {
    /// No content (204, 304, HEAD, or zero length).
    Empty,
    /// JSON or text content, read eagerly.
    Text(String),
    /// Any other content, left open for the caller to read.
    Stream(Box<dyn Read + Send>),
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// Successful response returned by the executor.
#[derive(Debug)]
pub struct ApiResponse {
    status: u16,
    headers: header::HeaderMap,
    body: ResponseBody,
}

impl ApiResponse {
    pub fn new(status: u16, headers: header::HeaderMap, body: ResponseBody) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    pub(crate) fn read(response: reqwest::blocking::Response, method: &Method) -> reqwest::Result<Self> {
        let status = response.status();
        let headers = response.headers().clone();
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        let body = if *method == Method::HEAD
            || status == StatusCode::NO_CONTENT
            || status == StatusCode::NOT_MODIFIED
            || response.content_length() == Some(0)
        {
            ResponseBody::Empty
        } else if is_textual(&content_type) {
            ResponseBody::Text(response.text()?)
        } else {
            ResponseBody::Stream(Box::new(response))
        };

        Ok(Self::new(status.as_u16(), headers, body))
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn headers(&self) -> &header::HeaderMap {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn body(&self) -> &ResponseBody {
        &self.body
    }

    /// Text body. Fails for streamed bodies; an empty body reads as `""`.
    pub fn text(&self) -> Result<&str> {
        match &self.body {
            ResponseBody::Text(text) => Ok(text),
            ResponseBody::Empty => Ok(""),
            ResponseBody::Stream(_) => Err(BoxApiError::Deserialization(
                "response body is a byte stream, not text".to_owned(),
            )),
        }
    }

    /// Parses the text body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        let text = self.text()?;
        serde_json::from_str(text).map_err(|err| {
            BoxApiError::Deserialization(format!("invalid response JSON: {err}; body: {text}"))
        })
    }

    /// Consumes the response and returns its body as a reader.
    pub fn into_reader(self) -> Box<dyn Read + Send> {
        match self.body {
            ResponseBody::Stream(reader) => reader,
            ResponseBody::Text(text) => Box::new(Cursor::new(text.into_bytes())),
            ResponseBody::Empty => Box::new(Cursor::new(Vec::new())),
        }
    }
}

fn is_textual(content_type: &str) -> bool {
    content_type.contains("json") || content_type.starts_with("text/")
}
