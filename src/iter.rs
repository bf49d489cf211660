//! Lazy iteration over paged list endpoints.
//!
//! A [`PageIterator`] fetches one page per HTTP call, only when its buffer is
//! empty, and yields items in server order. It is forward-only: once exhausted
//! or failed it returns `None` without touching the network again.

use std::{collections::VecDeque, fmt, marker::PhantomData};

use serde::de::DeserializeOwned;
use url::Url;

use crate::{wire::PageEnvelope, ApiRequest, BoxApiError, BoxClient, PagingParameters, Result};

/// Numeric offset paging: `limit` + `offset`.
#[derive(Clone, Debug, PartialEq, Eq)]
struct OffsetPager {
    limit: u64,
    offset: u64,
    more: bool,
}

impl OffsetPager {
    fn query_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("limit", self.limit.to_string()),
            ("offset", self.offset.to_string()),
        ]
    }

    fn advance(&mut self, envelope: &PageEnvelope) {
        let offset = envelope.offset.unwrap_or(self.offset);
        let step = envelope
            .limit
            .filter(|limit| *limit > 0)
            .unwrap_or(envelope.entries.len() as u64);
        self.offset = offset.saturating_add(step);
        self.more = match envelope.total_count {
            Some(total) => self.offset < total,
            None => false,
        };
    }
}

/// Continuation-token paging: `limit` + `usemarker=true` + `marker`.
#[derive(Clone, Debug, PartialEq, Eq)]
struct MarkerPager {
    limit: u64,
    marker: Option<String>,
    more: bool,
}

impl MarkerPager {
    fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("limit", self.limit.to_string()),
            ("usemarker", "true".to_owned()),
        ];
        if let Some(marker) = &self.marker {
            pairs.push(("marker", marker.clone()));
        }
        pairs
    }

    fn advance(&mut self, envelope: &PageEnvelope) {
        self.marker = envelope
            .next_marker
            .clone()
            .filter(|marker| !marker.is_empty());
        self.more = self.marker.is_some();
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Pager {
    Offset(OffsetPager),
    Marker(MarkerPager),
}

impl Pager {
    fn new(paging: &PagingParameters) -> Self {
        match paging {
            PagingParameters::Offset { limit, offset } => Self::Offset(OffsetPager {
                limit: *limit,
                offset: *offset,
                more: true,
            }),
            PagingParameters::Marker { limit, marker } => Self::Marker(MarkerPager {
                limit: *limit,
                marker: marker.clone(),
                more: true,
            }),
        }
    }

    fn query_pairs(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::Offset(pager) => pager.query_pairs(),
            Self::Marker(pager) => pager.query_pairs(),
        }
    }

    fn advance(&mut self, envelope: &PageEnvelope) {
        match self {
            Self::Offset(pager) => pager.advance(envelope),
            Self::Marker(pager) => pager.advance(envelope),
        }
    }

    fn has_more(&self) -> bool {
        match self {
            Self::Offset(pager) => pager.more,
            Self::Marker(pager) => pager.more,
        }
    }

    fn stop(&mut self) {
        match self {
            Self::Offset(pager) => pager.more = false,
            Self::Marker(pager) => pager.more = false,
        }
    }
}

/// Iterator state. Fetching happens inside `next` and always lands in one of these.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageState {
    /// No request made yet.
    Init,
    /// Items from the current page are buffered.
    HasPage,
    /// Every page was consumed.
    Exhausted,
    /// A fetch or decode failed; the error was yielded once.
    Failed,
}

/// Lazy, finite, forward-only sequence of items from a list endpoint.
pub struct PageIterator<T> {
    client: BoxClient,
    url: Url,
    pager: Pager,
    state: PageState,
    buffer: VecDeque<serde_json::Value>,
    pages_fetched: u32,
    _item: PhantomData<fn() -> T>,
}

impl<T> fmt::Debug for PageIterator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageIterator")
            .field("url", &self.url.as_str())
            .field("pager", &self.pager)
            .field("state", &self.state)
            .field("buffered", &self.buffer.len())
            .field("pages_fetched", &self.pages_fetched)
            .finish()
    }
}

impl<T: DeserializeOwned> PageIterator<T> {
    /// Creates an iterator over `url`. No request is made until the first `next`.
    pub fn new(client: BoxClient, url: Url, paging: &PagingParameters) -> Self {
        Self {
            client,
            url,
            pager: Pager::new(paging),
            state: PageState::Init,
            buffer: VecDeque::new(),
            pages_fetched: 0,
            _item: PhantomData,
        }
    }

    pub fn state(&self) -> PageState {
        self.state
    }

    /// Number of pages requested so far.
    pub fn pages_fetched(&self) -> u32 {
        self.pages_fetched
    }

    fn fetch(&mut self) -> Result<()> {
        let mut url = self.url.clone();
        url.query_pairs_mut()
            .extend_pairs(self.pager.query_pairs());

        #[cfg(feature = "tracing")]
        tracing::debug!(url = %url, "fetching page");

        let mut request = ApiRequest::get(url);
        self.pages_fetched += 1;
        let response = self.client.send(&mut request)?;
        let envelope: PageEnvelope = response.json()?;

        self.pager.advance(&envelope);
        if envelope.entries.is_empty() {
            self.pager.stop();
        }
        self.buffer.extend(envelope.entries);
        Ok(())
    }

    fn fail(&mut self, err: BoxApiError) -> Option<Result<T>> {
        self.buffer.clear();
        self.state = PageState::Failed;
        Some(Err(err))
    }
}

impl<T: DeserializeOwned> Iterator for PageIterator<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.state {
                PageState::Exhausted | PageState::Failed => return None,
                PageState::Init => {
                    if let Err(err) = self.fetch() {
                        return self.fail(err);
                    }
                    self.state = PageState::HasPage;
                }
                PageState::HasPage => {
                    if let Some(raw) = self.buffer.pop_front() {
                        return match serde_json::from_value(raw) {
                            Ok(item) => Some(Ok(item)),
                            Err(err) => self.fail(BoxApiError::Deserialization(format!(
                                "invalid list entry: {err}"
                            ))),
                        };
                    }
                    if !self.pager.has_more() {
                        self.state = PageState::Exhausted;
                        return None;
                    }
                    if let Err(err) = self.fetch() {
                        return self.fail(err);
                    }
                }
            }
        }
    }
}
