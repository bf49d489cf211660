use std::{fmt, marker::PhantomData};

use serde::de::DeserializeOwned;
use url::Url;

use crate::{BoxApiError, BoxClient, PageIterator, PagingParameters, Result, SortParameters};

/// Query options for a list endpoint.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListQuery {
    /// Explicit paging; `None` uses the endpoint default.
    pub paging: Option<PagingParameters>,
    pub sort: SortParameters,
    /// Fields to request, sent comma joined.
    pub fields: Vec<String>,
    /// Endpoint specific filters such as `filter_term`.
    pub params: Vec<(String, String)>,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_paging(mut self, paging: PagingParameters) -> Self {
        self.paging = Some(paging);
        self
    }

    pub fn with_sort(mut self, sort: SortParameters) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }
}

/// Re-iterable listing: every call to [`iter`](Self::iter) starts a fresh
/// [`PageIterator`] from the first page.
pub struct ResourceIterable<T> {
    client: BoxClient,
    url: Url,
    paging: PagingParameters,
    _item: PhantomData<fn() -> T>,
}

impl<T> Clone for ResourceIterable<T> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            url: self.url.clone(),
            paging: self.paging.clone(),
            _item: PhantomData,
        }
    }
}

impl<T> fmt::Debug for ResourceIterable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceIterable")
            .field("url", &self.url.as_str())
            .field("paging", &self.paging)
            .finish()
    }
}

impl<T: DeserializeOwned> ResourceIterable<T> {
    /// Validates `query` and builds the listing URL. Makes no network call.
    ///
    /// Fails with [`BoxApiError::Configuration`] when marker paging is combined
    /// with a sort, or when the page limit is zero.
    pub fn new(
        client: BoxClient,
        mut url: Url,
        query: ListQuery,
        default_paging: PagingParameters,
    ) -> Result<Self> {
        let paging = query.paging.unwrap_or(default_paging);
        paging.validate()?;
        if paging.is_marker_based() && !query.sort.is_empty() {
            return Err(BoxApiError::configuration(
                "Sorting is not supported when using marker based pagination",
            ));
        }

        let mut pairs = query.sort.query_pairs();
        if !query.fields.is_empty() {
            pairs.push(("fields", query.fields.join(",")));
        }
        if !pairs.is_empty() || !query.params.is_empty() {
            let mut serializer = url.query_pairs_mut();
            serializer.extend_pairs(pairs);
            serializer.extend_pairs(query.params);
        }

        Ok(Self {
            client,
            url,
            paging,
            _item: PhantomData,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn paging(&self) -> &PagingParameters {
        &self.paging
    }

    pub fn iter(&self) -> PageIterator<T> {
        PageIterator::new(self.client.clone(), self.url.clone(), &self.paging)
    }
}

impl<T: DeserializeOwned> IntoIterator for ResourceIterable<T> {
    type Item = Result<T>;
    type IntoIter = PageIterator<T>;

    fn into_iter(self) -> Self::IntoIter {
        PageIterator::new(self.client, self.url, &self.paging)
    }
}

impl<T: DeserializeOwned> IntoIterator for &ResourceIterable<T> {
    type Item = Result<T>;
    type IntoIter = PageIterator<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
