//! `boxcloud-http` is a blocking HTTP client core for the Box content API.
//!
//! The crate covers the protocol plumbing shared by every resource:
//! - [`RequestExecutor::send`] with retry classification and jittered backoff
//! - [`PageIterator`] / [`ResourceIterable`] for offset and marker paging
//! - [`MultipartEncoder`] for streaming file and avatar uploads
//!
//! Resource wrappers plug in through the [`Pageable`] and [`Uploadable`] traits.
//!
//! ```no_run
//! use boxcloud_http::{BoxClient, ListQuery, PagingParameters};
//!
//! # fn main() -> boxcloud_http::Result<()> {
//! let client = BoxClient::new("developer-token")?;
//! let query = ListQuery::new().with_paging(PagingParameters::marker(100));
//! for item in client.list::<serde_json::Value>("folders/trash/items", query)? {
//!     println!("{}", item?["name"]);
//! }
//! # Ok(())
//! # }
//! ```

mod backoff;
mod body;
mod client;
mod error;
mod executor;
mod iter;
mod iterable;
mod multipart;
mod options;
mod paging;
mod request;
mod resource;
mod response;
mod wire;

pub use backoff::{BackoffCounter, BackoffPolicy, Clock, SystemClock};
pub use body::{ReadSeek, RequestBody, SharedSource};
pub use client::BoxClient;
pub use error::BoxApiError;
pub use executor::{client_info, RequestExecutor};
pub use iter::{PageIterator, PageState};
pub use iterable::{ListQuery, ResourceIterable};
pub use multipart::{
    FilePart, FileSource, MultipartEncoder, MultipartReader, ProgressListener, BOUNDARY,
    DEFAULT_CHUNK_SIZE,
};
pub use options::{ClientOptions, DEFAULT_BASE_UPLOAD_URL, DEFAULT_BASE_URL, DEFAULT_MAX_RETRIES};
pub use paging::{
    PagingParameters, SortDirection, SortParameters, DEFAULT_COLLABORATION_LIMIT, DEFAULT_LIMIT,
};
pub use request::{ApiRequest, AS_USER_HEADER, CLIENT_INFO_HEADER};
pub use resource::{Pageable, Uploadable};
pub use response::{ApiResponse, ResponseBody};

pub type Result<T> = std::result::Result<T, BoxApiError>;
