//! Capability traits implemented by resource wrappers.

use serde::de::DeserializeOwned;
use url::Url;

use crate::{BoxClient, FilePart, FileSource, MultipartEncoder, PagingParameters, Result};

/// A list endpoint whose entries decode into [`Pageable::Item`].
pub trait Pageable {
    type Item: DeserializeOwned;

    /// Path relative to the API base URL, e.g. `folders/trash/items`.
    fn list_path(&self) -> String;

    /// Paging used when the query does not set one.
    fn default_paging(&self) -> PagingParameters {
        PagingParameters::default()
    }
}

/// A multipart upload endpoint.
pub trait Uploadable {
    /// Path relative to the upload base URL.
    fn upload_path(&self) -> String;

    fn upload_url(&self, client: &BoxClient) -> Result<Url> {
        client.upload_url(&self.upload_path())
    }

    /// Form name of the file part.
    fn part_name(&self) -> &str {
        "file"
    }

    /// Content type for the file part; `None` guesses from the file name.
    fn part_content_type(&self, _filename: &str) -> Option<String> {
        None
    }

    /// Text fields sent before the file part.
    fn fields(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    fn file_part(&self, filename: &str, source: FileSource) -> FilePart {
        let part = FilePart::new(self.part_name(), filename, source);
        match self.part_content_type(filename) {
            Some(content_type) => part.with_content_type(content_type),
            None => part,
        }
    }

    /// Encoder holding [`fields`](Self::fields) and the file part.
    fn encoder(&self, filename: &str, source: FileSource) -> MultipartEncoder {
        self.fields().into_iter().fold(
            MultipartEncoder::new(self.file_part(filename, source)),
            |encoder, (key, value)| encoder.with_field(key, value),
        )
    }
}
