use std::{
    fmt,
    io::{self, Read, Seek, SeekFrom},
    sync::{Arc, Mutex},
};

use crate::{BoxApiError, MultipartEncoder, Result};

/// Readable and rewindable byte source.
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// Body attached to an [`ApiRequest`](crate::ApiRequest).
///
/// The executor prepares the body once per attempt. Between attempts it is
/// reset: fixed bytes are re-sent, seekable streams rewind to position 0, and
/// bodies that cannot be reset make the request non-retryable.
#[derive(Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Bytes(Vec<u8>),
    Stream(SharedSource),
    OneShot(Option<Box<dyn Read + Send>>),
    Multipart(MultipartEncoder),
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            Self::Stream(_) => f.write_str("Stream"),
            Self::OneShot(reader) => {
                write!(f, "OneShot({})", if reader.is_some() { "ready" } else { "consumed" })
            }
            Self::Multipart(encoder) => f.debug_tuple("Multipart").field(encoder).finish(),
        }
    }
}

impl RequestBody {
    /// Streams from a seekable reader; retries rewind it to the start.
    pub fn reader<R: Read + Seek + Send + 'static>(reader: R) -> Self {
        Self::Stream(SharedSource::new(reader))
    }

    /// Streams from a reader that can only be read once.
    pub fn one_shot<R: Read + Send + 'static>(reader: R) -> Self {
        Self::OneShot(Some(Box::new(reader)))
    }

    pub(crate) fn prepare(&mut self) -> Result<Option<reqwest::blocking::Body>> {
        match self {
            Self::Empty => Ok(None),
            Self::Bytes(bytes) => Ok(Some(reqwest::blocking::Body::from(bytes.clone()))),
            Self::Stream(source) => Ok(Some(reqwest::blocking::Body::new(source.handle()?))),
            Self::OneShot(reader) => {
                let reader = reader.take().ok_or_else(|| {
                    BoxApiError::configuration("one-shot request body was already consumed")
                })?;
                Ok(Some(reqwest::blocking::Body::new(reader)))
            }
            Self::Multipart(encoder) => Ok(Some(reqwest::blocking::Body::new(encoder.reader()?))),
        }
    }

    /// Makes the body ready for another attempt. Returns `false` when it cannot be replayed.
    pub(crate) fn reset(&mut self) -> io::Result<bool> {
        match self {
            Self::Empty | Self::Bytes(_) => Ok(true),
            Self::Stream(source) => source.rewind().map(|()| true),
            Self::OneShot(_) => Ok(false),
            Self::Multipart(encoder) => encoder.rewind(),
        }
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<&[u8]> for RequestBody {
    fn from(bytes: &[u8]) -> Self {
        Self::Bytes(bytes.to_vec())
    }
}

impl From<String> for RequestBody {
    fn from(text: String) -> Self {
        Self::Bytes(text.into_bytes())
    }
}

impl From<&str> for RequestBody {
    fn from(text: &str) -> Self {
        Self::Bytes(text.as_bytes().to_vec())
    }
}

impl From<MultipartEncoder> for RequestBody {
    fn from(encoder: MultipartEncoder) -> Self {
        Self::Multipart(encoder)
    }
}

struct SourceState {
    reader: Box<dyn ReadSeek>,
    generation: u64,
}

/// Seekable reader shared between a request and the body handed to the transport.
///
/// Each rewind starts a new generation; handles from earlier attempts stop
/// reading so a lingering transport cannot interleave with a retry.
#[derive(Clone)]
pub struct SharedSource {
    state: Arc<Mutex<SourceState>>,
}

impl SharedSource {
    pub fn new<R: Read + Seek + Send + 'static>(reader: R) -> Self {
        Self {
            state: Arc::new(Mutex::new(SourceState {
                reader: Box::new(reader),
                generation: 0,
            })),
        }
    }

    pub(crate) fn handle(&self) -> io::Result<SourceHandle> {
        let generation = self.lock()?.generation;
        Ok(SourceHandle {
            state: Arc::clone(&self.state),
            generation,
        })
    }

    pub(crate) fn rewind(&self) -> io::Result<()> {
        let mut state = self.lock()?;
        state.reader.seek(SeekFrom::Start(0))?;
        state.generation += 1;
        Ok(())
    }

    fn lock(&self) -> io::Result<std::sync::MutexGuard<'_, SourceState>> {
        self.state
            .lock()
            .map_err(|_| io::Error::other("body source lock poisoned"))
    }
}

pub(crate) struct SourceHandle {
    state: Arc<Mutex<SourceState>>,
    generation: u64,
}

impl Read for SourceHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| io::Error::other("body source lock poisoned"))?;
        if state.generation != self.generation {
            return Err(io::Error::other("request body superseded by a retry"));
        }
        state.reader.read(buf)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Read};

    use super::{RequestBody, SharedSource};

    #[test]
    fn shared_source_rewinds_and_invalidates_old_handles() {
        let source = SharedSource::new(Cursor::new(b"hello".to_vec()));
        let mut first = source.handle().expect("handle");
        let mut buf = [0u8; 3];
        first.read_exact(&mut buf).expect("read");
        assert_eq!(&buf, b"hel");

        source.rewind().expect("rewind");
        assert!(first.read(&mut buf).is_err());

        let mut second = source.handle().expect("handle");
        let mut all = String::new();
        second.read_to_string(&mut all).expect("read");
        assert_eq!(all, "hello");
    }

    #[test]
    fn one_shot_cannot_be_reset() {
        let mut body = RequestBody::one_shot(Cursor::new(vec![1, 2, 3]));
        assert!(body.prepare().expect("prepare").is_some());
        assert!(!body.reset().expect("reset"));
        assert!(body.prepare().is_err());
    }

    #[test]
    fn fixed_bodies_are_replayable() {
        let mut body = RequestBody::from("{}");
        assert!(body.reset().expect("reset"));
        assert!(RequestBody::Empty.prepare().expect("prepare").is_none());
    }
}
