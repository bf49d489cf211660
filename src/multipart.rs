//! Streaming `multipart/form-data` encoder for file and avatar uploads.
//!
//! The body is produced on demand: text fields and part headers are small and
//! rendered up front, the file part is pulled from its source in bounded
//! chunks. The encoder never keeps or logs file bytes.

use std::{
    fmt,
    fs::File,
    io::{self, Cursor, Read, Write},
    path::{Path, PathBuf},
    sync::{mpsc, Arc},
};

use crate::body::{SharedSource, SourceHandle};

/// Boundary token shared by every multipart request.
pub const BOUNDARY: &str = "da39a3ee5e6b4b0d3255bfef95601890afd80709";
/// File bytes are read and reported in chunks of this size.
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

const FILE_CONTENTS_OMITTED: &str = "<File Contents Omitted>";

/// Receives upload progress for the file part.
pub trait ProgressListener: Send + Sync {
    /// `total_bytes` is the declared file size, or 0 when unknown.
    fn on_progress(&self, bytes_written: u64, total_bytes: u64);
}

impl<F> ProgressListener for F
where
    F: Fn(u64, u64) + Send + Sync,
{
    fn on_progress(&self, bytes_written: u64, total_bytes: u64) {
        self(bytes_written, total_bytes)
    }
}

type OpenFn = dyn Fn() -> io::Result<Box<dyn Read + Send>> + Send + Sync;
type WriteCallback = Box<dyn FnOnce(&mut dyn Write) -> io::Result<()> + Send>;

enum SourceKind {
    Seekable(SharedSource),
    Reopen(Arc<OpenFn>),
    Callback(Option<WriteCallback>),
}

/// Where the file part's bytes come from.
pub struct FileSource {
    kind: SourceKind,
}

impl fmt::Debug for FileSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            SourceKind::Seekable(_) => "seekable",
            SourceKind::Reopen(_) => "reopen",
            SourceKind::Callback(Some(_)) => "callback",
            SourceKind::Callback(None) => "callback (consumed)",
        };
        f.debug_struct("FileSource").field("kind", &kind).finish()
    }
}

impl FileSource {
    /// Seekable reader; retries rewind it to position 0.
    pub fn reader<R: Read + std::io::Seek + Send + 'static>(reader: R) -> Self {
        Self {
            kind: SourceKind::Seekable(SharedSource::new(reader)),
        }
    }

    /// Opens `path` afresh for every attempt.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self::reopen(move || Ok(Box::new(File::open(&path)?) as Box<dyn Read + Send>))
    }

    /// Calls `open` for every attempt to get a fresh reader.
    pub fn reopen<F>(open: F) -> Self
    where
        F: Fn() -> io::Result<Box<dyn Read + Send>> + Send + Sync + 'static,
    {
        Self {
            kind: SourceKind::Reopen(Arc::new(open)),
        }
    }

    /// Lets the caller write the file bytes. The callback runs once, so a
    /// request using it cannot be retried.
    pub fn callback<F>(write: F) -> Self
    where
        F: FnOnce(&mut dyn Write) -> io::Result<()> + Send + 'static,
    {
        Self {
            kind: SourceKind::Callback(Some(Box::new(write))),
        }
    }

    fn stream(&mut self, chunk_size: usize) -> io::Result<FileStream> {
        match &mut self.kind {
            SourceKind::Seekable(source) => Ok(FileStream::Shared(source.handle()?)),
            SourceKind::Reopen(open) => Ok(FileStream::Owned(open()?)),
            SourceKind::Callback(callback) => {
                let callback = callback.take().ok_or_else(consumed_callback)?;
                spawn_pipe(callback, chunk_size).map(FileStream::Piped)
            }
        }
    }

    fn rewind(&mut self) -> io::Result<bool> {
        match &self.kind {
            SourceKind::Seekable(source) => source.rewind().map(|()| true),
            SourceKind::Reopen(_) => Ok(true),
            SourceKind::Callback(_) => Ok(false),
        }
    }
}

fn consumed_callback() -> io::Error {
    io::Error::other("upload callback was already consumed")
}

/// The single file part of a multipart body.
#[derive(Debug)]
pub struct FilePart {
    part_name: String,
    filename: String,
    content_type: Option<String>,
    size: u64,
    source: FileSource,
}

impl FilePart {
    pub fn new(part_name: impl Into<String>, filename: impl Into<String>, source: FileSource) -> Self {
        Self {
            part_name: part_name.into(),
            filename: filename.into(),
            content_type: None,
            size: 0,
            source,
        }
    }

    /// File part reading `path`, with its file name and size filled in.
    pub fn from_path(part_name: impl Into<String>, path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let size = std::fs::metadata(path)?.len();
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::new(part_name, filename, FileSource::from_path(path)).with_size(size))
    }

    /// Overrides the content type guessed from the file name.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Declares the file size reported to progress listeners.
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn content_type(&self) -> String {
        self.content_type.clone().unwrap_or_else(|| {
            mime_guess::from_path(&self.filename)
                .first_or_octet_stream()
                .to_string()
        })
    }
}

/// Writes text fields followed by one file part as `multipart/form-data`.
pub struct MultipartEncoder {
    fields: Vec<(String, String)>,
    file: FilePart,
    chunk_size: usize,
    progress: Option<Arc<dyn ProgressListener>>,
    content_sha1: Option<String>,
}

impl fmt::Debug for MultipartEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultipartEncoder")
            .field("fields", &self.fields)
            .field("file", &self.file)
            .field("chunk_size", &self.chunk_size)
            .field("content_sha1", &self.content_sha1)
            .finish()
    }
}

impl MultipartEncoder {
    pub fn new(file: FilePart) -> Self {
        Self {
            fields: Vec::new(),
            file,
            chunk_size: DEFAULT_CHUNK_SIZE,
            progress: None,
            content_sha1: None,
        }
    }

    /// Sets a text field. Setting an existing key replaces its value in place.
    pub fn put_field(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(name, _)| *name == key) {
            Some(entry) => entry.1 = value,
            None => self.fields.push((key, value)),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.put_field(key, value);
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_progress(mut self, listener: impl ProgressListener + 'static) -> Self {
        self.progress = Some(Arc::new(listener));
        self
    }

    /// SHA-1 of the file content, sent as `Content-MD5` so the server can verify it.
    pub fn set_content_sha1(&mut self, sha1: impl Into<String>) {
        self.content_sha1 = Some(sha1.into());
    }

    pub fn content_sha1(&self) -> Option<&str> {
        self.content_sha1.as_deref()
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    pub fn file(&self) -> &FilePart {
        &self.file
    }

    /// Value of the request's `Content-Type` header.
    pub fn content_type_header() -> String {
        format!("multipart/form-data; boundary={BOUNDARY}")
    }

    /// The body as it may be logged: every header and field, with the file
    /// content replaced by a placeholder.
    pub fn logged_body(&self) -> String {
        let mut logged = String::from_utf8_lossy(&self.head()).into_owned();
        logged.push_str(FILE_CONTENTS_OMITTED);
        logged.push_str(&String::from_utf8_lossy(&Self::tail()));
        logged
    }

    /// Writes the whole body into `out`, streaming the file in chunks.
    ///
    /// Consumes the file source the same way an attempt does; call again only
    /// after [`rewind`](Self::rewind) returned `true`.
    pub fn write_to<W: Write + ?Sized>(&mut self, out: &mut W) -> io::Result<u64> {
        self.trace_body();

        let head = self.head();
        out.write_all(&head)?;

        let mut progress = Progress::new(self.progress.clone(), self.file.size);
        match &mut self.file.source.kind {
            SourceKind::Callback(callback) => {
                let callback = callback.take().ok_or_else(consumed_callback)?;
                let mut writer = ProgressWriter {
                    inner: &mut *out,
                    progress: &mut progress,
                };
                callback(&mut writer)?;
            }
            _ => {
                let mut stream = self.file.source.stream(self.chunk_size)?;
                let mut buffer = vec![0u8; self.chunk_size];
                loop {
                    let n = stream.read(&mut buffer)?;
                    if n == 0 {
                        break;
                    }
                    out.write_all(&buffer[..n])?;
                    progress.advance(n);
                }
            }
        }

        let tail = Self::tail();
        out.write_all(&tail)?;
        out.flush()?;
        Ok(head.len() as u64 + progress.written + tail.len() as u64)
    }

    /// Pull-based body for the transport.
    pub fn reader(&mut self) -> io::Result<MultipartReader> {
        self.trace_body();

        let file = self.file.source.stream(self.chunk_size)?;
        Ok(MultipartReader {
            head: Cursor::new(self.head()),
            file,
            tail: Cursor::new(Self::tail()),
            stage: Stage::Head,
            chunk_size: self.chunk_size,
            progress: Progress::new(self.progress.clone(), self.file.size),
        })
    }

    /// Prepares the file source for another pass. Returns `false` when the
    /// source cannot be replayed.
    pub fn rewind(&mut self) -> io::Result<bool> {
        self.file.source.rewind()
    }

    fn head(&self) -> Vec<u8> {
        let mut head = Vec::new();
        let mut first = true;
        for (key, value) in &self.fields {
            write_part_header(&mut head, &mut first, &[("name", key)], None);
            head.extend_from_slice(value.as_bytes());
        }
        let content_type = self.file.content_type();
        write_part_header(
            &mut head,
            &mut first,
            &[("name", &self.file.part_name), ("filename", &self.file.filename)],
            Some(&content_type),
        );
        head
    }

    fn tail() -> Vec<u8> {
        format!("\r\n--{BOUNDARY}--").into_bytes()
    }

    fn trace_body(&self) {
        #[cfg(feature = "tracing")]
        tracing::trace!(body = %self.logged_body(), "multipart request body");
    }
}

fn write_part_header(
    out: &mut Vec<u8>,
    first: &mut bool,
    disposition: &[(&str, &String)],
    content_type: Option<&str>,
) {
    if !*first {
        out.extend_from_slice(b"\r\n");
    }
    *first = false;
    out.extend_from_slice(b"--");
    out.extend_from_slice(BOUNDARY.as_bytes());
    out.extend_from_slice(b"\r\nContent-Disposition: form-data");
    for (name, value) in disposition {
        let encoded: String = url::form_urlencoded::byte_serialize(value.as_bytes()).collect();
        out.extend_from_slice(format!("; {name}=\"{encoded}\"").as_bytes());
    }
    if let Some(content_type) = content_type {
        out.extend_from_slice(format!("\r\nContent-Type: {content_type}").as_bytes());
    }
    out.extend_from_slice(b"\r\n\r\n");
}

struct Progress {
    listener: Option<Arc<dyn ProgressListener>>,
    written: u64,
    total: u64,
}

impl Progress {
    fn new(listener: Option<Arc<dyn ProgressListener>>, total: u64) -> Self {
        Self {
            listener,
            written: 0,
            total,
        }
    }

    fn advance(&mut self, n: usize) {
        self.written += n as u64;
        if let Some(listener) = &self.listener {
            listener.on_progress(self.written, self.total);
        }
    }
}

struct ProgressWriter<'a, W: Write + ?Sized> {
    inner: &'a mut W,
    progress: &'a mut Progress,
}

impl<W: Write + ?Sized> Write for ProgressWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.progress.advance(n);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

enum FileStream {
    Shared(SourceHandle),
    Owned(Box<dyn Read + Send>),
    Piped(PipeReader),
}

impl Read for FileStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Shared(handle) => handle.read(buf),
            Self::Owned(reader) => reader.read(buf),
            Self::Piped(pipe) => pipe.read(buf),
        }
    }
}

enum Stage {
    Head,
    File,
    Tail,
}

/// [`Read`] adapter producing a multipart body chunk by chunk.
pub struct MultipartReader {
    head: Cursor<Vec<u8>>,
    file: FileStream,
    tail: Cursor<Vec<u8>>,
    stage: Stage,
    chunk_size: usize,
    progress: Progress,
}

impl Read for MultipartReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            match self.stage {
                Stage::Head => {
                    let n = self.head.read(buf)?;
                    if n > 0 {
                        return Ok(n);
                    }
                    self.stage = Stage::File;
                }
                Stage::File => {
                    let limit = buf.len().min(self.chunk_size);
                    let n = self.file.read(&mut buf[..limit])?;
                    if n > 0 {
                        self.progress.advance(n);
                        return Ok(n);
                    }
                    self.stage = Stage::Tail;
                }
                Stage::Tail => return self.tail.read(buf),
            }
        }
    }
}

// Callback sources push bytes while the transport pulls them, so the callback
// runs on its own thread and hands over chunks through a bounded channel.
type Chunk = io::Result<Vec<u8>>;

struct PipeReader {
    rx: mpsc::Receiver<Chunk>,
    chunk: Cursor<Vec<u8>>,
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let n = self.chunk.read(buf)?;
            if n > 0 {
                return Ok(n);
            }
            match self.rx.recv() {
                Ok(Ok(chunk)) => self.chunk = Cursor::new(chunk),
                Ok(Err(err)) => return Err(err),
                Err(_) => return Ok(0),
            }
        }
    }
}

struct PipeWriter {
    tx: mpsc::SyncSender<Chunk>,
    buf: Vec<u8>,
    chunk_size: usize,
}

impl PipeWriter {
    fn send(&mut self, chunk: Vec<u8>) -> io::Result<()> {
        self.tx
            .send(Ok(chunk))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "upload body was dropped"))
    }
}

impl Write for PipeWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        while self.buf.len() >= self.chunk_size {
            let rest = self.buf.split_off(self.chunk_size);
            let chunk = std::mem::replace(&mut self.buf, rest);
            self.send(chunk)?;
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let chunk = std::mem::take(&mut self.buf);
        self.send(chunk)
    }
}

fn spawn_pipe(callback: WriteCallback, chunk_size: usize) -> io::Result<PipeReader> {
    let (tx, rx) = mpsc::sync_channel(2);
    std::thread::Builder::new()
        .name("multipart-upload".to_owned())
        .spawn(move || {
            let mut writer = PipeWriter {
                tx,
                buf: Vec::with_capacity(chunk_size),
                chunk_size,
            };
            let result = callback(&mut writer).and_then(|()| writer.flush());
            if let Err(err) = result {
                let _ = writer.tx.send(Err(err));
            }
        })?;
    Ok(PipeReader {
        rx,
        chunk: Cursor::new(Vec::new()),
    })
}
