use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::{Bytes, BytesMut};
use futures::{Stream, TryStreamExt};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::trace;

use crate::codec::error::{PartsLimitExceededSnafu, UnterminatedPartSnafu};
use crate::codec::DecodeError;
use crate::protocol::{Boundary, Multipart, MultipartItem, PartHeaders, SpillFile, StoredBody, StoredPart};
use crate::stream::ItemStream;

/// Max bytes per header block before `HeaderTooLarge`.
pub const DEFAULT_HEADER_LIMIT: usize = 1024;

/// Per-part in-memory byte threshold before spilling to disk (50 MiB).
pub const DEFAULT_MAX_BEFORE_WRITE: usize = 50 * 1024 * 1024;

/// Part count ceiling.
pub const DEFAULT_MAX_PARTS: usize = 20;

/// Configuration for spill-to-disk parsing.
#[derive(Debug, Clone)]
pub struct SpillConfig {
    header_limit: usize,
    max_before_write: usize,
    max_parts: usize,
    fail_on_limit: bool,
    spill_dir: Option<PathBuf>,
}

impl Default for SpillConfig {
    fn default() -> Self {
        Self {
            header_limit: DEFAULT_HEADER_LIMIT,
            max_before_write: DEFAULT_MAX_BEFORE_WRITE,
            max_parts: DEFAULT_MAX_PARTS,
            fail_on_limit: false,
            spill_dir: None,
        }
    }
}

impl SpillConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header_limit(mut self, limit: usize) -> Self {
        self.header_limit = limit;
        self
    }

    pub fn max_before_write(mut self, size: usize) -> Self {
        self.max_before_write = size;
        self
    }

    pub fn max_parts(mut self, count: usize) -> Self {
        self.max_parts = count;
        self
    }

    /// Whether exceeding `max_parts` errors instead of truncating.
    pub fn fail_on_limit(mut self, fail: bool) -> Self {
        self.fail_on_limit = fail;
        self
    }

    /// Directory for spill files; defaults to the OS temp dir.
    pub fn spill_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.spill_dir = Some(dir.into());
        self
    }
}

/// Pull-style parser that buffers large part bodies in temporary files.
///
/// A part body accumulates in memory until it crosses the configured
/// threshold, then moves to a lazily created spill file that is appended to
/// as further bytes settle. The emitted [`StoredPart`] owns the file; it is
/// deleted when the part is dropped, and immediately if parsing fails or is
/// abandoned before the part is emitted.
///
/// When the part ceiling is reached without `fail_on_limit`, emission stops
/// gracefully and the remainder of the input is intentionally left unread.
pub struct SpillParser<S> {
    items: ItemStream<S>,
    config: SpillConfig,
    emitted: usize,
    done: bool,
}

impl<S> SpillParser<S>
where
    S: Stream<Item = io::Result<Bytes>> + Unpin,
{
    pub fn new(input: S, boundary: Boundary, config: SpillConfig) -> Self {
        Self {
            items: ItemStream::new(input, boundary, config.header_limit),
            config,
            emitted: 0,
            done: false,
        }
    }

    /// Next part, or `None` once the terminal boundary or the part ceiling
    /// has been reached.
    pub async fn next_part(&mut self) -> Result<Option<StoredPart>, DecodeError> {
        if self.done {
            return Ok(None);
        }

        if self.emitted >= self.config.max_parts {
            self.done = true;
            if self.config.fail_on_limit {
                return PartsLimitExceededSnafu { max_parts: self.config.max_parts }.fail();
            }
            return Ok(None);
        }

        loop {
            let Some(item) = self.items.try_next().await? else {
                self.done = true;
                return Ok(None);
            };

            match item {
                MultipartItem::Headers(headers) => {
                    let part = self.read_body(headers).await?;
                    self.emitted += 1;
                    return Ok(Some(part));
                }
                MultipartItem::Eof => {
                    self.done = true;
                    // drain the epilogue
                    while self.items.try_next().await?.is_some() {}
                    return Ok(None);
                }
                MultipartItem::Chunk(_) | MultipartItem::PartEof => {}
            }
        }
    }

    async fn read_body(&mut self, headers: PartHeaders) -> Result<StoredPart, DecodeError> {
        let mut acc = BytesMut::new();
        // on any failure path out of this function the writer is dropped
        // and its spill file deleted with it
        let mut writer: Option<SpillWriter> = None;

        loop {
            let Some(item) = self.items.try_next().await? else {
                return UnterminatedPartSnafu.fail();
            };

            match item {
                MultipartItem::Chunk(bytes) => {
                    acc.extend_from_slice(&bytes);
                    if acc.len() >= self.config.max_before_write {
                        if writer.is_none() {
                            writer = Some(SpillWriter::create(self.config.spill_dir.as_deref()).await?);
                        }
                        if let Some(writer) = &mut writer {
                            writer.append(&mut acc).await?;
                        }
                    }
                }
                MultipartItem::PartEof => {
                    let body = match writer {
                        Some(mut writer) => {
                            writer.append(&mut acc).await?;
                            StoredBody::Spilled(writer.finish().await?)
                        }
                        None => StoredBody::Memory(acc.freeze()),
                    };
                    return Ok(StoredPart::new(headers, body));
                }
                MultipartItem::Headers(_) | MultipartItem::Eof => {}
            }
        }
    }
}

/// Parse a byte stream with spill-to-disk buffering and collect the parts.
pub async fn parse_spilled<S>(input: S, boundary: Boundary, config: SpillConfig) -> Result<Multipart, DecodeError>
where
    S: Stream<Item = io::Result<Bytes>> + Unpin,
{
    let mut parser = SpillParser::new(input, boundary.clone(), config);
    let mut parts = Vec::new();
    while let Some(part) = parser.next_part().await? {
        parts.push(part);
    }
    Ok(Multipart::new(parts, boundary))
}

struct SpillWriter {
    file: File,
    handle: SpillFile,
}

impl SpillWriter {
    async fn create(dir: Option<&Path>) -> io::Result<Self> {
        let (path, file) = create_spill_file(dir).await?;
        trace!(path = %path.display(), "created spill file");
        Ok(Self { file, handle: SpillFile::new(path) })
    }

    async fn append(&mut self, acc: &mut BytesMut) -> io::Result<()> {
        if acc.is_empty() {
            return Ok(());
        }
        self.file.write_all(acc).await?;
        self.handle.record_write(acc.len() as u64);
        acc.clear();
        Ok(())
    }

    async fn finish(mut self) -> io::Result<SpillFile> {
        self.file.flush().await?;
        trace!(path = %self.handle.path().display(), size = self.handle.len(), "finished spill file");
        Ok(self.handle)
    }
}

static SPILL_COUNTER: AtomicU64 = AtomicU64::new(1);

async fn create_spill_file(dir: Option<&Path>) -> io::Result<(PathBuf, File)> {
    let dir = dir.map(Path::to_path_buf).unwrap_or_else(std::env::temp_dir);
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos();

    for _ in 0..32 {
        let counter = SPILL_COUNTER.fetch_add(1, Ordering::Relaxed);
        let candidate = dir.join(format!("micro-multipart-{}-{nanos}-{counter}.tmp", std::process::id()));

        match OpenOptions::new().create_new(true).write(true).open(&candidate).await {
            Ok(file) => return Ok((candidate, file)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {}
            Err(err) => return Err(err),
        }
    }

    Err(io::Error::new(io::ErrorKind::AlreadyExists, "failed to allocate unique spill file"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn chunked(chunks: &[&[u8]]) -> stream::Iter<std::vec::IntoIter<io::Result<Bytes>>> {
        let chunks: Vec<io::Result<Bytes>> = chunks.iter().map(|c| Ok(Bytes::copy_from_slice(c))).collect();
        stream::iter(chunks)
    }

    fn message_with_body(body: &[u8]) -> Vec<u8> {
        let mut input = Vec::from(&b"--B\r\nContent-Disposition: form-data; name=\"f\"\r\n\r\n"[..]);
        input.extend_from_slice(body);
        input.extend_from_slice(b"\r\n--B--\r\n");
        input
    }

    #[tokio::test]
    async fn test_small_body_stays_in_memory() {
        let input = message_with_body(b"tiny");
        let mut parser = SpillParser::new(chunked(&[&input]), Boundary::new("B"), SpillConfig::new());

        let part = parser.next_part().await.unwrap().unwrap();
        assert!(!part.body().is_spilled());
        assert_eq!(&part.body().bytes().await.unwrap()[..], b"tiny");

        assert!(parser.next_part().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_large_body_spills_and_is_deleted_on_drop() {
        let dir = test_spill_dir("spill-drop");
        let body: Vec<u8> = (0..64 * 1024).map(|i| (i % 251) as u8).collect();
        let input = message_with_body(&body);
        let config = SpillConfig::new().max_before_write(1024).spill_dir(&dir);
        let mut parser = SpillParser::new(chunked(&input.chunks(7000).collect::<Vec<_>>()), Boundary::new("B"), config);

        let part = parser.next_part().await.unwrap().unwrap();
        let StoredBody::Spilled(file) = part.body() else {
            panic!("expected a spilled body");
        };

        assert_eq!(file.len(), body.len() as u64);
        assert!(file.path().exists());
        assert_eq!(files_in(&dir), 1);
        assert_eq!(&file.bytes().await.unwrap()[..], &body[..]);

        let path = file.path().to_path_buf();
        drop(part);
        assert!(!path.exists());
        assert_eq!(files_in(&dir), 0);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_spilled_body_lazy_read() {
        let body: Vec<u8> = (0..16 * 1024).map(|i| (i % 13) as u8 + b'a').collect();
        let input = message_with_body(&body);
        let config = SpillConfig::new().max_before_write(512);
        let mut parser = SpillParser::new(chunked(&[&input]), Boundary::new("B"), config);

        let part = parser.next_part().await.unwrap().unwrap();
        let StoredBody::Spilled(file) = part.body() else {
            panic!("expected a spilled body");
        };

        let mut read = file.read(4096).await.unwrap();
        let mut collected = Vec::new();
        while let Some(chunk) = read.try_next().await.unwrap() {
            collected.extend_from_slice(&chunk);
        }
        assert_eq!(&collected[..], &body[..]);
    }

    #[tokio::test]
    async fn test_close_deletes_spill_file() {
        let input = message_with_body(&[b'x'; 4096]);
        let config = SpillConfig::new().max_before_write(256);
        let mut parser = SpillParser::new(chunked(&[&input]), Boundary::new("B"), config);

        let part = parser.next_part().await.unwrap().unwrap();
        let StoredBody::Spilled(mut file) = part.into_body() else {
            panic!("expected a spilled body");
        };

        let path = file.path().to_path_buf();
        file.close().await.unwrap();
        assert!(!path.exists());

        // closing again is a no-op, and drop must not attempt a second delete
        file.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_spill_file_deleted_on_parse_error() {
        // body crosses the threshold, then the stream ends with no closing
        // boundary
        let dir = test_spill_dir("spill-error");
        let mut input = Vec::from(&b"--B\r\nX: 1\r\n\r\n"[..]);
        input.extend_from_slice(&[b'y'; 8192]);
        let config = SpillConfig::new().max_before_write(1024).spill_dir(&dir);

        let mut parser = SpillParser::new(chunked(&[&input]), Boundary::new("B"), config);
        let err = parser.next_part().await.unwrap_err();

        assert!(matches!(err, DecodeError::UnterminatedPart));
        assert_eq!(files_in(&dir), 0);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_max_parts_truncates() {
        let input = two_part_message();
        let config = SpillConfig::new().max_parts(1);
        let mut parser = SpillParser::new(chunked(&[&input]), Boundary::new("B"), config);

        assert!(parser.next_part().await.unwrap().is_some());
        // the second part is never produced; the remainder stays unread
        assert!(parser.next_part().await.unwrap().is_none());
        assert!(parser.next_part().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_max_parts_fails_when_configured() {
        let input = two_part_message();
        let config = SpillConfig::new().max_parts(1).fail_on_limit(true);
        let mut parser = SpillParser::new(chunked(&[&input]), Boundary::new("B"), config);

        assert!(parser.next_part().await.unwrap().is_some());
        let err = parser.next_part().await.unwrap_err();

        assert!(matches!(err, DecodeError::PartsLimitExceeded { max_parts: 1 }));
    }

    #[tokio::test]
    async fn test_parse_spilled_collects_parts() {
        let input = two_part_message();
        let multipart = parse_spilled(chunked(&[&input]), Boundary::new("B"), SpillConfig::new()).await.unwrap();

        assert_eq!(multipart.len(), 2);
        assert_eq!(&multipart.parts()[0].body().bytes().await.unwrap()[..], b"hello");
        assert_eq!(&multipart.parts()[1].body().bytes().await.unwrap()[..], b"world");
    }

    fn two_part_message() -> Vec<u8> {
        Vec::from(&b"--B\r\nX: a\r\n\r\nhello\r\n--B\r\nX: b\r\n\r\nworld\r\n--B--\r\n"[..])
    }

    fn test_spill_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("micro-multipart-test-{name}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn files_in(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }
}
