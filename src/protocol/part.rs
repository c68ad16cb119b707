use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::warn;

use crate::protocol::{Boundary, PartHeaders};

/// A part whose body has been fully resolved, either in memory or in a
/// spill file on disk.
#[derive(Debug)]
pub struct StoredPart {
    headers: PartHeaders,
    body: StoredBody,
}

impl StoredPart {
    pub(crate) fn new(headers: PartHeaders, body: StoredBody) -> Self {
        Self { headers, body }
    }

    pub fn headers(&self) -> &PartHeaders {
        &self.headers
    }

    pub fn body(&self) -> &StoredBody {
        &self.body
    }

    pub fn into_body(self) -> StoredBody {
        self.body
    }
}

#[derive(Debug)]
pub enum StoredBody {
    Memory(Bytes),
    Spilled(SpillFile),
}

impl StoredBody {
    pub fn len(&self) -> u64 {
        match self {
            StoredBody::Memory(bytes) => bytes.len() as u64,
            StoredBody::Spilled(file) => file.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_spilled(&self) -> bool {
        matches!(self, StoredBody::Spilled(_))
    }

    /// Read the body regardless of its backing.
    pub async fn bytes(&self) -> io::Result<Bytes> {
        match self {
            StoredBody::Memory(bytes) => Ok(bytes.clone()),
            StoredBody::Spilled(file) => file.bytes().await,
        }
    }
}

/// Handle to a temporary file holding one spilled part body.
///
/// The backing file is deleted exactly once: on [`close`](Self::close), or
/// when the handle is dropped.
#[derive(Debug)]
pub struct SpillFile {
    path: PathBuf,
    len: u64,
    deleted: bool,
}

impl SpillFile {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self { path, len: 0, deleted: false }
    }

    pub(crate) fn record_write(&mut self, len: u64) {
        self.len += len;
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Lazy chunked read of the spilled body from the start.
    pub async fn read(&self, chunk_size: usize) -> io::Result<ReaderStream<File>> {
        let file = File::open(&self.path).await?;
        Ok(ReaderStream::with_capacity(file, chunk_size))
    }

    /// Read the whole spilled body into memory.
    pub async fn bytes(&self) -> io::Result<Bytes> {
        let data = tokio::fs::read(&self.path).await?;
        Ok(Bytes::from(data))
    }

    /// Delete the backing file now instead of at drop time.
    pub async fn close(&mut self) -> io::Result<()> {
        if self.deleted {
            return Ok(());
        }
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                self.deleted = true;
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                self.deleted = true;
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}

impl Drop for SpillFile {
    fn drop(&mut self) {
        if self.deleted {
            return;
        }
        if let Err(err) = std::fs::remove_file(&self.path) {
            if err.kind() != io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), cause = %err, "failed to delete spill file");
            }
        }
    }
}

/// All parts of one multipart message.
#[derive(Debug)]
pub struct Multipart {
    parts: Vec<StoredPart>,
    boundary: Boundary,
}

impl Multipart {
    pub(crate) fn new(parts: Vec<StoredPart>, boundary: Boundary) -> Self {
        Self { parts, boundary }
    }

    pub fn parts(&self) -> &[StoredPart] {
        &self.parts
    }

    pub fn boundary(&self) -> &Boundary {
        &self.boundary
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn into_parts(self) -> Vec<StoredPart> {
        self.parts
    }
}
