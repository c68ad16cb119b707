use bytes::Bytes;

use crate::protocol::PartHeaders;

/// event produced from the multipart decoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MultipartItem {
    /// header block of the next part
    Headers(PartHeaders),
    /// settled body bytes of the current part
    Chunk(Bytes),
    /// the current part's closing delimiter has been consumed
    PartEof,
    /// the terminal boundary has been consumed
    Eof,
}

impl MultipartItem {
    pub fn is_eof(&self) -> bool {
        matches!(self, MultipartItem::Eof)
    }

    pub fn is_chunk(&self) -> bool {
        matches!(self, MultipartItem::Chunk(_))
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            MultipartItem::Chunk(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            MultipartItem::Chunk(bytes) => Some(bytes),
            _ => None,
        }
    }
}
