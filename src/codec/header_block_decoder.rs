use bytes::{Buf, Bytes, BytesMut};
use snafu::ensure;
use tokio_util::codec::Decoder;

use crate::codec::error::HeaderTooLargeSnafu;
use crate::codec::scanner::BoundaryScanner;
use crate::codec::DecodeError;
use crate::protocol::{PartHeaders, HEADER_END};

/// Splits the next header block off the stream, bounded by a byte limit.
///
/// Positioned right after a boundary, the stream either continues with a
/// header block terminated by double-CRLF or closes the multipart with
/// `--`; the two-byte peek distinguishes them before any scanning starts.
pub(crate) struct HeaderBlockDecoder {
    scanner: BoundaryScanner,
    acc: BytesMut,
    limit: usize,
    peeked: bool,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum HeaderBlockItem {
    Headers(PartHeaders),
    /// terminal `--`: no further parts
    End,
}

impl HeaderBlockDecoder {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            scanner: BoundaryScanner::new(Bytes::from_static(HEADER_END)),
            acc: BytesMut::new(),
            limit,
            peeked: false,
        }
    }
}

impl Decoder for HeaderBlockDecoder {
    type Item = HeaderBlockItem;
    type Error = DecodeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if !self.peeked {
            // the peek needs two buffered bytes, even if they arrive in
            // separate chunks
            if src.len() < 2 {
                return Ok(None);
            }
            if &src[..2] == b"--" {
                src.advance(2);
                return Ok(Some(HeaderBlockItem::End));
            }
            self.peeked = true;
        }

        let found = self.scanner.scan(src, &mut self.acc);
        ensure!(
            self.acc.len() <= self.limit,
            HeaderTooLargeSnafu { current_size: self.acc.len(), max_size: self.limit }
        );

        if !found {
            return Ok(None);
        }
        Ok(Some(HeaderBlockItem::Headers(PartHeaders::parse(&self.acc))))
    }
}
