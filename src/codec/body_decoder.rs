use bytes::{Bytes, BytesMut};
use tokio_util::codec::Decoder;

use crate::codec::scanner::BoundaryScanner;
use crate::codec::DecodeError;

/// Splits one part body off the stream.
///
/// Body bytes are emitted as soon as the scanner settles them, so a body is
/// never buffered in full; `End` is emitted once the part delimiter has
/// been consumed, leaving the remainder in the shared buffer for the
/// driver. No size limit applies.
pub(crate) struct BodyDecoder {
    scanner: BoundaryScanner,
    out: BytesMut,
    found: bool,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum BodyItem {
    Chunk(Bytes),
    End,
}

impl BodyDecoder {
    pub(crate) fn new(delimiter: Bytes) -> Self {
        Self { scanner: BoundaryScanner::new(delimiter), out: BytesMut::new(), found: false }
    }
}

impl Decoder for BodyDecoder {
    type Item = BodyItem;
    type Error = DecodeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if !self.found {
            self.found = self.scanner.scan(src, &mut self.out);
        }

        if !self.out.is_empty() {
            return Ok(Some(BodyItem::Chunk(self.out.split().freeze())));
        }
        if self.found {
            return Ok(Some(BodyItem::End));
        }
        Ok(None)
    }
}
