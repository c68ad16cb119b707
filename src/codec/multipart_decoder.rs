use bytes::BytesMut;
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::codec::body_decoder::{BodyDecoder, BodyItem};
use crate::codec::error::{EmptyStreamSnafu, MalformedStartSnafu, PartialBoundarySnafu, UnterminatedPartSnafu};
use crate::codec::header_block_decoder::{HeaderBlockDecoder, HeaderBlockItem};
use crate::codec::scanner::BoundaryScanner;
use crate::codec::DecodeError;
use crate::protocol::{Boundary, MultipartItem};

/// Decoder for a whole multipart message.
///
/// Emits [`MultipartItem`] events: the header block of each part, its body
/// bytes as they settle, `PartEof` when a part's closing delimiter has been
/// consumed, and `Eof` once the terminal `--` marker is reached. Bytes
/// after the terminal marker (the epilogue) are discarded, as is anything
/// before the opening boundary (the prelude).
pub struct MultipartDecoder {
    boundary: Boundary,
    header_limit: usize,
    state: State,
    seen_any: bool,
}

enum State {
    /// discarding bytes up to the opening boundary
    Prelude(BoundaryScanner),
    /// expecting a header block or the terminal `--`
    Headers(HeaderBlockDecoder),
    /// streaming a part body up to the next part delimiter
    Body(BodyDecoder),
    /// discarding the epilogue
    Epilogue,
}

impl MultipartDecoder {
    pub fn new(boundary: Boundary, header_limit: usize) -> Self {
        let prelude = BoundaryScanner::new(boundary.start_delimiter());
        Self { boundary, header_limit, state: State::Prelude(prelude), seen_any: false }
    }
}

impl Decoder for MultipartDecoder {
    type Item = MultipartItem;
    type Error = DecodeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if !src.is_empty() {
            self.seen_any = true;
        }

        loop {
            match &mut self.state {
                State::Prelude(scanner) => {
                    if !scanner.skip(src) {
                        return Ok(None);
                    }
                    self.state = State::Headers(HeaderBlockDecoder::new(self.header_limit));
                }

                State::Headers(decoder) => {
                    return match decoder.decode(src)? {
                        Some(HeaderBlockItem::Headers(headers)) => {
                            trace!(header_num = headers.len(), "parsed part header block");
                            self.state = State::Body(BodyDecoder::new(self.boundary.part_delimiter()));
                            Ok(Some(MultipartItem::Headers(headers)))
                        }
                        Some(HeaderBlockItem::End) => {
                            self.state = State::Epilogue;
                            Ok(Some(MultipartItem::Eof))
                        }
                        None => Ok(None),
                    };
                }

                State::Body(decoder) => {
                    return match decoder.decode(src)? {
                        Some(BodyItem::Chunk(bytes)) => Ok(Some(MultipartItem::Chunk(bytes))),
                        Some(BodyItem::End) => {
                            self.state = State::Headers(HeaderBlockDecoder::new(self.header_limit));
                            Ok(Some(MultipartItem::PartEof))
                        }
                        None => Ok(None),
                    };
                }

                State::Epilogue => {
                    src.clear();
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // buffered bytes may still complete items
        if let Some(item) = self.decode(src)? {
            return Ok(Some(item));
        }

        match self.state {
            State::Prelude(_) => {
                if self.seen_any {
                    MalformedStartSnafu.fail()
                } else {
                    EmptyStreamSnafu.fail()
                }
            }
            State::Headers(_) => PartialBoundarySnafu.fail(),
            State::Body(_) => UnterminatedPartSnafu.fail(),
            State::Epilogue => Ok(None),
        }
    }
}
