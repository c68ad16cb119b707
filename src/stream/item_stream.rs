use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use tokio_util::codec::Decoder;

use crate::codec::{DecodeError, MultipartDecoder};
use crate::protocol::{Boundary, MultipartItem};

/// Pumps input chunks through the multipart decoder, yielding one event at
/// a time. Fuses itself after the first error.
pub(crate) struct ItemStream<S> {
    input: S,
    decoder: MultipartDecoder,
    buffer: BytesMut,
    read_eof: bool,
    failed: bool,
}

impl<S> ItemStream<S>
where
    S: Stream<Item = io::Result<Bytes>> + Unpin,
{
    pub(crate) fn new(input: S, boundary: Boundary, header_limit: usize) -> Self {
        Self {
            input,
            decoder: MultipartDecoder::new(boundary, header_limit),
            buffer: BytesMut::new(),
            read_eof: false,
            failed: false,
        }
    }

    pub(crate) fn poll_item(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<MultipartItem, DecodeError>>> {
        if self.failed {
            return Poll::Ready(None);
        }

        loop {
            if self.read_eof {
                return match self.decoder.decode_eof(&mut self.buffer) {
                    Ok(Some(item)) => Poll::Ready(Some(Ok(item))),
                    Ok(None) => Poll::Ready(None),
                    Err(e) => {
                        self.failed = true;
                        Poll::Ready(Some(Err(e)))
                    }
                };
            }

            match self.decoder.decode(&mut self.buffer) {
                Ok(Some(item)) => return Poll::Ready(Some(Ok(item))),
                Ok(None) => {}
                Err(e) => {
                    self.failed = true;
                    return Poll::Ready(Some(Err(e)));
                }
            }

            match ready!(self.input.poll_next_unpin(cx)) {
                // a zero-length chunk is a no-op
                Some(Ok(chunk)) => self.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    self.failed = true;
                    return Poll::Ready(Some(Err(e.into())));
                }
                None => self.read_eof = true,
            }
        }
    }
}

impl<S> Stream for ItemStream<S>
where
    S: Stream<Item = io::Result<Bytes>> + Unpin,
{
    type Item = Result<MultipartItem, DecodeError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().poll_item(cx)
    }
}
