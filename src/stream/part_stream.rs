use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{ready, Context, Poll};

use bytes::{Bytes, BytesMut};
use futures::{Stream, TryStreamExt};
use tracing::info;

use crate::codec::DecodeError;
use crate::protocol::{Boundary, Multipart, MultipartItem, PartHeaders, StoredBody, StoredPart};
use crate::stream::ItemStream;

/// Parse a byte stream into a lazy sequence of parts.
///
/// Each [`Part`] exposes its body as a stream over the same underlying
/// input cursor: a body not read to completion is discarded when the next
/// part is requested.
pub fn parse_to_parts<S>(input: S, boundary: Boundary, header_limit: usize) -> PartStream<S>
where
    S: Stream<Item = io::Result<Bytes>> + Unpin,
{
    PartStream {
        inner: Arc::new(Mutex::new(Inner {
            items: ItemStream::new(input, boundary, header_limit),
            generation: 0,
            in_body: false,
            discarded: 0,
            done: false,
        })),
    }
}

/// Parse a byte stream and collect every part, with bodies held in memory.
pub async fn parse<S>(input: S, boundary: Boundary, header_limit: usize) -> Result<Multipart, DecodeError>
where
    S: Stream<Item = io::Result<Bytes>> + Unpin,
{
    let mut items = ItemStream::new(input, boundary.clone(), header_limit);
    let mut parts = Vec::new();
    let mut current: Option<(PartHeaders, BytesMut)> = None;

    while let Some(item) = items.try_next().await? {
        match item {
            MultipartItem::Headers(headers) => current = Some((headers, BytesMut::new())),
            MultipartItem::Chunk(bytes) => {
                if let Some((_, acc)) = &mut current {
                    acc.extend_from_slice(&bytes);
                }
            }
            MultipartItem::PartEof => {
                if let Some((headers, acc)) = current.take() {
                    parts.push(StoredPart::new(headers, StoredBody::Memory(acc.freeze())));
                }
            }
            // keep pulling so the epilogue is drained
            MultipartItem::Eof => {}
        }
    }

    Ok(Multipart::new(parts, boundary))
}

pub struct PartStream<S> {
    inner: Arc<Mutex<Inner<S>>>,
}

struct Inner<S> {
    items: ItemStream<S>,
    /// index of the most recently emitted part
    generation: usize,
    in_body: bool,
    discarded: usize,
    done: bool,
}

fn lock<S>(inner: &Mutex<Inner<S>>) -> MutexGuard<'_, Inner<S>> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<S> Stream for PartStream<S>
where
    S: Stream<Item = io::Result<Bytes>> + Unpin,
{
    type Item = Result<Part<S>, DecodeError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let mut inner = lock(&this.inner);

        if inner.done {
            return Poll::Ready(None);
        }

        // discard the unread remainder of the previous part's body; its
        // producer and this stream share one cursor
        while inner.in_body {
            match ready!(inner.items.poll_item(cx)) {
                Some(Ok(MultipartItem::Chunk(bytes))) => inner.discarded += bytes.len(),
                Some(Ok(MultipartItem::PartEof)) => {
                    inner.in_body = false;
                    if inner.discarded > 0 {
                        info!(size = inner.discarded, "discarded unread part body");
                        inner.discarded = 0;
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    inner.done = true;
                    return Poll::Ready(Some(Err(e)));
                }
                None => {
                    inner.done = true;
                    return Poll::Ready(None);
                }
            }
        }

        loop {
            match ready!(inner.items.poll_item(cx)) {
                Some(Ok(MultipartItem::Headers(headers))) => {
                    inner.generation += 1;
                    inner.in_body = true;
                    let body = PartBody { inner: Arc::clone(&this.inner), generation: inner.generation };
                    return Poll::Ready(Some(Ok(Part { headers, body })));
                }
                // keep pulling past the terminal marker so the epilogue is
                // drained from the input
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    inner.done = true;
                    return Poll::Ready(Some(Err(e)));
                }
                None => {
                    inner.done = true;
                    return Poll::Ready(None);
                }
            }
        }
    }
}

/// One part of the stream: decoded headers plus a lazy, single-consumption
/// body.
pub struct Part<S> {
    headers: PartHeaders,
    body: PartBody<S>,
}

impl<S> Part<S>
where
    S: Stream<Item = io::Result<Bytes>> + Unpin,
{
    pub fn headers(&self) -> &PartHeaders {
        &self.headers
    }

    pub fn into_body(self) -> PartBody<S> {
        self.body
    }

    pub fn body_mut(&mut self) -> &mut PartBody<S> {
        &mut self.body
    }

    /// Read the body to completion.
    pub async fn bytes(self) -> Result<Bytes, DecodeError> {
        let mut body = self.body;
        let mut acc = BytesMut::new();
        while let Some(chunk) = body.try_next().await? {
            acc.extend_from_slice(&chunk);
        }
        Ok(acc.freeze())
    }

    /// Read the body to completion and decode it as UTF-8.
    pub async fn text(self) -> Result<String, DecodeError> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Lazy body of one part.
///
/// Ends when the part's closing delimiter is consumed. Once the enclosing
/// [`PartStream`] has moved on to a later part, a leftover body reads as
/// terminated.
pub struct PartBody<S> {
    inner: Arc<Mutex<Inner<S>>>,
    generation: usize,
}

impl<S> Stream for PartBody<S>
where
    S: Stream<Item = io::Result<Bytes>> + Unpin,
{
    type Item = Result<Bytes, DecodeError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let mut inner = lock(&this.inner);

        if inner.done || inner.generation != this.generation || !inner.in_body {
            return Poll::Ready(None);
        }

        match ready!(inner.items.poll_item(cx)) {
            Some(Ok(MultipartItem::Chunk(bytes))) => Poll::Ready(Some(Ok(bytes))),
            Some(Ok(MultipartItem::PartEof)) => {
                inner.in_body = false;
                Poll::Ready(None)
            }
            Some(Ok(_)) => Poll::Ready(None),
            Some(Err(e)) => {
                inner.done = true;
                Poll::Ready(Some(Err(e)))
            }
            None => Poll::Ready(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream::{self, Iter};
    use futures::StreamExt;
    use std::vec::IntoIter;

    type ChunkStream = Iter<IntoIter<io::Result<Bytes>>>;

    fn chunked(chunks: &[&[u8]]) -> ChunkStream {
        let chunks: Vec<io::Result<Bytes>> = chunks.iter().map(|c| Ok(Bytes::copy_from_slice(c))).collect();
        stream::iter(chunks)
    }

    const TWO_PARTS: &[u8] = b"--B\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nhello\r\n--B\r\nContent-Disposition: form-data; name=\"b\"\r\n\r\nworld\r\n--B--\r\n";

    #[tokio::test]
    async fn test_parse_two_parts() {
        let multipart = parse(chunked(&[TWO_PARTS]), Boundary::new("B"), 1024).await.unwrap();

        assert_eq!(multipart.len(), 2);
        assert_eq!(multipart.boundary().as_str(), "B");

        let parts = multipart.parts();
        assert_eq!(parts[0].headers().get("content-disposition"), Some("form-data; name=\"a\""));
        assert_eq!(&parts[0].body().bytes().await.unwrap()[..], b"hello");
        assert_eq!(&parts[1].body().bytes().await.unwrap()[..], b"world");
    }

    #[tokio::test]
    async fn test_parse_with_prelude_and_epilogue() {
        let input = b"preamble text\r\n--B\r\nX: 1\r\n\r\nBODY\r\n--B--\r\ntrailing garbage";
        let multipart = parse(chunked(&[input]), Boundary::new("B"), 1024).await.unwrap();

        assert_eq!(multipart.len(), 1);
        assert_eq!(multipart.parts()[0].headers().get("X"), Some("1"));
        assert_eq!(&multipart.parts()[0].body().bytes().await.unwrap()[..], b"BODY");
    }

    #[tokio::test]
    async fn test_parse_chunked_arbitrarily() {
        for split in 1..TWO_PARTS.len() {
            let input = chunked(&[&TWO_PARTS[..split], &TWO_PARTS[split..]]);
            let multipart = parse(input, Boundary::new("B"), 1024).await.unwrap();

            assert_eq!(multipart.len(), 2, "split at {split}");
            assert_eq!(&multipart.parts()[0].body().bytes().await.unwrap()[..], b"hello");
            assert_eq!(&multipart.parts()[1].body().bytes().await.unwrap()[..], b"world");
        }
    }

    #[tokio::test]
    async fn test_webkit_style_boundary_end_to_end() {
        let boundary = "----WebKitFormBoundaryGpMDnKA9";
        let mut input = Vec::from(&b"prelude--"[..]);
        input.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        input.extend_from_slice(b"Content-Disposition: form-data; name=\"notes\"\r\n\r\n");
        input.extend_from_slice(b"intro\r\n---\r\noutro");
        input.extend_from_slice(format!("\r\n--{boundary}\r\n").as_bytes());
        input.extend_from_slice(b"Content-Disposition: form-data; name=\"patch\"\r\n\r\n");
        input.extend_from_slice(b"--- old\r\n+++ new");
        input.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        for split in 1..input.len() {
            let chunks = chunked(&[&input[..split], &input[split..]]);
            let multipart = parse(chunks, Boundary::new(boundary), 1024).await.unwrap();

            assert_eq!(multipart.len(), 2, "split at {split}");
            assert_eq!(
                &multipart.parts()[0].body().bytes().await.unwrap()[..],
                b"intro\r\n---\r\noutro",
                "split at {split}"
            );
            assert_eq!(
                &multipart.parts()[1].body().bytes().await.unwrap()[..],
                b"--- old\r\n+++ new",
                "split at {split}"
            );
        }
    }

    #[tokio::test]
    async fn test_streamed_parts() {
        let mut parts = parse_to_parts(chunked(&[TWO_PARTS]), Boundary::new("B"), 1024);

        let part = parts.next().await.unwrap().unwrap();
        assert_eq!(part.headers().get("content-disposition"), Some("form-data; name=\"a\""));
        assert_eq!(part.text().await.unwrap(), "hello");

        let part = parts.next().await.unwrap().unwrap();
        assert_eq!(part.text().await.unwrap(), "world");

        assert!(parts.next().await.is_none());
    }

    #[tokio::test]
    async fn test_skipped_body_is_discarded() {
        let mut parts = parse_to_parts(chunked(&[TWO_PARTS]), Boundary::new("B"), 1024);

        let first = parts.next().await.unwrap().unwrap();
        let mut first_body = first.into_body();

        // requesting the next part abandons the unread body
        let second = parts.next().await.unwrap().unwrap();
        assert_eq!(second.text().await.unwrap(), "world");

        assert!(first_body.next().await.is_none());
    }

    #[tokio::test]
    async fn test_body_read_chunk_by_chunk() {
        let input = b"--B\r\n\r\nabc\r\n--B--\r\n";
        let mut parts = parse_to_parts(chunked(&[&input[..6], &input[6..10], &input[10..]]), Boundary::new("B"), 1024);

        let mut part = parts.next().await.unwrap().unwrap();
        assert!(part.headers().is_empty());

        let mut collected = Vec::new();
        while let Some(chunk) = part.body_mut().try_next().await.unwrap() {
            collected.extend_from_slice(&chunk);
        }
        assert_eq!(&collected[..], b"abc");
    }

    #[tokio::test]
    async fn test_header_too_large_surfaces() {
        let mut input = Vec::from(&b"--B\r\n"[..]);
        input.extend(std::iter::repeat(b'X').take(2000));
        input.extend_from_slice(b"\r\n\r\nbody\r\n--B--\r\n");

        let err = parse(chunked(&[&input]), Boundary::new("B"), 1024).await.unwrap_err();

        assert!(matches!(err, DecodeError::HeaderTooLarge { .. }));
    }

    #[tokio::test]
    async fn test_unterminated_part_surfaces() {
        let input = b"--B\r\nX:1\r\n\r\npartial body with no end";
        let err = parse(chunked(&[input]), Boundary::new("B"), 1024).await.unwrap_err();

        assert!(matches!(err, DecodeError::UnterminatedPart));
    }

    #[tokio::test]
    async fn test_input_error_surfaces() {
        let chunks: Vec<io::Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"--B\r\nX: 1\r\n\r\npart")),
            Err(io::Error::new(io::ErrorKind::TimedOut, "read timed out")),
        ];
        let err = parse(stream::iter(chunks), Boundary::new("B"), 1024).await.unwrap_err();

        assert!(matches!(err, DecodeError::Io { .. }));
    }

    #[tokio::test]
    async fn test_stream_is_fused_after_end() {
        let mut parts = parse_to_parts(chunked(&[TWO_PARTS]), Boundary::new("B"), 1024);

        while let Some(part) = parts.next().await {
            part.unwrap().bytes().await.unwrap();
        }

        assert!(parts.next().await.is_none());
    }
}
