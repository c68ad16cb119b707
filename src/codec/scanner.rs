use bytes::{Buf, BytesMut};

/// Incremental matcher for one boundary delimiter.
///
/// The scanner consumes whole chunks and classifies their bytes into
/// "definitely before the delimiter" and a retained tail that is a prefix
/// of the delimiter. `matched` counts how many leading delimiter bytes the
/// current tail covers, so a delimiter split across any number of chunks is
/// still recognized; the retained tail never needs its own buffer because
/// its bytes always equal `delim[..matched]`.
///
/// On a mismatch the pending prefix falls back to its longest border via a
/// precomputed failure table instead of restarting from scratch. Delimiters
/// with repeated-byte prefixes overlap themselves (`START` for any boundary
/// that itself starts with `-`, as the WebKit-style defaults do), and a
/// plain restart would walk past matches that begin inside a failed run.
#[derive(Debug)]
pub(crate) struct BoundaryScanner {
    delim: bytes::Bytes,
    fail: Vec<usize>,
    matched: usize,
}

/// `fail[i]` is the length of the longest proper prefix of `delim[..=i]`
/// that is also its suffix.
fn failure_table(delim: &[u8]) -> Vec<usize> {
    let mut fail = vec![0; delim.len()];
    let mut k = 0;
    for i in 1..delim.len() {
        while k > 0 && delim[i] != delim[k] {
            k = fail[k - 1];
        }
        if delim[i] == delim[k] {
            k += 1;
        }
        fail[i] = k;
    }
    fail
}

impl BoundaryScanner {
    pub(crate) fn new(delim: bytes::Bytes) -> Self {
        let fail = failure_table(&delim);
        Self { delim, fail, matched: 0 }
    }

    /// Scan `src` for the delimiter, appending settled before-bytes to `out`.
    ///
    /// Consumes everything it looks at. Returns true once the full delimiter
    /// has been consumed; `src` is then left positioned just after it. When
    /// the chunk ends inside a possible delimiter the partial match is kept
    /// in `matched` and the call returns false with `src` drained.
    pub(crate) fn scan(&mut self, src: &mut BytesMut, out: &mut BytesMut) -> bool {
        let first = self.delim[0];
        let mut k = self.matched;
        let mut i = 0;

        while i < src.len() {
            if k == 0 {
                // bulk-settle bytes that cannot start a match
                match src[i..].iter().position(|&b| b == first) {
                    Some(off) => {
                        out.extend_from_slice(&src[i..i + off]);
                        i += off;
                    }
                    None => {
                        out.extend_from_slice(&src[i..]);
                        i = src.len();
                        break;
                    }
                }
            }

            if src[i] == self.delim[k] {
                k += 1;
                i += 1;
                if k == self.delim.len() {
                    src.advance(i);
                    self.matched = 0;
                    return true;
                }
            } else {
                // shrink the pending prefix to its longest border that may
                // still match; the bytes falling off its front settle, and
                // they are rebuilt from the delimiter itself because the
                // prefix may span earlier chunks
                let next = self.fail[k - 1];
                out.extend_from_slice(&self.delim[..k - next]);
                k = next;
            }
        }

        self.matched = k;
        let n = src.len();
        src.advance(n);
        false
    }

    /// Prelude variant of [`scan`](Self::scan): identical matching rules,
    /// but the before-bytes are discarded instead of accumulated.
    pub(crate) fn skip(&mut self, src: &mut BytesMut) -> bool {
        let first = self.delim[0];
        let mut k = self.matched;
        let mut i = 0;

        while i < src.len() {
            if k == 0 {
                match src[i..].iter().position(|&b| b == first) {
                    Some(off) => i += off,
                    None => {
                        i = src.len();
                        break;
                    }
                }
            }

            if src[i] == self.delim[k] {
                k += 1;
                i += 1;
                if k == self.delim.len() {
                    src.advance(i);
                    self.matched = 0;
                    return true;
                }
            } else {
                k = self.fail[k - 1];
            }
        }

        self.matched = k;
        let n = src.len();
        src.advance(n);
        false
    }
}
