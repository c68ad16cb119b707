use snafu::prelude::*;

use std::io::Error as IoError;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum DecodeError {
    #[snafu(display("multipart stream contained no data"))]
    EmptyStream,

    #[snafu(display("multipart stream ended before the opening boundary"))]
    MalformedStart,

    #[snafu(display("header block too large, current size: {current_size}, max size: {max_size}"))]
    HeaderTooLarge { current_size: usize, max_size: usize },

    #[snafu(display("multipart stream ended inside a boundary delimiter"))]
    PartialBoundary,

    #[snafu(display("part body ended without a closing boundary"))]
    UnterminatedPart,

    #[snafu(display("part count exceeded the limit {max_parts}"))]
    PartsLimitExceeded { max_parts: usize },

    #[snafu(display("io error happens when parsing : {source}"), context(false))]
    Io { source: IoError },
}
