//! Streaming `multipart/form-data` parsing.
//!
//! Feed any `Stream` of byte chunks in and get parts out: either lazily
//! with [`parse_to_parts`], collected in memory with [`parse`], or with
//! large part bodies transparently buffered in temporary files via
//! [`SpillParser`] / [`parse_spilled`]. Boundaries are recognized across
//! arbitrary chunk splits and part bodies are never buffered in full on
//! the streaming paths.

pub mod codec;
pub mod protocol;
pub mod stream;

pub use codec::{DecodeError, MultipartDecoder};
pub use protocol::{Boundary, Multipart, MultipartItem, PartHeaders, SpillFile, StoredBody, StoredPart};
pub use stream::{
    parse, parse_spilled, parse_to_parts, Part, PartBody, PartStream, SpillConfig, SpillParser, DEFAULT_HEADER_LIMIT,
    DEFAULT_MAX_BEFORE_WRITE, DEFAULT_MAX_PARTS,
};
