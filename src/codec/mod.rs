mod body_decoder;
pub(crate) mod error;
mod header_block_decoder;
mod multipart_decoder;
mod scanner;

pub use error::DecodeError;
pub use multipart_decoder::MultipartDecoder;
