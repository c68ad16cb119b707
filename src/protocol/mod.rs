mod boundary;
mod headers;
mod message;
mod part;

pub(crate) use boundary::HEADER_END;

pub use boundary::Boundary;
pub use headers::PartHeaders;
pub use message::MultipartItem;
pub use part::{Multipart, SpillFile, StoredBody, StoredPart};
