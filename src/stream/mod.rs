mod item_stream;
mod part_stream;
mod spill;

pub(crate) use item_stream::ItemStream;

pub use part_stream::{parse, parse_to_parts, Part, PartBody, PartStream};
pub use spill::{
    parse_spilled, SpillConfig, SpillParser, DEFAULT_HEADER_LIMIT, DEFAULT_MAX_BEFORE_WRITE, DEFAULT_MAX_PARTS,
};
