use bytes::Bytes;

/// the header block terminator, shared by every multipart message
pub(crate) const HEADER_END: &[u8] = b"\r\n\r\n";

/// Caller-supplied multipart boundary with its derived delimiters.
///
/// `start` opens the first part, `inter` separates parts; the terminal
/// marker is `inter` immediately followed by `--`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Boundary {
    value: String,
    start: Bytes,
    inter: Bytes,
}

impl Boundary {
    /// Build a boundary from the `boundary` parameter of the Content-Type
    /// header. The value is used verbatim; it must be non-empty.
    pub fn new(value: impl Into<String>) -> Self {
        let value = value.into();
        let start = Bytes::from(format!("--{value}"));
        let inter = Bytes::from(format!("\r\n--{value}"));
        Self { value, start, inter }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// `"--" ++ boundary`
    pub fn start_delimiter(&self) -> Bytes {
        self.start.clone()
    }

    /// `CRLF ++ "--" ++ boundary`
    pub fn part_delimiter(&self) -> Bytes {
        self.inter.clone()
    }
}
