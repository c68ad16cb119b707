/// Ordered header list of one part.
///
/// Names keep their original case and duplicates are permitted; lookups
/// compare case-insensitively per HTTP convention.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartHeaders {
    entries: Vec<(String, String)>,
}

impl PartHeaders {
    /// Decode a header block known to be delimited by (but not to contain)
    /// the double-CRLF terminator.
    ///
    /// Each line is split bytewise at the first `:` before UTF-8 decoding,
    /// and the value is trimmed of surrounding whitespace. Lines without a
    /// `:` are dropped.
    pub fn parse(block: &[u8]) -> Self {
        let mut entries = Vec::new();

        let mut rest = block;
        while !rest.is_empty() {
            let (line, tail) = match rest.windows(2).position(|w| w == b"\r\n") {
                Some(idx) => (&rest[..idx], &rest[idx + 2..]),
                None => (rest, &rest[rest.len()..]),
            };
            rest = tail;

            if line.is_empty() {
                continue;
            }
            let Some(colon) = line.iter().position(|&b| b == b':') else {
                continue;
            };

            let name = String::from_utf8_lossy(&line[..colon]).into_owned();
            let value = String::from_utf8_lossy(&line[colon + 1..]).trim().to_string();
            entries.push((name, value));
        }

        Self { entries }
    }

    /// first value for `name`, compared case-insensitively
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(entry, _)| entry.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// every value for `name`, in input order
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(entry, _)| entry.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
