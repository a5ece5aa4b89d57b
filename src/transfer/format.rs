// ABOUTME: Transfer file codec: tab-separated header and body lines
// ABOUTME: Escapes tabs, newlines, backslashes and NULL so every text value round-trips

use std::borrow::Cow;
use std::io::{BufRead, Write};
use thiserror::Error;

pub const FIELD_SEPARATOR: char = '\t';

/// Field text standing for SQL `NULL`
pub const NULL_MARKER: &str = "\\N";

/// Problems found while reading a transfer file
#[derive(Debug, Error)]
pub enum FileError {
    #[error("file is empty (missing header line)")]
    MissingHeader,

    #[error("header contains an empty field name")]
    EmptyHeaderField,

    #[error("expected {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },

    #[error("line is not valid UTF-8")]
    Encoding,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Escape one value for the body of a transfer file
///
/// # Examples
///
/// ```
/// # use tsvio::transfer::format::escape_value;
/// assert_eq!(escape_value(Some("plain")), "plain");
/// assert_eq!(escape_value(Some("a\tb")), "a\\tb");
/// assert_eq!(escape_value(None), "\\N");
/// ```
pub fn escape_value(value: Option<&str>) -> Cow<'_, str> {
    let text = match value {
        Some(text) => text,
        None => return Cow::Borrowed(NULL_MARKER),
    };

    if !text.contains(['\\', '\t', '\n', '\r']) {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    Cow::Owned(out)
}

/// Reverse [`escape_value`] for one body field
///
/// Unknown escape sequences and a trailing lone backslash are kept as-is.
///
/// # Examples
///
/// ```
/// # use tsvio::transfer::format::unescape_field;
/// assert_eq!(unescape_field("a\\tb"), Some("a\tb".to_string()));
/// assert_eq!(unescape_field("\\N"), None);
/// assert_eq!(unescape_field(""), Some(String::new()));
/// ```
pub fn unescape_field(field: &str) -> Option<String> {
    if field == NULL_MARKER {
        return None;
    }
    if !field.contains('\\') {
        return Some(field.to_string());
    }

    let mut out = String::with_capacity(field.len());
    let mut chars = field.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    Some(out)
}

/// Remove the record separator (and a CR left by CRLF files)
pub fn strip_line_ending(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

fn read_error(error: std::io::Error) -> FileError {
    match error.kind() {
        std::io::ErrorKind::InvalidData => FileError::Encoding,
        _ => FileError::Io(error),
    }
}

/// Split a header line into field names
pub fn parse_header(line: &str) -> Result<Vec<String>, FileError> {
    let line = strip_line_ending(line);
    if line.trim().is_empty() {
        return Err(FileError::MissingHeader);
    }

    let names: Vec<String> = line
        .split(FIELD_SEPARATOR)
        .map(|name| name.trim().to_string())
        .collect();
    if names.iter().any(String::is_empty) {
        return Err(FileError::EmptyHeaderField);
    }
    Ok(names)
}

/// Split and unescape one body line
pub fn decode_line(line: &str) -> Vec<Option<String>> {
    strip_line_ending(line)
        .split(FIELD_SEPARATOR)
        .map(unescape_field)
        .collect()
}

/// Join already-escaped fields into one line, without the record separator
pub fn encode_line<'a, I>(fields: I) -> String
where
    I: IntoIterator<Item = Cow<'a, str>>,
{
    let mut line = String::new();
    for (i, field) in fields.into_iter().enumerate() {
        if i > 0 {
            line.push(FIELD_SEPARATOR);
        }
        line.push_str(&field);
    }
    line
}

/// Writes a header followed by body lines
pub struct TransferWriter<W: Write> {
    out: W,
    arity: usize,
    rows: u64,
}

impl<W: Write> TransferWriter<W> {
    /// Write the header line and return a writer for the body
    pub fn new(mut out: W, header: &[String]) -> std::io::Result<Self> {
        let line = encode_line(header.iter().map(|name| Cow::Borrowed(name.as_str())));
        out.write_all(line.as_bytes())?;
        out.write_all(b"\n")?;
        Ok(Self {
            out,
            arity: header.len(),
            rows: 0,
        })
    }

    /// Write one row; the caller guarantees one value per header field
    pub fn write_row(&mut self, values: &[Option<String>]) -> std::io::Result<()> {
        debug_assert_eq!(values.len(), self.arity);
        let line = encode_line(values.iter().map(|v| escape_value(v.as_deref())));
        self.out.write_all(line.as_bytes())?;
        self.out.write_all(b"\n")?;
        self.rows += 1;
        Ok(())
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Flush buffered output and hand back the underlying writer
    pub fn finish(mut self) -> std::io::Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}

/// One decoded body line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyLine {
    /// 1-based line number in the file (the header is line 1)
    pub line: usize,
    pub values: Vec<Option<String>>,
}

/// Reads the header, then body lines checked against the header's arity
pub struct TransferReader<R: BufRead> {
    input: R,
    header: Vec<String>,
    line: usize,
    buf: String,
}

impl<R: BufRead> TransferReader<R> {
    pub fn new(mut input: R) -> Result<Self, FileError> {
        let mut buf = String::new();
        if input.read_line(&mut buf).map_err(read_error)? == 0 {
            return Err(FileError::MissingHeader);
        }
        let header = parse_header(&buf)?;
        Ok(Self {
            input,
            header,
            line: 1,
            buf,
        })
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// Number of the last line read
    pub fn line(&self) -> usize {
        self.line
    }

    /// Next body line, or `None` at end of file
    ///
    /// A blank line decodes to one empty field, which is a row of its own in a
    /// single-column file. In wider files a blank last line is ignored and a
    /// blank line anywhere else is a field count error.
    pub fn next_line(&mut self) -> Option<Result<BodyLine, FileError>> {
        self.buf.clear();
        match self.input.read_line(&mut self.buf) {
            Ok(0) => return None,
            Ok(_) => {}
            Err(e) => {
                self.line += 1;
                return Some(Err(read_error(e)));
            }
        }
        self.line += 1;

        if self.header.len() > 1 && strip_line_ending(&self.buf).is_empty() {
            match self.input.fill_buf() {
                Ok(rest) if rest.is_empty() => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(read_error(e))),
            }
        }

        let values = decode_line(&self.buf);
        if values.len() != self.header.len() {
            return Some(Err(FileError::FieldCount {
                expected: self.header.len(),
                found: values.len(),
            }));
        }
        Some(Ok(BodyLine {
            line: self.line,
            values,
        }))
    }
}
