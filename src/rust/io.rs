//! Input and output streams.
//!
//! Inputs are recognised by their first bytes, never by file extension:
//! gzip and plain text are accepted, any other compression or binary
//! content is rejected for that input only.

use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::string::FromUtf8Error;

use niffler::Format;

use crate::errors::{IndexError, IndexResult, IndexResultExt};

/// Number of bytes niffler needs to recognise a compression format
const SNIFF_LEN: usize = 5;

/// Detected encoding of an accepted input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentFormat {
    Plain,
    Gzip,
}

impl fmt::Display for ContentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentFormat::Plain => write!(f, "text/plain"),
            ContentFormat::Gzip => write!(f, "application/gzip"),
        }
    }
}

pub type InputReader = Box<dyn BufRead + Send>;

/// Recognise the content of `reader` and return a reader over its text.
///
/// `source_name` only labels errors and logs.
pub fn open_sniffed<R>(source_name: &str, reader: R) -> IndexResult<(InputReader, ContentFormat)>
where
    R: Read + Send + 'static,
{
    let mut buffered = BufReader::new(reader);
    let available = buffered.fill_buf()?.len();

    let boxed: Box<dyn Read + Send> = Box::new(buffered);
    let (reader, format) = if available >= SNIFF_LEN {
        niffler::send::sniff(boxed).map_err(|e| unsupported(source_name, e))?
    } else {
        (boxed, Format::No)
    };

    match format {
        Format::No => Ok((ensure_text(source_name, reader, "binary")?, ContentFormat::Plain)),
        Format::Gzip => {
            let (inner, _) =
                niffler::send::get_reader(reader).map_err(|e| unsupported(source_name, e))?;
            Ok((ensure_text(source_name, inner, "binary in gzip")?, ContentFormat::Gzip))
        }
        other => Err(unsupported(source_name, format!("{:?} compression", other).to_lowercase())),
    }
}

/// Open a file, or stdin for `-`, and recognise its content
pub fn open_input<P: AsRef<Path>>(path: P) -> IndexResult<(InputReader, ContentFormat)> {
    let path = path.as_ref();
    if path.as_os_str() == "-" {
        return open_sniffed("stdin", io::stdin());
    }
    let file = File::open(path)?;
    open_sniffed(&path.display().to_string(), file)
}

/// Buffered writer to a file, or to stdout when no path is given
pub fn open_output<P: AsRef<Path>>(path: Option<P>) -> IndexResult<Box<dyn Write + Send>> {
    match path {
        Some(path) => {
            let path = path.as_ref();
            let file = File::create(path)
                .with_field_context("output", &format!("cannot create {}", path.display()))?;
            Ok(Box::new(BufWriter::new(file)))
        }
        None => Ok(Box::new(BufWriter::new(io::stdout()))),
    }
}

/// Lines of a text stream, decoded one at a time.
///
/// Unlike [`BufRead::lines`], a line that is not UTF-8 is handed back as
/// `Ok(Err(_))` and reading goes on with the next line; only a failing read
/// ends the stream with `Err`. Line endings (`\n` or `\r\n`) are stripped.
pub struct TextLines<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: BufRead> TextLines<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, buf: Vec::new() }
    }
}

impl<R: BufRead> Iterator for TextLines<R> {
    type Item = io::Result<Result<String, FromUtf8Error>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => None,
            Ok(_) => {
                if self.buf.last() == Some(&b'\n') {
                    self.buf.pop();
                    if self.buf.last() == Some(&b'\r') {
                        self.buf.pop();
                    }
                }
                Some(Ok(String::from_utf8(std::mem::take(&mut self.buf))))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

fn unsupported(source_name: &str, detected: impl ToString) -> IndexError {
    IndexError::UnsupportedContent {
        source_name: source_name.to_string(),
        detected: detected.to_string(),
    }
}

/// Reject content whose first block is not text
fn ensure_text(
    source_name: &str,
    reader: Box<dyn Read + Send>,
    detected: &str,
) -> IndexResult<InputReader> {
    let mut buffered = BufReader::new(reader);
    let head = buffered.fill_buf()?;
    if !looks_like_text(head) {
        return Err(unsupported(source_name, detected));
    }
    Ok(Box::new(buffered))
}

fn looks_like_text(bytes: &[u8]) -> bool {
    if bytes.contains(&0) {
        return false;
    }
    match std::str::from_utf8(bytes) {
        Ok(_) => true,
        // A multi-byte character cut at the end of the block is still text
        Err(e) => e.error_len().is_none(),
    }
}
