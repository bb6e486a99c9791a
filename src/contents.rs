//! Parsing of Debian-style `Contents-<arch>.gz` documents.
//!
//! A document starts with free-form prose, terminated by a header line
//! such as `FILE                                LOCATION`. Every following
//! line maps one installed path to the package that ships it:
//!
//! ```text
//! usr/share/doc/foo/copyright        libdevel/libfoo-dev
//! ```

use std::io::BufRead;

use crate::error::{Error, Result};

/// One parsed contents line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentsEntry {
    pub path: String,
    pub package: String,
}

/// Split a data line into its file path and package.
///
/// The last whitespace-separated token is the location column; the tokens
/// before it, joined by single spaces, are the path. Only the final
/// `/`-separated segment of the location (the package name without its
/// section) is kept.
///
/// # Examples
///
/// ```
/// use contents_grapple::contents::parse_line;
///
/// let entry = parse_line("usr/bin/ls    utils/coreutils", 1).unwrap();
/// assert_eq!(entry.path, "usr/bin/ls");
/// assert_eq!(entry.package, "coreutils");
/// ```
pub fn parse_line(line: &str, line_no: u64) -> Result<ContentsEntry> {
    let mut tokens: Vec<&str> = line.split_whitespace().collect();
    let location = match tokens.pop() {
        Some(location) if !tokens.is_empty() => location,
        _ => {
            return Err(Error::MalformedLine {
                line_no,
                line: line.trim_end().to_string(),
            });
        }
    };

    let package = location.rsplit('/').next().unwrap_or(location).trim();
    let path = tokens.join(" ");

    Ok(ContentsEntry {
        path: path.trim().to_string(),
        package: package.to_string(),
    })
}

/// Whether `line` is the header that precedes the data section.
pub fn is_header(line: &str) -> bool {
    line.starts_with("FILE") && line.contains("LOCATION")
}

/// Consume the preamble up to and including the header line.
///
/// Returns the number of lines consumed, or `None` when the stream ends
/// without a header, in which case the document holds nothing to ingest.
pub fn skip_preamble<R: BufRead>(reader: &mut R) -> Result<Option<u64>> {
    let mut buf = Vec::new();
    let mut consumed = 0;
    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .map_err(Error::Decompress)?;
        if read == 0 {
            return Ok(None);
        }
        consumed += 1;
        if is_header(&String::from_utf8_lossy(&buf)) {
            return Ok(Some(consumed));
        }
    }
}
