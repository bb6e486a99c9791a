use std::{
    io::{BufRead, BufReader, Read, Seek, SeekFrom},
    time::Duration,
};

use reqwest::{
    StatusCode,
    blocking::{Client, Response},
    header::{DATE, HeaderName, IF_MODIFIED_SINCE, LAST_MODIFIED},
    redirect::Policy,
};
use tracing::debug;

use crate::{
    config::FetchConfig,
    error::{Error, Result},
};

/// A freshly downloaded contents document.
pub struct Document {
    /// Gzip-compressed document bytes.
    pub body: Box<dyn Read + Send>,
    /// Freshness marker to record once the document is fully applied.
    pub marker: Option<String>,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("marker", &self.marker)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub enum Fetched {
    /// The server reported no change since the given marker.
    Unchanged,
    Modified(Document),
}

/// Where contents documents come from.
pub trait DocumentSource: Send + Sync {
    /// Retrieve the document at `uri`, conditional on it having changed
    /// since the `since` marker when one is given.
    fn fetch(&self, uri: &str, since: Option<&str>) -> Result<Fetched>;
}

/// Conditional HTTP retrieval.
///
/// By default the body is spooled to an anonymous temporary file before it
/// is handed on: decompressing straight off the connection was measured to
/// be far slower for multi-hundred-megabyte documents. The file is removed
/// by the OS as soon as the returned reader is dropped.
pub struct HttpSource {
    client: Client,
    spool_to_disk: bool,
}

impl HttpSource {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .redirect(Policy::limited(10))
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            spool_to_disk: config.spool_to_disk,
        })
    }
}

impl DocumentSource for HttpSource {
    fn fetch(&self, uri: &str, since: Option<&str>) -> Result<Fetched> {
        let mut request = self.client.get(uri);
        if let Some(since) = since {
            request = request.header(IF_MODIFIED_SINCE, since);
        }
        let mut response = request.send()?;

        let status = response.status();
        if status == StatusCode::NOT_MODIFIED {
            return Ok(Fetched::Unchanged);
        }
        if !status.is_success() {
            return Err(Error::Status {
                uri: uri.to_string(),
                status: status.as_u16(),
            });
        }
        if response.content_length() == Some(0) {
            return Ok(Fetched::Unchanged);
        }

        let marker = header(&response, DATE)
            .or_else(|| header(&response, LAST_MODIFIED));

        // Chunked or close-delimited bodies carry no length up front; an
        // empty one still means nothing changed.
        let body: Box<dyn Read + Send> = if self.spool_to_disk {
            let mut scratch = tempfile::tempfile()?;
            let bytes = response.copy_to(&mut scratch)?;
            if bytes == 0 {
                return Ok(Fetched::Unchanged);
            }
            scratch.seek(SeekFrom::Start(0))?;
            debug!(uri, bytes, "spooled document to scratch file");
            Box::new(scratch)
        } else {
            let mut stream = BufReader::new(response);
            if stream.fill_buf()?.is_empty() {
                return Ok(Fetched::Unchanged);
            }
            Box::new(stream)
        };

        Ok(Fetched::Modified(Document { body, marker }))
    }
}

fn header(response: &Response, name: HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
