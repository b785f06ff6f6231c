use bytes::Bytes;
use reqwest::blocking::{Client, Request};
use reqwest::header::{HeaderValue, RANGE};
use reqwest::{IntoUrl, Method, StatusCode, Url};

use crate::backend::Backend;
use crate::cache::{DirectoryCache, NoCache};
use crate::error::{PmtError, PmtResult};
use crate::reader::PmTilesReader;

impl PmTilesReader<HttpBackend, NoCache> {
    /// Creates a new `PMTiles` reader from a URL using the Reqwest backend.
    ///
    /// Fails if the URL does not exist or is an invalid archive.
    /// (Note: HTTP requests are made to validate it.)
    ///
    /// # Errors
    /// Fails on transport errors and when the server does not serve a
    /// valid archive.
    pub fn new_with_url<U: IntoUrl>(client: Client, url: U) -> PmtResult<Self> {
        Self::new_with_cached_url(NoCache, client, url)
    }
}

impl<C: DirectoryCache> PmTilesReader<HttpBackend, C> {
    /// Creates a new cached `PMTiles` reader from a URL using the Reqwest backend.
    ///
    /// Fails if the URL does not exist or is an invalid archive.
    /// (Note: HTTP requests are made to validate it.)
    ///
    /// # Errors
    /// Fails on transport errors and when the server does not serve a
    /// valid archive.
    pub fn new_with_cached_url<U: IntoUrl>(cache: C, client: Client, url: U) -> PmtResult<Self> {
        let backend = HttpBackend::try_from(client, url)?;

        Self::try_from_cached_source(backend, cache)
    }
}

/// A byte-range source issuing HTTP `Range` requests against one URL.
pub struct HttpBackend {
    client: Client,
    url: Url,
}

impl HttpBackend {
    /// Wraps a client and archive URL.
    ///
    /// # Errors
    /// Fails when `url` is not a valid URL.
    pub fn try_from<U: IntoUrl>(client: Client, url: U) -> PmtResult<Self> {
        Ok(Self {
            client,
            url: url.into_url()?,
        })
    }
}

impl Backend for HttpBackend {
    fn read(&self, offset: u64, length: u64) -> PmtResult<Bytes> {
        // HTTP range requests are inclusive of the end byte.
        let end = offset + length - 1;
        let range = format!("bytes={offset}-{end}");
        let range = HeaderValue::try_from(range)?;

        let mut req = Request::new(Method::GET, self.url.clone());
        req.headers_mut().insert(RANGE, range);

        let response = self.client.execute(req)?.error_for_status()?;
        if response.status() != StatusCode::PARTIAL_CONTENT {
            return Err(PmtError::RangeRequestsUnsupported);
        }

        let response_bytes = response.bytes()?;
        if response_bytes.len() as u64 > length {
            Err(PmtError::ResponseBodyTooLong(
                response_bytes.len(),
                usize::try_from(length).unwrap_or(usize::MAX),
            ))
        } else {
            Ok(response_bytes)
        }
    }

    fn read_exact(&self, offset: u64, length: u64) -> PmtResult<Bytes> {
        let data = self.read(offset, length)?;

        if data.len() as u64 == length {
            Ok(data)
        } else {
            Err(PmtError::UnexpectedNumberOfBytesReturned(
                usize::try_from(length).unwrap_or(usize::MAX),
                data.len(),
            ))
        }
    }
}
