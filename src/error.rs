use thiserror::Error;

use crate::Compression;

/// A specialized [`Result`] type for `PMTiles` operations.
pub type PmtResult<T> = Result<T, PmtError>;

/// Errors that can occur while reading or writing `PMTiles` archives.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PmtError {
    /// The archive does not start with the `PMTiles` magic string.
    #[error("Invalid magic number")]
    InvalidMagicNumber,
    /// The archive declares a specification version other than 3.
    #[error("Unsupported PMTiles version")]
    UnsupportedPmTilesVersion,
    /// The header is shorter than 127 bytes or otherwise unparseable.
    #[error("Invalid header")]
    InvalidHeader,
    /// The header carries a compression value outside the known range.
    #[error("Invalid compression value {0}")]
    InvalidCompression(u8),
    /// The header carries a tile type value outside the known range.
    #[error("Invalid tile type value {0}")]
    InvalidTileType(u8),
    /// The requested operation cannot be performed with this compression.
    #[error("Unsupported compression {0:?}")]
    UnsupportedCompression(Compression),
    /// A directory ended in the middle of a varint.
    #[error("Truncated varint in directory")]
    TruncatedVarint,
    /// A directory entry is inconsistent, e.g. the first entry uses the
    /// contiguous-offset marker.
    #[error("Invalid directory entry")]
    InvalidEntry,
    /// A directory entry length does not fit into 32 bits.
    #[error("Directory index entry is too large")]
    IndexEntryOverflow,
    /// The zoom level exceeds what 64-bit tile IDs can address.
    #[error("Tile zoom {0} exceeds the maximum of 31")]
    ZoomOutOfRange(u8),
    /// The x/y coordinates fall outside the given zoom level.
    #[error("Tile coordinates {1}/{2} are outside zoom level {0}")]
    CoordinatesOutOfRange(u8, u64, u64),
    /// The raw tile ID lies beyond the last tile of zoom 31.
    #[error("Tile ID {0} exceeds the 64-bit tile pyramid")]
    TileIdOutOfRange(u64),
    /// The metadata section is not a valid JSON document.
    #[error(transparent)]
    JsonParsing(#[from] serde_json::Error),
    /// An I/O error from the backend or an output stream.
    #[error(transparent)]
    Reading(#[from] std::io::Error),
    /// The file could not be memory-mapped.
    #[error("Unable to open mmap file")]
    UnableToOpenMmapFile,
    /// A byte-range source returned a different number of bytes than requested.
    #[error("Unexpected number of bytes returned [expected: {0}, received: {1}]")]
    UnexpectedNumberOfBytesReturned(usize, usize),
    /// The remote server ignored the `Range` request header.
    #[error("Range requests unsupported")]
    RangeRequestsUnsupported,
    /// The remote server sent more bytes than were requested.
    #[error("HTTP response body is too long, Response {0}B > requested {1}B")]
    ResponseBodyTooLong(usize, usize),
    /// An HTTP transport error.
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    /// The requested byte range does not form a valid `Range` header value.
    #[error(transparent)]
    InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),
}
