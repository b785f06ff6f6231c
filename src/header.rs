use std::io::Write;
use std::num::NonZeroU64;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{PmtError, PmtResult};

/// Size of the fixed archive header, in bytes.
pub const HEADER_SIZE: usize = 127;

/// Number of bytes a cold reader fetches in its first request; the header
/// and the root directory must fit inside it.
pub const MAX_INITIAL_BYTES: usize = 16_384;

static V3_MAGIC: &str = "PMTiles";
static V2_MAGIC: &str = "PM";

/// The fixed 127-byte header at the start of every archive.
///
/// Bounds and center coordinates are stored the way the format stores
/// them, as signed degrees scaled by 10^7 (`*_e7` fields); use the
/// degree accessors for floating-point values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Specification version, always `3`.
    pub version: u8,
    /// Offset of the root directory from the start of the archive.
    pub root_offset: u64,
    /// Compressed length of the root directory.
    pub root_length: u64,
    /// Offset of the metadata document from the start of the archive.
    pub metadata_offset: u64,
    /// Compressed length of the metadata document.
    pub metadata_length: u64,
    /// Offset of the leaf directories section from the start of the archive.
    pub leaf_offset: u64,
    /// Length of the leaf directories section.
    pub leaf_length: u64,
    /// Offset of the tile data section from the start of the archive.
    pub data_offset: u64,
    /// Length of the tile data section.
    pub data_length: u64,
    /// Number of addressable tiles; `None` when unknown (stored as 0).
    pub n_addressed_tiles: Option<NonZeroU64>,
    /// Number of tile entries after run-length coalescing; `None` when unknown.
    pub n_tile_entries: Option<NonZeroU64>,
    /// Number of distinct tile contents; `None` when unknown.
    pub n_tile_contents: Option<NonZeroU64>,
    /// Whether tile data is laid out in ascending tile-ID order.
    pub clustered: bool,
    /// Compression of directories and metadata.
    pub internal_compression: Compression,
    /// Compression of the stored tile bytes.
    pub tile_compression: Compression,
    /// Type of the stored tiles.
    pub tile_type: TileType,
    /// Lowest zoom level present in the archive.
    pub min_zoom: u8,
    /// Highest zoom level present in the archive.
    pub max_zoom: u8,
    /// Western bound, degrees times 10^7.
    pub min_longitude_e7: i32,
    /// Southern bound, degrees times 10^7.
    pub min_latitude_e7: i32,
    /// Eastern bound, degrees times 10^7.
    pub max_longitude_e7: i32,
    /// Northern bound, degrees times 10^7.
    pub max_latitude_e7: i32,
    /// Suggested initial zoom level for viewers.
    pub center_zoom: u8,
    /// Suggested initial longitude, degrees times 10^7.
    pub center_longitude_e7: i32,
    /// Suggested initial latitude, degrees times 10^7.
    pub center_latitude_e7: i32,
}

impl Header {
    /// Creates a header with empty sections and world bounds.
    #[must_use]
    pub fn new(tile_compression: Compression, tile_type: TileType) -> Self {
        Self {
            version: 3,
            root_offset: 0,
            root_length: 0,
            metadata_offset: 0,
            metadata_length: 0,
            leaf_offset: 0,
            leaf_length: 0,
            data_offset: 0,
            data_length: 0,
            n_addressed_tiles: None,
            n_tile_entries: None,
            n_tile_contents: None,
            clustered: true,
            internal_compression: Compression::Gzip,
            tile_compression,
            tile_type,
            min_zoom: 0,
            max_zoom: 0,
            min_longitude_e7: -1_800_000_000,
            min_latitude_e7: -900_000_000,
            max_longitude_e7: 1_800_000_000,
            max_latitude_e7: 900_000_000,
            center_zoom: 0,
            center_longitude_e7: 0,
            center_latitude_e7: 0,
        }
    }

    /// Western bound in degrees.
    #[must_use]
    pub fn min_longitude(&self) -> f64 {
        f64::from(self.min_longitude_e7) / 10_000_000.0
    }

    /// Southern bound in degrees.
    #[must_use]
    pub fn min_latitude(&self) -> f64 {
        f64::from(self.min_latitude_e7) / 10_000_000.0
    }

    /// Eastern bound in degrees.
    #[must_use]
    pub fn max_longitude(&self) -> f64 {
        f64::from(self.max_longitude_e7) / 10_000_000.0
    }

    /// Northern bound in degrees.
    #[must_use]
    pub fn max_latitude(&self) -> f64 {
        f64::from(self.max_latitude_e7) / 10_000_000.0
    }

    /// Suggested initial longitude in degrees.
    #[must_use]
    pub fn center_longitude(&self) -> f64 {
        f64::from(self.center_longitude_e7) / 10_000_000.0
    }

    /// Suggested initial latitude in degrees.
    #[must_use]
    pub fn center_latitude(&self) -> f64 {
        f64::from(self.center_latitude_e7) / 10_000_000.0
    }

    /// Parses a header from the first 127 bytes of an archive.
    ///
    /// # Errors
    /// Fails with [`PmtError::InvalidMagicNumber`] when the magic string
    /// is absent, [`PmtError::UnsupportedPmTilesVersion`] for v2 archives
    /// or unknown version bytes, and [`PmtError::InvalidHeader`] when the
    /// buffer is too short.
    pub fn try_from_bytes(mut bytes: Bytes) -> PmtResult<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(PmtError::InvalidHeader);
        }

        if &bytes[0..V3_MAGIC.len()] != V3_MAGIC.as_bytes() {
            return if &bytes[0..V2_MAGIC.len()] == V2_MAGIC.as_bytes() {
                Err(PmtError::UnsupportedPmTilesVersion)
            } else {
                Err(PmtError::InvalidMagicNumber)
            };
        }
        bytes.advance(V3_MAGIC.len());

        let version = bytes.get_u8();
        if version != 3 {
            return Err(PmtError::UnsupportedPmTilesVersion);
        }

        Ok(Self {
            version,
            root_offset: bytes.get_u64_le(),
            root_length: bytes.get_u64_le(),
            metadata_offset: bytes.get_u64_le(),
            metadata_length: bytes.get_u64_le(),
            leaf_offset: bytes.get_u64_le(),
            leaf_length: bytes.get_u64_le(),
            data_offset: bytes.get_u64_le(),
            data_length: bytes.get_u64_le(),
            n_addressed_tiles: NonZeroU64::new(bytes.get_u64_le()),
            n_tile_entries: NonZeroU64::new(bytes.get_u64_le()),
            n_tile_contents: NonZeroU64::new(bytes.get_u64_le()),
            clustered: bytes.get_u8() == 1,
            internal_compression: bytes.get_u8().try_into()?,
            tile_compression: bytes.get_u8().try_into()?,
            tile_type: bytes.get_u8().try_into()?,
            min_zoom: bytes.get_u8(),
            max_zoom: bytes.get_u8(),
            min_longitude_e7: bytes.get_i32_le(),
            min_latitude_e7: bytes.get_i32_le(),
            max_longitude_e7: bytes.get_i32_le(),
            max_latitude_e7: bytes.get_i32_le(),
            center_zoom: bytes.get_u8(),
            center_longitude_e7: bytes.get_i32_le(),
            center_latitude_e7: bytes.get_i32_le(),
        })
    }

    /// Writes the 127-byte header.
    ///
    /// # Errors
    /// Fails when the underlying writer does.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE);
        buf.put_slice(V3_MAGIC.as_bytes());
        buf.put_u8(3);
        buf.put_u64_le(self.root_offset);
        buf.put_u64_le(self.root_length);
        buf.put_u64_le(self.metadata_offset);
        buf.put_u64_le(self.metadata_length);
        buf.put_u64_le(self.leaf_offset);
        buf.put_u64_le(self.leaf_length);
        buf.put_u64_le(self.data_offset);
        buf.put_u64_le(self.data_length);
        buf.put_u64_le(self.n_addressed_tiles.map_or(0, NonZeroU64::get));
        buf.put_u64_le(self.n_tile_entries.map_or(0, NonZeroU64::get));
        buf.put_u64_le(self.n_tile_contents.map_or(0, NonZeroU64::get));
        buf.put_u8(u8::from(self.clustered));
        buf.put_u8(self.internal_compression.into());
        buf.put_u8(self.tile_compression.into());
        buf.put_u8(self.tile_type.into());
        buf.put_u8(self.min_zoom);
        buf.put_u8(self.max_zoom);
        buf.put_i32_le(self.min_longitude_e7);
        buf.put_i32_le(self.min_latitude_e7);
        buf.put_i32_le(self.max_longitude_e7);
        buf.put_i32_le(self.max_latitude_e7);
        buf.put_u8(self.center_zoom);
        buf.put_i32_le(self.center_longitude_e7);
        buf.put_i32_le(self.center_latitude_e7);
        debug_assert_eq!(buf.len(), HEADER_SIZE);
        writer.write_all(&buf)
    }
}

/// Compression of directories, metadata, or tile data.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum Compression {
    /// Unknown compression, the default for pre-existing archives.
    Unknown,
    /// No compression.
    None,
    /// Gzip (RFC 1952).
    Gzip,
    /// Brotli (RFC 7932).
    Brotli,
    /// Zstandard (RFC 8478).
    Zstd,
}

impl Compression {
    /// The `Content-Encoding` HTTP header value for tiles stored with
    /// this compression, if one applies.
    #[must_use]
    pub const fn content_encoding(self) -> Option<&'static str> {
        match self {
            Self::Gzip => Some("gzip"),
            Self::Brotli => Some("br"),
            Self::Zstd => Some("zstd"),
            Self::Unknown | Self::None => None,
        }
    }
}

impl TryFrom<u8> for Compression {
    type Error = PmtError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Unknown),
            1 => Ok(Self::None),
            2 => Ok(Self::Gzip),
            3 => Ok(Self::Brotli),
            4 => Ok(Self::Zstd),
            v => Err(PmtError::InvalidCompression(v)),
        }
    }
}

impl From<Compression> for u8 {
    fn from(compression: Compression) -> Self {
        match compression {
            Compression::Unknown => 0,
            Compression::None => 1,
            Compression::Gzip => 2,
            Compression::Brotli => 3,
            Compression::Zstd => 4,
        }
    }
}

/// Type of the tiles stored in an archive.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum TileType {
    /// Unknown tile type.
    Unknown,
    /// Mapbox vector tiles.
    Mvt,
    /// PNG raster tiles.
    Png,
    /// JPEG raster tiles.
    Jpeg,
    /// WebP raster tiles.
    Webp,
    /// AVIF raster tiles.
    Avif,
}

impl TileType {
    /// The `Content-Type` HTTP header value for tiles of this type, if
    /// one applies.
    #[must_use]
    pub const fn content_type(self) -> Option<&'static str> {
        match self {
            Self::Mvt => Some("application/vnd.mapbox-vector-tile"),
            Self::Png => Some("image/png"),
            Self::Jpeg => Some("image/jpeg"),
            Self::Webp => Some("image/webp"),
            Self::Avif => Some("image/avif"),
            Self::Unknown => None,
        }
    }
}

impl TryFrom<u8> for TileType {
    type Error = PmtError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Unknown),
            1 => Ok(Self::Mvt),
            2 => Ok(Self::Png),
            3 => Ok(Self::Jpeg),
            4 => Ok(Self::Webp),
            5 => Ok(Self::Avif),
            v => Err(PmtError::InvalidTileType(v)),
        }
    }
}

impl From<TileType> for u8 {
    fn from(tile_type: TileType) -> Self {
        match tile_type {
            TileType::Unknown => 0,
            TileType::Mvt => 1,
            TileType::Png => 2,
            TileType::Jpeg => 3,
            TileType::Webp => 4,
            TileType::Avif => 5,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample_header() -> Header {
        Header {
            version: 3,
            root_offset: 127,
            root_length: 246,
            metadata_offset: 373,
            metadata_length: 22,
            leaf_offset: 395,
            leaf_length: 18,
            data_offset: 413,
            data_length: 715_657,
            n_addressed_tiles: NonZeroU64::new(85),
            n_tile_entries: NonZeroU64::new(84),
            n_tile_contents: NonZeroU64::new(80),
            clustered: true,
            internal_compression: Compression::Gzip,
            tile_compression: Compression::None,
            tile_type: TileType::Png,
            min_zoom: 0,
            max_zoom: 3,
            min_longitude_e7: -1_800_000_000,
            min_latitude_e7: -850_000_000,
            max_longitude_e7: 1_800_000_000,
            max_latitude_e7: 850_000_000,
            center_zoom: 0,
            center_longitude_e7: 0,
            center_latitude_e7: 0,
        }
    }

    #[test]
    fn round_trip_all_fields() {
        let header = Header {
            // exercise values that do not survive 32-bit floats
            min_longitude_e7: 111_540_261,
            min_latitude_e7: 437_270_125,
            max_longitude_e7: 113_289_395,
            max_latitude_e7: 438_325_455,
            center_longitude_e7: 112_414_827,
            center_latitude_e7: 437_797_790,
            tile_type: TileType::Mvt,
            tile_compression: Compression::Gzip,
            clustered: false,
            min_zoom: 0,
            max_zoom: 14,
            center_zoom: 7,
            ..sample_header()
        };

        let mut buf = Vec::new();
        header.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_SIZE);

        let parsed = Header::try_from_bytes(Bytes::from(buf)).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn wire_layout() {
        let mut buf = Vec::new();
        sample_header().write_to(&mut buf).unwrap();

        assert_eq!(&buf[0..7], b"PMTiles");
        assert_eq!(buf[7], 3);
        // root offset at byte 8, little endian
        assert_eq!(u64::from_le_bytes(buf[8..16].try_into().unwrap()), 127);
        assert_eq!(buf[96], 1);
        assert_eq!(buf[97], u8::from(Compression::Gzip));
        assert_eq!(buf[98], u8::from(Compression::None));
        assert_eq!(buf[99], u8::from(TileType::Png));
        assert_eq!(buf[100], 0);
        assert_eq!(buf[101], 3);
        assert_eq!(
            i32::from_le_bytes(buf[102..106].try_into().unwrap()),
            -1_800_000_000
        );
        assert_eq!(buf[118], 0);
        assert_eq!(i32::from_le_bytes(buf[119..123].try_into().unwrap()), 0);
    }

    #[test]
    fn degree_accessors() {
        let header = sample_header();
        assert!((header.min_longitude() - -180.0).abs() < f64::EPSILON);
        assert!((header.max_latitude() - 85.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut buf = Vec::new();
        sample_header().write_to(&mut buf).unwrap();
        buf[0] = b'X';
        assert!(matches!(
            Header::try_from_bytes(Bytes::from(buf)),
            Err(PmtError::InvalidMagicNumber)
        ));
    }

    #[test]
    fn rejects_v2_archives() {
        let mut buf = vec![0_u8; HEADER_SIZE];
        buf[0] = b'P';
        buf[1] = b'M';
        assert!(matches!(
            Header::try_from_bytes(Bytes::from(buf)),
            Err(PmtError::UnsupportedPmTilesVersion)
        ));
    }

    #[test]
    fn rejects_unknown_version() {
        let mut buf = Vec::new();
        sample_header().write_to(&mut buf).unwrap();
        buf[7] = 4;
        assert!(matches!(
            Header::try_from_bytes(Bytes::from(buf)),
            Err(PmtError::UnsupportedPmTilesVersion)
        ));
    }

    #[test]
    fn rejects_short_buffer() {
        assert!(matches!(
            Header::try_from_bytes(Bytes::from_static(b"PMTiles")),
            Err(PmtError::InvalidHeader)
        ));
    }
}
