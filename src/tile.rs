#![allow(clippy::unreadable_literal)]

use std::fmt::{Display, Formatter};

use hilbert_2d::Variant;

use crate::error::{PmtError, PmtResult};

/// The pre-computed sizes of the tile pyramid below each zoom level.
///
/// `PYRAMID_SIZE_BY_ZOOM[z]` is the number of tiles in all zoom levels
/// before `z`, and therefore the first tile ID of zoom level `z`.
///
/// ```
/// # use pmtiles_core::PYRAMID_SIZE_BY_ZOOM;
/// for z in 0..32 {
///     let tiles_at_level = 4_u64.pow(z as u32);
///     assert_eq!(PYRAMID_SIZE_BY_ZOOM[z + 1], PYRAMID_SIZE_BY_ZOOM[z] + tiles_at_level);
/// }
/// ```
pub const PYRAMID_SIZE_BY_ZOOM: [u64; 33] = [
    /*  0 */ 0,
    /*  1 */ 1,
    /*  2 */ 5,
    /*  3 */ 21,
    /*  4 */ 85,
    /*  5 */ 341,
    /*  6 */ 1365,
    /*  7 */ 5461,
    /*  8 */ 21845,
    /*  9 */ 87381,
    /* 10 */ 349525,
    /* 11 */ 1398101,
    /* 12 */ 5592405,
    /* 13 */ 22369621,
    /* 14 */ 89478485,
    /* 15 */ 357913941,
    /* 16 */ 1431655765,
    /* 17 */ 5726623061,
    /* 18 */ 22906492245,
    /* 19 */ 91625968981,
    /* 20 */ 366503875925,
    /* 21 */ 1466015503701,
    /* 22 */ 5864062014805,
    /* 23 */ 23456248059221,
    /* 24 */ 93824992236885,
    /* 25 */ 375299968947541,
    /* 26 */ 1501199875790165,
    /* 27 */ 6004799503160661,
    /* 28 */ 24019198012642645,
    /* 29 */ 96076792050570581,
    /* 30 */ 384307168202282325,
    /* 31 */ 1537228672809129301,
    // this is the largest possible value because at z32 (base + 4^32) would overflow u64
    /* 32 */ 6148914691236517205,
];

/// The highest zoom level addressable by 64-bit tile IDs.
pub const MAX_ZOOM: u8 = 31;

/// The largest valid tile ID, i.e. the last tile of zoom level 31.
pub const MAX_TILE_ID: u64 = PYRAMID_SIZE_BY_ZOOM[32] - 1;

/// A tile's position in the Hilbert-ordered tile pyramid.
///
/// IDs start at `0` for `0/0/0` and run through each zoom level in
/// Hilbert-curve order, so consecutive IDs are spatially adjacent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TileId(u64);

impl TileId {
    /// Validates a raw 64-bit value as a tile ID.
    ///
    /// # Errors
    /// Returns [`PmtError::TileIdOutOfRange`] for values past the last
    /// tile of zoom 31.
    pub fn new(value: u64) -> PmtResult<Self> {
        if value > MAX_TILE_ID {
            Err(PmtError::TileIdOutOfRange(value))
        } else {
            Ok(Self(value))
        }
    }

    /// Returns the raw 64-bit value.
    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }

    /// Returns the zoom level this ID belongs to.
    #[must_use]
    pub fn zoom(self) -> u8 {
        // The pyramid table is cumulative, so the zoom level is the last
        // base at or below the ID.
        for z in (0..=MAX_ZOOM).rev() {
            if PYRAMID_SIZE_BY_ZOOM[usize::from(z)] <= self.0 {
                return z;
            }
        }
        0
    }
}

impl Display for TileId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Tile coordinates `(z, x, y)` in the XYZ addressing scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoord {
    z: u8,
    x: u64,
    y: u64,
}

impl TileCoord {
    /// Validates tile coordinates against the zoom level bounds.
    ///
    /// # Errors
    /// Returns [`PmtError::ZoomOutOfRange`] for `z > 31` and
    /// [`PmtError::CoordinatesOutOfRange`] when `x` or `y` does not fit
    /// into `[0, 2^z)`.
    pub fn new(z: u8, x: u64, y: u64) -> PmtResult<Self> {
        if z > MAX_ZOOM {
            return Err(PmtError::ZoomOutOfRange(z));
        }
        let dim = 1_u64 << z;
        if x >= dim || y >= dim {
            return Err(PmtError::CoordinatesOutOfRange(z, x, y));
        }
        Ok(Self { z, x, y })
    }

    /// The zoom level.
    #[must_use]
    pub fn z(&self) -> u8 {
        self.z
    }

    /// The column.
    #[must_use]
    pub fn x(&self) -> u64 {
        self.x
    }

    /// The row.
    #[must_use]
    pub fn y(&self) -> u64 {
        self.y
    }
}

impl Display for TileCoord {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

impl From<TileCoord> for TileId {
    fn from(coord: TileCoord) -> Self {
        // Zoom 0 has a single tile; the Hilbert transform is undefined for order 0.
        if coord.z == 0 {
            return Self(0);
        }
        let base = PYRAMID_SIZE_BY_ZOOM[usize::from(coord.z)];
        let pos = hilbert_2d::u64::xy2h_discrete(coord.x, coord.y, coord.z.into(), Variant::Hilbert);
        Self(base + pos)
    }
}

impl From<TileId> for TileCoord {
    fn from(tile_id: TileId) -> Self {
        let z = tile_id.zoom();
        if z == 0 {
            return Self { z: 0, x: 0, y: 0 };
        }
        let pos = tile_id.0 - PYRAMID_SIZE_BY_ZOOM[usize::from(z)];
        let (x, y) = hilbert_2d::u64::h2xy_discrete(pos, z.into(), Variant::Hilbert);
        Self { z, x, y }
    }
}
