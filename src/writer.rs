use std::collections::HashMap;
use std::collections::hash_map::Entry as HashMapEntry;
use std::fs::File;
use std::hash::BuildHasherDefault;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::num::NonZeroU64;

use countio::Counter;
use log::debug;
use serde_json::Value as JsonValue;
use twox_hash::{XxHash3_64, XxHash3_128};

use crate::directory::{DirEntry, Directory};
use crate::error::{PmtError, PmtResult};
use crate::header::{HEADER_SIZE, MAX_INITIAL_BYTES};
use crate::tile::TileId;
use crate::{Compression, Header, TileType, compression::compress_all};

/// Maximum serialized size of the root directory in bytes.
const MAX_ROOT_DIR_BYTES: usize = MAX_INITIAL_BYTES - HEADER_SIZE;

/// Entries per leaf directory in the first optimization round.
const INITIAL_LEAF_SIZE: usize = 4096;

/// Builder for a streaming archive writer.
pub struct PmTilesWriter {
    header: Header,
    metadata: JsonValue,
    center: Option<(i32, i32)>,
    center_zoom: Option<u8>,
}

struct TileLocation {
    offset: u64,
    length: u32,
}

type TileContentMap = HashMap<u128, TileLocation, BuildHasherDefault<XxHash3_64>>;

/// Streaming archive writer.
///
/// Tiles are accepted in any order, deduplicated by content, and staged
/// in an anonymous temporary file; [`finalize`](Self::finalize) builds
/// the directory pyramid and writes the sections in their final order:
/// header, root directory, metadata, leaf directories, tile data.
pub struct PmTilesStreamWriter<W: Write> {
    out: W,
    staging: Counter<BufWriter<File>>,
    header: Header,
    metadata: JsonValue,
    center: Option<(i32, i32)>,
    center_zoom: Option<u8>,
    entries: Vec<DirEntry>,
    n_addressed_tiles: u64,
    tile_content_map: TileContentMap,
}

impl PmTilesWriter {
    /// Creates a new writer builder with default values.
    #[must_use]
    pub fn new(tile_type: TileType) -> Self {
        let tile_compression = match tile_type {
            TileType::Mvt => Compression::Gzip,
            _ => Compression::None,
        };
        Self {
            header: Header::new(tile_compression, tile_type),
            metadata: JsonValue::Object(serde_json::Map::new()),
            center: None,
            center_zoom: None,
        }
    }

    /// Sets the compression for metadata and directories.
    #[must_use]
    pub fn internal_compression(mut self, compression: Compression) -> Self {
        self.header.internal_compression = compression;
        self
    }

    /// Declares the compression of the tile bytes passed to
    /// [`PmTilesStreamWriter::add_tile`]. Tile data is stored as given
    /// and never recompressed.
    #[must_use]
    pub fn tile_compression(mut self, compression: Compression) -> Self {
        self.header.tile_compression = compression;
        self
    }

    /// Sets the bounds of the tiles, in degrees.
    #[must_use]
    pub fn bounds(mut self, min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        self.header.min_longitude_e7 = to_e7(min_lon);
        self.header.min_latitude_e7 = to_e7(min_lat);
        self.header.max_longitude_e7 = to_e7(max_lon);
        self.header.max_latitude_e7 = to_e7(max_lat);
        self
    }

    /// Sets the suggested initial position, in degrees. Defaults to the
    /// center of the bounds.
    #[must_use]
    pub fn center(mut self, lon: f64, lat: f64) -> Self {
        self.center = Some((to_e7(lon), to_e7(lat)));
        self
    }

    /// Sets the suggested initial zoom level. Defaults to the minimum
    /// zoom of the written tiles.
    #[must_use]
    pub fn center_zoom(mut self, level: u8) -> Self {
        self.center_zoom = Some(level);
        self
    }

    /// Sets the metadata document stored alongside the tiles.
    #[must_use]
    pub fn metadata(mut self, metadata: JsonValue) -> Self {
        self.metadata = metadata;
        self
    }

    /// Creates the streaming writer. Tile bytes are staged in an
    /// anonymous temporary file until [`PmTilesStreamWriter::finalize`].
    ///
    /// # Errors
    /// Fails when the staging file cannot be created.
    pub fn create<W: Write>(self, writer: W) -> PmtResult<PmTilesStreamWriter<W>> {
        let staging = Counter::new(BufWriter::new(tempfile::tempfile()?));
        Ok(PmTilesStreamWriter {
            out: writer,
            staging,
            header: self.header,
            metadata: self.metadata,
            center: self.center,
            center_zoom: self.center_zoom,
            entries: Vec::new(),
            n_addressed_tiles: 0,
            tile_content_map: HashMap::default(),
        })
    }
}

impl<W: Write> PmTilesStreamWriter<W> {
    /// Adds a tile to the archive.
    ///
    /// Identical bytes are stored once; a duplicate at the next
    /// consecutive tile ID extends the previous entry's run length
    /// instead of adding an entry. Writing IDs in ascending order keeps
    /// the archive clustered. Empty tiles are skipped, since the format
    /// cannot address them.
    ///
    /// # Errors
    /// Fails when staging the tile bytes fails or a tile exceeds 32-bit
    /// lengths.
    pub fn add_tile(&mut self, tile_id: impl Into<TileId>, data: &[u8]) -> PmtResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        let tile_id = tile_id.into().value();

        if let Some(last) = self.entries.last() {
            if tile_id < last.tile_id {
                self.header.clustered = false;
            }
        }

        let tile_hash = XxHash3_128::oneshot(data);
        match self.tile_content_map.entry(tile_hash) {
            HashMapEntry::Occupied(occupied) => {
                let location = occupied.get();
                match self.entries.last_mut() {
                    Some(last)
                        if tile_id == last.tile_id + u64::from(last.run_length)
                            && last.offset == location.offset =>
                    {
                        last.run_length += 1;
                    }
                    _ => self.entries.push(DirEntry {
                        tile_id,
                        offset: location.offset,
                        length: location.length,
                        run_length: 1,
                    }),
                }
            }
            HashMapEntry::Vacant(vacant) => {
                let offset = self.staging.writer_bytes() as u64;
                let length = into_u32(data.len())?;
                self.staging.write_all(data)?;
                vacant.insert(TileLocation { offset, length });
                self.entries.push(DirEntry {
                    tile_id,
                    offset,
                    length,
                    run_length: 1,
                });
            }
        }

        self.n_addressed_tiles += 1;
        Ok(())
    }

    /// Finishes the archive: sorts the entries, builds the directory
    /// pyramid, stamps the header, and writes every section to the
    /// output. The staging file is released when this returns.
    ///
    /// # Errors
    /// Fails on I/O errors and when serialization of a directory or the
    /// metadata document fails.
    pub fn finalize(mut self) -> PmtResult<()> {
        self.header.n_addressed_tiles = NonZeroU64::new(self.n_addressed_tiles);
        self.header.n_tile_entries = NonZeroU64::new(self.entries.len() as u64);
        self.header.n_tile_contents = NonZeroU64::new(self.tile_content_map.len() as u64);

        // Final on-disk order is ascending regardless of insertion order.
        self.entries.sort_by_key(|entry| entry.tile_id);

        if let (Some(first), Some(last)) = (self.entries.first(), self.entries.last()) {
            self.header.min_zoom = TileId::new(first.tile_id)?.zoom();
            self.header.max_zoom = TileId::new(last.tile_id)?.zoom();
        }
        self.header.center_zoom = self.center_zoom.unwrap_or(self.header.min_zoom);
        let (center_lon, center_lat) = self.center.unwrap_or((
            midpoint(self.header.min_longitude_e7, self.header.max_longitude_e7),
            midpoint(self.header.min_latitude_e7, self.header.max_latitude_e7),
        ));
        self.header.center_longitude_e7 = center_lon;
        self.header.center_latitude_e7 = center_lat;

        let (root_bytes, leaves_bytes, n_leaves) = self.optimize_directories(MAX_ROOT_DIR_BYTES)?;

        let metadata_bytes = compress_all(
            self.header.internal_compression,
            &serde_json::to_vec(&self.metadata)?,
        )?;

        self.staging.flush()?;
        self.header.root_offset = HEADER_SIZE as u64;
        self.header.root_length = root_bytes.len() as u64;
        self.header.metadata_offset = self.header.root_offset + self.header.root_length;
        self.header.metadata_length = metadata_bytes.len() as u64;
        self.header.leaf_offset = self.header.metadata_offset + self.header.metadata_length;
        self.header.leaf_length = leaves_bytes.len() as u64;
        self.header.data_offset = self.header.leaf_offset + self.header.leaf_length;
        self.header.data_length = self.staging.writer_bytes() as u64;

        debug!(
            "finalizing archive: {} addressed tiles, {} entries, {} contents, {} leaf directories, root {} B, leaves {} B, tile data {} B",
            self.n_addressed_tiles,
            self.entries.len(),
            self.tile_content_map.len(),
            n_leaves,
            root_bytes.len(),
            leaves_bytes.len(),
            self.header.data_length,
        );

        self.header.write_to(&mut self.out)?;
        self.out.write_all(&root_bytes)?;
        self.out.write_all(&metadata_bytes)?;
        self.out.write_all(&leaves_bytes)?;

        // The temp file is deleted when it drops at the end of this call.
        let mut staged = self
            .staging
            .into_inner()
            .into_inner()
            .map_err(io::IntoInnerError::into_error)?;
        staged.seek(SeekFrom::Start(0))?;
        io::copy(&mut staged, &mut self.out)?;
        self.out.flush()?;

        Ok(())
    }

    /// Serializes the entries as a single root directory when it fits
    /// the budget; otherwise moves all entries into leaf directories,
    /// doubling the leaf size until the root of leaf pointers fits.
    fn optimize_directories(&self, target_root_len: usize) -> PmtResult<(Vec<u8>, Vec<u8>, usize)> {
        let root_bytes =
            Directory::serialize_entries(&self.entries, self.header.internal_compression)?;
        if root_bytes.len() < target_root_len {
            return Ok((root_bytes, Vec::new(), 0));
        }

        let mut leaf_size = INITIAL_LEAF_SIZE;
        loop {
            let (root_bytes, leaves_bytes, n_leaves) = self.build_roots_leaves(leaf_size)?;
            if root_bytes.len() < target_root_len {
                return Ok((root_bytes, leaves_bytes, n_leaves));
            }
            leaf_size *= 2;
        }
    }

    fn build_roots_leaves(&self, leaf_size: usize) -> PmtResult<(Vec<u8>, Vec<u8>, usize)> {
        let mut root_entries = Vec::with_capacity(self.entries.len().div_ceil(leaf_size));
        let mut leaves_bytes = Vec::new();
        for chunk in self.entries.chunks(leaf_size) {
            let leaf_bytes =
                Directory::serialize_entries(chunk, self.header.internal_compression)?;
            root_entries.push(DirEntry {
                tile_id: chunk[0].tile_id,
                offset: leaves_bytes.len() as u64,
                length: into_u32(leaf_bytes.len())?,
                run_length: 0,
            });
            leaves_bytes.extend_from_slice(&leaf_bytes);
        }

        let n_leaves = root_entries.len();
        let root_bytes =
            Directory::serialize_entries(&root_entries, self.header.internal_compression)?;
        Ok((root_bytes, leaves_bytes, n_leaves))
    }
}

fn into_u32(value: usize) -> PmtResult<u32> {
    u32::try_from(value).map_err(|_| PmtError::IndexEntryOverflow)
}

fn to_e7(degrees: f64) -> i32 {
    (degrees * 10_000_000.0) as i32
}

fn midpoint(a: i32, b: i32) -> i32 {
    ((i64::from(a) + i64::from(b)) / 2) as i32
}
