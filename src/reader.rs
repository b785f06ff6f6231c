use std::collections::VecDeque;

use bytes::Bytes;
use serde_json::Value as JsonValue;

use crate::Header;
use crate::backend::Backend;
use crate::cache::{DirCacheResult, DirectoryCache, NoCache};
use crate::compression::decompress_all;
use crate::directory::{DirEntry, Directory};
use crate::error::{PmtError, PmtResult};
use crate::header::{HEADER_SIZE, MAX_INITIAL_BYTES};
use crate::tile::{TileCoord, TileId};

/// Maximum number of directories visited while resolving one tile.
const MAX_DIRECTORY_DEPTH: u8 = 4;

/// A random-access reader over a `PMTiles` archive.
///
/// The reader keeps only the parsed header and the root directory; every
/// tile lookup costs at most three more range requests (leaf directory
/// and tile data). It never mutates shared state, so it can be used from
/// multiple threads when the backend and cache are `Sync`.
pub struct PmTilesReader<B, C = NoCache> {
    backend: B,
    cache: C,
    header: Header,
    root_directory: Directory,
}

impl<B: Backend> PmTilesReader<B, NoCache> {
    /// Opens an archive from a backend and validates its header.
    ///
    /// # Errors
    /// Fails when the header is invalid or the root directory cannot be
    /// read.
    pub fn try_from_source(backend: B) -> PmtResult<Self> {
        Self::try_from_cached_source(backend, NoCache)
    }
}

impl<B: Backend, C: DirectoryCache> PmTilesReader<B, C> {
    /// Opens an archive from a backend, consulting `cache` for leaf
    /// directories on later lookups.
    ///
    /// # Errors
    /// Fails when the header is invalid or the root directory cannot be
    /// read.
    pub fn try_from_cached_source(backend: B, cache: C) -> PmtResult<Self> {
        // One optimistic request: for well-formed archives the first
        // 16 KiB covers the header and the complete root directory.
        let initial_bytes = backend.read(0, MAX_INITIAL_BYTES as u64)?;
        if initial_bytes.len() < HEADER_SIZE {
            return Err(PmtError::InvalidHeader);
        }
        let header = Header::try_from_bytes(initial_bytes.slice(0..HEADER_SIZE))?;

        let root_end = header.root_offset + header.root_length;
        let root_bytes = if root_end <= initial_bytes.len() as u64 {
            initial_bytes.slice(header.root_offset as usize..root_end as usize)
        } else {
            backend.read_exact(header.root_offset, header.root_length)?
        };
        let root_directory = Directory::deserialize(&root_bytes, header.internal_compression)?;

        Ok(Self {
            backend,
            cache,
            header,
            root_directory,
        })
    }

    /// Returns the parsed archive header.
    #[must_use]
    pub fn get_header(&self) -> &Header {
        &self.header
    }

    /// Reads, decompresses, and parses the metadata document.
    ///
    /// # Errors
    /// Fails when the metadata section cannot be read or is not valid
    /// JSON.
    pub fn get_metadata(&self) -> PmtResult<JsonValue> {
        let bytes = self
            .backend
            .read_exact(self.header.metadata_offset, self.header.metadata_length)?;
        let decompressed = decompress_all(self.header.internal_compression, &bytes)?;
        Ok(serde_json::from_slice(&decompressed)?)
    }

    /// Fetches the stored bytes of a tile.
    ///
    /// Returns `Ok(None)` when the archive holds no tile at this
    /// position; a missing tile is not an error.
    ///
    /// # Errors
    /// Fails on backend errors or corrupt directories.
    pub fn get_tile(&self, tile_id: impl Into<TileId>) -> PmtResult<Option<Bytes>> {
        let tile_id = tile_id.into();
        let Some(entry) = self.find_tile_entry(tile_id)? else {
            return Ok(None);
        };
        self.backend
            .read_exact(
                self.header.data_offset + entry.offset,
                u64::from(entry.length),
            )
            .map(Some)
    }

    /// Fetches a tile and inflates it according to the declared tile
    /// compression.
    ///
    /// # Errors
    /// Fails like [`get_tile`](Self::get_tile), and additionally when the
    /// archive declares [`crate::Compression::Unknown`] or the stored
    /// bytes do not match the declared compression.
    pub fn get_tile_decompressed(&self, tile_id: impl Into<TileId>) -> PmtResult<Option<Bytes>> {
        let Some(data) = self.get_tile(tile_id)? else {
            return Ok(None);
        };
        decompress_all(self.header.tile_compression, &data)
            .map(Bytes::from)
            .map(Some)
    }

    /// Returns an iterator over every addressed tile in ascending
    /// tile-ID order. Restart the traversal by calling this again.
    #[must_use]
    pub fn tiles(&self) -> Tiles<'_, B, C> {
        Tiles {
            reader: self,
            queue: self.root_directory.entries().iter().cloned().collect(),
            run: None,
        }
    }

    fn find_tile_entry(&self, tile_id: TileId) -> PmtResult<Option<DirEntry>> {
        let mut entry = self.root_directory.find_tile_id(tile_id.value()).cloned();

        let mut depth = 1;
        while let Some(needle) = entry {
            if !needle.is_leaf() {
                return Ok(Some(needle));
            }
            if depth >= MAX_DIRECTORY_DEPTH {
                // A chain deeper than root plus three leaf hops means a
                // malformed archive; stop rather than chase it.
                return Ok(None);
            }

            let offset = self.header.leaf_offset + needle.offset;
            entry = match self.cache.get_dir_entry(offset, tile_id) {
                DirCacheResult::Found(found) => Some(found),
                DirCacheResult::NotFound => None,
                DirCacheResult::NotCached => {
                    let dir = self.read_directory(offset, u64::from(needle.length))?;
                    let found = dir.find_tile_id(tile_id.value()).cloned();
                    self.cache.insert_dir(offset, dir);
                    found
                }
            };
            depth += 1;
        }
        Ok(None)
    }

    fn read_directory(&self, offset: u64, length: u64) -> PmtResult<Directory> {
        let bytes = self.backend.read_exact(offset, length)?;
        Directory::deserialize(&bytes, self.header.internal_compression)
    }
}

/// Depth-first iterator over all tiles of an archive.
///
/// Run-length entries are expanded, so the number of items equals the
/// number of addressed tiles; items within a run share their bytes.
pub struct Tiles<'a, B, C> {
    reader: &'a PmTilesReader<B, C>,
    queue: VecDeque<DirEntry>,
    run: Option<(DirEntry, u32, Bytes)>,
}

impl<B: Backend, C: DirectoryCache> Iterator for Tiles<'_, B, C> {
    type Item = PmtResult<(TileCoord, Bytes)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((entry, served, data)) = &mut self.run {
                if *served < entry.run_length {
                    let tile_id = entry.tile_id + u64::from(*served);
                    *served += 1;
                    let item = TileId::new(tile_id).map(|id| (TileCoord::from(id), data.clone()));
                    return Some(item);
                }
                self.run = None;
            }

            let entry = self.queue.pop_front()?;
            let result = if entry.is_leaf() {
                let offset = self.reader.header.leaf_offset + entry.offset;
                self.reader
                    .read_directory(offset, u64::from(entry.length))
                    .map(|dir| {
                        for child in dir.entries().iter().rev() {
                            self.queue.push_front(child.clone());
                        }
                    })
            } else {
                let offset = self.reader.header.data_offset + entry.offset;
                self.reader
                    .backend
                    .read_exact(offset, u64::from(entry.length))
                    .map(|data| self.run = Some((entry, 0, data)))
            };
            if let Err(err) = result {
                self.queue.clear();
                return Some(Err(err));
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::Cell;

    use crate::backend::MemoryBackend;
    use crate::cache::HashMapCache;
    use crate::directory::{DirEntry, Directory};
    use crate::writer::PmTilesWriter;
    use crate::{Compression, Header, TileCoord, TileType};

    use super::*;

    fn build_archive(tiles: &[(TileCoord, &[u8])]) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut writer = PmTilesWriter::new(TileType::Png)
            .create(&mut buf)
            .unwrap();
        for (coord, data) in tiles {
            writer.add_tile(*coord, data).unwrap();
        }
        writer.finalize().unwrap();
        buf
    }

    fn coord(z: u8, x: u64, y: u64) -> TileCoord {
        TileCoord::new(z, x, y).unwrap()
    }

    #[test]
    fn missing_tiles_are_not_errors() {
        let archive = build_archive(&[(coord(0, 0, 0), b"a")]);
        let reader = PmTilesReader::try_from_source(MemoryBackend::from(archive)).unwrap();

        assert!(reader.get_tile(coord(0, 0, 0)).unwrap().is_some());
        assert!(reader.get_tile(coord(3, 1, 1)).unwrap().is_none());
    }

    #[test]
    fn small_archives_resolve_from_the_initial_request() {
        struct CountingBackend {
            inner: MemoryBackend,
            reads: Cell<usize>,
        }

        impl Backend for CountingBackend {
            fn read(&self, offset: u64, length: u64) -> PmtResult<Bytes> {
                self.reads.set(self.reads.get() + 1);
                self.inner.read(offset, length)
            }
        }

        let archive = build_archive(&[(coord(0, 0, 0), b"a")]);
        let backend = CountingBackend {
            inner: MemoryBackend::from(archive),
            reads: Cell::new(0),
        };
        let reader = PmTilesReader::try_from_source(backend).unwrap();
        assert_eq!(reader.backend.reads.get(), 1);

        reader.get_tile(coord(0, 0, 0)).unwrap().unwrap();
        // one more request for the tile bytes, none for directories
        assert_eq!(reader.backend.reads.get(), 2);
    }

    #[test]
    fn leaf_directories_are_cached() {
        struct CountingBackend {
            inner: MemoryBackend,
            reads: Cell<usize>,
        }

        impl Backend for CountingBackend {
            fn read(&self, offset: u64, length: u64) -> PmtResult<Bytes> {
                self.reads.set(self.reads.get() + 1);
                self.inner.read(offset, length)
            }
        }

        // enough distinct entries to force leaf directories
        let mut buf = Vec::new();
        let mut writer = PmTilesWriter::new(TileType::Png)
            .internal_compression(Compression::None)
            .create(&mut buf)
            .unwrap();
        for id in 0..20_000_u64 {
            writer
                .add_tile(TileId::new(id).unwrap(), &id.to_le_bytes())
                .unwrap();
        }
        writer.finalize().unwrap();

        let backend = CountingBackend {
            inner: MemoryBackend::from(buf),
            reads: Cell::new(0),
        };
        let reader = PmTilesReader::try_from_cached_source(backend, HashMapCache::default()).unwrap();
        assert!(reader.get_header().leaf_length > 0);

        let probe = TileId::new(12_345).unwrap();
        reader.get_tile(probe).unwrap().unwrap();
        let after_first = reader.backend.reads.get();

        reader.get_tile(probe).unwrap().unwrap();
        // second lookup skips the leaf directory fetch
        assert_eq!(reader.backend.reads.get(), after_first + 1);
    }

    #[test]
    fn lookup_gives_up_on_deep_directory_chains() {
        // Hand-assembled archive whose directories chain root -> leaf ->
        // leaf -> leaf -> leaf before ever reaching a tile entry. The
        // reader must stop after four directories instead of chasing it.
        let compression = Compression::None;
        let make_leaf = |target_offset: u64, target_len: usize| {
            Directory::from_entries(vec![DirEntry {
                tile_id: 0,
                offset: target_offset,
                length: u32::try_from(target_len).unwrap(),
                run_length: 0,
            }])
            .serialize(compression)
            .unwrap()
        };

        // innermost directory actually holds the tile
        let tile_dir = Directory::from_entries(vec![DirEntry {
            tile_id: 0,
            offset: 0,
            length: 1,
            run_length: 1,
        }])
        .serialize(compression)
        .unwrap();

        // Single-entry uncompressed directories with one-byte varints all
        // serialize to the same size, so the section can be laid out as
        // leaf4 | leaf3 | leaf2 | tile_dir with precomputed offsets.
        let leaf_len = make_leaf(0, tile_dir.len()).len();
        assert_eq!(leaf_len, tile_dir.len());

        let leaf4 = make_leaf(leaf_len as u64, leaf_len);
        let leaf3 = make_leaf(2 * leaf_len as u64, leaf_len);
        let leaf2 = make_leaf(3 * leaf_len as u64, tile_dir.len());
        let root = make_leaf(0, leaf4.len());

        let mut leaves_bytes = Vec::new();
        leaves_bytes.extend_from_slice(&leaf4);
        leaves_bytes.extend_from_slice(&leaf3);
        leaves_bytes.extend_from_slice(&leaf2);
        leaves_bytes.extend_from_slice(&tile_dir);

        let mut header = Header::new(Compression::None, TileType::Png);
        header.internal_compression = compression;
        header.root_offset = crate::HEADER_SIZE as u64;
        header.root_length = root.len() as u64;
        header.metadata_offset = header.root_offset + header.root_length;
        header.metadata_length = 2;
        header.leaf_offset = header.metadata_offset + header.metadata_length;
        header.leaf_length = leaves_bytes.len() as u64;
        header.data_offset = header.leaf_offset + header.leaf_length;
        header.data_length = 1;

        let mut archive = Vec::new();
        header.write_to(&mut archive).unwrap();
        archive.extend_from_slice(&root);
        archive.extend_from_slice(b"{}");
        archive.extend_from_slice(&leaves_bytes);
        archive.push(b'x');

        let reader = PmTilesReader::try_from_source(MemoryBackend::from(archive)).unwrap();
        // root + leaf4 + leaf3 + leaf2 exhausts the depth budget before
        // the directory holding the tile entry is ever fetched
        assert!(reader.get_tile(coord(0, 0, 0)).unwrap().is_none());
    }
}
