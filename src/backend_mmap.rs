use std::io;
use std::path::Path;

use bytes::Bytes;
use fmmap::{MmapFile, MmapFileExt as _, Options};

use crate::backend::Backend;
use crate::cache::{DirectoryCache, NoCache};
use crate::error::{PmtError, PmtResult};
use crate::reader::PmTilesReader;

impl PmTilesReader<MmapBackend, NoCache> {
    /// Creates a new `PMTiles` reader from a file path using the mmap backend.
    ///
    /// # Errors
    /// Fails when the file cannot be mapped or is not a valid archive.
    pub fn new_with_path<P: AsRef<Path>>(path: P) -> PmtResult<Self> {
        Self::new_with_cached_path(NoCache, path)
    }
}

impl<C: DirectoryCache> PmTilesReader<MmapBackend, C> {
    /// Creates a new cached `PMTiles` reader from a file path using the mmap backend.
    ///
    /// # Errors
    /// Fails when the file cannot be mapped or is not a valid archive.
    pub fn new_with_cached_path<P: AsRef<Path>>(cache: C, path: P) -> PmtResult<Self> {
        let backend = MmapBackend::try_from_path(path)?;

        Self::try_from_cached_source(backend, cache)
    }
}

/// A byte-range source over a memory-mapped archive file.
pub struct MmapBackend {
    file: MmapFile,
}

impl MmapBackend {
    /// Memory-maps the file at `path` read-only.
    ///
    /// # Errors
    /// Fails with [`PmtError::UnableToOpenMmapFile`] when the file cannot
    /// be opened or mapped.
    pub fn try_from_path<P: AsRef<Path>>(path: P) -> PmtResult<Self> {
        Ok(Self {
            file: MmapFile::open_with_options(path, Options::new().read(true))
                .map_err(|_| PmtError::UnableToOpenMmapFile)?,
        })
    }
}

impl From<fmmap::error::Error> for PmtError {
    fn from(_: fmmap::error::Error) -> Self {
        Self::Reading(io::Error::from(io::ErrorKind::UnexpectedEof))
    }
}

impl Backend for MmapBackend {
    fn read(&self, offset: u64, length: u64) -> PmtResult<Bytes> {
        let offset = usize::try_from(offset)
            .ok()
            .filter(|offset| *offset <= self.file.len())
            .ok_or_else(|| PmtError::Reading(io::Error::from(io::ErrorKind::UnexpectedEof)))?;
        let length = usize::try_from(length)
            .unwrap_or(usize::MAX)
            .min(self.file.len() - offset);

        Ok(Bytes::copy_from_slice(self.file.bytes(offset, length)?))
    }

    fn read_exact(&self, offset: u64, length: u64) -> PmtResult<Bytes> {
        let data = self.read(offset, length)?;
        if data.len() as u64 == length {
            Ok(data)
        } else {
            Err(PmtError::Reading(io::Error::from(
                io::ErrorKind::UnexpectedEof,
            )))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Write as _;

    use crate::{PmTilesReader, PmTilesWriter, TileCoord, TileType};

    #[test]
    fn read_archive_from_mapped_file() {
        let coord = TileCoord::new(0, 0, 0).unwrap();

        let mut archive = Vec::new();
        let mut writer = PmTilesWriter::new(TileType::Png)
            .create(&mut archive)
            .unwrap();
        writer.add_tile(coord, b"mapped").unwrap();
        writer.finalize().unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&archive).unwrap();
        file.flush().unwrap();

        let reader = PmTilesReader::new_with_path(file.path()).unwrap();
        assert_eq!(reader.get_tile(coord).unwrap().unwrap(), &b"mapped"[..]);
    }
}
