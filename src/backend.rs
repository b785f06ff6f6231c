use std::io;

use bytes::Bytes;

use crate::error::{PmtError, PmtResult};

/// A synchronous byte-range source.
///
/// Implementations return bytes from arbitrary offsets of one archive;
/// file, memory, and HTTP backed sources all fit behind this trait. A
/// reader can be shared between threads when its backend is `Sync`.
pub trait Backend {
    /// Reads up to `length` bytes starting at `offset`.
    ///
    /// Fewer bytes are returned only when the source ends inside the
    /// requested range.
    ///
    /// # Errors
    /// Fails when `offset` lies past the end of the source or the
    /// underlying I/O fails.
    fn read(&self, offset: u64, length: u64) -> PmtResult<Bytes>;

    /// Reads exactly `length` bytes starting at `offset`.
    ///
    /// # Errors
    /// Fails when the full range is not available.
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

/// A byte-range source over a fully loaded in-memory archive.
pub struct MemoryBackend {
    data: Bytes,
}

impl MemoryBackend {
    /// Wraps an in-memory archive.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }
}

impl From<Vec<u8>> for MemoryBackend {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl From<Bytes> for MemoryBackend {
    fn from(data: Bytes) -> Self {
        Self::new(data)
    }
}

impl Backend for MemoryBackend {
    fn read(&self, offset: u64, length: u64) -> PmtResult<Bytes> {
        let start = usize::try_from(offset)
            .ok()
            .filter(|start| *start <= self.data.len())
            .ok_or_else(|| PmtError::Reading(io::Error::from(io::ErrorKind::UnexpectedEof)))?;
        let length = usize::try_from(length).unwrap_or(usize::MAX);
        let end = start.saturating_add(length).min(self.data.len());
        Ok(self.data.slice(start..end))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn read_clamps_at_the_end() {
        let backend = MemoryBackend::from(vec![1_u8, 2, 3, 4]);
        assert_eq!(backend.read(1, 2).unwrap(), Bytes::from_static(&[2, 3]));
        assert_eq!(backend.read(2, 10).unwrap(), Bytes::from_static(&[3, 4]));
        assert!(backend.read(5, 1).is_err());
    }

    #[test]
    fn read_exact_requires_the_full_range() {
        let backend = MemoryBackend::from(vec![1_u8, 2, 3, 4]);
        assert_eq!(backend.read_exact(0, 4).unwrap().len(), 4);
        assert!(matches!(
            backend.read_exact(2, 10),
            Err(PmtError::UnexpectedNumberOfBytesReturned(10, 2))
        ));
    }
}
