use std::fmt::{Debug, Formatter};
use std::io::{self, Write};

use bytes::{Buf, Bytes};
use varint_rs::{VarintReader, VarintWriter};

use crate::Compression;
use crate::compression::{compress_all, decompress_all};
use crate::error::{PmtError, PmtResult};

/// A directory record pointing at either a run of tiles or a leaf
/// directory.
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct DirEntry {
    /// First tile ID covered by this entry.
    pub tile_id: u64,
    /// Byte offset of the referenced data, relative to the tile data
    /// section for tile entries and to the leaf directories section for
    /// leaf entries.
    pub offset: u64,
    /// Length of the referenced tile or leaf directory in bytes.
    pub length: u32,
    /// Number of consecutive tile IDs resolving to the same bytes; `0`
    /// marks a leaf-directory pointer.
    pub run_length: u32,
}

impl DirEntry {
    /// Returns `true` when this entry points at a leaf directory.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.run_length == 0
    }
}

/// A sorted list of directory entries.
#[derive(Default, Clone, PartialEq, Eq)]
pub struct Directory {
    entries: Vec<DirEntry>,
}

impl Debug for Directory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("Directory [entries: {}]", self.entries.len()))
    }
}

impl Directory {
    pub(crate) fn from_entries(entries: Vec<DirEntry>) -> Self {
        Self { entries }
    }

    /// Number of entries in the directory.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when the directory holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The entries in ascending tile-ID order.
    #[must_use]
    pub fn entries(&self) -> &[DirEntry] {
        &self.entries
    }

    /// Finds the entry responsible for `tile_id`, if any.
    ///
    /// An exact match wins. Otherwise the nearest entry below the target
    /// is returned when it is a leaf pointer (descent continues there) or
    /// when the target falls inside its run.
    #[must_use]
    pub fn find_tile_id(&self, tile_id: u64) -> Option<&DirEntry> {
        match self.entries.binary_search_by(|e| e.tile_id.cmp(&tile_id)) {
            Ok(idx) => self.entries.get(idx),
            Err(0) => None,
            Err(next_idx) => {
                let previous = &self.entries[next_idx - 1];
                if previous.is_leaf() || tile_id - previous.tile_id < u64::from(previous.run_length)
                {
                    Some(previous)
                } else {
                    None
                }
            }
        }
    }

    /// Serializes the directory and compresses it with `compression`.
    ///
    /// # Errors
    /// Fails when the compression is [`Compression::Unknown`] or an entry
    /// does not fit the columnar encoding.
    pub fn serialize(&self, compression: Compression) -> PmtResult<Vec<u8>> {
        Self::serialize_entries(&self.entries, compression)
    }

    pub(crate) fn serialize_entries(
        entries: &[DirEntry],
        compression: Compression,
    ) -> PmtResult<Vec<u8>> {
        let mut buf = Vec::new();
        write_entries(entries, &mut buf)?;
        compress_all(compression, &buf)
    }

    /// Decompresses `bytes` with `compression` and parses a directory.
    ///
    /// # Errors
    /// Fails when decompression fails or the directory encoding is
    /// corrupt.
    pub fn deserialize(bytes: &[u8], compression: Compression) -> PmtResult<Self> {
        Self::try_from(Bytes::from(decompress_all(compression, bytes)?))
    }
}

/// The columnar layout: entry count, then tile-ID deltas, run lengths,
/// lengths, and offsets, each written as varints. Offsets use `0` to mean
/// "directly after the previous entry" and `offset + 1` otherwise.
fn write_entries<W: Write>(entries: &[DirEntry], writer: &mut W) -> io::Result<()> {
    writer.write_usize_varint(entries.len())?;

    let mut last_id = 0;
    for entry in entries {
        writer.write_u64_varint(entry.tile_id - last_id)?;
        last_id = entry.tile_id;
    }

    for entry in entries {
        writer.write_u32_varint(entry.run_length)?;
    }

    for entry in entries {
        writer.write_u32_varint(entry.length)?;
    }

    let mut next_byte = 0;
    for (idx, entry) in entries.iter().enumerate() {
        if idx > 0 && entry.offset == next_byte {
            writer.write_u64_varint(0)?;
        } else {
            writer.write_u64_varint(entry.offset + 1)?;
        }
        next_byte = entry.offset + u64::from(entry.length);
    }

    Ok(())
}

fn truncated(err: io::Error) -> PmtError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        PmtError::TruncatedVarint
    } else {
        PmtError::Reading(err)
    }
}

impl TryFrom<Bytes> for Directory {
    type Error = PmtError;

    fn try_from(buffer: Bytes) -> Result<Self, Self::Error> {
        let mut buffer = buffer.reader();
        let n_entries = buffer.read_usize_varint().map_err(truncated)?;

        let mut entries = vec![DirEntry::default(); n_entries];

        let mut next_tile_id = 0;
        for entry in &mut entries {
            next_tile_id += buffer.read_u64_varint().map_err(truncated)?;
            entry.tile_id = next_tile_id;
        }

        for entry in &mut entries {
            entry.run_length = buffer.read_u32_varint().map_err(truncated)?;
        }

        for entry in &mut entries {
            entry.length = buffer.read_u32_varint().map_err(truncated)?;
        }

        let mut last_entry: Option<&DirEntry> = None;
        for entry in &mut entries {
            let offset = buffer.read_u64_varint().map_err(truncated)?;
            entry.offset = if offset == 0 {
                let previous = last_entry.ok_or(PmtError::InvalidEntry)?;
                previous.offset + u64::from(previous.length)
            } else {
                offset - 1
            };
            last_entry = Some(entry);
        }

        Ok(Self { entries })
    }
}
