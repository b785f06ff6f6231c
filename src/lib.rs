#![doc = include_str!("../README.md")]

mod backend;
mod backend_http;
mod backend_mmap;
mod cache;
mod compression;
mod directory;
mod error;
mod header;
mod reader;
mod tile;
mod writer;

pub use backend::{Backend, MemoryBackend};
pub use backend_http::HttpBackend;
pub use backend_mmap::MmapBackend;
pub use cache::{DirCacheResult, DirectoryCache, HashMapCache, NoCache};
pub use compression::{compress_all, decompress_all};
pub use directory::{DirEntry, Directory};
pub use error::{PmtError, PmtResult};
pub use header::{Compression, HEADER_SIZE, Header, MAX_INITIAL_BYTES, TileType};
pub use reader::{PmTilesReader, Tiles};
pub use tile::{MAX_TILE_ID, MAX_ZOOM, PYRAMID_SIZE_BY_ZOOM, TileCoord, TileId};
pub use writer::{PmTilesStreamWriter, PmTilesWriter};

/// Re-export of crate exposed in our API to simplify dependency management
pub use bytes;
/// Re-export of crate exposed in our API to simplify dependency management
pub use reqwest;
/// Re-export of crate exposed in our API to simplify dependency management
pub use serde_json;
