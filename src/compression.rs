use std::io::{Read, Write};

use brotli::{CompressorWriter as BrotliEncoder, Decompressor as BrotliDecoder};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use zstd::{Decoder as ZstdDecoder, Encoder as ZstdEncoder};

use crate::Compression;
use crate::error::{PmtError, PmtResult};

/// Compresses a byte slice with the given codec.
///
/// # Errors
/// Fails with [`PmtError::UnsupportedCompression`] for
/// [`Compression::Unknown`], or when an encoder reports an I/O error.
pub fn compress_all(compression: Compression, data: &[u8]) -> PmtResult<Vec<u8>> {
    match compression {
        Compression::Unknown => Err(PmtError::UnsupportedCompression(compression)),
        Compression::None => Ok(data.to_vec()),
        Compression::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(data)?;
            Ok(encoder.finish()?)
        }
        Compression::Brotli => {
            let mut out = Vec::new();
            {
                let mut encoder = BrotliEncoder::new(&mut out, 4096, 11, 24);
                encoder.write_all(data)?;
                encoder.flush()?;
            }
            Ok(out)
        }
        Compression::Zstd => {
            let mut encoder = ZstdEncoder::new(Vec::new(), 0)?;
            encoder.write_all(data)?;
            Ok(encoder.finish()?)
        }
    }
}

/// Decompresses a byte slice with the given codec.
///
/// # Errors
/// Fails with [`PmtError::UnsupportedCompression`] for
/// [`Compression::Unknown`], or when the data does not match the codec.
pub fn decompress_all(compression: Compression, data: &[u8]) -> PmtResult<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len() * 2);
    match compression {
        Compression::Unknown => return Err(PmtError::UnsupportedCompression(compression)),
        Compression::None => out.extend_from_slice(data),
        Compression::Gzip => {
            GzDecoder::new(data).read_to_end(&mut out)?;
        }
        Compression::Brotli => {
            BrotliDecoder::new(data, 4096).read_to_end(&mut out)?;
        }
        Compression::Zstd => {
            ZstdDecoder::new(data)?.read_to_end(&mut out)?;
        }
    }
    Ok(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rstest::rstest;

    use super::*;

    const DATA: &[u8] = br#"{"vector_layers": [{"id": "water", "fields": {}}]}"#;

    #[rstest]
    #[case(Compression::None)]
    #[case(Compression::Gzip)]
    #[case(Compression::Brotli)]
    #[case(Compression::Zstd)]
    fn round_trip(#[case] compression: Compression) {
        let compressed = compress_all(compression, DATA).unwrap();
        let decompressed = decompress_all(compression, &compressed).unwrap();
        assert_eq!(decompressed, DATA);
    }

    #[test]
    fn gzip_frames_are_recognizable() {
        let compressed = compress_all(Compression::Gzip, DATA).unwrap();
        assert_eq!(&compressed[0..2], &[0x1f, 0x8b]);
    }

    #[test]
    fn unknown_is_rejected() {
        assert!(matches!(
            compress_all(Compression::Unknown, DATA),
            Err(PmtError::UnsupportedCompression(Compression::Unknown))
        ));
        assert!(matches!(
            decompress_all(Compression::Unknown, DATA),
            Err(PmtError::UnsupportedCompression(Compression::Unknown))
        ));
    }

    #[test]
    fn corrupt_gzip_is_an_error() {
        assert!(decompress_all(Compression::Gzip, b"not gzip at all").is_err());
    }
}
