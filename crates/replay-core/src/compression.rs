//! Gzip encoding for event batches and hierarchy snapshots.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::CoreError;

/// Gzip-compresses `data` at the default compression level.
///
/// # Errors
/// Returns [`CoreError::Gzip`] when the underlying writer fails.
pub fn gzip_encode(data: &[u8]) -> Result<Vec<u8>, CoreError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|error| CoreError::Gzip(error.to_string()))?;
    encoder.finish().map_err(|error| CoreError::Gzip(error.to_string()))
}

/// Decompresses a gzip payload produced by [`gzip_encode`].
///
/// # Errors
/// Returns [`CoreError::Gzip`] when the payload is not valid gzip data.
pub fn gzip_decode(data: &[u8]) -> Result<Vec<u8>, CoreError> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|error| CoreError::Gzip(error.to_string()))?;
    Ok(out)
}
