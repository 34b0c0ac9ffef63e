//! Gzip codec for cached payloads.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};

use super::CacheError;

/// Compress bytes with gzip at the default level.
pub fn compress(bytes: &[u8]) -> Result<Vec<u8>, CacheError> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(bytes.len() / 2), Compression::default());
    encoder
        .write_all(bytes)
        .map_err(|e| CacheError::Compression(format!("Failed to compress payload: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| CacheError::Compression(format!("Failed to finish compression: {}", e)))
}

/// Decompress a gzip payload.
pub fn decompress(bytes: &[u8]) -> Result<Vec<u8>, CacheError> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| CacheError::Compression(format!("Corrupt compressed payload: {}", e)))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repetitive_payload_shrinks() {
        let payload = "rule content line\n".repeat(200).into_bytes();
        let compressed = compress(&payload).unwrap();
        assert!(compressed.len() < payload.len());
        assert_eq!(decompress(&compressed).unwrap(), payload);
    }

    #[test]
    fn test_corrupt_payload_is_error() {
        let err = decompress(b"definitely not gzip").unwrap_err();
        assert!(matches!(err, CacheError::Compression(_)));
    }
}
