//! LZ4 block compression for chunk and column data.
//!
//! Both sides know the exact decompressed size of everything that is
//! compressed (a 256-byte column, a fixed-size chunk payload), so the raw
//! block format is used without a size prefix and decompression checks the
//! output against that size.

/// Compress `data` into a raw LZ4 block.
pub fn compress_block(data: &[u8]) -> Vec<u8> {
    lz4_flex::block::compress(data)
}

/// Decompress a raw LZ4 block that must expand to exactly `size` bytes.
pub fn decompress_exact(data: &[u8], size: usize) -> Result<Vec<u8>, CompressionError> {
    let out = lz4_flex::block::decompress(data, size)
        .map_err(|e| CompressionError::DecompressFailed(e.to_string()))?;
    if out.len() != size {
        return Err(CompressionError::SizeMismatch {
            expected: size,
            actual: out.len(),
        });
    }
    Ok(out)
}

/// Errors that can occur during decompression.
#[derive(Debug, thiserror::Error)]
pub enum CompressionError {
    /// LZ4 decompression failed.
    #[error("LZ4 decompression failed: {0}")]
    DecompressFailed(String),
    /// The block decompressed to the wrong size.
    #[error("decompressed {actual} bytes, expected {expected}")]
    SizeMismatch {
        /// Size the caller required.
        expected: usize,
        /// Size actually produced.
        actual: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_with_known_size() {
        let data: Vec<u8> = (0..12_352).map(|i| (i / 97) as u8).collect();
        let compressed = compress_block(&data);
        assert!(compressed.len() < data.len());
        assert_eq!(decompress_exact(&compressed, data.len()).unwrap(), data);
    }

    #[test]
    fn test_compression_reduces_size_for_sparse_chunk() {
        let mut payload = vec![0u8; 12_352];
        payload[..256].fill(3);
        let compressed = compress_block(&payload);
        let ratio = 1.0 - (compressed.len() as f64 / payload.len() as f64);
        assert!(ratio > 0.9, "Expected at least 90% compression, got {ratio:.2}");
    }

    #[test]
    fn test_wrong_size_rejected() {
        let compressed = compress_block(&[7u8; 100]);
        assert!(matches!(
            decompress_exact(&compressed, 256),
            Err(CompressionError::SizeMismatch { expected: 256, .. })
        ));
        assert!(decompress_exact(&compressed, 50).is_err());
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(decompress_exact(&[0xFF, 0xFF, 0xFF, 0xFF], 4096).is_err());
    }
}
