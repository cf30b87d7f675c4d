//! Compression sniffing for captured response bodies.
//!
//! The upstream client does not decode responses, so captured bodies may
//! still carry the provider's content encoding.

use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};
use gateway_core::GatewayError;
use std::borrow::Cow;
use std::io::Read;
use tracing::debug;

const PRINTABLE_THRESHOLD: f64 = 0.7;
const BROTLI_BUFFER: usize = 4096;

/// Decode `data` if it looks compressed, otherwise borrow it unchanged.
///
/// gzip and zlib are recognised by magic bytes. Binary-looking data without
/// a known header is tried as brotli, then raw deflate.
pub fn decompress_if_needed(data: &[u8]) -> Result<Cow<'_, [u8]>, GatewayError> {
    if data.len() < 2 {
        return Ok(Cow::Borrowed(data));
    }

    if data[0] == 0x1f && data[1] == 0x8b {
        return read_all(GzDecoder::new(data), "gzip").map(Cow::Owned);
    }

    if data[0] == 0x78 && matches!(data[1], 0x01 | 0x5e | 0x9c | 0xda) {
        return read_all(ZlibDecoder::new(data), "zlib").map(Cow::Owned);
    }

    if is_printable_text(&data[..data.len().min(100)]) {
        return Ok(Cow::Borrowed(data));
    }

    if let Ok(decoded) = read_all(brotli::Decompressor::new(data, BROTLI_BUFFER), "brotli") {
        return Ok(Cow::Owned(decoded));
    }
    if let Ok(decoded) = read_all(DeflateDecoder::new(data), "deflate") {
        return Ok(Cow::Owned(decoded));
    }

    debug!(
        len = data.len(),
        head = ?&data[..data.len().min(4)],
        "binary body matched no known encoding"
    );
    Err(GatewayError::UsageExtraction(
        "response appears to be compressed in unsupported format".to_string(),
    ))
}

fn read_all(mut reader: impl Read, scheme: &str) -> Result<Vec<u8>, GatewayError> {
    let mut out = Vec::new();
    reader
        .read_to_end(&mut out)
        .map_err(|e| GatewayError::UsageExtraction(format!("failed to decompress {scheme} data: {e}")))?;
    debug!(scheme, decoded_len = out.len(), "decompressed response body");
    Ok(out)
}

/// True when more than 70% of `data` is printable ASCII, tab, LF or CR.
#[must_use]
pub fn is_printable_text(data: &[u8]) -> bool {
    if data.is_empty() {
        return true;
    }
    let printable = data
        .iter()
        .filter(|b| matches!(b, 32..=126 | b'\t' | b'\n' | b'\r'))
        .count();
    printable as f64 / data.len() as f64 > PRINTABLE_THRESHOLD
}
