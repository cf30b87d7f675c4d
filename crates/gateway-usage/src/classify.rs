//! Streaming classification.
//!
//! The relay and the accounting path share this heuristic: a response is a
//! stream if its content type is event-stream or plain text, or if a
//! `data:` frame marker appears in the first bytes of the body.

/// Bytes inspected for a frame marker.
pub const SNIFF_LEN: usize = 100;

const STREAMING_CONTENT_TYPES: [&str; 2] = ["text/event-stream", "text/plain"];

/// Decide whether a response is a server-push stream.
///
/// `body_prefix` may be empty when only headers are known.
#[must_use]
pub fn is_streaming(content_type: Option<&str>, body_prefix: &[u8]) -> bool {
    if let Some(ct) = content_type {
        let ct = ct.to_ascii_lowercase();
        if STREAMING_CONTENT_TYPES.iter().any(|s| ct.contains(s)) {
            return true;
        }
    }

    let sniff = &body_prefix[..body_prefix.len().min(SNIFF_LEN)];
    sniff.windows(5).any(|w| w == b"data:")
}
