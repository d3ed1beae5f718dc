//! Overlapping character-window text splitter.
//!
//! Splits long text into fixed-size windows that share `overlap` characters
//! with their predecessor, so that sentences cut at a window edge still
//! appear whole in the next chunk. Window edges are snapped back to UTF-8
//! character boundaries.

/// Split text into overlapping chunks for embedding.
///
/// Windows are `chunk_size` bytes long (snapped to char boundaries) and each
/// subsequent window starts `chunk_size - overlap` bytes after the previous
/// one. Empty text produces no chunks.
///
/// # Guarantees
///
/// - Every chunk is non-empty and within a char boundary of `chunk_size`.
/// - Consecutive chunks share roughly `overlap` characters.
/// - Concatenating chunks (minus overlaps) reproduces the input.
pub fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    debug_assert!(overlap < chunk_size, "overlap must be less than chunk_size");

    let text_len = text.len();
    if text_len == 0 {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < text_len {
        let end = snap_to_char_boundary(text, (start + chunk_size).min(text_len));
        chunks.push(text[start..end].to_string());
        if end >= text_len {
            break;
        }
        // Advance keeping `overlap` characters of context.
        let next = snap_to_char_boundary(text, end.saturating_sub(overlap));
        start = if next > start { next } else { end };
    }

    chunks
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}
