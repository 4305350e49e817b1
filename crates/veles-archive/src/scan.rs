//! Signature search for ZIP trailer records.

/// Maximum distance of the EOCD record from the end of the archive
/// (22-byte record plus a comment of up to 65535 bytes).
pub const EOCD_SEARCH_WINDOW: usize = 22 + u16::MAX as usize;

/// Find the last occurrence of `signature` in `data[search_start..search_end]`.
///
/// Returns the absolute offset of the match.
#[inline]
pub fn find_signature_backward(
    data: &[u8],
    signature: &[u8],
    search_start: usize,
    search_end: usize,
) -> Option<usize> {
    if search_end <= search_start || search_end > data.len() {
        return None;
    }

    memchr::memmem::rfind(&data[search_start..search_end], signature).map(|pos| search_start + pos)
}

/// End of Central Directory signatures in the search window, last one first.
///
/// A ZIP comment may itself contain the signature, so callers validate each
/// candidate and fall back to the next.
pub fn eocd_candidates<'a>(
    data: &'a [u8],
    signature: &'a [u8],
) -> impl Iterator<Item = usize> + 'a {
    let search_start = data.len().saturating_sub(EOCD_SEARCH_WINDOW);
    let mut search_end = data.len();
    std::iter::from_fn(move || {
        let offset = find_signature_backward(data, signature, search_start, search_end)?;
        search_end = offset;
        Some(offset)
    })
}
