/// Telegram rejects messages longer than this many bytes of text.
pub(crate) const TELEGRAM_MAX_LEN: usize = 4096;

/// Split a plain-text message into chunks no longer than `max_len` bytes.
/// Prefers paragraph boundaries, then line boundaries, then any char boundary.
pub(crate) fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks: Vec<String> = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let mut boundary = max_len;
        while boundary > 0 && !remaining.is_char_boundary(boundary) {
            boundary -= 1;
        }

        let search_region = &remaining[..boundary];
        let split_at = search_region
            .rfind("\n\n")
            .map(|p| p + 1)
            .or_else(|| search_region.rfind('\n'))
            .filter(|p| *p > 0)
            .unwrap_or(boundary);

        // max_len smaller than the first char: take that char anyway.
        let split_at = if split_at == 0 {
            remaining
                .char_indices()
                .nth(1)
                .map_or(remaining.len(), |(i, _)| i)
        } else {
            split_at
        };

        let (chunk, rest) = remaining.split_at(split_at);
        let chunk = chunk.trim_end();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }
        remaining = rest.trim_start_matches('\n');
    }

    chunks
}
