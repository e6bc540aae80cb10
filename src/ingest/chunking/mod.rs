
use serde::{Deserialize, Serialize};

/// Configuration for document chunking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Target chunk size in characters
    pub chunk_size: usize,
    /// Overlap between adjacent chunks in characters
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// Split text into overlapping chunks, preferring paragraph breaks, then
/// sentence ends, then word boundaries, with a hard character cut as the
/// last resort. Input order is preserved; the caller assigns indexes.
#[inline]
pub fn split_text(text: &str, config: &ChunkingConfig) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    // Byte offset of every char boundary, plus the end of the string, so
    // all cuts below stay on valid boundaries.
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(offset, _)| offset)
        .chain(std::iter::once(text.len()))
        .collect();
    let total_chars = bounds.len() - 1;

    let chunk_size = config.chunk_size.max(1);
    let overlap = config.chunk_overlap.min(chunk_size - 1);

    let mut chunks = Vec::new();
    let mut start = 0;

    loop {
        let end = (start + chunk_size).min(total_chars);
        let cut = if end < total_chars {
            find_cut(text, &bounds, start, end)
        } else {
            end
        };

        let piece = text.get(bounds[start]..bounds[cut]).unwrap_or_default();
        if !piece.trim().is_empty() {
            chunks.push(piece.to_string());
        }

        if cut >= total_chars {
            break;
        }

        start = cut.saturating_sub(overlap).max(start + 1);
    }

    chunks
}

/// Pick the cut position (a char index) for the window `[start, end)`,
/// preferring a natural boundary in the second half of the window
fn find_cut(text: &str, bounds: &[usize], start: usize, end: usize) -> usize {
    let window_start = bounds[start];
    let window = text.get(window_start..bounds[end]).unwrap_or_default();

    // Boundaries in the first half of the window would produce runt chunks,
    // so they are ignored.
    let half = (end - start) / 2;
    let min_offset = bounds[start + half] - window_start;

    match find_boundary(window, min_offset) {
        Some(offset) => {
            let absolute = window_start + offset;
            // The boundary patterns are ASCII, so `absolute` is always a
            // char boundary and the search hits exactly.
            match bounds.binary_search(&absolute) {
                Ok(index) | Err(index) => index,
            }
        }
        None => end,
    }
}

/// Byte offset just past the last natural boundary in `window` that leaves
/// at least `min_offset` bytes of content, if any
fn find_boundary(window: &str, min_offset: usize) -> Option<usize> {
    let paragraph = window
        .rfind("\n\n")
        .map(|pos| pos + 2)
        .filter(|&cut| cut > min_offset);
    if paragraph.is_some() {
        return paragraph;
    }

    let sentence = [". ", "! ", "? ", "\n"]
        .iter()
        .filter_map(|pattern| window.rfind(pattern).map(|pos| pos + pattern.len()))
        .filter(|&cut| cut > min_offset)
        .max();
    if sentence.is_some() {
        return sentence;
    }

    window
        .rfind(' ')
        .map(|pos| pos + 1)
        .filter(|&cut| cut > min_offset)
}
