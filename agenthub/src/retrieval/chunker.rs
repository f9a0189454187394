//! Paragraph-packing chunker for uploaded documents.

/// Rough characters-per-token ratio used for estimates.
const CHARS_PER_TOKEN: usize = 4;

/// Split `text` into chunks of at most `max_chars` characters.
///
/// Paragraphs (blank-line separated) are packed greedily; a paragraph that
/// alone exceeds the limit is cut on character boundaries.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for paragraph in split_paragraphs(text) {
        let para_len = paragraph.chars().count();

        if para_len > max_chars {
            flush(&mut chunks, &mut current, &mut current_len);
            chunks.extend(hard_split(paragraph, max_chars));
            continue;
        }

        // +2 for the paragraph break that joins them
        let joined_len = if current.is_empty() {
            para_len
        } else {
            current_len + 2 + para_len
        };
        if joined_len > max_chars {
            flush(&mut chunks, &mut current, &mut current_len);
        }

        if !current.is_empty() {
            current.push_str("\n\n");
            current_len += 2;
        }
        current.push_str(paragraph);
        current_len += para_len;
    }

    flush(&mut chunks, &mut current, &mut current_len);
    chunks
}

/// Estimated token count; at least 1 for non-empty text.
pub fn estimate_tokens(text: &str) -> usize {
    let chars = text.chars().count();
    if chars == 0 {
        0
    } else {
        chars.div_ceil(CHARS_PER_TOKEN)
    }
}

fn split_paragraphs(text: &str) -> impl Iterator<Item = &str> {
    let mut paragraphs = Vec::new();
    let mut start: Option<usize> = None;
    let mut end = 0;

    for (offset, line) in line_offsets(text) {
        if line.trim().is_empty() {
            if let Some(s) = start.take() {
                paragraphs.push(text[s..end].trim());
            }
        } else {
            if start.is_none() {
                start = Some(offset);
            }
            end = offset + line.len();
        }
    }
    if let Some(s) = start {
        paragraphs.push(text[s..end].trim());
    }

    paragraphs.into_iter().filter(|p| !p.is_empty())
}

/// Lines with their byte offsets, newline excluded.
fn line_offsets(text: &str) -> impl Iterator<Item = (usize, &str)> {
    let mut offset = 0;
    text.split('\n').map(move |line| {
        let start = offset;
        offset += line.len() + 1;
        (start, line.trim_end_matches('\r'))
    })
}

fn hard_split(paragraph: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = paragraph.chars().collect();
    chars
        .chunks(max_chars)
        .map(|piece| piece.iter().collect::<String>().trim().to_string())
        .filter(|piece| !piece.is_empty())
        .collect()
}

fn flush(chunks: &mut Vec<String>, current: &mut String, current_len: &mut usize) {
    if !current.is_empty() {
        chunks.push(std::mem::take(current));
    }
    *current_len = 0;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_small_paragraphs() {
        let text = "one\n\ntwo\n\nthree";
        assert_eq!(chunk_text(text, 100), vec!["one\n\ntwo\n\nthree"]);
    }

    #[test]
    fn splits_when_full() {
        let text = "aaaa\n\nbbbb\n\ncccc";
        assert_eq!(chunk_text(text, 10), vec!["aaaa\n\nbbbb", "cccc"]);
    }

    #[test]
    fn keeps_multiline_paragraphs_together() {
        let text = "line one\nline two\r\n\r\nnext";
        let chunks = chunk_text(text, 17);
        assert_eq!(chunks, vec!["line one\nline two", "next"]);
    }

    #[test]
    fn hard_splits_oversize_paragraph() {
        let text = "安".repeat(25);
        let chunks = chunk_text(&text, 10);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
    }

    #[test]
    fn empty_text_has_no_chunks() {
        assert!(chunk_text("\n\n  \n", 10).is_empty());
    }

    #[test]
    fn token_estimate() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcdefgh"), 2);
        assert_eq!(estimate_tokens("abcdefghi"), 3);
    }
}
