//! Segmentation of oversized paragraphs.
//!
//! A splitter turns one long paragraph into ordered pieces whose
//! concatenation is exactly the original text.

use crate::dom::is_void_element;

/// Splits text into ordered pieces that concatenate back to the input.
pub trait SegmentSplitter: Send + Sync {
    fn split(&self, text: &str) -> Vec<String>;
}

/// Cuts after sentence-ending punctuation followed by whitespace.
///
/// Boundaries inside markup tags are ignored, and the whitespace after a
/// sentence stays with the sentence it follows. Cuts only happen outside
/// inline elements: directly under the wrapping element when the text is
/// one whole element such as `<p>...</p>`, otherwise at the top level.
#[derive(Debug, Clone, Copy, Default)]
pub struct SentenceSplitter;

/// Punctuation after which CJK text may be cut without trailing whitespace.
const CJK_TERMINALS: &[char] = &['。', '！', '？', '；'];

/// Punctuation that ends a sentence when followed by whitespace.
const TERMINALS: &[char] = &['.', '!', '?', ';', '…'];

/// Closing quotes and brackets that may trail a terminal.
const CLOSERS: &[char] = &['"', '\'', '”', '’', ')', '」', '』', '》'];

impl SegmentSplitter for SentenceSplitter {
    fn split(&self, text: &str) -> Vec<String> {
        let base = wrapper_depth(text);
        let mut pieces = Vec::new();
        let mut start = 0;
        let mut depth = 0usize;
        let mut chars = text.char_indices().peekable();

        while let Some((index, c)) = chars.next() {
            if c == '<' {
                let end = tag_end(text, index);
                depth = depth_after(depth, &text[index..end]);
                while chars.peek().is_some_and(|&(i, _)| i < end) {
                    chars.next();
                }
                continue;
            }

            let cjk = CJK_TERMINALS.contains(&c);
            if !cjk && !TERMINALS.contains(&c) {
                continue;
            }

            let mut end = index + c.len_utf8();
            loop {
                if let Some(&(next_index, next)) = chars.peek() {
                    if TERMINALS.contains(&next)
                        || CJK_TERMINALS.contains(&next)
                        || CLOSERS.contains(&next)
                    {
                        end = next_index + next.len_utf8();
                        chars.next();
                        continue;
                    }
                }
                // Closing inline tags such as `</a>` belong to the sentence.
                if !text[end..].starts_with("</") {
                    break;
                }
                let close = tag_end(text, end);
                depth = depth_after(depth, &text[end..close]);
                end = close;
                while chars.peek().is_some_and(|&(i, _)| i < end) {
                    chars.next();
                }
            }

            let mut saw_space = false;
            while let Some(&(next_index, next)) = chars.peek() {
                if next.is_whitespace() {
                    end = next_index + next.len_utf8();
                    saw_space = true;
                    chars.next();
                } else {
                    break;
                }
            }

            let at_end = end == text.len();
            if (saw_space || cjk) && !at_end && depth <= base {
                pieces.push(text[start..end].to_string());
                start = end;
            }
        }

        if start < text.len() {
            pieces.push(text[start..].to_string());
        }
        pieces
    }
}

/// Byte offset just past the tag starting at `start`, skipping `>` inside
/// quoted attribute values. Runs to the end of input if the tag never closes.
fn tag_end(text: &str, start: usize) -> usize {
    let mut quote = None;
    for (index, c) in text[start..].char_indices().skip(1) {
        match (quote, c) {
            (Some(open), c) if c == open => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '>') => return start + index + 1,
            _ => {}
        }
    }
    text.len()
}

/// Element nesting depth after reading `tag`.
fn depth_after(depth: usize, tag: &str) -> usize {
    if tag.starts_with("</") {
        depth.saturating_sub(1)
    } else if tag.starts_with("<!") || tag.starts_with("<?") || tag.ends_with("/>") {
        depth
    } else if is_void_element(tag_name(tag)) {
        depth
    } else {
        depth + 1
    }
}

/// Local name of a start or end tag.
fn tag_name(tag: &str) -> &str {
    let name = tag.trim_start_matches('<').trim_start_matches('/');
    let name = name
        .split(|c: char| c.is_whitespace() || c == '/' || c == '>')
        .next()
        .unwrap_or("");
    name.rsplit(':').next().unwrap_or(name)
}

/// 1 when `text` is a single wrapping element, e.g. `<p>...</p>`, else 0.
fn wrapper_depth(text: &str) -> usize {
    let trimmed = text.trim();
    if !trimmed.starts_with('<') {
        return 0;
    }
    let open = &trimmed[..tag_end(trimmed, 0)];
    if depth_after(0, open) != 1 {
        return 0;
    }
    let closing = format!("</{}>", tag_name(open));
    let qualified = open
        .trim_start_matches('<')
        .split(|c: char| c.is_whitespace() || c == '>')
        .next()
        .unwrap_or("");
    if trimmed.ends_with(&closing) || trimmed.ends_with(&format!("</{}>", qualified)) {
        1
    } else {
        0
    }
}
