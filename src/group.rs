//! Grouping of paragraph text into provider-sized batches.
//!
//! Long paragraphs are segmented into cells first; cells are then packed
//! greedily into groups whose total length stays under the provider payload
//! limit. When a group closes, its last two cells are carried into the next
//! group as context so translations stay coherent across batch boundaries.

use crate::segment::SegmentSplitter;
use log::debug;

/// Number of trailing cells repeated at the start of the next group.
const CONTEXT_CELLS: usize = 2;

/// A translatable fragment and the paragraph it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paragraph {
    /// Fragment text.
    pub text: String,
    /// Document-order index of the source paragraph.
    pub origin_index: usize,
}

impl Paragraph {
    pub fn new(text: impl Into<String>, origin_index: usize) -> Self {
        Self {
            text: text.into(),
            origin_index,
        }
    }

    /// Length in characters.
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// One batch of cells submitted together.
///
/// The first `context_len` cells repeat the tail of the previous group and
/// are only there for context; the rest are owned by this group.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParagraphGroup {
    cells: Vec<Paragraph>,
    context_len: usize,
}

impl ParagraphGroup {
    /// Every cell in submission order, context first.
    pub fn cells(&self) -> &[Paragraph] {
        &self.cells
    }

    /// Cells copied from the previous group.
    pub fn context(&self) -> &[Paragraph] {
        &self.cells[..self.context_len]
    }

    /// Cells that belong to this group.
    pub fn own_cells(&self) -> &[Paragraph] {
        &self.cells[self.context_len..]
    }

    /// Summed character length of every cell.
    pub fn text_len(&self) -> usize {
        self.cells.iter().map(Paragraph::len).sum()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Splits per-paragraph text into segmented cells and packs them into groups.
pub struct ParagraphGrouper<S: SegmentSplitter> {
    splitter: S,
    max_paragraph_len: usize,
    max_group_len: usize,
    include_short_paragraphs: bool,
}

impl<S: SegmentSplitter> ParagraphGrouper<S> {
    /// Creates a grouper. Both lengths are in characters and must be non-zero.
    pub fn new(splitter: S, max_paragraph_len: usize, max_group_len: usize) -> Self {
        Self {
            splitter,
            max_paragraph_len: max_paragraph_len.max(1),
            max_group_len: max_group_len.max(1),
            include_short_paragraphs: true,
        }
    }

    /// When disabled, paragraphs at or below `max_paragraph_len` produce no
    /// cells at all and only segmented paragraphs are grouped.
    pub fn include_short_paragraphs(mut self, include: bool) -> Self {
        self.include_short_paragraphs = include;
        self
    }

    /// Segments and groups `texts`, where each index is a paragraph's document position.
    pub fn group(&self, texts: &[String]) -> Vec<ParagraphGroup> {
        let cells = self.cells(texts);
        let groups = self.pack(cells);
        debug!(
            "Grouped {} paragraphs into {} groups (max {} chars)",
            texts.len(),
            groups.len(),
            self.max_group_len
        );
        groups
    }

    /// Builds the ordered cell list.
    pub fn cells(&self, texts: &[String]) -> Vec<Paragraph> {
        let mut cells = Vec::new();

        for (index, text) in texts.iter().enumerate() {
            if text.chars().count() <= self.max_paragraph_len {
                if self.include_short_paragraphs && !text.is_empty() {
                    cells.push(Paragraph::new(text.as_str(), index));
                }
                continue;
            }

            for piece in self.splitter.split(text) {
                for window in slice_chars(&piece, self.max_group_len) {
                    cells.push(Paragraph::new(window, index));
                }
            }
        }

        cells
    }

    /// Greedy packing with context carry-over.
    fn pack(&self, cells: Vec<Paragraph>) -> Vec<ParagraphGroup> {
        let mut groups = Vec::new();
        let mut current = ParagraphGroup::default();
        let mut running_len = 0usize;

        for cell in cells {
            let cell_len = cell.len();

            if !current.is_empty() && running_len + cell_len > self.max_group_len {
                let closed = std::mem::take(&mut current);
                running_len = 0;

                // The seeded context always travels whole, so a group may
                // pass the ceiling by its context alone.
                if closed.len() > CONTEXT_CELLS {
                    let context = closed.cells[closed.len() - CONTEXT_CELLS..].to_vec();
                    running_len = context.iter().map(Paragraph::len).sum();
                    current.context_len = context.len();
                    current.cells = context;
                }

                groups.push(closed);
            }

            running_len += cell_len;
            current.cells.push(cell);
        }

        if !current.own_cells().is_empty() {
            groups.push(current);
        }

        groups
    }
}

/// Slices `text` into windows of exactly `size` characters, the last one
/// possibly shorter. Empty input yields no windows.
fn slice_chars(text: &str, size: usize) -> Vec<String> {
    let mut windows = Vec::new();
    let mut current = String::new();
    let mut count = 0;

    for c in text.chars() {
        current.push(c);
        count += 1;
        if count == size {
            windows.push(std::mem::take(&mut current));
            count = 0;
        }
    }
    if !current.is_empty() {
        windows.push(current);
    }
    windows
}
