//! Source Text Model
//!
//! A `SourceBuffer` is a read-only, code-point addressable view of
//! expression text. Indexing is always in Unicode code points, never
//! bytes or UTF-16 units, so diagnostics and token offsets line up with
//! what a user counts on screen.
//!
//! The buffer picks the narrowest storage width that fits the largest
//! code point observed during construction: one byte per element for
//! Latin-1 text, two for BMP text, four for anything beyond. Slices are
//! logical subviews that share both the storage and the line-offset
//! index with their parent.
//!
//! The line-offset index stores, for each line, the code-point index
//! one past its terminating line feed, and always ends with `size + 1`
//! so lookups on the last line need no special case. An empty buffer
//! has `line_offsets == [1]`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::CelError;

/// A 1-based line/column pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
}

/// A half-open code-point range into a source buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpan {
    /// Start offset (inclusive).
    pub start: u32,
    /// End offset (exclusive).
    pub end: u32,
}

impl SourceSpan {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// Backing storage for a buffer, shared between slices.
#[derive(Debug, Clone)]
enum Repr {
    /// The empty singleton. Also what `from_text("")` produces.
    Empty,
    /// All code points fit in one byte (Latin-1).
    Latin1(Arc<[u8]>),
    /// All code points fit in the Basic Multilingual Plane.
    Bmp(Arc<[u16]>),
    /// Full Unicode range.
    Supplemental(Arc<[u32]>),
}

/// Read-only code-point array with a line-offset index.
#[derive(Debug, Clone)]
pub struct SourceBuffer {
    repr: Repr,
    /// Window into the shared storage, in elements.
    start: usize,
    len: usize,
    /// Shared with every slice of this buffer.
    line_offsets: Arc<[u32]>,
}

impl SourceBuffer {
    /// Build a buffer from text, scanning it once to collect line
    /// offsets and pick the storage width.
    pub fn from_text(text: &str) -> Self {
        let mut max_code_point: u32 = 0;
        let mut count: usize = 0;
        let mut line_offsets: Vec<u32> = Vec::new();
        for c in text.chars() {
            count += 1;
            max_code_point = max_code_point.max(c as u32);
            if c == '\n' {
                line_offsets.push(count as u32);
            }
        }
        line_offsets.push(count as u32 + 1);

        let repr = if count == 0 {
            Repr::Empty
        } else if max_code_point <= 0xFF {
            Repr::Latin1(text.chars().map(|c| c as u32 as u8).collect())
        } else if max_code_point <= 0xFFFF {
            Repr::Bmp(text.chars().map(|c| c as u32 as u16).collect())
        } else {
            Repr::Supplemental(text.chars().map(|c| c as u32).collect())
        };

        Self {
            repr,
            start: 0,
            len: count,
            line_offsets: line_offsets.into(),
        }
    }

    /// Number of code points in this buffer.
    pub fn size(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The code point at `index`, bounds-checked.
    pub fn get(&self, index: usize) -> Result<char, CelError> {
        self.char_at(index).ok_or(CelError::OutOfRange {
            index: index as i64,
            size: self.len,
        })
    }

    /// The code point at `index`, or `None` when out of bounds.
    pub fn char_at(&self, index: usize) -> Option<char> {
        if index >= self.len {
            return None;
        }
        let value = match &self.repr {
            Repr::Empty => return None,
            Repr::Latin1(data) => data[self.start + index] as u32,
            Repr::Bmp(data) => data[self.start + index] as u32,
            Repr::Supplemental(data) => data[self.start + index],
        };
        // Stored elements originate from `char`s, which excludes
        // surrogates and out-of-range values.
        Some(char::from_u32(value).expect("stored code points originate from chars"))
    }

    /// A logical subview of `[from, to)` sharing storage and line
    /// offsets with this buffer. Indices of the slice start at 0.
    pub fn slice(&self, from: usize, to: usize) -> Result<SourceBuffer, CelError> {
        if from > to || to > self.len {
            let bad = if from > to { from } else { to };
            return Err(CelError::OutOfRange {
                index: bad as i64,
                size: self.len,
            });
        }
        Ok(SourceBuffer {
            repr: self.repr.clone(),
            start: self.start + from,
            len: to - from,
            line_offsets: Arc::clone(&self.line_offsets),
        })
    }

    /// The line-offset index; never empty. Entry `k` is the code-point
    /// index one past line `k + 1`'s terminating line feed, and the
    /// final entry is `size + 1`.
    pub fn line_offsets(&self) -> &[u32] {
        &self.line_offsets
    }

    /// Resolve a code-point offset to a 1-based line/column pair.
    /// Offsets at `size` (one past the end) resolve onto the last line
    /// so "unexpected end of input" diagnostics have a position.
    pub fn location(&self, offset: usize) -> Option<SourceLocation> {
        location_for_offset(&self.line_offsets, offset)
    }

    /// The text of the 1-based `line`, without its terminating line
    /// feed.
    pub fn line_text(&self, line: u32) -> Option<String> {
        if line == 0 || line as usize > self.line_offsets.len() {
            return None;
        }
        let start = if line == 1 {
            0
        } else {
            self.line_offsets[line as usize - 2] as usize
        };
        let end = (self.line_offsets[line as usize - 1] as usize - 1).min(self.len);
        let mut text = String::new();
        for i in start..end {
            text.push(self.char_at(i)?);
        }
        Some(text)
    }

    /// Iterator over the code points of this buffer.
    pub fn chars(&self) -> impl Iterator<Item = char> + '_ {
        (0..self.len).map(move |i| {
            self.char_at(i)
                .expect("index in range by construction")
        })
    }
}

/// Shared line/column lookup: the smallest `k` with
/// `line_offsets[k] > offset` gives line `k + 1`; the column is the
/// distance from that line's start, 1-based.
pub(crate) fn location_for_offset(line_offsets: &[u32], offset: usize) -> Option<SourceLocation> {
    let offset = offset as u32;
    let k = line_offsets.iter().position(|&end| end > offset)?;
    let line_start = if k == 0 { 0 } else { line_offsets[k - 1] };
    Some(SourceLocation {
        line: k as u32 + 1,
        column: offset - line_start + 1,
    })
}

impl std::fmt::Display for SourceBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for c in self.chars() {
            f.write_fmt(format_args!("{}", c))?;
        }
        Ok(())
    }
}

impl PartialEq for SourceBuffer {
    /// Content equality over code points; storage width is an internal
    /// detail and does not participate.
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.chars().eq(other.chars())
    }
}

impl Eq for SourceBuffer {}
