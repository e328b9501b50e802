//! Sentence segmentation of streamed assistant text.
//!
//! Deltas arrive at arbitrary split points ("Hi", " there.", ...). The
//! segmenter buffers them and cuts speakable chunks as early as possible so
//! synthesis can start before the reply has finished streaming.
//!
//! Rules, checked after every delta in this order:
//!
//! 1. A `.`, `!` or `?` (plus any closing quotes/brackets) that ends the
//!    buffer or is followed by whitespace closes a sentence. The text up to
//!    and including the mark is emitted and the rest stays buffered. This
//!    repeats while the buffer still contains a boundary.
//! 2. If what remains is longer than the soft limit (in characters), all of
//!    it is emitted.
//! 3. [`finish`](SentenceSegmenter::finish) emits any non-empty remainder.
//!
//! Whitespace is never trimmed: concatenating every emitted chunk gives back
//! exactly the concatenation of the input deltas.

use odia_core::{BoundaryReason, TextChunk};

const SENTENCE_MARKS: [char; 3] = ['.', '!', '?'];
const CLOSERS: [char; 6] = ['"', '\'', ')', ']', '\u{201d}', '\u{2019}'];

#[derive(Debug)]
pub struct SentenceSegmenter {
    soft_limit: usize,
    buffer: String,
    next_index: u64,
    closed: bool,
}

impl SentenceSegmenter {
    pub fn new(soft_limit: usize) -> Self {
        Self {
            soft_limit: soft_limit.max(1),
            buffer: String::new(),
            next_index: 0,
            closed: false,
        }
    }

    /// Feed one delta; returns the chunks it completed (possibly none).
    pub fn push(&mut self, delta: &str) -> Vec<TextChunk> {
        if self.closed || delta.is_empty() {
            return Vec::new();
        }
        self.buffer.push_str(delta);

        let mut chunks = Vec::new();
        while let Some(end) = sentence_end(&self.buffer) {
            let rest = self.buffer.split_off(end);
            let sentence = std::mem::replace(&mut self.buffer, rest);
            chunks.push(self.emit(sentence, BoundaryReason::SentenceEnd));
        }
        if self.buffer.chars().count() > self.soft_limit {
            let text = std::mem::take(&mut self.buffer);
            chunks.push(self.emit(text, BoundaryReason::LengthLimit));
        }
        chunks
    }

    /// Stream ended: flush whatever is left.
    pub fn finish(&mut self) -> Option<TextChunk> {
        if self.closed {
            return None;
        }
        self.closed = true;
        if self.buffer.is_empty() {
            return None;
        }
        let text = std::mem::take(&mut self.buffer);
        Some(self.emit(text, BoundaryReason::StreamEnd))
    }

    /// Discard the buffer. Returns the number of characters dropped.
    ///
    /// After cancelling, `push` and `finish` emit nothing.
    pub fn cancel(&mut self) -> usize {
        self.closed = true;
        let dropped = self.buffer.chars().count();
        self.buffer.clear();
        dropped
    }

    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn buffered(&self) -> &str {
        &self.buffer
    }

    /// Number of chunks emitted so far.
    pub const fn emitted(&self) -> u64 {
        self.next_index
    }

    fn emit(&mut self, text: String, boundary: BoundaryReason) -> TextChunk {
        let index = self.next_index;
        self.next_index += 1;
        TextChunk {
            index,
            text,
            boundary,
        }
    }
}

/// Byte offset just past the first sentence boundary in `text`, if any.
fn sentence_end(text: &str) -> Option<usize> {
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if !SENTENCE_MARKS.contains(&c) {
            continue;
        }
        let mut end = i + c.len_utf8();
        while let Some(&(j, next)) = chars.peek() {
            if !CLOSERS.contains(&next) {
                break;
            }
            end = j + next.len_utf8();
            chars.next();
        }
        match chars.peek() {
            None => return Some(end),
            Some(&(_, next)) if next.is_whitespace() => return Some(end),
            // "3.14", "e.g.x", "?!" runs: keep scanning.
            Some(_) => {}
        }
    }
    None
}
