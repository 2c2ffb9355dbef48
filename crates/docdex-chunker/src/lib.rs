//! Word-bounded chunking for docdex.
//!
//! [`WordChunker`] streams whitespace-delimited words into chunks whose
//! joined text (words separated by single spaces) stays within a configured
//! character budget. A word that would push the joined length over the
//! budget closes the current chunk first; a single word longer than the
//! budget becomes a chunk of its own, so no chunk ever exceeds
//! `budget + longest_word`.
//!
//! Splitting is resumable: [`WordChunker::split`] reports the byte offset of
//! the first word it did not consume, so a capped call (`max_chunks`) can be
//! continued later from exactly that offset. The scan scheduler relies on
//! this to bound the work done per tick.

/// One produced chunk: the joined text plus its word count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub text: String,
    pub words: usize,
}

/// The outcome of one [`WordChunker::split`] call.
#[derive(Debug, Clone)]
pub struct ChunkBatch {
    pub chunks: Vec<TextChunk>,
    /// Byte offset into the input just past the consumed words. Equals the
    /// input length when everything was consumed.
    pub consumed: usize,
}

/// Splits text into word-joined chunks bounded by a character budget.
#[derive(Debug, Clone, Copy)]
pub struct WordChunker {
    chunk_size: usize,
}

impl WordChunker {
    pub fn new(chunk_size: usize) -> Self {
        Self { chunk_size }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Split `input` into chunks, producing at most `max_chunks` of them
    /// (`0` means unlimited).
    ///
    /// When the cap is reached the remaining words are left unconsumed and
    /// `consumed` points at the first of them.
    pub fn split(&self, input: &str, max_chunks: usize) -> ChunkBatch {
        let mut chunks = Vec::new();
        let mut buf: Vec<&str> = Vec::new();
        let mut joined_len = 0usize;

        for (start, word) in WordScanner::new(input) {
            if !buf.is_empty() && joined_len + 1 + word.len() > self.chunk_size {
                chunks.push(flush(&mut buf));
                joined_len = 0;
                if max_chunks != 0 && chunks.len() == max_chunks {
                    return ChunkBatch {
                        chunks,
                        consumed: start,
                    };
                }
            }
            joined_len = if buf.is_empty() {
                word.len()
            } else {
                joined_len + 1 + word.len()
            };
            buf.push(word);
        }

        if !buf.is_empty() {
            chunks.push(flush(&mut buf));
        }

        ChunkBatch {
            chunks,
            consumed: input.len(),
        }
    }
}

fn flush(buf: &mut Vec<&str>) -> TextChunk {
    let chunk = TextChunk {
        text: buf.join(" "),
        words: buf.len(),
    };
    buf.clear();
    chunk
}

/// Iterates whitespace-delimited words together with their byte offsets.
struct WordScanner<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> WordScanner<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }
}

impl<'a> Iterator for WordScanner<'a> {
    type Item = (usize, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        let rest = &self.input[self.pos..];
        let skip = rest
            .char_indices()
            .find(|(_, c)| !c.is_whitespace())
            .map(|(i, _)| i)?;
        let start = self.pos + skip;
        let word_rest = &self.input[start..];
        let len = word_rest
            .char_indices()
            .find(|(_, c)| c.is_whitespace())
            .map_or(word_rest.len(), |(i, _)| i);
        self.pos = start + len;
        Some((start, &word_rest[..len]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(batch: &ChunkBatch) -> Vec<&str> {
        batch.chunks.iter().map(|c| c.text.as_str()).collect()
    }

    #[test]
    fn splits_on_character_budget() {
        // "Hello world. Foo" is 16 chars joined; adding " bar." would be 21.
        let chunker = WordChunker::new(20);
        let batch = chunker.split("Hello world. Foo bar.", 0);
        assert_eq!(texts(&batch), vec!["Hello world. Foo", "bar."]);
        assert_eq!(batch.chunks[0].words, 3);
        assert_eq!(batch.chunks[1].words, 1);
        assert_eq!(batch.consumed, "Hello world. Foo bar.".len());
    }

    #[test]
    fn exact_fit_is_kept_in_one_chunk() {
        // joined length is exactly the budget
        let chunker = WordChunker::new(11);
        let batch = chunker.split("hello world", 0);
        assert_eq!(texts(&batch), vec!["hello world"]);
    }

    #[test]
    fn oversized_word_becomes_its_own_chunk() {
        let chunker = WordChunker::new(8);
        let batch = chunker.split("tiny incomprehensibility tiny", 0);
        assert_eq!(texts(&batch), vec!["tiny", "incomprehensibility", "tiny"]);
        // bound: no chunk exceeds budget + longest word length
        let longest = "incomprehensibility".len();
        for chunk in &batch.chunks {
            assert!(chunk.text.len() <= 8 + longest);
        }
    }

    #[test]
    fn empty_input_yields_nothing() {
        let chunker = WordChunker::new(64);
        let batch = chunker.split("", 0);
        assert!(batch.chunks.is_empty());
        assert_eq!(batch.consumed, 0);

        let batch = chunker.split("   \n\t ", 0);
        assert!(batch.chunks.is_empty());
    }

    #[test]
    fn collapses_interior_whitespace() {
        let chunker = WordChunker::new(64);
        let batch = chunker.split("alpha \n beta\t\tgamma", 0);
        assert_eq!(texts(&batch), vec!["alpha beta gamma"]);
    }

    #[test]
    fn max_chunks_caps_output_and_reports_position() {
        let chunker = WordChunker::new(10);
        let input = "aaaa bbbb cccc dddd eeee ffff";
        let batch = chunker.split(input, 2);
        assert_eq!(texts(&batch), vec!["aaaa bbbb", "cccc dddd"]);
        // consumed points at "eeee"
        assert_eq!(&input[batch.consumed..], "eeee ffff");
    }

    #[test]
    fn capped_runs_resume_to_identical_chunk_set() {
        let chunker = WordChunker::new(12);
        let input = "the quick brown fox jumps over the lazy dog again and again";
        let reference = chunker.split(input, 0);

        let mut resumed = Vec::new();
        let mut pos = 0;
        loop {
            let batch = chunker.split(&input[pos..], 1);
            let done = batch.consumed == input.len() - pos;
            resumed.extend(batch.chunks);
            pos += batch.consumed;
            if done {
                break;
            }
        }
        assert_eq!(resumed, reference.chunks);
    }

    #[test]
    fn word_scanner_reports_byte_offsets() {
        let words: Vec<(usize, &str)> = WordScanner::new("  ab  cd").collect();
        assert_eq!(words, vec![(2, "ab"), (6, "cd")]);
    }

    #[test]
    fn word_scanner_handles_multibyte_whitespace() {
        // U+00A0 is whitespace per char::is_whitespace and is 2 bytes
        let input = "a\u{a0}b";
        let words: Vec<(usize, &str)> = WordScanner::new(input).collect();
        assert_eq!(words, vec![(0, "a"), (3, "b")]);
    }
}
