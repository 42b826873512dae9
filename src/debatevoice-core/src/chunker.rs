//! Sentence-aware text chunking.
//!
//! Text is split at ". " boundaries and whole sentences are packed greedily
//! into chunks of at most `max_chars` characters. The single space of each
//! boundary between two chunks is dropped, so joining the chunks with `" "`
//! gives back the input exactly. A sentence longer than `max_chars` is kept
//! whole as its own chunk.

use std::iter::Peekable;

/// Split `text` into chunks of at most `max_chars` characters.
pub fn chunk_text(text: &str, max_chars: usize) -> Chunks<'_> {
    let whole = text.chars().count() <= max_chars;
    Chunks {
        text,
        max_chars,
        whole,
        sentences: Sentences { text, start: 0 }.peekable(),
    }
}

/// Iterator over the chunks of a text. See [`chunk_text`].
pub struct Chunks<'a> {
    text: &'a str,
    max_chars: usize,
    whole: bool,
    sentences: Peekable<Sentences<'a>>,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        if self.whole {
            self.whole = false;
            // Drain so the short-text path also yields exactly once.
            self.sentences.by_ref().for_each(drop);
            return Some(self.text);
        }

        let (start, mut end) = self.sentences.next()?;
        let mut len = self.text[start..end].chars().count();

        while let Some(&(next_start, next_end)) = self.sentences.peek() {
            let next_len = self.text[next_start..next_end].chars().count();
            if len + 1 + next_len > self.max_chars {
                break;
            }
            len += 1 + next_len;
            end = next_end;
            self.sentences.next();
        }

        Some(&self.text[start..end])
    }
}

/// Byte ranges of sentences. Each range keeps its trailing period; the space
/// after it is the separator and belongs to neither sentence. A ". " at the
/// very end of the text is not a boundary.
struct Sentences<'a> {
    text: &'a str,
    start: usize,
}

impl Iterator for Sentences<'_> {
    type Item = (usize, usize);

    fn next(&mut self) -> Option<(usize, usize)> {
        let len = self.text.len();
        if self.start >= len {
            return None;
        }

        let start = self.start;
        let mut search = start;
        while let Some(offset) = self.text[search..].find(". ") {
            let dot = search + offset;
            if dot + 2 < len {
                self.start = dot + 2;
                return Some((start, dot + 1));
            }
            search = dot + 2;
        }

        self.start = len;
        Some((start, len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(text: &str, max: usize) -> Vec<&str> {
        chunk_text(text, max).collect()
    }

    fn assert_chunk_invariants(text: &str, max: usize) {
        let pieces = chunks(text, max);
        assert_eq!(pieces.join(" "), text);
        for piece in &pieces {
            assert!(!piece.is_empty());
            let len = piece.chars().count();
            if len > max {
                // Only a lone oversized sentence may exceed the budget.
                assert_eq!(chunks(piece, usize::MAX).len(), 1);
                assert!(!piece[..piece.len() - 1].contains(". "));
            }
        }
    }

    #[test]
    fn test_short_text_single_chunk() {
        assert_eq!(chunks("Hello world. Bye.", 100), vec!["Hello world. Bye."]);
    }

    #[test]
    fn test_text_at_limit_is_not_split() {
        let text = "abcde. fghij";
        assert_eq!(chunks(text, text.len()), vec![text]);
    }

    #[test]
    fn test_splits_on_sentence_boundaries() {
        let text = "Hello world. This is a test. Another sentence here.";
        assert_eq!(
            chunks(text, 30),
            vec!["Hello world. This is a test.", "Another sentence here."]
        );
        assert_chunk_invariants(text, 30);
    }

    #[test]
    fn test_long_sentence_kept_whole() {
        let long = "x".repeat(50);
        let text = format!("Short. {}. Tail.", long);
        let pieces = chunks(&text, 20);
        assert_eq!(pieces, vec!["Short.", &format!("{}.", long), "Tail."]);
        assert_chunk_invariants(&text, 20);
    }

    #[test]
    fn test_trailing_separator_not_a_boundary() {
        let text = "One two. Three four. ";
        assert_eq!(chunks(text, 10), vec!["One two.", "Three four. "]);
        assert_chunk_invariants(text, 10);
    }

    #[test]
    fn test_no_empty_chunks_with_repeated_separators() {
        assert_chunk_invariants("a. . b. . . c", 2);
        assert_chunk_invariants(". . .", 1);
    }

    #[test]
    fn test_multibyte_counts_characters() {
        let text = "Ünïcödé sëntence. Ånother öne.";
        assert_eq!(chunks(text, 17), vec!["Ünïcödé sëntence.", "Ånother öne."]);
        assert_chunk_invariants(text, 17);
    }

    fn sentence_text(total: usize) -> String {
        // Sentences of 39 chars plus the joining space.
        let sentence = "The motion should be rejected outright.";
        let mut text = String::new();
        while text.len() + sentence.len() + 1 < total {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(sentence);
        }
        // Pad to exactly `total` with an unfinished sentence.
        text.push(' ');
        while text.len() < total {
            text.push('w');
        }
        text
    }

    #[test]
    fn test_2500_chars_fits_2500_budget() {
        let text = sentence_text(2500);
        assert_eq!(text.chars().count(), 2500);
        assert_eq!(chunks(&text, 2500), vec![text.as_str()]);
    }

    #[test]
    fn test_2500_chars_split_for_2000_budget() {
        let text = sentence_text(2500);
        let pieces = chunks(&text, 2000);
        assert!(pieces.len() >= 2);
        for piece in &pieces {
            assert!(piece.chars().count() <= 2000);
        }
        // Every chunk but the last ends a sentence.
        for piece in &pieces[..pieces.len() - 1] {
            assert!(piece.ends_with('.'));
        }
        assert_chunk_invariants(&text, 2000);
    }

    #[test]
    fn test_empty_text() {
        assert_eq!(chunks("", 10), vec![""]);
    }
}
