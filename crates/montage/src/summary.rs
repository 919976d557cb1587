//! Sentence-level splitting of free-text summaries.
//!
//! The heuristic is deterministic and works on whitespace-separated words:
//!
//! - blank lines are hard boundaries, single newlines count as spaces;
//! - a word ending in `!` or `?` (optionally followed by closing quotes or
//!   brackets) ends a sentence;
//! - an ellipsis, written `…` or `...`, ends a sentence unless the next word
//!   starts with a lowercase letter;
//! - a word ending in `.` ends a sentence unless it is a known abbreviation,
//!   a single-letter initial, or the next word starts with a lowercase letter;
//! - trailing text without terminal punctuation forms the last sentence;
//! - a piece with no letters or digits (`...`, `!!!`) is folded into the
//!   previous sentence, or into the next one when it opens the summary.
//!
//! Joining the result with single spaces gives back the summary with its
//! whitespace collapsed.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

static RE_PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t\r\f]*\n").unwrap());

const DEFAULT_ABBREVIATIONS: &[&str] = &[
    "mr", "mrs", "ms", "dr", "prof", "sr", "jr", "st", "vs", "etc", "e.g", "i.e", "fig", "approx",
    "ca",
];

const CLOSERS: &[char] = &['"', '\'', '”', '’', ')', ']', '»'];
const OPENERS: &[char] = &['"', '\'', '“', '‘', '(', '[', '«'];

#[derive(Debug, Clone)]
pub struct SummarySplitter {
    abbreviations: HashSet<String>,
}

impl Default for SummarySplitter {
    fn default() -> Self {
        Self::new(DEFAULT_ABBREVIATIONS.iter().copied())
    }
}

impl SummarySplitter {
    /// Builds a splitter with a custom abbreviation list (case-insensitive,
    /// written without the trailing period).
    pub fn new<'a>(abbreviations: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            abbreviations: abbreviations
                .into_iter()
                .map(|a| a.trim_end_matches('.').to_lowercase())
                .collect(),
        }
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        let mut sentences = Vec::new();

        for paragraph in RE_PARAGRAPH_BREAK.split(text) {
            let words: Vec<&str> = paragraph.split_whitespace().collect();
            let mut current: Vec<&str> = Vec::new();

            for (i, word) in words.iter().enumerate() {
                current.push(word);
                if self.ends_sentence(word, words.get(i + 1).copied()) {
                    sentences.push(current.join(" "));
                    current.clear();
                }
            }

            if !current.is_empty() {
                sentences.push(current.join(" "));
            }
        }

        attach_fragments(sentences)
    }

    fn ends_sentence(&self, word: &str, next: Option<&str>) -> bool {
        let core = word.trim_end_matches(CLOSERS);

        if core.ends_with('!') || core.ends_with('?') {
            return true;
        }
        if !core.ends_with('.') && !core.ends_with('…') {
            return false;
        }

        let next_is_lowercase = next
            .and_then(|n| n.trim_start_matches(OPENERS).chars().next())
            .map(|c| c.is_lowercase())
            .unwrap_or(false);
        if next_is_lowercase {
            return false;
        }

        if core.ends_with('…') || core.ends_with("...") {
            return true;
        }

        let stem = core.trim_end_matches('.').trim_start_matches(OPENERS);
        if self.abbreviations.contains(&stem.to_lowercase()) {
            return false;
        }

        let mut chars = stem.chars();
        let is_initial = matches!((chars.next(), chars.next()), (Some(c), None) if c.is_alphabetic());
        !is_initial
    }
}

/// Folds punctuation-only pieces into a neighbouring sentence. Returns
/// nothing when no piece carries a letter or digit.
fn attach_fragments(pieces: Vec<String>) -> Vec<String> {
    let mut sentences: Vec<String> = Vec::new();
    let mut leading: Option<String> = None;

    for piece in pieces {
        if piece.chars().any(char::is_alphanumeric) {
            match leading.take() {
                Some(prefix) => sentences.push(format!("{} {}", prefix, piece)),
                None => sentences.push(piece),
            }
            continue;
        }

        match sentences.last_mut() {
            Some(last) => {
                last.push(' ');
                last.push_str(&piece);
            }
            None => {
                leading = Some(match leading.take() {
                    Some(prefix) => format!("{} {}", prefix, piece),
                    None => piece,
                });
            }
        }
    }

    sentences
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(text: &str) -> Vec<String> {
        SummarySplitter::default().split(text)
    }

    #[test]
    fn test_two_simple_sentences() {
        assert_eq!(
            split("A man walks away. A woman calls him."),
            vec!["A man walks away.", "A woman calls him."]
        );
    }

    #[test]
    fn test_question_and_exclamation() {
        assert_eq!(
            split("Who is he? Nobody knows! The end."),
            vec!["Who is he?", "Nobody knows!", "The end."]
        );
    }

    #[test]
    fn test_missing_terminal_punctuation() {
        assert_eq!(
            split("They meet at noon. Then everything changes"),
            vec!["They meet at noon.", "Then everything changes"]
        );
    }

    #[test]
    fn test_abbreviations_do_not_split() {
        assert_eq!(
            split("Dr. Smith meets Mr. Jones at St. Mary's. They argue, e.g. about money."),
            vec![
                "Dr. Smith meets Mr. Jones at St. Mary's.",
                "They argue, e.g. about money."
            ]
        );
    }

    #[test]
    fn test_initials_do_not_split() {
        assert_eq!(
            split("J. R. Ewing buys a ranch. He sells it."),
            vec!["J. R. Ewing buys a ranch.", "He sells it."]
        );
    }

    #[test]
    fn test_lowercase_continuation_does_not_split() {
        assert_eq!(
            split("It costs approx. five dollars. Cheap."),
            vec!["It costs approx. five dollars.", "Cheap."]
        );
        assert_eq!(split("Version 2. then more"), vec!["Version 2. then more"]);
    }

    #[test]
    fn test_closing_quotes_stay_with_sentence() {
        assert_eq!(
            split("She says \"Run!\" He runs. (It rains.) Done"),
            vec!["She says \"Run!\"", "He runs.", "(It rains.)", "Done"]
        );
    }

    #[test]
    fn test_ellipsis() {
        assert_eq!(
            split("He waits... Nothing happens… The door opens."),
            vec!["He waits...", "Nothing happens…", "The door opens."]
        );
    }

    #[test]
    fn test_both_ellipsis_forms_continue_before_lowercase() {
        assert_eq!(
            split("He waits... and waits. She waits… and waits."),
            vec!["He waits... and waits.", "She waits… and waits."]
        );
    }

    #[test]
    fn test_punctuation_pieces_join_a_neighbour() {
        assert_eq!(
            split("He left. ... She stayed."),
            vec!["He left. ...", "She stayed."]
        );
        assert_eq!(split("!!! It begins."), vec!["!!! It begins."]);
        assert_eq!(split("The end.\n\n?!"), vec!["The end. ?!"]);
    }

    #[test]
    fn test_blank_lines_are_boundaries() {
        assert_eq!(
            split("Opening shot\n\nA long drive\nthrough the desert"),
            vec!["Opening shot", "A long drive through the desert"]
        );
    }

    #[test]
    fn test_empty_and_punctuation_only() {
        assert!(split("").is_empty());
        assert!(split("   \n\n  ").is_empty());
        assert!(split("... !!! ?").is_empty());
    }

    #[test]
    fn test_join_reconstructs_normalized_text() {
        for text in [
            "  First  line.\nSecond line!  Third?\n\nFourth without end",
            "He left. ... She stayed.",
            "... Opening. Middle !!! \n\n ?",
        ] {
            let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
            assert_eq!(split(text).join(" "), normalized);
        }
    }

    #[test]
    fn test_deterministic() {
        let text = "Mr. A leaves. Ms. B stays! C. D. Someone else?";
        assert_eq!(split(text), split(text));
    }

    #[test]
    fn test_custom_abbreviations() {
        let splitter = SummarySplitter::new(["Sig.", "dott"]);
        assert_eq!(
            splitter.split("Il Sig. Rossi arriva. Il Dott. Bianchi parte."),
            vec!["Il Sig. Rossi arriva.", "Il Dott. Bianchi parte."]
        );
    }
}
