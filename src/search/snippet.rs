//! Snippet extraction and term highlighting.
//!
//! Matching follows the FTS5 `unicode61 remove_diacritics` tokenizer: words
//! are runs of alphanumeric characters (so `_` separates words) and accents are
//! folded away before comparing.

use regex::{Regex, RegexBuilder};
use unicode_normalization::char::{decompose_canonical, is_combining_mark};

pub const HIGHLIGHT_OPEN: &str = "**";
pub const HIGHLIGHT_CLOSE: &str = "**";
pub const ELLIPSIS: &str = "...";

/// Highlights query terms in one pass with a single pre-compiled alternation.
#[derive(Debug, Clone, Default)]
pub struct Highlighter {
    pattern: Option<Regex>,
}

impl Highlighter {
    pub fn new<S: AsRef<str>>(terms: &[S]) -> Self {
        let mut terms: Vec<String> = terms
            .iter()
            .map(|t| fold(&t.as_ref().trim().to_lowercase()))
            .filter(|t| !t.is_empty())
            .collect();
        if terms.is_empty() {
            return Self::default();
        }
        // Longest first so overlapping terms prefer the longer match.
        terms.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()).then_with(|| a.cmp(b)));
        terms.dedup();

        let alternation = terms
            .iter()
            .map(|t| regex::escape(t))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = RegexBuilder::new(&format!("(?:{})", alternation))
            .case_insensitive(true)
            .build()
            .ok();
        Self { pattern }
    }

    /// Whole-word term occurrences in `chars`, as sorted non-overlapping
    /// char ranges.
    fn find_terms(&self, chars: &[char]) -> Vec<(usize, usize)> {
        let Some(pattern) = &self.pattern else {
            return Vec::new();
        };

        // One folded char per source char, so char indexes line up.
        let folded: String = chars.iter().map(|&c| fold_char(c)).collect();
        let mut starts = Vec::with_capacity(chars.len() + 1);
        let mut offset = 0;
        for c in folded.chars() {
            starts.push(offset);
            offset += c.len_utf8();
        }
        starts.push(offset);
        let char_at = |byte: usize| starts.partition_point(|&s| s < byte);

        let mut found = Vec::new();
        let mut at = 0;
        while let Some(m) = pattern.find_at(&folded, at) {
            let (start, end) = (char_at(m.start()), char_at(m.end()));
            if start >= chars.len() {
                break;
            }
            let whole_word = end > start
                && (start == 0 || !chars[start - 1].is_alphanumeric())
                && (end == chars.len() || !chars[end].is_alphanumeric());
            if whole_word {
                found.push((start, end));
                at = m.end();
            } else {
                at = starts[start + 1];
            }
        }
        found
    }

    /// Window of at most `max_len` visible characters around the first match,
    /// with every term occurrence wrapped in highlight markers.
    ///
    /// Markers and the leading/trailing ellipsis are not counted in `max_len`.
    pub fn snippet(&self, text: &str, max_len: usize) -> String {
        if max_len == 0 || text.is_empty() {
            return String::new();
        }

        let chars: Vec<char> = text
            .chars()
            .map(|c| if c.is_whitespace() { ' ' } else { c })
            .collect();
        let total = chars.len();
        let matches = self.find_terms(&chars);
        let (match_start, match_end) = matches.first().copied().unwrap_or((0, 0));

        let (mut start, mut end) = if total <= max_len {
            (0, total)
        } else {
            let lead = max_len / 3;
            let start = match_start.saturating_sub(lead);
            let end = (start + max_len).min(total);
            (end.saturating_sub(max_len), end)
        };

        // Don't cut words at the window edges.
        if start > 0 {
            while start < match_start && chars[start - 1].is_alphanumeric() && chars[start].is_alphanumeric() {
                start += 1;
            }
        }
        if end < total {
            while end > match_end.max(start + 1) && chars[end - 1].is_alphanumeric() && chars[end].is_alphanumeric() {
                end -= 1;
            }
        }
        let (cut_start, cut_end) = (start > 0, end < total);

        while start < end && chars[start] == ' ' {
            start += 1;
        }
        while end > start && chars[end - 1] == ' ' {
            end -= 1;
        }

        let mut out = String::with_capacity(end - start + 2 * ELLIPSIS.len());
        if cut_start {
            out.push_str(ELLIPSIS);
        }
        let mut pos = start;
        for &(s, e) in matches.iter().filter(|&&(s, e)| s >= start && e <= end) {
            out.extend(&chars[pos..s]);
            out.push_str(HIGHLIGHT_OPEN);
            out.extend(&chars[s..e]);
            out.push_str(HIGHLIGHT_CLOSE);
            pos = e;
        }
        out.extend(&chars[pos..end]);
        if cut_end {
            out.push_str(ELLIPSIS);
        }
        out
    }
}

/// `c` without its combining marks (`é` -> `e`).
fn fold_char(c: char) -> char {
    let mut base = None;
    decompose_canonical(c, |d| {
        if base.is_none() && !is_combining_mark(d) {
            base = Some(d);
        }
    });
    base.unwrap_or(c)
}

fn fold(text: &str) -> String {
    text.chars().map(fold_char).collect()
}

/// Leading preview of `text`, used where there is nothing to highlight.
pub fn preview(text: &str, max_len: usize) -> String {
    Highlighter::default().snippet(text, max_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn visible(snippet: &str) -> usize {
        snippet
            .trim_start_matches(ELLIPSIS)
            .trim_end_matches(ELLIPSIS)
            .replace(HIGHLIGHT_OPEN, "")
            .chars()
            .count()
    }

    #[test]
    fn test_short_text_is_highlighted_whole() {
        let h = Highlighter::new(&["gpu"]);
        assert_eq!(
            h.snippet("Sharing GPU memory", 100),
            "Sharing **GPU** memory"
        );
    }

    #[test]
    fn test_all_terms_highlighted_case_insensitive() {
        let h = Highlighter::new(&["memory", "GPU"]);
        assert_eq!(
            h.snippet("gpu memory and more GPU", 100),
            "**gpu** **memory** and more **GPU**"
        );
    }

    #[test]
    fn test_whole_words_only() {
        let h = Highlighter::new(&["config"]);
        assert_eq!(
            h.snippet("configuration vs config", 100),
            "configuration vs **config**"
        );
    }

    #[test]
    fn test_longer_term_wins_overlap() {
        let h = Highlighter::new(&["new", "new york"]);
        assert_eq!(h.snippet("in new york", 100), "in **new york**");
    }

    #[test]
    fn test_window_around_first_match() {
        let filler = "lorem ipsum dolor sit amet ".repeat(20);
        let text = format!("{}the needle is here {}", filler, filler);
        let h = Highlighter::new(&["needle"]);
        let snippet = h.snippet(&text, 60);

        assert!(snippet.starts_with(ELLIPSIS));
        assert!(snippet.ends_with(ELLIPSIS));
        assert!(snippet.contains("**needle**"));
        assert!(visible(&snippet) <= 60);
    }

    #[test]
    fn test_match_near_end_fills_window() {
        let text = format!("{}tail match", "word ".repeat(50));
        let h = Highlighter::new(&["match"]);
        let snippet = h.snippet(&text, 40);
        assert!(snippet.starts_with(ELLIPSIS));
        assert!(!snippet.ends_with(ELLIPSIS));
        assert!(snippet.ends_with("**match**"));
        assert!(visible(&snippet) <= 40);
    }

    #[test]
    fn test_bounded_and_deterministic() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(30);
        let h = Highlighter::new(&["lazy", "fox"]);
        for len in [1, 5, 17, 80, 160] {
            let a = h.snippet(&text, len);
            let b = h.snippet(&text, len);
            assert_eq!(a, b);
            assert!(visible(&a) <= len, "len {} produced {:?}", len, a);
        }
    }

    #[test]
    fn test_no_terms_is_leading_preview() {
        assert_eq!(preview("one two three four", 7), "one two...");
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("anything", 0), "");
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        let h = Highlighter::new(&["c", "a.b"]);
        assert_eq!(h.snippet("axb a.b c", 100), "axb **a.b** **c**");
    }

    #[test]
    fn test_underscore_separates_words() {
        let text = format!("{}my_config value", "lorem ipsum dolor sit amet ".repeat(20));
        let snippet = Highlighter::new(&["config"]).snippet(&text, 80);
        assert!(snippet.contains("my_**config** value"), "{}", snippet);
        assert!(visible(&snippet) <= 80);
    }

    #[test]
    fn test_accents_fold_both_ways() {
        let text = format!("{}café value", "lorem ipsum dolor sit amet ".repeat(20));
        let snippet = Highlighter::new(&["cafe"]).snippet(&text, 80);
        assert!(snippet.contains("**café** value"), "{}", snippet);

        assert_eq!(
            Highlighter::new(&["Café"]).snippet("a CAFE here", 80),
            "a **CAFE** here"
        );
    }

    #[test]
    fn test_rejected_partial_match_does_not_hide_later_one() {
        let h = Highlighter::new(&["new york", "york"]);
        assert_eq!(h.snippet("renew york", 100), "renew **york**");
    }

    #[test]
    fn test_newlines_flattened() {
        let h = Highlighter::new(&["two"]);
        assert_eq!(h.snippet("one\ntwo", 100), "one **two**");
    }
}
