//! Approximate substring matching.
//!
//! A pattern is scored against a text by the smallest edit distance between
//! the pattern and any substring of the text, divided by the pattern length
//! (Bitap semantics with location ignored). Scores are then adjusted by the
//! text's length so that a hit in a short entry ranks above the same hit in a
//! long one. 0 is a perfect match; 1 is no match at all.

/// Patterns are matched in chunks of at most this many characters.
pub const MAX_PATTERN_CHUNK: usize = 32;

/// Floor for a non-identical match, so only whole-text equality scores 0.
const MIN_RAW_SCORE: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchOptions {
    /// Raw scores above this are rejected.
    pub threshold: f64,
    /// Shorter patterns never match.
    pub min_match_char_len: usize,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            min_match_char_len: 2,
        }
    }
}

/// Text prepared for repeated matching.
#[derive(Debug, Clone)]
pub struct MatchText {
    chars: Vec<char>,
    norm: f64,
}

impl MatchText {
    pub fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            norm: field_norm(text),
        }
    }

    pub fn norm(&self) -> f64 {
        self.norm
    }
}

/// Length normalization factor: 1/√(word count), rounded to 3 decimals.
pub fn field_norm(text: &str) -> f64 {
    let words = text.split(' ').filter(|w| !w.is_empty()).count().max(1);
    let norm = 1.0 / (words as f64).sqrt();
    (norm * 1000.0).round() / 1000.0
}

/// Smallest edit distance between `pattern` and any substring of `text`.
fn min_substring_distance(pattern: &[char], text: &[char]) -> usize {
    let m = pattern.len();
    // Row 0 stays 0: a match may start anywhere in the text
    let mut prev: Vec<usize> = (0..=m).collect();
    let mut cur = vec![0; m + 1];
    let mut best = prev[m];

    for &c in text {
        cur[0] = 0;
        for i in 1..=m {
            let cost = usize::from(pattern[i - 1] != c);
            cur[i] = (prev[i - 1] + cost).min(prev[i] + 1).min(cur[i - 1] + 1);
        }
        best = best.min(cur[m]);
        std::mem::swap(&mut prev, &mut cur);
    }
    best
}

/// Raw error ratio of `pattern` in `text`, or `None` if it does not match.
pub fn raw_score(pattern: &[char], text: &MatchText, options: &MatchOptions) -> Option<f64> {
    if pattern.is_empty() || pattern.len() < options.min_match_char_len {
        return None;
    }
    if pattern == text.chars.as_slice() {
        return Some(0.0);
    }

    let mut total = 0.0;
    let mut any_match = false;
    let chunks: Vec<&[char]> = pattern.chunks(MAX_PATTERN_CHUNK).collect();
    for chunk in &chunks {
        let distance = min_substring_distance(chunk, &text.chars);
        let score = (distance as f64 / chunk.len() as f64).max(MIN_RAW_SCORE);
        if score <= options.threshold {
            any_match = true;
            total += score;
        } else {
            total += 1.0;
        }
    }

    if any_match {
        Some(total / chunks.len() as f64)
    } else {
        None
    }
}

/// Final score of `pattern` against `text`, length-normalized.
pub fn score(pattern: &[char], text: &MatchText, options: &MatchOptions) -> Option<f64> {
    raw_score(pattern, text, options).map(|raw| {
        let base = if raw == 0.0 { f64::EPSILON } else { raw };
        base.powf(text.norm)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    #[test]
    fn test_min_substring_distance() {
        assert_eq!(min_substring_distance(&chars("flood"), &chars("flash flood warning")), 0);
        assert_eq!(min_substring_distance(&chars("flod"), &chars("flash flood warning")), 1);
        assert_eq!(min_substring_distance(&chars("abc"), &chars("")), 3);
        assert_eq!(min_substring_distance(&chars("swayed"), &chars("it sways")), 2);
    }

    #[test]
    fn test_field_norm() {
        assert_eq!(field_norm("one"), 1.0);
        assert_eq!(field_norm("one two three four"), 0.5);
        assert_eq!(field_norm("a b c"), 0.577);
        assert_eq!(field_norm(""), 1.0);
    }

    #[test]
    fn test_exact_text_scores_best() {
        let options = MatchOptions::default();
        let text = MatchText::new("fire");
        let exact = score(&chars("fire"), &text, &options).unwrap();
        assert!(exact < 1e-10);
    }

    #[test]
    fn test_substring_hit_floored() {
        let options = MatchOptions::default();
        let text = MatchText::new("fire safety");
        assert_eq!(raw_score(&chars("safety"), &text, &options), Some(MIN_RAW_SCORE));
    }

    #[test]
    fn test_threshold_and_min_length() {
        let options = MatchOptions::default();
        let text = MatchText::new("earthquake safety");
        assert!(raw_score(&chars("zzzz qqqq"), &text, &options).is_none());
        assert!(raw_score(&chars("e"), &text, &options).is_none());
        assert!(raw_score(&chars(""), &text, &options).is_none());
    }

    #[test]
    fn test_shorter_entries_rank_higher() {
        let options = MatchOptions::default();
        let short = MatchText::new("flood safety");
        let long = MatchText::new("flood safety is about moving to higher ground quickly and calmly");
        let pattern = chars("flood");
        assert!(score(&pattern, &short, &options).unwrap() < score(&pattern, &long, &options).unwrap());
    }

    #[test]
    fn test_long_patterns_are_chunked() {
        let options = MatchOptions::default();
        let text = MatchText::new("what should i do during an earthquake at school");
        let pattern = chars("what should i do during an earthquake at school please help");
        assert!(pattern.len() > MAX_PATTERN_CHUNK);
        let raw = raw_score(&pattern, &text, &options).unwrap();
        assert!(raw > 0.0 && raw < 1.0);
    }
}
