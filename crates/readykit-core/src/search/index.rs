use super::corpus::FaqRecord;
use super::fuzzy::{self, MatchOptions, MatchText};

/// Separator placed between question variants and the answer.
const TEXT_SEPARATOR: &str = " | ";

/// Lower-case, trim, and collapse internal whitespace.
pub fn normalize(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Split a normalized query into letter/number runs of at least `min_len`
/// characters.
///
/// Runs are split on anything that is not `char::is_alphanumeric`. That set
/// also holds the combining vowel signs Unicode marks alphabetic, so a word
/// like "भूकंप" stays one token instead of breaking at each mark. Marks
/// outside it, such as the Devanagari virama, still split.
pub fn tokenize(query: &str, min_len: usize) -> Vec<String> {
    query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= min_len)
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub id: String,
    /// Normalized questions and answer; matching also sees answer text.
    pub searchable_text: String,
    pub answer: String,
    text: MatchText,
}

impl IndexEntry {
    pub fn from_record(record: &FaqRecord) -> Self {
        let joined = record
            .questions
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(record.answer.as_str()))
            .collect::<Vec<_>>()
            .join(TEXT_SEPARATOR);
        let searchable_text = normalize(&joined);
        let text = MatchText::new(&searchable_text);

        Self {
            id: record.id.clone(),
            searchable_text,
            answer: record.answer.clone(),
            text,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SearchHit<'a> {
    pub entry: &'a IndexEntry,
    pub score: f64,
}

/// Immutable fuzzy index over the FAQ corpus.
#[derive(Debug, Clone)]
pub struct SearchIndex {
    entries: Vec<IndexEntry>,
    options: MatchOptions,
}

impl SearchIndex {
    pub fn build(records: &[FaqRecord], options: MatchOptions) -> Self {
        Self {
            entries: records.iter().map(IndexEntry::from_record).collect(),
            options,
        }
    }

    pub fn empty(options: MatchOptions) -> Self {
        Self {
            entries: Vec::new(),
            options,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// All matching entries, best first. Ties keep corpus order.
    pub fn search(&self, pattern: &str) -> Vec<SearchHit<'_>> {
        let pattern: Vec<char> = pattern.chars().collect();
        let mut hits: Vec<SearchHit<'_>> = self
            .entries
            .iter()
            .filter_map(|entry| {
                fuzzy::score(&pattern, &entry.text, &self.options).map(|score| SearchHit { entry, score })
            })
            .collect();
        hits.sort_by(|a, b| a.score.total_cmp(&b.score));
        hits
    }

    pub fn best(&self, pattern: &str) -> Option<SearchHit<'_>> {
        self.search(pattern).into_iter().next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::corpus::builtin_records;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  Earthquake   SAFETY\n"), "earthquake safety");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn test_tokenize_unicode_runs() {
        assert_eq!(
            tokenize("building swayed, suddenly! help", 3),
            vec!["building", "swayed", "suddenly", "help"]
        );
        assert_eq!(tokenize("what to do in a flood?", 3), vec!["what", "flood"]);
        assert_eq!(tokenize("inundación: ¿qué hacer?", 3), vec!["inundación", "qué", "hacer"]);
    }

    #[test]
    fn test_tokenize_keeps_vowel_signs_in_words() {
        assert_eq!(tokenize("भूकंप के समय", 3), vec!["भूकंप", "समय"]);
        assert_eq!(tokenize("घर में रहें", 2), vec!["घर", "में", "रहें"]);
    }

    #[test]
    fn test_entry_text_includes_questions_and_answer() {
        let record = FaqRecord {
            id: "x".into(),
            questions: vec!["Flood  Safety".into(), "high water?".into()],
            answer: "Move to Higher ground.".into(),
        };
        let entry = IndexEntry::from_record(&record);
        assert_eq!(entry.searchable_text, "flood safety | high water? | move to higher ground.");
        assert_eq!(entry.answer, "Move to Higher ground.");
    }

    #[test]
    fn test_search_ranks_best_first() {
        let index = SearchIndex::build(&builtin_records(), MatchOptions::default());
        let hits = index.search("fire safety");
        assert!(!hits.is_empty());
        assert_eq!(hits[0].entry.id, "fallback_fire");
        assert!(hits.windows(2).all(|w| w[0].score <= w[1].score));
    }

    #[test]
    fn test_empty_index_finds_nothing() {
        let index = SearchIndex::empty(MatchOptions::default());
        assert!(index.best("earthquake").is_none());
    }
}
