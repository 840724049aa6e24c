//! Text tokenization shared by index builds and queries

use crate::config::IndexConfig;

/// English stop words, sorted for binary search
pub const STOP_WORDS: &[&str] = &[
    "about", "above", "after", "again", "against", "all", "also", "am", "an", "and", "any",
    "are", "as", "at", "be", "been", "before", "being", "below", "between", "both", "but", "by",
    "can", "could", "did", "do", "does", "doing", "down", "during", "each", "either", "etc",
    "ever", "every", "few", "for", "from", "further", "had", "has", "have", "having", "he",
    "her", "here", "hers", "herself", "him", "himself", "his", "how", "however", "if", "in",
    "into", "is", "it", "its", "itself", "just", "may", "me", "might", "more", "most", "much",
    "must", "my", "myself", "neither", "no", "nor", "not", "now", "of", "off", "on", "once",
    "only", "or", "other", "our", "ours", "ourselves", "out", "over", "own", "same", "shall",
    "she", "should", "since", "so", "some", "such", "than", "that", "the", "their", "theirs",
    "them", "themselves", "then", "there", "these", "they", "this", "those", "through", "thus",
    "to", "too", "under", "until", "up", "upon", "very", "was", "we", "were", "what", "when",
    "where", "whether", "which", "while", "who", "whom", "whose", "why", "will", "with",
    "within", "without", "would", "yet", "you", "your", "yours", "yourself", "yourselves",
];

/// Shortest token kept, in characters
const MIN_TOKEN_CHARS: usize = 2;

pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.binary_search(&word).is_ok()
}

/// Splits text into index terms
///
/// Text is lowercased, every non-alphanumeric character becomes a word
/// break, stop words and one-character tokens are dropped, and the
/// remaining words are joined into n-grams for every `n` in the range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tokenizer {
    ngram_min: usize,
    ngram_max: usize,
}

impl Tokenizer {
    pub fn new(ngram_min: usize, ngram_max: usize) -> Self {
        let ngram_min = ngram_min.max(1);
        Self {
            ngram_min,
            ngram_max: ngram_max.max(ngram_min),
        }
    }

    pub fn from_config(config: &IndexConfig) -> Self {
        Self::new(config.ngram_min, config.ngram_max)
    }

    pub fn ngram_range(&self) -> (usize, usize) {
        (self.ngram_min, self.ngram_max)
    }

    /// Filtered single words in text order
    pub fn words(&self, text: &str) -> Vec<String> {
        let folded: String = text
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { ' ' })
            .collect();

        folded
            .split_whitespace()
            .filter(|word| word.chars().count() >= MIN_TOKEN_CHARS)
            .filter(|word| !is_stop_word(word))
            .map(str::to_string)
            .collect()
    }

    /// All n-gram terms of the text
    ///
    /// # Example
    ///
    /// ```
    /// use wikidex::index::Tokenizer;
    ///
    /// let tokenizer = Tokenizer::new(1, 2);
    /// assert_eq!(
    ///     tokenizer.terms("The Rust programming language"),
    ///     vec!["rust", "programming", "language", "rust programming", "programming language"]
    /// );
    /// ```
    pub fn terms(&self, text: &str) -> Vec<String> {
        let words = self.words(text);
        let mut terms = Vec::new();

        for n in self.ngram_min..=self.ngram_max {
            if n == 1 {
                terms.extend(words.iter().cloned());
            } else {
                terms.extend(words.windows(n).map(|window| window.join(" ")));
            }
        }

        terms
    }
}
