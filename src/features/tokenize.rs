//! Text tokenization for the sparse-lexical embedder
//!
//! Tokens are lowercased alphanumeric runs of at least two characters;
//! everything else is a separator. The stop-word list covers common English
//! function words so the TF-IDF vocabulary is spent on content terms.

use std::collections::HashSet;

/// Minimum token length kept by [`tokenize`].
const MIN_TOKEN_LENGTH: usize = 2;

/// Split a text into lowercase alphanumeric tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= MIN_TOKEN_LENGTH)
        .map(|t| t.to_lowercase())
        .collect()
}

/// English stop words removed before vocabulary construction.
pub fn english_stop_words() -> HashSet<&'static str> {
    let words = [
        // Articles
        "a", "an", "the",
        // Pronouns
        "i", "me", "my", "myself", "we", "our", "ours", "ourselves", "you", "your", "yours",
        "yourself", "yourselves", "he", "him", "his", "himself", "she", "her", "hers", "herself",
        "it", "its", "itself", "they", "them", "their", "theirs", "themselves", "what", "which",
        "who", "whom", "this", "that", "these", "those",
        // Verbs
        "am", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had", "having",
        "do", "does", "did", "doing", "would", "should", "could", "ought", "might", "must",
        "shall", "will", "can", "may",
        // Prepositions
        "at", "by", "for", "from", "in", "into", "of", "on", "to", "with", "about", "against",
        "between", "during", "before", "after", "above", "below", "up", "down", "out", "off",
        "over", "under", "again", "further", "then", "once",
        // Conjunctions
        "and", "but", "or", "nor", "so", "yet", "if", "because", "as", "until", "while", "when",
        "where", "why", "how",
        // Quantifiers and misc
        "all", "any", "both", "each", "few", "more", "most", "other", "some", "such", "no",
        "not", "only", "own", "same", "than", "too", "very", "just", "also", "there", "here",
        "via",
    ];
    words.into_iter().collect()
}
