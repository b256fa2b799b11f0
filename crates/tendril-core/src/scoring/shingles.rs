//! Text shingling and overlap measures.

use std::collections::BTreeSet;

/// Lower-case the text and collapse whitespace runs into single spaces.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Overlapping 3-character windows of the normalized text.
///
/// Texts of one or two characters yield a single shingle; empty text yields none.
pub fn trigrams(text: &str) -> BTreeSet<String> {
    let chars: Vec<char> = normalize(text).chars().collect();
    match chars.len() {
        0 => BTreeSet::new(),
        1 | 2 => BTreeSet::from([chars.iter().collect()]),
        _ => chars.windows(3).map(|w| w.iter().collect()).collect(),
    }
}

/// Alphanumeric tokens of at least `min_len` characters, lower-cased.
pub fn words(text: &str, min_len: usize) -> BTreeSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= min_len)
        .map(String::from)
        .collect()
}

/// Jaccard index |A ∩ B| / |A ∪ B|; zero when both sets are empty.
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f32 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f32 / union as f32
}

/// Fraction of probe words that contain, or are contained in, some query word.
pub fn word_overlap(query_words: &BTreeSet<String>, probe_words: &BTreeSet<String>) -> f32 {
    if probe_words.is_empty() {
        return 0.0;
    }
    let hits = probe_words
        .iter()
        .filter(|pw| {
            query_words
                .iter()
                .any(|qw| qw.contains(pw.as_str()) || pw.contains(qw.as_str()))
        })
        .count();
    hits as f32 / probe_words.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  Hello \t  WORLD\n"), "hello world");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn test_trigrams() {
        let grams = trigrams("Abcd");
        assert_eq!(grams.len(), 2);
        assert!(grams.contains("abc"));
        assert!(grams.contains("bcd"));

        assert_eq!(trigrams("ab").len(), 1);
        assert!(trigrams("   ").is_empty());
    }

    #[test]
    fn test_jaccard() {
        let a = trigrams("consciousness");
        assert!((jaccard(&a, &a) - 1.0).abs() < f32::EPSILON);
        assert_eq!(jaccard(&a, &trigrams("xyz")), 0.0);
        assert_eq!(jaccard(&BTreeSet::new(), &BTreeSet::new()), 0.0);
    }

    #[test]
    fn test_words_skip_short_tokens() {
        let w = words("AI is a field, for real-time research!", 3);
        assert!(w.contains("field"));
        assert!(w.contains("real"));
        assert!(w.contains("time"));
        assert!(!w.contains("is"));
        assert!(!w.contains("ai"));
    }

    #[test]
    fn test_word_overlap_partial_words() {
        let probe = words("find consciousness collaborators", 3);
        let query = words("conscious collaborator search", 3);
        // "consciousness" contains "conscious", "collaborators" contains "collaborator"
        let overlap = word_overlap(&query, &probe);
        assert!((overlap - 2.0 / 3.0).abs() < 1e-6);

        assert_eq!(word_overlap(&query, &BTreeSet::new()), 0.0);
    }
}
