use std::collections::{BTreeSet, HashMap};

/// Common words that carry no signal for similarity matching.
const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "can", "her", "was", "one", "our",
    "out", "has", "had", "have", "this", "that", "with", "what", "when", "where", "which", "who",
    "how", "why", "your", "from", "they", "them", "then", "than", "its", "it's", "will", "would",
    "could", "should", "about", "into", "over", "just", "like", "some", "only", "also", "been",
    "being", "does", "did", "doing", "very", "really", "there", "here", "because", "please",
];

fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(&word)
}

/// Normalized, stopword-filtered, top-N keyword set of a prompt. Frequency
/// decides the top N; ties go alphabetically so the set is stable.
pub fn extract_keywords(text: &str, top_n: usize) -> BTreeSet<String> {
    let mut frequency: HashMap<String, usize> = HashMap::new();
    for word in text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 3 && !is_stopword(w))
    {
        *frequency.entry(word.to_string()).or_insert(0) += 1;
    }

    let mut ranked: Vec<(String, usize)> = frequency.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(top_n).map(|(w, _)| w).collect()
}

/// |A ∩ B| / |A ∪ B|; 0.0 when both sets are empty.
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f64 / union as f64
}

/// Space-joined sorted serialization used for the `semantic_cache.keywords`
/// column; `BTreeSet` iteration keeps it deterministic.
pub fn join_keywords(set: &BTreeSet<String>) -> String {
    set.iter().cloned().collect::<Vec<_>>().join(" ")
}

pub fn split_keywords(joined: &str) -> BTreeSet<String> {
    joined.split_whitespace().map(ToString::to_string).collect()
}
