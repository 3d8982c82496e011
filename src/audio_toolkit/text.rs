use natural::phonetics::soundex;
use strsim::levenshtein;

/// Case-insensitive substring scan for the command keyword.
pub fn contains_keyword(text: &str, keyword: &str) -> bool {
    if keyword.is_empty() {
        return false;
    }
    text.to_lowercase().contains(&keyword.to_lowercase())
}

/// Fuzzy keyword scan for transcripts where the recognizer mangled the
/// keyword ("abdate" for "update"). Each word is scored with normalized
/// levenshtein distance, discounted when the soundex codes match, and
/// accepted when the combined score falls below `threshold`.
pub fn fuzzy_contains_keyword(text: &str, keyword: &str, threshold: f64) -> bool {
    let keyword = keyword.trim().to_lowercase();
    if keyword.is_empty() {
        return false;
    }

    for word in text.split_whitespace() {
        let cleaned: String = word
            .chars()
            .filter(|c| c.is_alphabetic())
            .collect::<String>()
            .to_lowercase();
        if cleaned.is_empty() || cleaned.len() > 50 {
            continue;
        }

        let distance = levenshtein(&cleaned, &keyword);
        let max_len = cleaned.len().max(keyword.len()) as f64;
        let mut score = if max_len > 0.0 {
            distance as f64 / max_len
        } else {
            1.0
        };
        if soundex(&cleaned, &keyword) {
            score *= 0.3;
        }
        if score < threshold {
            return true;
        }
    }
    false
}
