//! Tiered noun extraction over free-form description text.
//!
//! The extractor never fails: when part-of-speech tagging is unavailable or
//! finds nothing it degrades through an ordered chain of heuristics, and the
//! first tier producing candidates wins. Within one call, candidates are
//! deduplicated preserving first appearance and source casing.

use anyhow::{Context, Result};
use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

/// Part-of-speech tags treated as nouns: singular/plural common and proper.
const NOUN_TAGS: [&str; 4] = ["NN", "NNS", "NNP", "NNPS"];

static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "an", "the", "and", "or", "but", "with", "without", "of", "in", "on", "for", "to",
        "from", "by", "is", "are", "was", "were", "be", "been", "this", "that", "these", "those",
        "it", "its", "as", "at", "about", "into", "over", "under", "other", "some", "next",
    ]
    .into_iter()
    .collect()
});

static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9]+(?:['-][A-Za-z0-9]+)*").expect("token regex"));

/// Phrases following these anchors tend to name the objects in a generated
/// image description ("the counter holds a knife and two tomatoes").
static ANCHOR_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)holds?\s+(?:a\s+|an\s+|the\s+)?([\w\s-]+?)(?:\.|,| and |$)",
        r"(?i)contains?\s+(?:a\s+|an\s+|the\s+)?([\w\s-]+?)(?:\.|,| and |$)",
        r"(?i)\bon\s+(?:a\s+|an\s+|the\s+)?([\w\s-]+?)(?:\.|,| and |$)",
        r"(?i)next\s+to\s+(?:a\s+|an\s+|the\s+)?([\w\s-]+?)(?:\.|,| and |$)",
        r"(?i)\bwith\s+(?:a\s+|an\s+|the\s+)?([\w\s-]+?)(?:\.|,| and |$)",
        r"(?i)there\s+(?:is|are)\s+(?:a\s+|an\s+|the\s+)?([\w\s-]+?)(?:\.|,| and |$)",
        r"(?i)\b(?:a|an|the)\s+([\w\s-]+?)(?:\.|,| and |$)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("anchor regex"))
    .collect()
});

static FRAGMENT_SPLIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\band\b|,|;").expect("fragment split regex"));

/// Word -> part-of-speech tag dictionary loaded from a plain-text model file
/// (one `word<TAB>tag` entry per line, `#` comments allowed).
pub struct Lexicon {
    tags: HashMap<String, String>,
}

impl Lexicon {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read lexicon {:?}", path))?;
        let mut tags = HashMap::new();
        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split_whitespace();
            if let (Some(word), Some(tag)) = (fields.next(), fields.next()) {
                tags.insert(word.to_lowercase(), tag.to_uppercase());
            }
        }
        if tags.is_empty() {
            anyhow::bail!("lexicon {:?} contains no entries", path);
        }
        Ok(Self { tags })
    }

    /// Try each candidate path in order; `None` when no model file loads.
    pub fn from_paths(paths: &[impl AsRef<Path>]) -> Option<Self> {
        for path in paths {
            match Self::from_file(path.as_ref()) {
                Ok(lexicon) => {
                    info!(
                        "loaded POS lexicon from {:?} ({} entries)",
                        path.as_ref(),
                        lexicon.tags.len()
                    );
                    return Some(lexicon);
                }
                Err(e) => debug!("skipping POS lexicon candidate: {e:#}"),
            }
        }
        debug!("no POS lexicon available; tagged extraction disabled");
        None
    }

    fn tag(&self, token: &str) -> Option<&str> {
        self.tags.get(&token.to_lowercase()).map(String::as_str)
    }
}

pub struct NounExtractor {
    lexicon: Option<Lexicon>,
}

impl NounExtractor {
    pub fn new(lexicon: Option<Lexicon>) -> Self {
        Self { lexicon }
    }

    /// Extract candidate nouns, in order of first appearance, case preserved.
    /// Best-effort: an empty result is possible but no input ever errors.
    pub fn extract(&self, text: &str) -> Vec<String> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }

        self.tagged_nouns(trimmed)
            .or_else(|| self.tagged_nouns(&with_context_clause(trimmed)))
            .or_else(|| anchor_nouns(trimmed))
            .or_else(|| token_nouns(trimmed))
            .unwrap_or_default()
    }

    /// Tier 1/2: keep tokens the lexicon tags as nouns.
    fn tagged_nouns(&self, text: &str) -> Option<Vec<String>> {
        let lexicon = self.lexicon.as_ref()?;
        let mut out = OrderedSet::new();
        for token in TOKEN_RE.find_iter(text) {
            if let Some(tag) = lexicon.tag(token.as_str()) {
                if NOUN_TAGS.contains(&tag) {
                    out.push(token.as_str());
                }
            }
        }
        out.into_non_empty()
    }
}

/// Prepend a synthetic context clause so fragment inputs ("tomato, basil")
/// look like the sentences a tagging model was trained on.
fn with_context_clause(text: &str) -> String {
    let mut clause = text.trim().to_string();
    if !clause.ends_with('.') && !clause.ends_with('!') && !clause.ends_with('?') {
        clause.push('.');
    }
    format!("The image contains {clause}")
}

/// Tier 3: phrases following anchor words, split on conjunctions, keeping the
/// last token of each fragment as the likely noun head.
fn anchor_nouns(text: &str) -> Option<Vec<String>> {
    let mut out = OrderedSet::new();
    for pattern in ANCHOR_PATTERNS.iter() {
        for captures in pattern.captures_iter(text) {
            let Some(group) = captures.get(1) else {
                continue;
            };
            for fragment in FRAGMENT_SPLIT.split(group.as_str()) {
                let candidate: String = fragment
                    .trim()
                    .chars()
                    .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace() || *c == '-')
                    .collect();
                let Some(head) = candidate.split_whitespace().last() else {
                    continue;
                };
                if is_plausible_noun(head, 2) {
                    out.push(head);
                }
            }
        }
    }
    out.into_non_empty()
}

/// Tier 4: bare tokenization on non-alphanumeric boundaries.
fn token_nouns(text: &str) -> Option<Vec<String>> {
    let mut out = OrderedSet::new();
    for word in text.split(|c: char| !c.is_ascii_alphanumeric()) {
        if is_plausible_noun(word, 3) {
            out.push(word);
        }
    }
    out.into_non_empty()
}

fn is_plausible_noun(word: &str, min_len: usize) -> bool {
    if word.len() < min_len {
        return false;
    }
    let lower = word.to_lowercase();
    !STOPWORDS.contains(lower.as_str()) && !lower.chars().all(|c| c.is_ascii_digit())
}

/// Insertion-ordered set of candidate strings.
struct OrderedSet {
    seen: HashSet<String>,
    items: Vec<String>,
}

impl OrderedSet {
    fn new() -> Self {
        Self {
            seen: HashSet::new(),
            items: Vec::new(),
        }
    }

    fn push(&mut self, item: &str) {
        if self.seen.insert(item.to_string()) {
            self.items.push(item.to_string());
        }
    }

    fn into_non_empty(self) -> Option<Vec<String>> {
        (!self.items.is_empty()).then_some(self.items)
    }
}
