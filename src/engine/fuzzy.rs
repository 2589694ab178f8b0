use strsim::{jaro_winkler, normalized_levenshtein};

use crate::engine::gazetteer::{Gazetteer, GazetteerEntry};

/// Best gazetteer candidate for a user-supplied city/province pair.
#[derive(Debug, Clone)]
pub struct FuzzyMatch {
    pub entry: GazetteerEntry,
    /// Normalized similarity in [0, 1].
    pub similarity: f64,
}

/// Approximate city/province matcher over the gazetteer. Pure and
/// deterministic: the same input always yields the same match and score.
#[derive(Debug, Clone)]
pub struct FuzzyMatcher {
    floor: f64,
}

impl FuzzyMatcher {
    pub fn new(floor: f64) -> Self {
        Self { floor }
    }

    /// Returns the best-matching entry, or None when nothing clears the
    /// similarity floor. Candidates whose province agrees with the supplied
    /// one beat raw city similarity; remaining ties go to the earlier
    /// gazetteer entry.
    pub fn best_match(
        &self,
        gazetteer: &Gazetteer,
        city: &str,
        province: Option<&str>,
    ) -> Option<FuzzyMatch> {
        let target = normalize_key(city);
        if target.is_empty() {
            return None;
        }

        let mut best: Option<(bool, f64, &GazetteerEntry)> = None;
        for entry in gazetteer.entries() {
            let score = similarity(&target, &normalize_key(&entry.city));
            if score < self.floor {
                continue;
            }
            let province_agrees = province.map_or(false, |p| province_matches(p, entry));
            let better = match &best {
                None => true,
                // strictly-greater comparison keeps the first entry on ties
                Some((best_agrees, best_score, _)) => {
                    (province_agrees, score) > (*best_agrees, *best_score)
                }
            };
            if better {
                best = Some((province_agrees, score, entry));
            }
        }

        best.map(|(_, similarity, entry)| FuzzyMatch {
            entry: entry.clone(),
            similarity,
        })
    }
}

/// Mean of normalized Levenshtein and Jaro-Winkler over folded keys.
fn similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    (normalized_levenshtein(a, b) + jaro_winkler(a, b)) / 2.0
}

/// A supplied province matches an entry by two-letter code ("MI") or by the
/// province's full name ("Milano").
pub fn province_matches(supplied: &str, entry: &GazetteerEntry) -> bool {
    let supplied = supplied.trim();
    entry.province.eq_ignore_ascii_case(supplied)
        || normalize_key(&entry.province_name) == normalize_key(supplied)
}

/// Lowercase, fold diacritics, drop apostrophes, collapse whitespace and
/// hyphens. Keys are ASCII afterwards, so the similarity metrics compare
/// letter for letter.
pub fn normalize_key(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.to_lowercase().chars() {
        match fold_char(c) {
            Some(' ') => {
                if !out.is_empty() && !out.ends_with(' ') {
                    out.push(' ');
                }
            }
            Some(folded) => out.push(folded),
            None => {}
        }
    }
    out.trim_end().to_string()
}

fn fold_char(c: char) -> Option<char> {
    match c {
        'à' | 'á' | 'â' | 'ä' => Some('a'),
        'è' | 'é' | 'ê' | 'ë' => Some('e'),
        'ì' | 'í' | 'î' | 'ï' => Some('i'),
        'ò' | 'ó' | 'ô' | 'ö' => Some('o'),
        'ù' | 'ú' | 'û' | 'ü' => Some('u'),
        '\'' | '’' | '`' => None,
        '-' => Some(' '),
        c if c.is_whitespace() => Some(' '),
        c => Some(c),
    }
}
