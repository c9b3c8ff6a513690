//! Fuzzy matching for misspelled tags and candidate comparison.
//!
//! Similarity is a weighted blend of three measures so that different
//! kinds of damage (typos, truncation, word reordering) all still score
//! high: normalized Levenshtein as the strict baseline, Jaro-Winkler for
//! prefix-heavy typos, and a token-sort pass for reordered words.
//!
//! All comparisons run on normalized text: lowercase, diacritics
//! stripped, bracketed qualifiers dropped, leading track numbers removed,
//! whitespace collapsed.

/// Minimum similarity (0-100) for a fuzzy match to be considered valid.
pub const MATCH_THRESHOLD: f64 = 80.0;

/// Duration deltas up to this many seconds score full credit.
const DURATION_TOLERANCE_SECONDS: f64 = 3.0;
/// Seconds of duration delta at which the duration factor reaches zero.
const DURATION_FALLOFF_SECONDS: f64 = 10.0;

/// Normalize a string for comparison.
///
/// Lowercases, strips diacritics, drops bracketed qualifiers like
/// `[remastered]` or `(live)`, strips a leading track number like
/// `07 - ` or `1-04 `, and collapses whitespace.
pub fn normalize(text: &str) -> String {
    let lowered: String = text
        .chars()
        .map(strip_diacritic)
        .flat_map(|c| c.to_lowercase())
        .collect();
    let without_brackets = drop_bracketed(&lowered);
    let without_number = strip_leading_track_number(without_brackets.trim());
    collapse_whitespace(without_number)
}

/// Similarity between two strings, 0.0 - 100.0.
pub fn similarity(a: Option<&str>, b: Option<&str>) -> f64 {
    let (Some(a), Some(b)) = (a, b) else {
        return 0.0;
    };
    let a = normalize(a);
    let b = normalize(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 100.0;
    }

    let ratio = strsim::normalized_levenshtein(&a, &b);
    let jaro = strsim::jaro_winkler(&a, &b);
    let token_sort = strsim::normalized_levenshtein(&token_sorted(&a), &token_sorted(&b));

    // ratio is the strict baseline, jaro handles prefix typos,
    // token_sort handles word reordering
    (ratio * 0.4 + jaro * 0.3 + token_sort * 0.3) * 100.0
}

/// Check if two strings are a fuzzy match above [`MATCH_THRESHOLD`].
pub fn is_match(a: Option<&str>, b: Option<&str>) -> bool {
    similarity(a, b) >= MATCH_THRESHOLD
}

/// Duration factor, 0.0 - 100.0.
///
/// Full credit within a 3 s tolerance, then linear falloff to zero at
/// 10 s. When either side is missing the factor is neutral.
pub fn duration_score(track_secs: Option<f64>, candidate_secs: Option<f64>) -> f64 {
    match (track_secs, candidate_secs) {
        (Some(a), Some(b)) => {
            let delta = (a - b).abs();
            if delta <= DURATION_TOLERANCE_SECONDS {
                100.0
            } else if delta <= DURATION_FALLOFF_SECONDS {
                let falloff = DURATION_FALLOFF_SECONDS - DURATION_TOLERANCE_SECONDS;
                (1.0 - (delta - DURATION_TOLERANCE_SECONDS) / falloff) * 100.0
            } else {
                0.0
            }
        }
        // Can't compare; neutral score
        _ => 50.0,
    }
}

/// Clean up a raw tag value: trim, collapse whitespace, None if empty.
pub fn clean_tag(value: &str) -> Option<String> {
    let cleaned = collapse_whitespace(value.trim());
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

fn token_sorted(s: &str) -> String {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Drop `(...)` and `[...]` spans entirely.
fn drop_bracketed(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut depth = 0usize;
    for c in s.chars() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}

/// Strip a leading `NN - `, `NN. `, `NN `, or `D-NN ` track prefix.
fn strip_leading_track_number(s: &str) -> &str {
    let digits = s.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 || digits > 3 {
        return s;
    }
    let mut rest = &s[digits..];
    // disc-track form "1-04"
    if let Some(after_dash) = rest.strip_prefix('-') {
        let d2 = after_dash.chars().take_while(|c| c.is_ascii_digit()).count();
        if (1..=3).contains(&d2) {
            rest = &after_dash[d2..];
        }
    }
    let trimmed = rest.trim_start_matches([' ', '.', '-']);
    if trimmed.len() < rest.trim_start().len() || rest.starts_with(' ') {
        let out = trimmed.trim_start();
        if !out.is_empty() {
            return out;
        }
    }
    s
}

/// Map accented Latin characters onto their ASCII base.
fn strip_diacritic(c: char) -> char {
    match c {
        'à'..='å' | 'À'..='Å' => 'a',
        'è'..='ë' | 'È'..='Ë' => 'e',
        'ì'..='ï' | 'Ì'..='Ï' => 'i',
        'ò'..='ö' | 'ø' | 'Ò'..='Ö' | 'Ø' => 'o',
        'ù'..='ü' | 'Ù'..='Ü' => 'u',
        'ý' | 'ÿ' | 'Ý' => 'y',
        'ñ' | 'Ñ' => 'n',
        'ç' | 'Ç' => 'c',
        'ß' => 's',
        _ => c,
    }
}

// Words that stay lowercase in title case (unless first or last)
const SMALL_WORDS: &[&str] = &[
    "a", "an", "the", "and", "but", "or", "nor", "for", "yet", "so", "at", "by", "in", "of", "on",
    "to", "up", "as", "if", "is", "it", "vs", "da", "tha",
];

// Abbreviations that stay ALL CAPS
const UPPERCASE_WORDS: &[&str] = &[
    "dj", "mc", "ii", "iii", "iv", "vi", "vii", "viii", "ix", "ep", "lp", "cd", "uk", "us", "usa",
    "og", "aka", "ft", "feat",
];

/// Apply smart title case to filename- or tag-derived metadata.
///
/// First and last words are always capitalized, small words stay
/// lowercase, known abbreviations go ALL CAPS, and words already in ALL
/// CAPS (2+ chars) are left alone since that is usually intentional.
pub fn smart_title_case(text: &str) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    let last_idx = words.len().saturating_sub(1);
    words
        .iter()
        .enumerate()
        .map(|(i, word)| {
            let stripped = word.trim_matches(|c: char| !c.is_alphanumeric());
            let stripped_lower = stripped.to_lowercase();
            if UPPERCASE_WORDS.contains(&stripped_lower.as_str()) {
                word.replace(stripped, &stripped.to_uppercase())
            } else if i != 0 && i != last_idx && SMALL_WORDS.contains(&stripped_lower.as_str()) {
                word.to_lowercase()
            } else if stripped.len() >= 2 && stripped.chars().all(|c| !c.is_lowercase()) {
                (*word).to_string()
            } else {
                capitalize(word)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}
