//! Text folding and normalization shared by the lexical components
//!
//! Everything lexical in the engine (domain hints, slot cues, alias keys,
//! document names) is compared in *normalized* form: lower-case, accents
//! stripped, every run of separators collapsed to a single space, and a
//! trailing file extension dropped.

use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

/// Lower-case and strip diacritics, keeping every other character.
pub fn fold(text: &str) -> String {
    text.nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Canonical form used for all name and keyword matching.
///
/// Idempotent: `normalize(&normalize(x)) == normalize(x)`.
pub fn normalize(text: &str) -> String {
    let folded = fold(text);
    let stem = strip_extension(folded.trim());

    let mut out = String::with_capacity(stem.len());
    for word in stem.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}

/// Words of a normalized string with at least `min_chars` characters.
pub fn tokens(normalized: &str, min_chars: usize) -> impl Iterator<Item = &str> {
    normalized
        .split(' ')
        .filter(move |t| t.chars().count() >= min_chars)
}

/// Whether `term` occurs in `haystack` starting at a word boundary and
/// ending at a word boundary or a Spanish plural suffix (`s` / `es`).
///
/// Both arguments must already be normalized.
pub fn contains_term(haystack: &str, term: &str) -> bool {
    if term.is_empty() {
        return false;
    }

    let bytes = haystack.as_bytes();
    let mut from = 0;
    while let Some(pos) = haystack[from..].find(term) {
        let start = from + pos;
        let end = start + term.len();
        let left_ok = start == 0 || bytes[start - 1] == b' ';
        let rest = &haystack[end..];
        let right_ok = rest.is_empty()
            || rest.starts_with(' ')
            || ["s", "es"]
                .iter()
                .any(|suffix| rest.strip_prefix(suffix).is_some_and(|r| r.is_empty() || r.starts_with(' ')));
        if left_ok && right_ok {
            return true;
        }
        from = start + 1;
        while !haystack.is_char_boundary(from) {
            from += 1;
        }
    }
    false
}

fn strip_extension(text: &str) -> &str {
    match text.rsplit_once('.') {
        Some((stem, ext))
            if !stem.trim().is_empty()
                && (2..=4).contains(&ext.len())
                && ext.chars().all(|c| c.is_ascii_alphabetic()) =>
        {
            stem
        }
        _ => text,
    }
}
