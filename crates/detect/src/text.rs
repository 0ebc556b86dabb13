//! Text cleanup and similarity primitives.
//!
//! All comparisons run over [`clean`]ed text: lowercased, diacritics folded
//! to their base letter, punctuation dropped, whitespace collapsed. Letters
//! outside the basic alphanumeric range are kept only when they belong to a
//! script range (CJK, kana, hangul) so non-Latin titles compare by content
//! rather than being stripped to nothing.

/// Stop words excluded from keyword extraction, per language. Words of
/// length <= 2 are dropped before this list is consulted.
const STOP_WORDS: &[&str] = &[
    // English
    "the", "and", "for", "with", "from", "that", "this", "are", "was", "not", "but", "all",
    "one", "vol", "volume", "chapter",
    // Spanish
    "los", "las", "del", "por", "con", "una", "que", "como",
    // French
    "les", "des", "une", "dans", "pour", "sur", "avec",
    // Romanized Japanese particles/fillers long enough to survive the
    // length filter
    "kara", "made", "desu", "koto", "mono",
];

/// Fold common Latin diacritics to their base letter.
fn fold_diacritic(ch: char) -> char {
    match ch {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' => 'a',
        'è' | 'é' | 'ê' | 'ë' | 'ē' => 'e',
        'ì' | 'í' | 'î' | 'ï' | 'ī' => 'i',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ō' => 'o',
        'ù' | 'ú' | 'û' | 'ü' | 'ū' => 'u',
        'ý' | 'ÿ' => 'y',
        'ñ' => 'n',
        'ç' => 'c',
        'ß' => 's',
        _ => ch,
    }
}

/// Whether a character belongs to a script range we compare by content
/// (CJK ideographs, hiragana, katakana, hangul).
fn is_script_letter(ch: char) -> bool {
    matches!(ch,
        '\u{3040}'..='\u{30ff}'      // hiragana + katakana
        | '\u{3400}'..='\u{4dbf}'    // CJK extension A
        | '\u{4e00}'..='\u{9fff}'    // CJK unified
        | '\u{ac00}'..='\u{d7af}'    // hangul syllables
    )
}

/// Normalize a string for comparison: lowercase, fold diacritics, keep
/// alphanumerics and script letters, collapse runs of anything else into a
/// single space.
pub fn clean(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut pending_space = false;
    for ch in s.chars().flat_map(char::to_lowercase) {
        // Combining marks left over from decomposed input are dropped.
        if ('\u{0300}'..='\u{036f}').contains(&ch) {
            continue;
        }
        let ch = fold_diacritic(ch);
        if ch.is_ascii_alphanumeric() || is_script_letter(ch) {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(ch);
        } else {
            pending_space = true;
        }
    }
    out
}

/// Levenshtein edit distance between two strings.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let m = a.len();
    let n = b.len();

    let mut prev = (0..=n).collect::<Vec<_>>();
    let mut curr = vec![0; n + 1];

    for i in 1..=m {
        curr[0] = i;
        for j in 1..=n {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            curr[j] = (prev[j] + 1)
                .min(curr[j - 1] + 1)
                .min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[n]
}

/// Normalized similarity in [0,1] between two raw strings, computed over
/// their cleaned forms: `1 − distance / max_len`. Two strings identical
/// after cleanup score 1.0; two empty strings score 1.0.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = clean(a);
    let b = clean(b);
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(&a, &b) as f64 / max_len as f64
}

/// Extract up to `max` significant keywords from a title for candidate
/// lookup: cleaned words longer than 2 characters that are not stop words.
pub fn significant_words(title: &str, max: usize) -> Vec<String> {
    clean(title)
        .split_whitespace()
        .filter(|w| w.chars().count() > 2)
        .filter(|w| !STOP_WORDS.contains(w))
        .take(max)
        .map(String::from)
        .collect()
}

// ── Tests ────────────────────────────────────────────────────────────
