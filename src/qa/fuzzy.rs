//! Fuzzy keyword matching for takeoff item text.
//!
//! Construction vocabulary is heavy on synonyms (roofing vs. shingles) and
//! plural/singular noise, so item-to-target matching is tiered: exact substring,
//! then mutual word containment, then edit-distance similarity, with a fixed
//! domain synonym table expanding the question's target keywords.

use std::collections::HashSet;

/// Default threshold for the boolean [`matches`] check.
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.7;

/// Default threshold for the graded [`score`] check.
pub const DEFAULT_SCORE_THRESHOLD: f64 = 0.6;

/// Words at or below this length are excluded from word-level comparison.
const MIN_WORD_LEN: usize = 3;

/// Domain synonym groups: canonical term plus related trade vocabulary.
///
/// A target that textually overlaps any entry of a group pulls in the whole
/// group, so "roof" also matches items labeled "Asphalt Shingles".
const SYNONYM_GROUPS: &[(&str, &[&str])] = &[
    (
        "roof",
        &["roofing", "shingle", "shingles", "asphalt", "tile", "membrane", "covering"],
    ),
    ("concrete", &["cement", "footing", "foundation", "slab", "rebar"]),
    ("framing", &["lumber", "stud", "studs", "joist", "truss", "beam"]),
    ("drywall", &["gypsum", "sheetrock", "wallboard"]),
    (
        "floor",
        &["flooring", "tile", "carpet", "hardwood", "vinyl", "laminate"],
    ),
    ("window", &["windows", "glazing", "glass"]),
    ("door", &["doors", "entry", "hardware"]),
    ("plumbing", &["pipe", "piping", "fixture", "fixtures", "water"]),
    (
        "electrical",
        &["wiring", "conduit", "outlet", "outlets", "panel", "lighting"],
    ),
    ("hvac", &["mechanical", "duct", "ductwork", "ventilation", "furnace"]),
    ("insulation", &["batt", "foam", "thermal"]),
    ("paint", &["painting", "primer", "coating"]),
    ("siding", &["cladding", "exterior", "veneer", "stucco"]),
];

/// Normalize free text for comparison: lowercase, `&` spelled out, all runs of
/// non-alphanumerics collapsed to single spaces, trimmed.
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase().replace('&', " and ");

    let mut out = String::with_capacity(lowered.len());
    let mut pending_space = false;
    for ch in lowered.chars() {
        if ch.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            out.push(ch);
            pending_space = false;
        } else {
            pending_space = true;
        }
    }
    out
}

/// Heuristic singularization. Left untouched for short words so "its" and
/// "gas" don't get mangled.
pub fn strip_plural(word: &str) -> String {
    let len = word.chars().count();
    if len <= MIN_WORD_LEN {
        return word.to_string();
    }
    if let Some(stem) = word.strip_suffix("ies") {
        return format!("{stem}y");
    }
    if len > 4 {
        if let Some(stem) = word.strip_suffix("es") {
            return stem.to_string();
        }
    }
    if let Some(stem) = word.strip_suffix('s') {
        return stem.to_string();
    }
    word.to_string()
}

/// Standard edit distance over the full dynamic-programming matrix. Inputs are
/// individual words, so no early-exit optimization is needed.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (m, n) = (a.len(), b.len());

    let mut dp = vec![vec![0usize; n + 1]; m + 1];
    for (i, row) in dp.iter_mut().enumerate().take(m + 1) {
        row[0] = i;
    }
    for (j, cell) in dp[0].iter_mut().enumerate().take(n + 1) {
        *cell = j;
    }
    for i in 1..=m {
        for j in 1..=n {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            dp[i][j] = (dp[i - 1][j] + 1)
                .min(dp[i][j - 1] + 1)
                .min(dp[i - 1][j - 1] + cost);
        }
    }
    dp[m][n]
}

/// Normalized similarity in `[0, 1]`. Two empty strings are identical.
pub fn similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / max_len as f64
}

/// Expand raw target keywords with the domain synonym table.
pub fn expand_targets(targets: &[String]) -> HashSet<String> {
    let mut expanded = HashSet::new();
    for raw in targets {
        let target = raw.to_lowercase();
        if target.trim().is_empty() {
            continue;
        }
        for (canonical, synonyms) in SYNONYM_GROUPS {
            let in_group = target.contains(canonical)
                || canonical.contains(target.as_str())
                || synonyms
                    .iter()
                    .any(|s| target.contains(s) || s.contains(target.as_str()));
            if in_group {
                expanded.insert((*canonical).to_string());
                expanded.extend(synonyms.iter().map(|s| (*s).to_string()));
            }
        }
        expanded.insert(target);
    }
    expanded
}

fn comparison_words(text: &str) -> Vec<String> {
    text.split(' ')
        .filter(|w| w.chars().count() > 2)
        .map(strip_plural)
        .collect()
}

/// True when the text matches any expanded target: substring containment,
/// mutual word containment after plural stripping, or word similarity at or
/// above `threshold`.
pub fn matches(text: &str, targets: &[String], threshold: f64) -> bool {
    let haystack = normalize(text);
    if haystack.is_empty() {
        return false;
    }
    let words = comparison_words(&haystack);

    for target in expand_targets(targets) {
        let needle = normalize(&target);
        if needle.is_empty() {
            continue;
        }
        if haystack.contains(&needle) {
            return true;
        }
        for target_word in comparison_words(&needle) {
            for word in &words {
                if word.contains(&target_word) || target_word.contains(word.as_str()) {
                    return true;
                }
                if similarity(word, &target_word) >= threshold {
                    return true;
                }
            }
        }
    }
    false
}

/// Graded match strength in `[0, 1]`: exact substring scores 1.0, mutual word
/// containment 0.8, and a word-pair similarity above `threshold` scores as that
/// similarity. Returns the best score across all expanded targets.
pub fn score(text: &str, targets: &[String], threshold: f64) -> f64 {
    let haystack = normalize(text);
    if haystack.is_empty() {
        return 0.0;
    }
    let words = comparison_words(&haystack);

    let mut best: f64 = 0.0;
    for target in expand_targets(targets) {
        let needle = normalize(&target);
        if needle.is_empty() {
            continue;
        }
        if haystack.contains(&needle) {
            return 1.0;
        }
        for target_word in comparison_words(&needle) {
            for word in &words {
                if word.contains(&target_word) || target_word.contains(word.as_str()) {
                    best = best.max(0.8);
                    continue;
                }
                let sim = similarity(word, &target_word);
                if sim > threshold {
                    best = best.max(sim);
                }
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn targets(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn normalize_collapses_punctuation() {
        assert_eq!(normalize("  Roofing & Siding -- (EPDM) "), "roofing and siding epdm");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("--- ---"), "");
    }

    #[test]
    fn strip_plural_heuristics() {
        assert_eq!(strip_plural("windows"), "window");
        assert_eq!(strip_plural("categories"), "category");
        assert_eq!(strip_plural("finishes"), "finish");
        // Short words are left alone.
        assert_eq!(strip_plural("gas"), "gas");
        assert_eq!(strip_plural("its"), "its");
    }

    #[test]
    fn levenshtein_spot_values() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("stud", "stud"), 0);
    }

    #[test]
    fn similarity_of_empty_strings_is_one() {
        assert_eq!(similarity("", ""), 1.0);
    }

    #[test]
    fn expand_targets_pulls_in_roofing_group() {
        let expanded = expand_targets(&targets(&["roof"]));
        for term in ["roof", "roofing", "shingles", "membrane"] {
            assert!(expanded.contains(term), "missing {term}");
        }
    }

    #[test]
    fn expand_targets_keeps_unknown_vocabulary() {
        let expanded = expand_targets(&targets(&["Geotextile Fabric"]));
        assert!(expanded.contains("geotextile fabric"));
    }

    #[test]
    fn matches_window_units_via_containment() {
        assert!(matches(
            "Window Units - Vinyl Double Hung",
            &targets(&["windows"]),
            DEFAULT_MATCH_THRESHOLD,
        ));
    }

    #[test]
    fn matches_rejects_unrelated_text() {
        assert!(!matches(
            "Structural Steel Beams",
            &targets(&["paint"]),
            DEFAULT_MATCH_THRESHOLD,
        ));
    }

    #[test]
    fn score_exact_substring_is_full() {
        assert_eq!(
            score("Window Units - Vinyl Double Hung", &targets(&["windows"]), DEFAULT_SCORE_THRESHOLD),
            1.0
        );
    }

    #[test]
    fn score_synonym_hit_counts_as_exact() {
        // "roof" expands to "shingles", which appears verbatim in the text.
        assert_eq!(
            score("Asphalt Shingles 30yr", &targets(&["roof"]), DEFAULT_SCORE_THRESHOLD),
            1.0
        );
    }

    #[test]
    fn score_no_match_is_zero() {
        assert_eq!(
            score("Landscaping allowance", &targets(&["drywall"]), DEFAULT_SCORE_THRESHOLD),
            0.0
        );
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(s in ".{0,64}") {
            let once = normalize(&s);
            prop_assert_eq!(normalize(&once), once);
        }

        #[test]
        fn similarity_is_symmetric(a in "[a-z]{0,12}", b in "[a-z]{0,12}") {
            prop_assert_eq!(similarity(&a, &b), similarity(&b, &a));
        }

        #[test]
        fn similarity_is_reflexive(a in "[a-z]{0,12}") {
            prop_assert_eq!(similarity(&a, &a), 1.0);
        }

        #[test]
        fn score_stays_in_unit_interval(
            text in "[a-zA-Z0-9 ]{0,48}",
            target in "[a-zA-Z]{1,12}",
        ) {
            let s = score(&text, &[target], DEFAULT_SCORE_THRESHOLD);
            prop_assert!((0.0..=1.0).contains(&s));
        }

        #[test]
        fn score_is_full_on_normalized_containment(
            prefix in "[a-z]{3,8}",
            target in "[a-z]{3,8}",
        ) {
            let text = format!("{prefix} {target}");
            prop_assert_eq!(score(&text, &[target], DEFAULT_SCORE_THRESHOLD), 1.0);
        }
    }
}
