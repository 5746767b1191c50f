//! Label text algorithms: comparison keys, stemming, display casing and
//! hashtag conversion.
//!
//! [`normalize`] and [`stem`] produce comparison keys only and are never
//! written back to the store. [`format_category_name`] produces the display
//! form that is.
//!
//! # Known limitations
//!
//! The stemmer folds three English plural patterns and nothing else. Irregular
//! plurals ("children"), non-English plurals and words that merely end in `s`
//! ("news" -> "new") are not handled correctly. Normalization strips every
//! character outside `[a-z0-9 ]`, so accented letters vanish from comparison
//! keys.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::defaults::FALLBACK_CATEGORY_NAME;

/// Anything that is not a letter, digit, whitespace or one of `- _ ' /`.
static DISALLOWED_LABEL_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\p{L}\p{N}\s\-_'/]").expect("static regex"));

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

/// Words forced to lowercase unless they open the name.
pub const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "and", "but", "or", "nor", "for", "so", "yet", "as", "at", "by", "in",
    "of", "on", "per", "to", "up", "via", "vs", "with", "from", "into",
];

fn straighten_apostrophes(s: &str) -> String {
    s.replace(['\u{2019}', '\u{2018}', '\u{02BC}'], "'")
}

// =============================================================================
// COMPARISON KEYS
// =============================================================================

/// Canonical comparison key for a label.
///
/// Lowercases, straightens curly apostrophes, drops everything outside
/// `[a-z0-9 ]` and collapses whitespace.
pub fn normalize(label: &str) -> String {
    let lowered = straighten_apostrophes(&label.to_lowercase());
    let kept: String = lowered
        .chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == ' ')
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Fold one word's plural suffix. Rules are tried in order, first match wins.
fn stem_word(word: &str) -> String {
    let len = word.len();
    if len > 4 && word.ends_with("ies") {
        return format!("{}y", &word[..len - 3]);
    }
    if len > 3
        && word.ends_with("es")
        && ["shes", "ches", "xes", "ses"]
            .iter()
            .any(|suffix| word.ends_with(suffix))
    {
        return word[..len - 2].to_string();
    }
    if len > 2 && word.ends_with('s') && !word.ends_with("ss") {
        return word[..len - 1].to_string();
    }
    word.to_string()
}

/// Stemmed comparison key used for lexical pre-clustering.
///
/// Applies [`normalize`] and then folds each word:
/// `-ies -> -y` (len > 4), `-es -> ""` after `sh/ch/x/s` (len > 3),
/// trailing `-s -> ""` (len > 2, not `-ss`).
pub fn stem(label: &str) -> String {
    normalize(label)
        .split(' ')
        .filter(|w| !w.is_empty())
        .map(stem_word)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether a label's normalized form ends in a plural `s` (not `ss`).
pub fn has_plural_suffix(label: &str) -> bool {
    let key = normalize(label);
    key.ends_with('s') && !key.ends_with("ss")
}

// =============================================================================
// DISPLAY FORM
// =============================================================================

/// Replace punctuation outside `letters|digits|space|-|_|'|/` with spaces and
/// collapse whitespace.
pub fn sanitize_label(raw: &str) -> String {
    let straightened = straighten_apostrophes(raw);
    let replaced = DISALLOWED_LABEL_CHARS.replace_all(&straightened, " ");
    WHITESPACE_RUN.replace_all(replaced.trim(), " ").into_owned()
}

fn is_acronym(core: &str) -> bool {
    core.chars().count() >= 2
        && core.chars().all(|c| c.is_alphanumeric())
        && core.chars().any(|c| c.is_alphabetic())
        && core
            .chars()
            .filter(|c| c.is_alphabetic())
            .all(|c| c.is_uppercase())
}

fn capitalize(core: &str) -> String {
    let mut chars = core.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(|c| c.to_lowercase()))
            .collect(),
    }
}

/// Case one `-`/`_`/`/`-delimited segment, keeping surrounding glyphs.
fn case_segment(segment: &str, force_capital: bool) -> String {
    let start = segment
        .char_indices()
        .find(|(_, c)| c.is_alphanumeric())
        .map(|(i, _)| i);
    let Some(start) = start else {
        return segment.to_string();
    };
    let end = segment
        .char_indices()
        .filter(|(_, c)| c.is_alphanumeric())
        .last()
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(segment.len());

    let (prefix, rest) = segment.split_at(start);
    let (core, suffix) = rest.split_at(end - start);

    let cased = if is_acronym(core) {
        core.to_string()
    } else if !force_capital && STOP_WORDS.contains(&core.to_lowercase().as_str()) {
        core.to_lowercase()
    } else {
        capitalize(core)
    };

    format!("{}{}{}", prefix, cased, suffix)
}

/// Title-case an already sanitized label.
///
/// Per whitespace token and per `-`/`_`/`/` sub-segment: all-caps acronyms of
/// two or more characters stay verbatim, leading and trailing glyphs are kept,
/// the very first segment is always capitalized, stop words elsewhere are
/// lowercased, everything else is capitalized. Empty input yields `"General"`.
pub fn title_case(label: &str) -> String {
    let mut words = Vec::new();
    for (word_index, token) in label.split_whitespace().enumerate() {
        let mut word = String::with_capacity(token.len());
        let mut segment = String::new();
        let mut segment_index = 0;
        for c in token.chars() {
            if matches!(c, '-' | '_' | '/') {
                word.push_str(&case_segment(
                    &segment,
                    word_index == 0 && segment_index == 0,
                ));
                word.push(c);
                segment.clear();
                segment_index += 1;
            } else {
                segment.push(c);
            }
        }
        word.push_str(&case_segment(&segment, word_index == 0 && segment_index == 0));
        words.push(word);
    }

    if words.is_empty() {
        FALLBACK_CATEGORY_NAME.to_string()
    } else {
        words.join(" ")
    }
}

/// Display name for a raw label: sanitize, then title-case.
pub fn format_category_name(raw: &str) -> String {
    title_case(&sanitize_label(raw))
}

// =============================================================================
// HASHTAGS
// =============================================================================

/// Convert a category name to a hashtag token (without the leading `#`).
///
/// Splits on whitespace, `-` and `_`, upper-cases each word's first letter,
/// concatenates and strips every non-alphanumeric character. Returns `None`
/// when nothing alphanumeric remains.
pub fn to_hashtag(name: &str) -> Option<String> {
    let joined: String = name
        .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect();

    let tag: String = joined.chars().filter(|c| c.is_alphanumeric()).collect();
    if tag.is_empty() {
        None
    } else {
        Some(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // normalize
    // =========================================================================

    #[test]
    fn test_normalize_lowercases_and_trims() {
        assert_eq!(normalize("  Street Food  "), "street food");
    }

    #[test]
    fn test_normalize_collapses_whitespace() {
        assert_eq!(normalize("street \t  food"), "street food");
    }

    #[test]
    fn test_normalize_strips_punctuation() {
        assert_eq!(normalize("Women’s Fashion!"), "womens fashion");
        assert_eq!(normalize("DIY-Crafts"), "diycrafts");
    }

    #[test]
    fn test_normalize_empty() {
        assert_eq!(normalize("   "), "");
        assert_eq!(normalize("!!!"), "");
    }

    // =========================================================================
    // stem
    // =========================================================================

    #[test]
    fn test_stem_trailing_s() {
        assert_eq!(stem("outfits"), "outfit");
        assert_eq!(stem("outfit"), "outfit");
        assert_eq!(stem("Outfits"), stem("outfit"));
    }

    #[test]
    fn test_stem_ies_to_y() {
        assert_eq!(stem("categories"), "category");
    }

    #[test]
    fn test_stem_ies_needs_length_over_four() {
        // "pies" is too short for the -ies rule and falls to the -s rule
        assert_eq!(stem("pies"), "pie");
    }

    #[test]
    fn test_stem_es_after_sibilant() {
        assert_eq!(stem("dishes"), "dish");
        assert_eq!(stem("beaches"), "beach");
        assert_eq!(stem("boxes"), "box");
        assert_eq!(stem("classes"), "class");
    }

    #[test]
    fn test_stem_es_without_sibilant_only_drops_s() {
        assert_eq!(stem("recipes"), "recipe");
    }

    #[test]
    fn test_stem_keeps_double_s() {
        assert_eq!(stem("dress"), "dress");
        assert_eq!(stem("fitness"), "fitness");
    }

    #[test]
    fn test_stem_short_words_untouched() {
        assert_eq!(stem("us"), "us");
        assert_eq!(stem("s"), "s");
    }

    #[test]
    fn test_stem_applies_per_word() {
        assert_eq!(stem("Travel Tips"), "travel tip");
        assert_eq!(stem("cats and dogs"), stem("cat and dog"));
    }

    #[test]
    fn test_has_plural_suffix() {
        assert!(has_plural_suffix("Outfits"));
        assert!(!has_plural_suffix("outfit"));
        assert!(!has_plural_suffix("Dress"));
    }

    // =========================================================================
    // sanitize / title_case
    // =========================================================================

    #[test]
    fn test_sanitize_replaces_punctuation() {
        assert_eq!(sanitize_label("food & drink!!"), "food drink");
        assert_eq!(sanitize_label("new-york_city/usa"), "new-york_city/usa");
        assert_eq!(sanitize_label("  it’s   fine "), "it's fine");
    }

    #[test]
    fn test_title_case_compound_tokens() {
        assert_eq!(title_case("new-york food"), "New-York Food");
    }

    #[test]
    fn test_title_case_stop_words() {
        assert_eq!(title_case("the lord of the rings"), "The Lord of the Rings");
    }

    #[test]
    fn test_title_case_acronym_preserved() {
        assert_eq!(title_case("USA travel"), "USA Travel");
        assert_eq!(title_case("travel in the USA"), "Travel in the USA");
    }

    #[test]
    fn test_title_case_single_capital_is_not_acronym() {
        assert_eq!(title_case("A guide"), "A Guide");
    }

    #[test]
    fn test_title_case_first_segment_capitalized_even_if_stop_word() {
        assert_eq!(title_case("of mice and men"), "Of Mice and Men");
    }

    #[test]
    fn test_title_case_stop_word_in_later_segment() {
        assert_eq!(title_case("rock-and-roll"), "Rock-and-Roll");
    }

    #[test]
    fn test_title_case_keeps_surrounding_glyphs() {
        assert_eq!(title_case("(diy) crafts"), "(Diy) Crafts");
    }

    #[test]
    fn test_title_case_lowercases_rest_of_word() {
        assert_eq!(title_case("sTREET fOOD"), "Street Food");
    }

    #[test]
    fn test_title_case_apostrophe_inside_word() {
        assert_eq!(title_case("women's fashion"), "Women's Fashion");
    }

    #[test]
    fn test_title_case_empty_is_general() {
        assert_eq!(title_case(""), "General");
        assert_eq!(format_category_name("!!! ???"), "General");
    }

    #[test]
    fn test_format_category_name() {
        assert_eq!(format_category_name("  street-food & eats "), "Street-Food Eats");
    }

    // =========================================================================
    // to_hashtag
    // =========================================================================

    #[test]
    fn test_to_hashtag_joins_words() {
        assert_eq!(to_hashtag("street food").as_deref(), Some("StreetFood"));
        assert_eq!(to_hashtag("new-york_city").as_deref(), Some("NewYorkCity"));
    }

    #[test]
    fn test_to_hashtag_strips_punctuation() {
        assert_eq!(to_hashtag("mom's recipes!").as_deref(), Some("MomsRecipes"));
    }

    #[test]
    fn test_to_hashtag_keeps_acronyms() {
        assert_eq!(to_hashtag("USA travel").as_deref(), Some("USATravel"));
    }

    #[test]
    fn test_to_hashtag_empty() {
        assert_eq!(to_hashtag("  - _ "), None);
        assert_eq!(to_hashtag("!!!"), None);
    }
}
