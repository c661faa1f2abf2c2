//! Series slug derivation.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

static RE_SPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s\u{3000}]+").expect("space run pattern"));
// ASCII word characters only; accented letters are already folded by this point.
static RE_NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9_-]+").expect("non-word pattern"));
static RE_DASH_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"--+").expect("dash run pattern"));

/// Derive the URL slug of a series from its title.
///
/// Accents are stripped via canonical decomposition, whitespace runs (including the ideographic
/// space) become `_`, anything outside `[A-Za-z0-9_-]` is dropped, and dash runs become `_`.
pub fn slugify(title: &str) -> String {
    let folded: String = title.nfd().filter(|ch| !is_combining_mark(*ch)).collect();
    let lowered = folded.to_lowercase();
    let spaced = RE_SPACE_RUN.replace_all(lowered.trim(), "_");
    let kept = RE_NON_WORD.replace_all(&spaced, "");
    RE_DASH_RUN.replace_all(&kept, "_").into_owned()
}
