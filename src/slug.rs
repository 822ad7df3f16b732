use std::sync::LazyLock;

use regex::Regex;

static DISALLOWED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_\s-]").expect("static regex"));
static SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s_-]+").expect("static regex"));

/// Derives the base slug for an article title.
///
/// Lowercases and trims, drops everything except ASCII word characters, whitespace and
/// hyphens, then collapses separator runs into a single `-` and trims hyphens from both
/// ends. May return an empty string for titles with no usable characters.
pub fn slugify(title: &str) -> String {
    let lowered = title.to_lowercase();
    let stripped = DISALLOWED.replace_all(lowered.trim(), "");
    let joined = SEPARATORS.replace_all(&stripped, "-");
    joined.trim_matches('-').to_string()
}

/// The `n`th disambiguated form of `base`. `0` is the base slug itself.
pub fn candidate(base: &str, n: u32) -> String {
    if n == 0 {
        base.to_string()
    } else {
        format!("{base}-{n}")
    }
}
