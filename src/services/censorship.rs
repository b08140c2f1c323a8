//! Forbidden-word censorship
//!
//! Moderators store regex patterns; every match in a comment's name or content
//! is replaced by asterisks of the same length before the comment is shown.

use regex::{Regex, RegexBuilder};

/// Combine the valid patterns into one case-insensitive regex.
///
/// Blank and invalid patterns are skipped; `None` when nothing is left.
pub fn build_censor_regex<S: AsRef<str>>(patterns: &[S]) -> Option<Regex> {
    let valid: Vec<String> = patterns
        .iter()
        .map(|p| p.as_ref())
        .filter(|p| !p.trim().is_empty())
        .filter(|p| match Regex::new(p) {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!("Skipping invalid forbidden-word pattern {:?}: {}", p, e);
                false
            }
        })
        .map(|p| format!("(?:{p})"))
        .collect();

    if valid.is_empty() {
        return None;
    }

    let combined = format!(r"\b(?:{})\b", valid.join("|"));
    RegexBuilder::new(&combined)
        .case_insensitive(true)
        .build()
        .ok()
}

/// Replace every match of `regex` by `*` repeated to the match length in characters.
pub fn censor_with(text: &str, regex: Option<&Regex>) -> String {
    match regex {
        Some(re) if !text.is_empty() => re
            .replace_all(text, |caps: &regex::Captures| "*".repeat(caps[0].chars().count()))
            .into_owned(),
        _ => text.to_string(),
    }
}

/// Censor `text` with the given patterns.
pub fn censor<S: AsRef<str>>(text: &str, patterns: &[S]) -> String {
    censor_with(text, build_censor_regex(patterns).as_ref())
}
