//! HTML sanitizing for post bodies written in the rich-text editor

use ammonia::Builder;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};

const ALLOWED_TAGS: [&str; 18] = [
    "p", "h1", "h2", "h3", "blockquote", "ul", "ol", "li", "figure", "figcaption", "hr", "br",
    "strong", "em", "span", "a", "img", "div",
];

/// `rel` is not listed: every link gets `rel="noopener"` instead
const ALLOWED_ATTRIBUTES: [&str; 8] = [
    "href", "title", "src", "alt", "width", "height", "loading", "decoding",
];

const ALLOWED_SCHEMES: [&str; 2] = ["https", "mailto"];

const ALLOWED_CLASSES: [&str; 3] = ["soft-box", "sara-quote", "image-collage"];

static IMG_SRC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<img\b[^>]*?\bsrc\s*=\s*["']([^"']+)["']"#).expect("valid img regex")
});

fn builder() -> Builder<'static> {
    let mut builder = Builder::default();
    builder
        .tags(ALLOWED_TAGS.iter().copied().collect::<HashSet<_>>())
        .tag_attributes(HashMap::new())
        .generic_attributes(ALLOWED_ATTRIBUTES.iter().copied().collect::<HashSet<_>>())
        .url_schemes(ALLOWED_SCHEMES.iter().copied().collect::<HashSet<_>>())
        .link_rel(Some("noopener"));
    for tag in ALLOWED_TAGS {
        builder.add_allowed_classes(tag, ALLOWED_CLASSES.iter());
    }
    builder
}

/// Strip everything outside the editor allowlist from `html`.
pub fn sanitize_html(html: &str) -> String {
    builder().clean(html).to_string()
}

/// `src` values of every `<img>` in `html`, in document order.
pub fn extract_image_sources(html: &str) -> Vec<String> {
    IMG_SRC_RE
        .captures_iter(html)
        .map(|c| c[1].trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Uploaded images referenced by `old_html` that `new_html` no longer uses.
///
/// Only our own uploads count (`/uploads/` in the url); `data:` urls are ignored.
pub fn removed_uploaded_images(old_html: &str, new_html: &str) -> Vec<String> {
    let kept: HashSet<String> = extract_image_sources(new_html).into_iter().collect();
    let mut seen = HashSet::new();
    extract_image_sources(old_html)
        .into_iter()
        .filter(|src| !src.starts_with("data:") && src.contains("/uploads/"))
        .filter(|src| !kept.contains(src))
        .filter(|src| seen.insert(src.clone()))
        .collect()
}
