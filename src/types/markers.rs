//! Inline image markup and temporary-image placeholders inside message text.

use std::sync::OnceLock;

use regex::Regex;

const PLACEHOLDER_PREFIX: &str = "[!TempImg ";

pub(crate) fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\[!TempImg ([A-Za-z0-9_-]+)\]").expect("valid placeholder regex")
    })
}

fn image_markup_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"!\[([^\]]*)\]\(([^)]*)\)").expect("valid image markup regex"))
}

/// `[!TempImg <token>]`
pub fn placeholder(token: &str) -> String {
    format!("{}{}]", PLACEHOLDER_PREFIX, token)
}

/// `![<label>](<target>)`
pub fn image_markup(label: &str, target: &str) -> String {
    format!("![{}]({})", label, target)
}

/// Placeholder tokens in order of first appearance, without duplicates.
pub fn placeholder_tokens(text: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    for caps in placeholder_regex().captures_iter(text) {
        let token = &caps[1];
        if !tokens.iter().any(|t| t == token) {
            tokens.push(token.to_string());
        }
    }
    tokens
}

pub fn has_placeholders(text: &str) -> bool {
    text.contains(PLACEHOLDER_PREFIX) && placeholder_regex().is_match(text)
}

/// Targets (paths or data URIs) of every resolved image marker.
pub fn image_targets(text: &str) -> Vec<&str> {
    image_markup_regex()
        .captures_iter(text)
        .filter_map(|caps| caps.get(2).map(|m| m.as_str()))
        .collect()
}

/// Text with both kinds of image markers removed.
pub fn strip_markers(text: &str) -> String {
    let without_images = image_markup_regex().replace_all(text, "");
    placeholder_regex()
        .replace_all(&without_images, "")
        .into_owned()
}
