//! Header block (YAML frontmatter) of a conversation document.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::{Map, Value};

use super::timestamp::{format_iso, parse_timestamp};
use crate::types::{ConversationId, StoredTempImage};

pub const DELIMITER: &str = "---";

const KEY_ID: &str = "conversationID";
const IDENTITY_KEYS: &[&str] = &[KEY_ID, "conversationId", "conversation_id", "id"];
const KEY_MODEL: &str = "model";
const KEY_TITLE: &str = "title";
const KEY_CREATED: &str = "created";
const KEY_LAST_MODIFIED: &str = "lastModified";
const KEY_LAST_MODE: &str = "lastMode";
const KEY_TAGS: &str = "tags";
const KEY_TEMP_IMAGES: &str = "tempImages";

const YAML_KEYWORDS: &[&str] = &[
    "true", "false", "yes", "no", "on", "off", "y", "n", "null", "~", ".inf", ".nan",
];

/// How the header block was understood.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderSyntax {
    Yaml,
    /// YAML parsing failed; a line-oriented `key: value` scan was used.
    LineScan,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentHeader {
    pub conversation_id: Option<ConversationId>,
    pub model: Option<String>,
    pub title: Option<String>,
    pub created: Option<DateTime<Utc>>,
    pub last_modified: Option<DateTime<Utc>>,
    pub last_mode: Option<String>,
    pub tags: Vec<String>,
    pub temp_images: BTreeMap<String, StoredTempImage>,
}

impl DocumentHeader {
    /// Parse a header block (without delimiters). Never fails; unknown keys
    /// are ignored.
    pub fn parse(block: &str) -> (Self, HeaderSyntax) {
        match serde_yaml_bw::from_str::<Value>(block) {
            Ok(Value::Object(map)) => (Self::from_map(&map), HeaderSyntax::Yaml),
            Ok(Value::Null) if block.trim().is_empty() => (Self::default(), HeaderSyntax::Yaml),
            Ok(_) => (Self::from_map(&scan_lines(block)), HeaderSyntax::LineScan),
            Err(e) => {
                tracing::debug!(error = %e, "Header is not valid YAML, scanning lines");
                (Self::from_map(&scan_lines(block)), HeaderSyntax::LineScan)
            }
        }
    }

    fn from_map(map: &Map<String, Value>) -> Self {
        let conversation_id = IDENTITY_KEYS
            .iter()
            .filter_map(|key| map.get(*key).and_then(scalar_string))
            .map(ConversationId::new)
            .find(|id| !id.is_empty());

        let temp_images = match map.get(KEY_TEMP_IMAGES) {
            Some(Value::Object(table)) => table
                .iter()
                .filter_map(|(token, raw)| {
                    let raw = match raw {
                        Value::Object(_) => raw.to_string(),
                        other => scalar_string(other)?,
                    };
                    Some((token.trim().to_string(), StoredTempImage::parse(&raw)))
                })
                .collect(),
            _ => BTreeMap::new(),
        };

        let tags = match map.get(KEY_TAGS) {
            Some(Value::Array(items)) => items.iter().filter_map(scalar_string).collect(),
            Some(other) => scalar_string(other)
                .map(|s| {
                    s.split(',')
                        .map(|t| t.trim().to_string())
                        .filter(|t| !t.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            None => Vec::new(),
        };

        let text = |key: &str| map.get(key).and_then(scalar_string);
        Self {
            conversation_id,
            model: text(KEY_MODEL),
            title: text(KEY_TITLE),
            created: text(KEY_CREATED).as_deref().and_then(parse_timestamp),
            last_modified: text(KEY_LAST_MODIFIED).as_deref().and_then(parse_timestamp),
            last_mode: text(KEY_LAST_MODE),
            tags,
            temp_images,
        }
    }

    /// True when the header names at least one field this codec writes.
    pub fn is_recognized(&self) -> bool {
        self.conversation_id.is_some()
            || self.title.is_some()
            || self.created.is_some()
            || self.model.is_some()
            || !self.temp_images.is_empty()
    }

    /// Render the header including both delimiter lines. Output is deterministic.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(256);
        out.push_str(DELIMITER);
        out.push('\n');

        if let Some(id) = &self.conversation_id {
            push_entry(&mut out, KEY_ID, &yaml_scalar(id.as_str()));
        }
        if let Some(model) = &self.model {
            push_entry(&mut out, KEY_MODEL, &yaml_scalar(model));
        }
        if let Some(title) = &self.title {
            push_entry(&mut out, KEY_TITLE, &quote(title));
        }
        if let Some(created) = &self.created {
            push_entry(&mut out, KEY_CREATED, &yaml_scalar(&format_iso(created)));
        }
        if let Some(modified) = &self.last_modified {
            push_entry(&mut out, KEY_LAST_MODIFIED, &yaml_scalar(&format_iso(modified)));
        }
        if let Some(mode) = &self.last_mode {
            push_entry(&mut out, KEY_LAST_MODE, &quote(mode));
        }
        if !self.tags.is_empty() {
            out.push_str(KEY_TAGS);
            out.push_str(":\n");
            for tag in &self.tags {
                out.push_str("  - ");
                out.push_str(&quote(tag));
                out.push('\n');
            }
        }
        if !self.temp_images.is_empty() {
            out.push_str(KEY_TEMP_IMAGES);
            out.push_str(":\n");
            for (token, image) in &self.temp_images {
                out.push_str("  ");
                push_entry(&mut out, &yaml_scalar(token), &quote(&image.to_header_value(token)));
            }
        }

        out.push_str(DELIMITER);
        out.push('\n');
        out
    }
}

fn push_entry(out: &mut String, key: &str, value: &str) {
    out.push_str(key);
    out.push_str(": ");
    out.push_str(value);
    out.push('\n');
}

/// Split a document into its header block (without delimiters) and body.
///
/// A leading byte-order mark is ignored. Without a closed leading `---` block
/// the whole text is body.
pub fn split_document(text: &str) -> (Option<&str>, &str) {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let Some(first_end) = text.find('\n') else {
        return (None, text);
    };
    if text[..first_end].trim_end() != DELIMITER {
        return (None, text);
    }

    let block_start = first_end + 1;
    let mut offset = block_start;
    for line in text[block_start..].split_inclusive('\n') {
        if line.trim_end() == DELIMITER {
            let block = &text[block_start..offset];
            let body = &text[offset + line.len()..];
            return (Some(block), body);
        }
        offset += line.len();
    }
    (None, text)
}

/// Parse only the identity from a document, without touching the body.
pub fn peek_identity(text: &str) -> Option<ConversationId> {
    let (block, _) = split_document(text);
    let block = block?;

    let mut found: Vec<(usize, String)> = Vec::new();
    for caps in identity_line_regex().captures_iter(block) {
        let key = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let Some(rank) = IDENTITY_KEYS.iter().position(|k| *k == key) else {
            continue;
        };
        let value = unquote(caps.get(2).map(|m| m.as_str()).unwrap_or_default());
        if !value.is_empty() {
            found.push((rank, value));
        }
    }
    found
        .into_iter()
        .min_by_key(|(rank, _)| *rank)
        .map(|(_, value)| ConversationId::new(value))
}

fn identity_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^(conversationID|conversationId|conversation_id|id):[ \t]*(.*?)[ \t]*\r?$")
            .expect("valid identity line regex")
    })
}

fn plain_scalar_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._:+-]*$").expect("valid plain scalar regex")
    })
}

/// Render `value` as a YAML scalar: plain when it reads back as the same
/// string, JSON-quoted otherwise.
pub fn yaml_scalar(value: &str) -> String {
    let lower = value.to_ascii_lowercase();
    let plain = plain_scalar_regex().is_match(value)
        && value.chars().any(|c| c.is_ascii_alphabetic())
        && value.parse::<f64>().is_err()
        && !YAML_KEYWORDS.contains(&lower.as_str())
        && !lower.starts_with("0x")
        && !lower.starts_with("0o");
    if plain { value.to_string() } else { quote(value) }
}

/// JSON string literal, which is also a valid YAML double-quoted scalar.
fn quote(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("\"{}\"", value))
}

fn unquote(raw: &str) -> String {
    let raw = raw.trim();
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        return serde_json::from_str::<String>(raw)
            .unwrap_or_else(|_| raw[1..raw.len() - 1].to_string());
    }
    if raw.len() >= 2 && raw.starts_with('\'') && raw.ends_with('\'') {
        return raw[1..raw.len() - 1].replace("''", "'");
    }
    raw.to_string()
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Tolerant `key: value` scan: top-level scalars, indented `- item` lists and
/// indented `key: value` maps.
fn scan_lines(block: &str) -> Map<String, Value> {
    let mut map = Map::new();
    let mut section: Option<String> = None;

    for line in block.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let indented = line.starts_with([' ', '\t']);

        if !indented {
            section = None;
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = unquote(key);
            let value = value.trim();
            if value.is_empty() {
                section = Some(key);
            } else {
                map.insert(key, Value::String(unquote(value)));
            }
            continue;
        }

        let Some(key) = &section else {
            continue;
        };
        if let Some(item) = trimmed.strip_prefix('-') {
            let item = unquote(item);
            let entry = map
                .entry(key.clone())
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(items) = entry {
                items.push(Value::String(item));
            }
        } else if let Some((nested_key, nested_value)) = trimmed.split_once(':') {
            let entry = map
                .entry(key.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(table) = entry {
                table.insert(unquote(nested_key), Value::String(unquote(nested_value)));
            }
        }
    }
    map
}
