//! Older block grammars.
//!
//! Both variants describe each message as a block of labeled fields:
//!
//! ```text
//! ---                              ## Message 1
//! Sender: User                     **Sender:** User
//! Time: 2024/01/02 03:04:05        **Time:** 2024/01/02 03:04:05
//! Content: Hello                   **Content:**
//! ---                              Hello
//! ```
//!
//! Sections are separated by `---` lines; headings variants start each block
//! with a `##` or `###` heading and use bold labels. A block without a sender
//! continues the previous message.

use std::sync::OnceLock;

use regex::Regex;

use super::decoder::{BodyFormat, ParsedMessage};
use super::timestamp::parse_timestamp;
use crate::types::Role;

fn label_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(?:\*\*)?(Sender|Time|Content)(?:\*\*)?:(?:\*\*)?[ \t]*(.*)$")
            .expect("valid legacy label regex")
    })
}

fn heading_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^#{2,3}\s").expect("valid legacy heading regex"))
}

fn is_section_delimiter(line: &str) -> bool {
    line.trim() == "---"
}

/// Which legacy grammar `body` uses, if any.
pub fn detect(body: &str) -> Option<BodyFormat> {
    let has_sender = body.lines().any(|line| {
        label_regex()
            .captures(line)
            .is_some_and(|caps| caps[1].eq_ignore_ascii_case("sender"))
    });
    if !has_sender {
        return None;
    }
    if body.lines().any(|line| heading_regex().is_match(line)) {
        Some(BodyFormat::LegacyHeadings)
    } else {
        Some(BodyFormat::LegacySections)
    }
}

pub(crate) fn parse(body: &str, format: BodyFormat) -> Vec<ParsedMessage> {
    let blocks = match format {
        BodyFormat::LegacyHeadings => split_blocks(body, |line| heading_regex().is_match(line)),
        _ => split_blocks(body, is_section_delimiter),
    };

    let mut messages: Vec<ParsedMessage> = Vec::new();
    for block in blocks {
        let Some(fields) = parse_block(&block) else {
            continue;
        };
        match fields.sender {
            None => match messages.last_mut() {
                Some(previous) => {
                    if !fields.content.is_empty() {
                        if !previous.content.is_empty() {
                            previous.content.push_str("\n\n");
                        }
                        previous.content.push_str(&fields.content);
                    }
                }
                None => {
                    tracing::debug!("Dropping legacy block without sender before first message");
                }
            },
            Some(sender) => match Role::from_sender(&sender) {
                Some(role) => messages.push(ParsedMessage {
                    role,
                    timestamp: fields.time.as_deref().and_then(parse_timestamp),
                    content: fields.content,
                }),
                None => {
                    tracing::warn!(sender = %sender, "Skipping legacy block with unknown sender");
                }
            },
        }
    }
    messages
}

/// Split into blocks at delimiter lines; the delimiter lines are dropped.
fn split_blocks(body: &str, is_delimiter: impl Fn(&str) -> bool) -> Vec<Vec<&str>> {
    let mut blocks = Vec::new();
    let mut current = Vec::new();
    for line in body.lines() {
        if is_delimiter(line) {
            if !current.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        blocks.push(current);
    }
    blocks
}

struct BlockFields {
    sender: Option<String>,
    time: Option<String>,
    content: String,
}

fn parse_block(lines: &[&str]) -> Option<BlockFields> {
    let mut sender = None;
    let mut time = None;
    let mut content: Vec<&str> = Vec::new();
    let mut in_content = false;

    for line in lines {
        if in_content {
            content.push(line);
            continue;
        }
        match label_regex().captures(line) {
            Some(caps) => {
                let value = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
                match caps[1].to_ascii_lowercase().as_str() {
                    "sender" => sender = Some(value.trim().to_string()),
                    "time" => time = Some(value.trim().to_string()),
                    _ => {
                        in_content = true;
                        if !value.trim().is_empty() {
                            content.push(value);
                        }
                    }
                }
            }
            None => content.push(line),
        }
    }

    let content = content.join("\n").trim().to_string();
    if sender.is_none() && content.is_empty() {
        return None;
    }
    Some(BlockFields {
        sender,
        time,
        content,
    })
}
