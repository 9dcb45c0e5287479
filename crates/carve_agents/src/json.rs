//! Locating a JSON object inside free-form agent output.
//!
//! Agents answer with plain JSON, JSON in a markdown fence, or JSON wrapped
//! in prose. Candidates are tried in this order:
//!
//! 1. a ```` ```json ```` fenced block
//! 2. any fenced block
//! 3. the whole text
//! 4. the first balanced `{...}` that parses

use serde_json::Value;

/// Extract the first JSON object from agent output.
pub fn extract_json(text: &str) -> Option<Value> {
    let blocks = fenced_blocks(text);

    blocks
        .iter()
        .filter(|(lang, _)| lang.eq_ignore_ascii_case("json"))
        .chain(blocks.iter().filter(|(lang, _)| !lang.eq_ignore_ascii_case("json")))
        .find_map(|(_, body)| parse_object(body))
        .or_else(|| parse_object(text))
        .or_else(|| first_balanced_object(text))
}

fn parse_object(candidate: &str) -> Option<Value> {
    serde_json::from_str::<Value>(candidate.trim())
        .ok()
        .filter(Value::is_object)
}

/// Collect `(info string, body)` for every closed fenced block.
fn fenced_blocks(text: &str) -> Vec<(String, String)> {
    let mut blocks = Vec::new();
    let mut current: Option<(String, String)> = None;

    for line in text.lines() {
        let trimmed = line.trim_start();
        match current.take() {
            None => {
                if let Some(info) = trimmed.strip_prefix("```") {
                    current = Some((info.trim().to_string(), String::new()));
                }
            }
            Some((lang, mut body)) => {
                if trimmed.starts_with("```") {
                    blocks.push((lang, body));
                } else {
                    body.push_str(line);
                    body.push('\n');
                    current = Some((lang, body));
                }
            }
        }
    }

    blocks
}

/// Scan for balanced braces, ignoring braces inside string literals.
fn first_balanced_object(text: &str) -> Option<Value> {
    let bytes = text.as_bytes();
    let mut search_from = 0;

    while let Some(offset) = text[search_from..].find('{') {
        let start = search_from + offset;
        if let Some(end) = matching_brace(&bytes[start..]) {
            if let Some(value) = parse_object(&text[start..start + end + 1]) {
                return Some(value);
            }
        }
        search_from = start + 1;
    }

    None
}

fn matching_brace(bytes: &[u8]) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_json() {
        let value = extract_json(r#"{"retryConfidence": 0.8}"#).unwrap();
        assert_eq!(value["retryConfidence"], 0.8);
    }

    #[test]
    fn test_json_fence_preferred() {
        let text = "Here is a sketch:\n```\n{\"a\": 1}\n```\nand the answer:\n```json\n{\"a\": 2}\n```\n";
        assert_eq!(extract_json(text).unwrap()["a"], 2);
    }

    #[test]
    fn test_untagged_fence() {
        let text = "```\n{\"a\": 3}\n```";
        assert_eq!(extract_json(text).unwrap()["a"], 3);
    }

    #[test]
    fn test_json_surrounded_by_prose() {
        let text = "Sure! The plan is {\"note\": \"use {braces} carefully\", \"n\": 1} - good luck.";
        let value = extract_json(text).unwrap();
        assert_eq!(value["note"], "use {braces} carefully");
    }

    #[test]
    fn test_skips_non_json_braces() {
        let text = "In Java write `if (x) { y(); }` then: {\"ok\": true}";
        assert_eq!(extract_json(text).unwrap()["ok"], true);
    }

    #[test]
    fn test_escaped_quotes_in_strings() {
        let text = r#"prefix {"msg": "say \"}\" now"} suffix"#;
        assert_eq!(extract_json(text).unwrap()["msg"], "say \"}\" now");
    }

    #[test]
    fn test_nothing_found() {
        assert!(extract_json("no json here").is_none());
        assert!(extract_json("[1, 2, 3]").is_none());
        assert!(extract_json("{ unterminated").is_none());
        assert!(extract_json("").is_none());
    }
}
